pub mod audio_pipeline;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod monitoring;
pub mod protocol;
pub mod server;
pub mod session;

pub use config::ConfigSet;
