use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine '{key}' is not available")]
    Unavailable { key: String },
    #[error("failed to load engine '{key}': {message}")]
    Load { key: String, message: String },
    #[error("decode failed: {message}")]
    Decode { message: String },
    #[error("no recognition engine could be loaded")]
    NoEngines,
}

impl EngineError {
    pub fn unavailable(key: impl Into<String>) -> Self {
        Self::Unavailable { key: key.into() }
    }

    pub fn load(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}
