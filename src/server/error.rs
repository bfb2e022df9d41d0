use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::session::SessionError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bind error: {0}")]
    Bind(std::io::Error),
}

/// `Active` に到達する前に接続を中断した理由
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),
    #[error("session could not be created: {0}")]
    EngineUnavailable(#[source] SessionError),
}
