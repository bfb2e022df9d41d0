use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// 認識器を生成できない（セッション開始時は接続にとって致命的）
    #[error("engine unavailable: {0}")]
    EngineUnavailable(#[source] EngineError),
    #[error("unknown engine '{requested}'")]
    UnknownEngine {
        requested: String,
        available: Vec<String>,
    },
    #[error("session is closed")]
    SessionClosed,
    /// 1フレームのデコード失敗。セッションは継続できる
    #[error("decode fault: {0}")]
    DecodeFault(#[source] EngineError),
}
