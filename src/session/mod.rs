//! 1接続ぶんの可変状態
//!
//! `Session` は接続タスクが専有し、共有マップには置かない。
//! 認識器ハンドルは常に高々1つで、リセット/切替時は新しいハンドルに
//! 丸ごと置き換える（旧ハンドルはその場で破棄され、プールしない）。
mod error;
mod tracker;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::engine::{Decoded, EngineError, EngineRegistry, RecognizerHandle};

pub use error::SessionError;
pub use tracker::{SessionSummary, SessionTracker, TrackedSession};

/// 接続のライフサイクル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    fn is_open(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Session {
    id: String,
    engine_key: String,
    sample_rate_hz: u32,
    handle: Option<RecognizerHandle>,
    state: SessionState,
    registry: Arc<EngineRegistry>,
}

impl Session {
    /// 指定エンジンの認識器を持つセッションを `Connecting` 状態で作成
    pub fn start(
        registry: Arc<EngineRegistry>,
        engine_key: &str,
        sample_rate_hz: u32,
    ) -> Result<Self, SessionError> {
        let handle = registry
            .create_recognizer(engine_key, sample_rate_hz)
            .map_err(SessionError::EngineUnavailable)?;
        let id = uuid::Uuid::new_v4().to_string();
        debug!(session_id = %id, engine = %engine_key, sample_rate_hz, "session created");

        Ok(Self {
            id,
            engine_key: engine_key.to_string(),
            sample_rate_hz,
            handle: Some(handle),
            state: SessionState::Connecting,
            registry,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn engine_key(&self) -> &str {
        &self.engine_key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 利用可能なエンジンキー（登録順）
    pub fn available_engines(&self) -> Vec<String> {
        self.registry.keys()
    }

    /// `Connecting` → `Active`
    pub fn activate(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.state = SessionState::Active;
        Ok(())
    }

    /// 別エンジンへ切り替える。未登録キーなら状態は変えずにエラー
    pub fn switch_engine(&mut self, key: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        if !self.registry.contains(key) {
            return Err(SessionError::UnknownEngine {
                requested: key.to_string(),
                available: self.registry.keys(),
            });
        }
        self.replace_handle(key)
    }

    /// 現在のエンジンで認識器を作り直す
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        let key = self.engine_key.clone();
        self.replace_handle(&key)
    }

    /// 現在の認識器へフレームをそのまま渡す
    pub fn feed(&mut self, frame: &[u8]) -> Result<Decoded, SessionError> {
        self.ensure_open()?;
        let handle = self.handle.as_mut().ok_or(SessionError::SessionClosed)?;
        handle.feed(frame).map_err(SessionError::DecodeFault)
    }

    /// 冪等。初回のみ認識器を解放して `Closed` へ遷移し、`true` を返す
    pub fn close(&mut self) -> bool {
        if !self.state.is_open() {
            return false;
        }
        self.state = SessionState::Closing;
        drop(self.handle.take());
        self.state = SessionState::Closed;
        debug!(session_id = %self.id, "session closed");
        true
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(SessionError::SessionClosed)
        }
    }

    /// 新しいハンドルの生成に成功した場合のみ旧ハンドルと差し替える
    fn replace_handle(&mut self, key: &str) -> Result<(), SessionError> {
        let handle = self
            .registry
            .create_recognizer(key, self.sample_rate_hz)
            .map_err(|err| match err {
                EngineError::Unavailable { key } => SessionError::UnknownEngine {
                    requested: key,
                    available: self.registry.keys(),
                },
                other => SessionError::EngineUnavailable(other),
            })?;
        let previous = self.handle.replace(handle);
        drop(previous);
        self.engine_key = key.to_string();
        debug!(session_id = %self.id, engine = %key, "recognizer replaced");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
