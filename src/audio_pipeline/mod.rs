//! 音声フレーム→認識結果イベント
//!
//! フレームは加工せずセッションの現在の認識器へ渡す。空白だけの結果（無音）は送らない。
//! 1フレームにつき高々1イベントで、フレーム順のまま返す。
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

use crate::engine::Decoded;
use crate::protocol::{OutboundEvent, TranscriptResult};
use crate::session::{Session, SessionError};

#[derive(Debug, Clone, Copy, Default)]
pub struct AudioPipeline;

impl AudioPipeline {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, session: &mut Session, frame: &[u8]) -> Vec<OutboundEvent> {
        match run_engine(|| session.feed(frame)) {
            Ok(decoded) => to_event(decoded, session.engine_key())
                .map(OutboundEvent::TranscriptResult)
                .into_iter()
                .collect(),
            Err(SessionError::DecodeFault(err)) => {
                warn!(session_id = %session.id(), bytes = frame.len(), error = %err, "frame dropped");
                vec![OutboundEvent::error(format!("audio processing error: {err}"))]
            }
            Err(err) => {
                debug!(session_id = %session.id(), error = %err, "frame rejected");
                vec![OutboundEvent::error(err.to_string())]
            }
        }
    }
}

/// エンジン出力をイベントへ。トリム後に空なら `None`
pub fn to_event(decoded: Decoded, engine_key: &str) -> Option<TranscriptResult> {
    match decoded {
        Decoded::Final { text, confidence } => {
            let text = text.trim();
            (!text.is_empty()).then(|| TranscriptResult::final_result(text, engine_key, confidence))
        }
        Decoded::Partial { text } => {
            let text = text.trim();
            (!text.is_empty()).then(|| TranscriptResult::partial(text, engine_key))
        }
    }
}

/// マルチスレッドランタイム上では `block_in_place` で推論し、他の接続を止めない
fn run_engine<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
