//! テスト・ドライラン用の決定的なモックエンジン
//!
//! フレームは UTF-8 テキストとして解釈され、仮説に追記されていく。
//! 改行で発話が確定し、それまでの仮説が最終結果になる。
//! UTF-8 として不正なフレームはデコード失敗として扱う。
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::error::EngineError;
use super::{Decoded, EngineModel, Recognizer};

/// 生成・解放された認識器の数（リーク/二重解放の検証用）
#[derive(Debug, Default)]
pub struct RecognizerStats {
    created: AtomicUsize,
    released: AtomicUsize,
}

impl RecognizerStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// 現在生きている認識器の数
    pub fn live(&self) -> usize {
        self.created().saturating_sub(self.released())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockModel {
    stats: Arc<RecognizerStats>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<RecognizerStats> {
        self.stats.clone()
    }
}

impl EngineModel for MockModel {
    fn create_recognizer(&self, _sample_rate_hz: u32) -> Result<Box<dyn Recognizer>, EngineError> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockRecognizer {
            pending: String::new(),
            stats: self.stats.clone(),
        }))
    }
}

#[derive(Debug)]
struct MockRecognizer {
    pending: String,
    stats: Arc<RecognizerStats>,
}

impl Recognizer for MockRecognizer {
    fn feed(&mut self, frame: &[u8]) -> Result<Decoded, EngineError> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| EngineError::decode(format!("mock engine expects UTF-8 frames: {e}")))?;
        self.pending.push_str(text);

        match self.pending.find('\n') {
            Some(pos) => {
                let rest = self.pending.split_off(pos + 1);
                let mut utterance = std::mem::replace(&mut self.pending, rest);
                utterance.truncate(pos);
                Ok(Decoded::Final {
                    text: utterance,
                    confidence: Some(1.0),
                })
            }
            None => Ok(Decoded::Partial {
                text: self.pending.clone(),
            }),
        }
    }
}

impl Drop for MockRecognizer {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}
