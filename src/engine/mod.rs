//! 認識エンジンアダプタ
//!
//! - `EngineModel` は読み込み済みの読み取り専用モデル。全セッションで共有される
//! - `Recognizer` はモデルから生成される可変のデコード状態。1セッション専有
//! - `EngineRegistry` がエンジンキー→モデルの対応を持ち、`RecognizerHandle` を払い出す
//!
//! エンジン呼び出しは同期・CPUバウンドで、無期限にブロックしない前提。
mod error;
mod mock;
pub mod pcm;
mod registry;
mod resampler;
pub mod segmenter;
#[cfg(feature = "whisper")]
pub mod whisper_engine;

use std::fmt;

pub use error::EngineError;
pub use mock::{MockModel, RecognizerStats};
pub use registry::{EngineInfo, EngineRegistry, EngineRegistryBuilder};
pub use resampler::LinearResampler;

/// 1フレーム投入後にエンジンが返す結果。粒度はエンジン側が決める
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// 未確定の仮説（空文字列もありうる）
    Partial { text: String },
    /// 発話の確定結果。以後このセグメントの状態はクリアされる
    Final {
        text: String,
        confidence: Option<f32>,
    },
}

pub trait Recognizer: Send {
    fn feed(&mut self, frame: &[u8]) -> Result<Decoded, EngineError>;
}

pub trait EngineModel: Send + Sync {
    fn create_recognizer(&self, sample_rate_hz: u32) -> Result<Box<dyn Recognizer>, EngineError>;
}

/// セッションが専有する認識器。破棄（drop）で解放される
pub struct RecognizerHandle {
    engine_key: String,
    sample_rate_hz: u32,
    inner: Box<dyn Recognizer>,
}

impl RecognizerHandle {
    pub(crate) fn new(engine_key: String, sample_rate_hz: u32, inner: Box<dyn Recognizer>) -> Self {
        Self {
            engine_key,
            sample_rate_hz,
            inner,
        }
    }

    pub fn engine_key(&self) -> &str {
        &self.engine_key
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn feed(&mut self, frame: &[u8]) -> Result<Decoded, EngineError> {
        self.inner.feed(frame)
    }
}

impl fmt::Debug for RecognizerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognizerHandle")
            .field("engine_key", &self.engine_key)
            .field("sample_rate_hz", &self.sample_rate_hz)
            .finish_non_exhaustive()
    }
}
