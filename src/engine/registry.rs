use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{EngineEntryConfig, EngineKind, EngineRegistryConfig, StreamingConfig};

use super::error::EngineError;
use super::mock::MockModel;
use super::{EngineModel, RecognizerHandle};

/// 登録済みエンジンの説明
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    pub key: String,
    pub display_name: String,
    pub language: String,
    pub kind: &'static str,
}

impl EngineInfo {
    pub fn new(key: impl Into<String>, kind: EngineKind) -> Self {
        let key = key.into();
        Self {
            display_name: key.clone(),
            language: key.clone(),
            key,
            kind: kind.as_str(),
        }
    }

    fn from_entry(entry: &EngineEntryConfig, kind: EngineKind) -> Self {
        Self {
            key: entry.key.clone(),
            display_name: entry.display_name().to_string(),
            language: entry.language().to_string(),
            kind: kind.as_str(),
        }
    }
}

struct RegisteredEngine {
    info: EngineInfo,
    model: Arc<dyn EngineModel>,
}

/// エンジンキー→読み込み済みモデル。起動時に一度だけ構築され、以後は読み取り専用
pub struct EngineRegistry {
    engines: Vec<RegisteredEngine>,
    default_key: String,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("keys", &self.keys())
            .field("default_key", &self.default_key)
            .finish()
    }
}

impl EngineRegistry {
    pub fn builder() -> EngineRegistryBuilder {
        EngineRegistryBuilder::default()
    }

    /// 設定からモデルを読み込む。読み込めないエントリは警告してスキップ
    /// （`allow_mock_fallback` ならモックで代替）
    pub fn from_config(config: &EngineRegistryConfig) -> Result<Self, EngineError> {
        let mut builder = Self::builder().default_engine(&config.default_engine);

        for entry in &config.engines {
            match load_model(entry, &config.streaming) {
                Ok(model) => {
                    info!(engine = %entry.key, kind = entry.kind.as_str(), "engine loaded");
                    builder = builder.register(EngineInfo::from_entry(entry, entry.kind), model);
                }
                Err(err) if config.allow_mock_fallback => {
                    warn!(engine = %entry.key, error = %err, "engine unavailable, falling back to mock");
                    builder = builder.register(
                        EngineInfo::from_entry(entry, EngineKind::Mock),
                        Arc::new(MockModel::new()),
                    );
                }
                Err(err) => {
                    warn!(engine = %entry.key, error = %err, "engine unavailable, skipping");
                }
            }
        }

        builder.build()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// 登録順のキー一覧
    pub fn keys(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.info.key.clone()).collect()
    }

    pub fn info(&self, key: &str) -> Option<&EngineInfo> {
        self.find(key).map(|e| &e.info)
    }

    pub fn engines(&self) -> impl Iterator<Item = &EngineInfo> {
        self.engines.iter().map(|e| &e.info)
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// 指定エンジンの新しい認識器を生成
    pub fn create_recognizer(
        &self,
        key: &str,
        sample_rate_hz: u32,
    ) -> Result<RecognizerHandle, EngineError> {
        let engine = self.find(key).ok_or_else(|| EngineError::unavailable(key))?;
        let inner = engine.model.create_recognizer(sample_rate_hz)?;
        Ok(RecognizerHandle::new(key.to_string(), sample_rate_hz, inner))
    }

    fn find(&self, key: &str) -> Option<&RegisteredEngine> {
        self.engines.iter().find(|e| e.info.key == key)
    }
}

#[derive(Default)]
pub struct EngineRegistryBuilder {
    engines: Vec<RegisteredEngine>,
    default_key: Option<String>,
}

impl EngineRegistryBuilder {
    /// 同じキーは後勝ちで置き換える
    pub fn register(mut self, info: EngineInfo, model: Arc<dyn EngineModel>) -> Self {
        self.engines.retain(|e| e.info.key != info.key);
        self.engines.push(RegisteredEngine { info, model });
        self
    }

    pub fn default_engine(mut self, key: impl Into<String>) -> Self {
        self.default_key = Some(key.into());
        self
    }

    pub fn build(self) -> Result<EngineRegistry, EngineError> {
        let first = self
            .engines
            .first()
            .map(|e| e.info.key.clone())
            .ok_or(EngineError::NoEngines)?;

        let default_key = match self.default_key {
            Some(key) if self.engines.iter().any(|e| e.info.key == key) => key,
            Some(key) => {
                warn!(requested = %key, fallback = %first, "default engine not available");
                first
            }
            None => first,
        };

        Ok(EngineRegistry {
            engines: self.engines,
            default_key,
        })
    }
}

fn load_model(
    entry: &EngineEntryConfig,
    streaming: &StreamingConfig,
) -> Result<Arc<dyn EngineModel>, EngineError> {
    match entry.kind {
        EngineKind::Mock => Ok(Arc::new(MockModel::new())),
        EngineKind::Whisper => load_whisper(entry, streaming),
    }
}

#[cfg(feature = "whisper")]
fn load_whisper(
    entry: &EngineEntryConfig,
    streaming: &StreamingConfig,
) -> Result<Arc<dyn EngineModel>, EngineError> {
    let model = super::whisper_engine::WhisperModel::load(entry, streaming)?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "whisper"))]
fn load_whisper(
    entry: &EngineEntryConfig,
    _streaming: &StreamingConfig,
) -> Result<Arc<dyn EngineModel>, EngineError> {
    Err(EngineError::load(
        &entry.key,
        "built without the `whisper` feature",
    ))
}
