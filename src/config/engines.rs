//! 認識エンジンの登録・ストリーミング設定
use std::ops::RangeInclusive;
use std::path::PathBuf;

use serde::Deserialize;

use super::ConfigError;

/// 受け付ける入力サンプルレート（設定値・接続時の指定とも）
pub const SUPPORTED_SAMPLE_RATES_HZ: RangeInclusive<u32> = 8_000..=48_000;

/// エンジンレジストリとストリーミング挙動の設定
#[derive(Debug, Clone, Deserialize)]
pub struct EngineRegistryConfig {
    pub sample_rate_hz: u32,
    pub default_engine: String,
    #[serde(default)]
    pub allow_mock_fallback: bool,
    #[serde(default)]
    pub streaming: StreamingConfig,
    pub engines: Vec<EngineEntryConfig>,
}

impl EngineRegistryConfig {
    /// 値の整合性を検査
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_SAMPLE_RATES_HZ.contains(&self.sample_rate_hz) {
            return Err(ConfigError::invalid(
                "sample_rate_hz",
                format!(
                    "{} Hz is outside {}..={} Hz",
                    self.sample_rate_hz,
                    SUPPORTED_SAMPLE_RATES_HZ.start(),
                    SUPPORTED_SAMPLE_RATES_HZ.end()
                ),
            ));
        }
        if self.engines.is_empty() {
            return Err(ConfigError::invalid("engines", "at least one engine is required"));
        }
        for (i, entry) in self.engines.iter().enumerate() {
            if entry.key.trim().is_empty() {
                return Err(ConfigError::invalid("engines.key", format!("entry #{i} has an empty key")));
            }
            if self.engines[..i].iter().any(|other| other.key == entry.key) {
                return Err(ConfigError::invalid(
                    "engines.key",
                    format!("duplicate engine key '{}'", entry.key),
                ));
            }
        }
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.engines.iter().map(|e| e.key.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamingConfig {
    pub partial_result_interval_ms: u64,
    pub finalization_silence_ms: u64,
    pub max_utterance_ms: u64,
    pub silence_threshold_db: f32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            partial_result_interval_ms: 500,
            finalization_silence_ms: 600,
            max_utterance_ms: 15_000,
            silence_threshold_db: -45.0,
        }
    }
}


#[derive(Debug, Clone, Deserialize)]
pub struct EngineEntryConfig {
    pub key: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    pub kind: EngineKind,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub translate: bool,
}

impl EngineEntryConfig {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.key)
    }

    /// 言語コード（未指定時はキーをそのまま使う）
    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or(&self.key)
    }
}

fn default_threads() -> usize {
    4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// whisper.cpp モデル（`whisper` フィーチャが必要）
    Whisper,
    /// テキストフレームを認識結果として扱う決定的なモック
    Mock,
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Whisper => "whisper",
            Self::Mock => "mock",
        }
    }
}
