//! whisper.cpp を使うバッファリング型エンジン（`whisper` フィーチャ）
//!
//! whisper はストリーミングデコーダではないため、s16le PCM を発話単位で貯め、
//! `UtteranceSegmenter` の判断に従ってバッファ全体を推論する。
use std::sync::Arc;

use crate::config::{EngineEntryConfig, StreamingConfig};

use super::error::EngineError;
use super::pcm::s16le_to_f32;
use super::resampler::LinearResampler;
use super::segmenter::{SegmentDecision, UtteranceSegmenter};
use super::{Decoded, EngineModel, Recognizer};

/// whisper の入力サンプルレート
const WHISPER_SAMPLE_RATE_HZ: u32 = 16_000;

pub struct WhisperModel {
    ctx: Arc<whisper_rs::WhisperContext>,
    language: String,
    threads: usize,
    translate: bool,
    streaming: StreamingConfig,
}

impl std::fmt::Debug for WhisperModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperModel")
            .field("language", &self.language)
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

impl WhisperModel {
    pub fn load(entry: &EngineEntryConfig, streaming: &StreamingConfig) -> Result<Self, EngineError> {
        let path = entry
            .model_path
            .as_ref()
            .ok_or_else(|| EngineError::load(&entry.key, "model_path is required for whisper engines"))?;
        if !path.exists() {
            return Err(EngineError::load(
                &entry.key,
                format!("model path does not exist: {}", path.display()),
            ));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| EngineError::load(&entry.key, "invalid model path"))?;
        let ctx = whisper_rs::WhisperContext::new(path_str)
            .map_err(|e| EngineError::load(&entry.key, format!("failed to load whisper model: {e}")))?;

        Ok(Self {
            ctx: Arc::new(ctx),
            language: entry.language().to_string(),
            threads: entry.threads.max(1),
            translate: entry.translate,
            streaming: streaming.clone(),
        })
    }
}

impl EngineModel for WhisperModel {
    fn create_recognizer(&self, sample_rate_hz: u32) -> Result<Box<dyn Recognizer>, EngineError> {
        Ok(Box::new(WhisperRecognizer {
            ctx: self.ctx.clone(),
            language: self.language.clone(),
            threads: self.threads,
            translate: self.translate,
            resampler: LinearResampler::new(sample_rate_hz, WHISPER_SAMPLE_RATE_HZ),
            segmenter: UtteranceSegmenter::new(WHISPER_SAMPLE_RATE_HZ, &self.streaming),
            buffer: Vec::new(),
        }))
    }
}

struct WhisperRecognizer {
    ctx: Arc<whisper_rs::WhisperContext>,
    language: String,
    threads: usize,
    translate: bool,
    resampler: LinearResampler,
    segmenter: UtteranceSegmenter,
    buffer: Vec<f32>,
}

impl WhisperRecognizer {
    fn transcribe(&self) -> Result<String, EngineError> {
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| EngineError::decode(format!("failed to create whisper state: {e}")))?;

        let mut params =
            whisper_rs::FullParams::new(whisper_rs::SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.threads as i32);
        if !self.language.eq_ignore_ascii_case("auto") {
            params.set_language(Some(&self.language));
        }
        params.set_translate(self.translate);

        state
            .full(params, &self.buffer)
            .map_err(|e| EngineError::decode(format!("whisper inference failed: {e}")))?;

        let segments = state
            .full_n_segments()
            .map_err(|e| EngineError::decode(format!("segment count failed: {e}")))?;
        let mut text = String::new();
        for i in 0..segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| EngineError::decode(format!("get segment failed: {e}")))?;
            text.push_str(&segment);
        }
        Ok(text)
    }
}

impl Recognizer for WhisperRecognizer {
    fn feed(&mut self, frame: &[u8]) -> Result<Decoded, EngineError> {
        if frame.len() % 2 != 0 {
            return Err(EngineError::decode(format!(
                "s16le frame has odd length {}",
                frame.len()
            )));
        }
        let samples = self.resampler.resample(&s16le_to_f32(frame));

        match self.segmenter.push(&samples) {
            SegmentDecision::Silence => {
                self.buffer.clear();
                Ok(Decoded::Partial { text: String::new() })
            }
            SegmentDecision::Pending => {
                self.buffer.extend_from_slice(&samples);
                Ok(Decoded::Partial { text: String::new() })
            }
            SegmentDecision::Partial => {
                self.buffer.extend_from_slice(&samples);
                Ok(Decoded::Partial {
                    text: self.transcribe()?,
                })
            }
            SegmentDecision::Final => {
                self.buffer.extend_from_slice(&samples);
                let result = self.transcribe();
                self.buffer.clear();
                Ok(Decoded::Final {
                    text: result?,
                    confidence: None,
                })
            }
        }
    }
}
