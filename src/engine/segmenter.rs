//! エネルギーベースの発話区切り
//!
//! バッファリング型エンジン（whisper）向けに、いつ部分結果を出し、
//! いつ発話を確定させるかを音声の長さと無音区間から判断する。
use crate::config::StreamingConfig;

use super::pcm::{db_to_linear, root_mean_square};

/// 1チャンク投入後の判断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentDecision {
    /// 発話前の無音。バッファは破棄してよい
    Silence,
    /// 発話中だが新しい仮説を出すほどの音声はまだない
    Pending,
    /// 部分結果を出すタイミング
    Partial,
    /// 発話が終わった（無音継続 or 最大長）
    Final,
}

#[derive(Debug, Clone)]
pub struct UtteranceSegmenter {
    threshold: f32,
    silence_samples: usize,
    max_samples: usize,
    partial_samples: usize,
    utterance: usize,
    trailing_silence: usize,
    since_partial: usize,
    in_speech: bool,
}

impl UtteranceSegmenter {
    pub fn new(sample_rate_hz: u32, streaming: &StreamingConfig) -> Self {
        let per_ms = |ms: u64| (sample_rate_hz as u64 * ms / 1000) as usize;
        Self {
            threshold: db_to_linear(streaming.silence_threshold_db),
            silence_samples: per_ms(streaming.finalization_silence_ms).max(1),
            max_samples: per_ms(streaming.max_utterance_ms).max(1),
            partial_samples: per_ms(streaming.partial_result_interval_ms).max(1),
            utterance: 0,
            trailing_silence: 0,
            since_partial: 0,
            in_speech: false,
        }
    }

    pub fn push(&mut self, samples: &[f32]) -> SegmentDecision {
        if samples.is_empty() {
            return if self.in_speech {
                SegmentDecision::Pending
            } else {
                SegmentDecision::Silence
            };
        }

        let voiced = root_mean_square(samples) >= self.threshold;
        if !self.in_speech && !voiced {
            return SegmentDecision::Silence;
        }

        self.in_speech = true;
        self.utterance += samples.len();
        self.since_partial += samples.len();
        if voiced {
            self.trailing_silence = 0;
        } else {
            self.trailing_silence += samples.len();
        }

        if self.trailing_silence >= self.silence_samples || self.utterance >= self.max_samples {
            self.reset();
            return SegmentDecision::Final;
        }
        if self.since_partial >= self.partial_samples {
            self.since_partial = 0;
            return SegmentDecision::Partial;
        }
        SegmentDecision::Pending
    }

    pub fn reset(&mut self) {
        self.utterance = 0;
        self.trailing_silence = 0;
        self.since_partial = 0;
        self.in_speech = false;
    }
}
