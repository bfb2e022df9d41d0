use std::time::{SystemTime, UNIX_EPOCH};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::config::ResponseSchema;

/// サーバ→クライアントのイベント
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    ConnectionEstablished {
        session_id: String,
        sample_rate_hz: u32,
        current: String,
        available: Vec<String>,
    },
    TranscriptResult(TranscriptResult),
    CommandAck(CommandAck),
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptResult {
    pub text: String,
    pub is_final: bool,
    pub engine_key: String,
    /// 確定結果のみ（エンジンが出す場合）
    pub confidence: Option<f32>,
    /// UNIX 秒。確定結果のみ
    pub timestamp: Option<f64>,
}

impl TranscriptResult {
    pub fn partial(text: impl Into<String>, engine_key: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            engine_key: engine_key.into(),
            confidence: None,
            timestamp: None,
        }
    }

    pub fn final_result(
        text: impl Into<String>,
        engine_key: impl Into<String>,
        confidence: Option<f32>,
    ) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            engine_key: engine_key.into(),
            confidence,
            timestamp: Some(unix_timestamp()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
    Pong,
}

impl AckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckStatus::Success => "success",
            AckStatus::Error => "error",
            AckStatus::Pong => "pong",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AckDetail {
    None,
    Switched { key: String },
    Rejected { requested: String, available: Vec<String> },
    Engines { current: String, available: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandAck {
    pub command: String,
    pub status: AckStatus,
    pub detail: AckDetail,
}

impl CommandAck {
    pub fn new(command: impl Into<String>, status: AckStatus, detail: AckDetail) -> Self {
        Self {
            command: command.into(),
            status,
            detail,
        }
    }

    pub fn success(command: impl Into<String>) -> Self {
        Self::new(command, AckStatus::Success, AckDetail::None)
    }
}

impl OutboundEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// `type` フィールドの値（ログ・メトリクス用）
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::ConnectionEstablished { .. } => "connection",
            OutboundEvent::TranscriptResult(_) => "asr_result",
            OutboundEvent::CommandAck(_) => "command_response",
            OutboundEvent::Error { .. } => "error",
        }
    }

    /// 指定スキーマでJSON文字列へ変換
    pub fn encode(&self, schema: ResponseSchema) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireEvent {
            event: self,
            schema,
        })
    }
}

struct WireEvent<'a> {
    event: &'a OutboundEvent,
    schema: ResponseSchema,
}

impl Serialize for WireEvent<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let schema = self.schema;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.event.kind())?;

        match self.event {
            OutboundEvent::ConnectionEstablished {
                session_id,
                sample_rate_hz,
                current,
                available,
            } => {
                map.serialize_entry("status", "connected")?;
                map.serialize_entry("session_id", session_id)?;
                map.serialize_entry("sample_rate", sample_rate_hz)?;
                map.serialize_entry(schema.current_field(), current)?;
                map.serialize_entry(schema.available_field(), available)?;
                map.serialize_entry(
                    "message",
                    &format!(
                        "WebSocket ASR service ready - current {}: {}",
                        schema.noun().to_lowercase(),
                        current
                    ),
                )?;
            }
            OutboundEvent::TranscriptResult(result) => {
                map.serialize_entry("text", &result.text)?;
                map.serialize_entry("is_final", &result.is_final)?;
                if let Some(confidence) = result.confidence {
                    map.serialize_entry("confidence", &confidence)?;
                }
                map.serialize_entry(schema.key_field(), &result.engine_key)?;
                if let Some(ts) = result.timestamp {
                    map.serialize_entry("timestamp", &ts)?;
                }
            }
            OutboundEvent::CommandAck(ack) => {
                map.serialize_entry("command", &ack.command)?;
                map.serialize_entry("status", &ack.status)?;
                match &ack.detail {
                    AckDetail::None => {}
                    AckDetail::Switched { key } => {
                        map.serialize_entry(schema.key_field(), key)?;
                        map.serialize_entry(
                            "message",
                            &format!("Switched to {} {}", key, schema.key_field()),
                        )?;
                    }
                    AckDetail::Rejected {
                        requested,
                        available,
                    } => {
                        map.serialize_entry(
                            "message",
                            &format!(
                                "{} '{}' not available. Available: [{}]",
                                schema.noun(),
                                requested,
                                available.join(", ")
                            ),
                        )?;
                        map.serialize_entry(schema.available_field(), available)?;
                    }
                    AckDetail::Engines { current, available } => {
                        map.serialize_entry(schema.current_field(), current)?;
                        map.serialize_entry(schema.available_field(), available)?;
                    }
                }
            }
            OutboundEvent::Error { message } => {
                map.serialize_entry("message", message)?;
            }
        }
        map.end()
    }
}

fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
