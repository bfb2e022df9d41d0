use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

/// JSONとして解釈できない、またはオブジェクトでないテキスト
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed command: {reason}")]
pub struct MalformedCommand {
    pub reason: String,
}

/// 受信メッセージ
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    AudioFrame(Bytes),
    Command(Command),
    Malformed(MalformedCommand),
}

impl InboundMessage {
    pub fn from_binary(data: impl Into<Bytes>) -> Self {
        Self::AudioFrame(data.into())
    }

    pub fn from_text(text: &str) -> Self {
        match Command::parse(text) {
            Ok(command) => Self::Command(command),
            Err(err) => Self::Malformed(err),
        }
    }
}

/// 制御コマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reset,
    SwitchLanguage { language: String },
    SwitchModel { model: String },
    GetLanguages,
    GetModels,
    Ping,
    /// 未知のコマンド名（名前が無い場合は空文字列）
    Unknown(String),
}

impl Command {
    /// コマンド名は `type` を優先し、既知でなければ旧形式の `command` を見る
    pub fn parse(text: &str) -> Result<Self, MalformedCommand> {
        let value: Value = serde_json::from_str(text).map_err(|e| MalformedCommand {
            reason: e.to_string(),
        })?;
        let object = match value {
            Value::Object(map) => map,
            other => {
                return Err(MalformedCommand {
                    reason: format!("expected a JSON object, got {}", json_kind(&other)),
                })
            }
        };

        let names: Vec<&str> = ["type", "command"]
            .iter()
            .filter_map(|field| object.get(*field).and_then(Value::as_str))
            .collect();

        for name in &names {
            if let Some(command) = Self::from_name(name, &object) {
                return Ok(command);
            }
        }
        Ok(Self::Unknown(
            names.first().map(|s| s.to_string()).unwrap_or_default(),
        ))
    }

    fn from_name(name: &str, object: &Map<String, Value>) -> Option<Self> {
        let field = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let command = match name {
            "reset" => Self::Reset,
            "switch_language" => Self::SwitchLanguage {
                language: field("language"),
            },
            "switch_model" => Self::SwitchModel {
                model: field("model"),
            },
            "get_languages" => Self::GetLanguages,
            "get_models" => Self::GetModels,
            "ping" => Self::Ping,
            _ => return None,
        };
        Some(command)
    }

    /// 応答の `command` フィールドに使う名前
    pub fn name(&self) -> &str {
        match self {
            Self::Reset => "reset",
            Self::SwitchLanguage { .. } => "switch_language",
            Self::SwitchModel { .. } => "switch_model",
            Self::GetLanguages => "get_languages",
            Self::GetModels => "get_models",
            Self::Ping => "ping",
            Self::Unknown(name) => name.as_str(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
