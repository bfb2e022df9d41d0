//! ワイヤプロトコルの差分（言語キー/モデルキー）と未知コマンドの扱い
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub schema: ResponseSchema,
    #[serde(default)]
    pub unknown_commands: UnknownCommandPolicy,
}

/// 応答JSONでエンジンキーを表すフィールド名の系統
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSchema {
    /// `language` / `current_language` / `available_languages`
    #[default]
    Language,
    /// `model` / `current_model` / `available_models`
    Model,
}

impl ResponseSchema {
    pub fn key_field(self) -> &'static str {
        match self {
            Self::Language => "language",
            Self::Model => "model",
        }
    }

    pub fn current_field(self) -> &'static str {
        match self {
            Self::Language => "current_language",
            Self::Model => "current_model",
        }
    }

    pub fn available_field(self) -> &'static str {
        match self {
            Self::Language => "available_languages",
            Self::Model => "available_models",
        }
    }

    /// 接続メッセージなどで使う人間向けの呼称
    pub fn noun(self) -> &'static str {
        match self {
            Self::Language => "Language",
            Self::Model => "Model",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCommandPolicy {
    /// `error` イベントを返す
    #[default]
    Reject,
    /// 何も返さない
    Ignore,
}
