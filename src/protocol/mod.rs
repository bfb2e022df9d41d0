//! ゲートウェイのワイヤプロトコル
//!
//! - クライアント→サーバ: バイナリ＝音声フレーム、テキスト＝JSONコマンド
//! - サーバ→クライアント: `connection` / `asr_result` / `command_response` / `error`
//!
//! エンジンキーを表すフィールド名は `ResponseSchema` で `language` 系か `model` 系に切り替わる。
mod inbound;
mod outbound;

pub use inbound::{Command, InboundMessage, MalformedCommand};
pub use outbound::{AckDetail, AckStatus, CommandAck, OutboundEvent, TranscriptResult};
