//! 制御コマンドの処理
//!
//! 1コマンドにつき、セッションを更新した上で0個以上の送信イベントを返す。
//! 失敗はすべてイベントに変換され、呼び出し元へは伝播しない。
use tracing::{debug, info, warn};

use crate::config::{ProtocolConfig, UnknownCommandPolicy};
use crate::protocol::{AckDetail, AckStatus, Command, CommandAck, MalformedCommand, OutboundEvent};
use crate::session::{Session, SessionError};

/// 不正なコマンドJSONに対して返すメッセージ
pub const INVALID_COMMAND_MESSAGE: &str = "invalid command payload";

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandDispatcher {
    config: ProtocolConfig,
}

impl CommandDispatcher {
    pub fn new(config: ProtocolConfig) -> Self {
        Self { config }
    }

    pub fn dispatch(&self, session: &mut Session, command: Command) -> Vec<OutboundEvent> {
        let name = command.name().to_string();
        debug!(session_id = %session.id(), command = %name, "command received");

        match command {
            Command::Reset => self.reset(session, name),
            Command::SwitchLanguage { language: key } | Command::SwitchModel { model: key } => {
                self.switch(session, name, &key)
            }
            Command::GetLanguages | Command::GetModels => {
                vec![OutboundEvent::CommandAck(CommandAck::new(
                    name,
                    AckStatus::Success,
                    AckDetail::Engines {
                        current: session.engine_key().to_string(),
                        available: session.available_engines(),
                    },
                ))]
            }
            Command::Ping => vec![OutboundEvent::CommandAck(CommandAck::new(
                name,
                AckStatus::Pong,
                AckDetail::None,
            ))],
            Command::Unknown(name) => match self.config.unknown_commands {
                UnknownCommandPolicy::Ignore => {
                    debug!(session_id = %session.id(), command = %name, "unknown command ignored");
                    Vec::new()
                }
                UnknownCommandPolicy::Reject => {
                    vec![OutboundEvent::error(format!("unknown command: {name}"))]
                }
            },
        }
    }

    /// JSONとして解釈できなかったテキスト。セッションは変更しない
    pub fn malformed(&self, session: &Session, err: &MalformedCommand) -> Vec<OutboundEvent> {
        warn!(session_id = %session.id(), error = %err, "malformed command");
        vec![OutboundEvent::error(INVALID_COMMAND_MESSAGE)]
    }

    fn reset(&self, session: &mut Session, name: String) -> Vec<OutboundEvent> {
        match session.reset() {
            Ok(()) => {
                info!(session_id = %session.id(), engine = %session.engine_key(), "recognizer reset");
                vec![OutboundEvent::CommandAck(CommandAck::success(name))]
            }
            Err(err) => vec![failure_event(name, err)],
        }
    }

    fn switch(&self, session: &mut Session, name: String, key: &str) -> Vec<OutboundEvent> {
        let previous = session.engine_key().to_string();
        match session.switch_engine(key) {
            Ok(()) => {
                info!(session_id = %session.id(), from = %previous, to = %key, "engine switched");
                vec![OutboundEvent::CommandAck(CommandAck::new(
                    name,
                    AckStatus::Success,
                    AckDetail::Switched {
                        key: key.to_string(),
                    },
                ))]
            }
            Err(err) => vec![failure_event(name, err)],
        }
    }
}

fn failure_event(command: String, err: SessionError) -> OutboundEvent {
    match err {
        SessionError::UnknownEngine {
            requested,
            available,
        } => OutboundEvent::CommandAck(CommandAck::new(
            command,
            AckStatus::Error,
            AckDetail::Rejected {
                requested,
                available,
            },
        )),
        other => OutboundEvent::error(format!("{command} failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineKind;
    use crate::engine::{EngineInfo, EngineRegistry, MockModel};

    fn session() -> Session {
        let registry = EngineRegistry::builder()
            .register(EngineInfo::new("cn", EngineKind::Mock), Arc::new(MockModel::new()))
            .register(EngineInfo::new("en", EngineKind::Mock), Arc::new(MockModel::new()))
            .build()
            .unwrap();
        Session::start(Arc::new(registry), "cn", 16_000).unwrap()
    }

    fn dispatcher(policy: UnknownCommandPolicy) -> CommandDispatcher {
        CommandDispatcher::new(ProtocolConfig {
            unknown_commands: policy,
            ..ProtocolConfig::default()
        })
    }

    #[test]
    fn ping_replies_pong() {
        let mut s = session();
        let events = CommandDispatcher::default().dispatch(&mut s, Command::Ping);
        assert_eq!(
            events,
            vec![OutboundEvent::CommandAck(CommandAck::new(
                "ping",
                AckStatus::Pong,
                AckDetail::None
            ))]
        );
    }

    #[test]
    fn switch_model_echoes_command_name() {
        let mut s = session();
        let events = CommandDispatcher::default().dispatch(
            &mut s,
            Command::SwitchModel { model: "en".into() },
        );
        assert_eq!(
            events,
            vec![OutboundEvent::CommandAck(CommandAck::new(
                "switch_model",
                AckStatus::Success,
                AckDetail::Switched { key: "en".into() }
            ))]
        );
        assert_eq!(s.engine_key(), "en");
    }

    #[test]
    fn rejected_switch_leaves_engine() {
        let mut s = session();
        let events = CommandDispatcher::default().dispatch(
            &mut s,
            Command::SwitchLanguage {
                language: String::new(),
            },
        );
        assert_eq!(
            events,
            vec![OutboundEvent::CommandAck(CommandAck::new(
                "switch_language",
                AckStatus::Error,
                AckDetail::Rejected {
                    requested: String::new(),
                    available: vec!["cn".into(), "en".into()],
                }
            ))]
        );
        assert_eq!(s.engine_key(), "cn");
    }

    #[test]
    fn get_languages_lists_current_and_available() {
        let mut s = session();
        let events = CommandDispatcher::default().dispatch(&mut s, Command::GetLanguages);
        assert_eq!(
            events,
            vec![OutboundEvent::CommandAck(CommandAck::new(
                "get_languages",
                AckStatus::Success,
                AckDetail::Engines {
                    current: "cn".into(),
                    available: vec!["cn".into(), "en".into()],
                }
            ))]
        );
    }

    #[test]
    fn unknown_command_policy() {
        let mut s = session();
        let rejected = dispatcher(UnknownCommandPolicy::Reject)
            .dispatch(&mut s, Command::Unknown("dance".into()));
        assert_eq!(rejected, vec![OutboundEvent::error("unknown command: dance")]);

        let ignored = dispatcher(UnknownCommandPolicy::Ignore)
            .dispatch(&mut s, Command::Unknown("dance".into()));
        assert!(ignored.is_empty());
    }

    #[test]
    fn commands_on_closed_session_report_errors() {
        let mut s = session();
        s.close();
        let events = CommandDispatcher::default().dispatch(&mut s, Command::Reset);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "error");
    }
}
