//! Prometheus メトリクス
//!
//! プロトコル処理の副作用としてカウンタを更新するだけで、処理結果には影響しない。
mod http;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub use http::{serve_metrics, HealthReport};

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),
    #[error("metrics encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    connections_accepted: IntCounter,
    connections_rejected: IntCounter,
    active_sessions: IntGauge,
    transcripts: IntCounterVec,
    commands: IntCounterVec,
    errors: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new_custom(Some("asr_gateway".to_string()), None)?;

        let connections_accepted = IntCounter::new(
            "connections_accepted_total",
            "WebSocket connections that reached the active state",
        )?;
        let connections_rejected = IntCounter::new(
            "connections_rejected_total",
            "Connections aborted before a session could be created",
        )?;
        let active_sessions = IntGauge::new("active_sessions", "Sessions currently open")?;
        let transcripts = IntCounterVec::new(
            Opts::new("transcripts_total", "Transcript events sent to clients"),
            &["kind"],
        )?;
        let commands = IntCounterVec::new(
            Opts::new("commands_total", "Control commands handled"),
            &["command", "status"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("errors_total", "Errors by category"),
            &["kind"],
        )?;

        registry.register(Box::new(connections_accepted.clone()))?;
        registry.register(Box::new(connections_rejected.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(transcripts.clone()))?;
        registry.register(Box::new(commands.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            connections_accepted,
            connections_rejected,
            active_sessions,
            transcripts,
            commands,
            errors,
        })
    }

    pub fn session_opened(&self) {
        self.connections_accepted.inc();
        self.active_sessions.inc();
    }

    pub fn session_closed(&self) {
        self.active_sessions.dec();
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.inc();
    }

    pub fn transcript(&self, is_final: bool) {
        let kind = if is_final { "final" } else { "partial" };
        self.transcripts.with_label_values(&[kind]).inc();
    }

    pub fn command(&self, command: &str, status: &str) {
        self.commands.with_label_values(&[command, status]).inc();
    }

    /// kind: `malformed_command` / `decode_fault` / `transport_fault` など
    pub fn error(&self, kind: &str) {
        self.errors.with_label_values(&[kind]).inc();
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.get()
    }

    /// テキスト形式でエクスポート
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}
