//! 1接続のライフサイクル管理
//!
//! `Connecting → Active → Closing → Closed` の順に遷移する。
//! 受信は1メッセージずつ処理し、生成したイベントをすべて書き終えてから次を読む。
//! どの経路で終了しても `Session::close()` はちょうど1回だけ実行される。
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, info, warn};

use super::error::ConnectionError;
use super::shutdown::Shutdown;
use crate::audio_pipeline::AudioPipeline;
use crate::config::{ConfigSet, ProtocolConfig, SUPPORTED_SAMPLE_RATES_HZ};
use crate::dispatcher::CommandDispatcher;
use crate::engine::EngineRegistry;
use crate::monitoring::GatewayMetrics;
use crate::protocol::{InboundMessage, OutboundEvent};
use crate::session::{Session, SessionTracker};

/// ハンドシェイクのクエリで指定できる接続パラメータ
///
/// 例: `/asr?language=en&sample_rate=8000`
///
/// 値はパーセントデコードする。範囲外のサンプルレートは無視して設定値を使う。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    /// `engine` / `language` / `model` のいずれか
    pub engine: Option<String>,
    pub sample_rate_hz: Option<u32>,
}

impl ConnectRequest {
    pub fn from_path(path_and_query: &str) -> Self {
        let engine = ["engine", "language", "model"]
            .iter()
            .find_map(|name| query_param(path_and_query, name));
        let sample_rate_hz = query_param(path_and_query, "sample_rate")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|rate| SUPPORTED_SAMPLE_RATES_HZ.contains(rate));
        Self {
            engine,
            sample_rate_hz,
        }
    }
}

/// 接続が終了した経緯
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// クライアントが Close フレームを送った、またはストリームが終端した
    ClientClosed,
    /// 読み書きの失敗
    TransportFault(String),
    /// サーバ停止
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ConnectionSummary {
    pub session_id: String,
    pub engine_key: String,
    pub reason: CloseReason,
    pub frames: u64,
    pub commands: u64,
    pub events_sent: u64,
}

#[derive(Debug, Clone)]
pub struct ConnectionSupervisor {
    registry: Arc<EngineRegistry>,
    sample_rate_hz: u32,
    /// `None` ならパスを検査しない
    ws_path: Option<String>,
    protocol: ProtocolConfig,
    dispatcher: CommandDispatcher,
    pipeline: AudioPipeline,
    tracker: SessionTracker,
    metrics: Option<GatewayMetrics>,
}

impl ConnectionSupervisor {
    pub fn new(registry: Arc<EngineRegistry>, sample_rate_hz: u32, protocol: ProtocolConfig) -> Self {
        Self {
            registry,
            sample_rate_hz,
            ws_path: None,
            protocol,
            dispatcher: CommandDispatcher::new(protocol),
            pipeline: AudioPipeline::new(),
            tracker: SessionTracker::new(),
            metrics: None,
        }
    }

    pub fn from_config(config: &ConfigSet, registry: Arc<EngineRegistry>) -> Self {
        Self::new(registry, config.engines.sample_rate_hz, config.protocol)
            .with_path(&config.server.ws_path)
    }

    /// ハンドシェイクのパスを `path` に限定する（`/` は制限なし）
    pub fn with_path(mut self, path: &str) -> Self {
        self.ws_path = match path.trim() {
            "" | "/" => None,
            p => Some(p.to_string()),
        };
        self
    }

    pub fn with_tracker(mut self, tracker: SessionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_metrics(mut self, metrics: GatewayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// ハンドシェイクから切断までを処理
    pub async fn serve_connection<S>(
        &self,
        stream: S,
        peer: Option<SocketAddr>,
        shutdown: Shutdown,
    ) -> Result<ConnectionSummary, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut request = ConnectRequest::default();
        let expected_path = self.ws_path.as_deref();
        let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
            if let Some(expected) = expected_path {
                if req.uri().path() != expected {
                    warn!(peer = ?peer, path = req.uri().path(), "websocket path rejected");
                    return Err(not_found(req.uri().path()));
                }
            }
            let path = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
            request = ConnectRequest::from_path(path);
            Ok(resp)
        })
        .await
        .map_err(ConnectionError::Handshake)?;

        self.serve_websocket(ws, request, peer, shutdown).await
    }

    /// ハンドシェイク済みのWebSocketを処理
    pub async fn serve_websocket<S>(
        &self,
        mut ws: WebSocketStream<S>,
        request: ConnectRequest,
        peer: Option<SocketAddr>,
        mut shutdown: Shutdown,
    ) -> Result<ConnectionSummary, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Connecting
        let engine_key = request
            .engine
            .unwrap_or_else(|| self.registry.default_key().to_string());
        let sample_rate_hz = request
            .sample_rate_hz
            .filter(|rate| SUPPORTED_SAMPLE_RATES_HZ.contains(rate))
            .unwrap_or(self.sample_rate_hz);
        let mut session = match Session::start(self.registry.clone(), &engine_key, sample_rate_hz) {
            Ok(session) => session,
            Err(err) => {
                warn!(peer = ?peer, engine = %engine_key, error = %err, "rejecting connection");
                if let Some(metrics) = &self.metrics {
                    metrics.connection_rejected();
                }
                let event = OutboundEvent::error(err.to_string());
                if let Ok(json) = event.encode(self.protocol.schema) {
                    let _ = ws.send(Message::Text(json)).await;
                }
                let _ = ws
                    .close(Some(CloseFrame {
                        code: CloseCode::Error,
                        reason: "engine unavailable".into(),
                    }))
                    .await;
                return Err(ConnectionError::EngineUnavailable(err));
            }
        };

        let tracked = self.tracker.track(session.id(), session.engine_key(), peer);
        if let Some(metrics) = &self.metrics {
            metrics.session_opened();
        }
        let mut stats = Counters::default();

        // Active
        let reason = match session.activate() {
            Ok(()) => {
                info!(session_id = %session.id(), peer = ?peer, engine = %session.engine_key(), sample_rate_hz, "session active");
                let welcome = OutboundEvent::ConnectionEstablished {
                    session_id: session.id().to_string(),
                    sample_rate_hz,
                    current: session.engine_key().to_string(),
                    available: session.available_engines(),
                };
                match self.write_events(&mut ws, vec![welcome], &mut stats).await {
                    Ok(()) => {
                        self.run_active(&mut ws, &mut session, &tracked, &mut shutdown, &mut stats)
                            .await
                    }
                    Err(reason) => reason,
                }
            }
            Err(err) => CloseReason::TransportFault(err.to_string()),
        };

        // Closing / Closed
        match &reason {
            CloseReason::ClientClosed => {
                let _ = ws.close(None).await;
            }
            CloseReason::Shutdown => {
                let _ = ws
                    .close(Some(CloseFrame {
                        code: CloseCode::Away,
                        reason: "server shutting down".into(),
                    }))
                    .await;
            }
            CloseReason::TransportFault(message) => {
                warn!(session_id = %session.id(), error = %message, "transport fault");
                if let Some(metrics) = &self.metrics {
                    metrics.error("transport_fault");
                }
            }
        }

        let summary = ConnectionSummary {
            session_id: session.id().to_string(),
            engine_key: session.engine_key().to_string(),
            reason,
            frames: stats.frames,
            commands: stats.commands,
            events_sent: stats.events_sent,
        };
        if session.close() {
            if let Some(metrics) = &self.metrics {
                metrics.session_closed();
            }
        }
        drop(tracked);
        info!(
            session_id = %summary.session_id,
            reason = ?summary.reason,
            frames = summary.frames,
            commands = summary.commands,
            "session closed"
        );
        Ok(summary)
    }

    async fn run_active<S>(
        &self,
        ws: &mut WebSocketStream<S>,
        session: &mut Session,
        tracked: &crate::session::TrackedSession,
        shutdown: &mut Shutdown,
        stats: &mut Counters,
    ) -> CloseReason
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.wait() => return CloseReason::Shutdown,
                message = ws.next() => message,
            };

            let inbound = match message {
                None => return CloseReason::ClientClosed,
                Some(Err(err)) => return CloseReason::TransportFault(err.to_string()),
                Some(Ok(Message::Binary(data))) => InboundMessage::from_binary(data),
                Some(Ok(Message::Text(text))) => InboundMessage::from_text(&text),
                Some(Ok(Message::Close(frame))) => {
                    debug!(session_id = %session.id(), frame = ?frame, "close received");
                    return CloseReason::ClientClosed;
                }
                // ping/pong はトランスポートが応答する
                Some(Ok(_)) => continue,
            };

            let events = self.handle(session, inbound, stats);
            tracked.set_engine(session.engine_key());
            if let Err(reason) = self.write_events(ws, events, stats).await {
                return reason;
            }
        }
    }

    fn handle(&self, session: &mut Session, inbound: InboundMessage, stats: &mut Counters) -> Vec<OutboundEvent> {
        match inbound {
            InboundMessage::AudioFrame(frame) => {
                stats.frames += 1;
                let events = self.pipeline.process(session, &frame);
                self.record(&events, "decode_fault");
                events
            }
            InboundMessage::Command(command) => {
                stats.commands += 1;
                let events = self.dispatcher.dispatch(session, command);
                self.record(&events, "command");
                events
            }
            InboundMessage::Malformed(err) => {
                stats.commands += 1;
                let events = self.dispatcher.malformed(session, &err);
                self.record(&events, "malformed_command");
                events
            }
        }
    }

    fn record(&self, events: &[OutboundEvent], error_kind: &str) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        for event in events {
            match event {
                OutboundEvent::TranscriptResult(result) => metrics.transcript(result.is_final),
                OutboundEvent::CommandAck(ack) => metrics.command(&ack.command, ack.status.as_str()),
                OutboundEvent::Error { .. } => metrics.error(error_kind),
                OutboundEvent::ConnectionEstablished { .. } => {}
            }
        }
    }

    /// 生成順に書き込む。書き込み失敗は接続にとって致命的
    async fn write_events<S>(
        &self,
        ws: &mut WebSocketStream<S>,
        events: Vec<OutboundEvent>,
        stats: &mut Counters,
    ) -> Result<(), CloseReason>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        for event in events {
            let json = match event.encode(self.protocol.schema) {
                Ok(json) => json,
                Err(err) => {
                    warn!(kind = event.kind(), error = %err, "event encoding failed");
                    continue;
                }
            };
            ws.send(Message::Text(json))
                .await
                .map_err(|err| CloseReason::TransportFault(err.to_string()))?;
            stats.events_sent += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    frames: u64,
    commands: u64,
    events_sent: u64,
}

fn not_found(path: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(format!("no websocket endpoint at {path}")));
    *resp.status_mut() = StatusCode::NOT_FOUND;
    resp
}

/// 例: `query_param("/asr?language=zh%2Dcn", "language") == Some("zh-cn")`
///
/// デコードできない値は指定なしとして扱う。
fn query_param(path_and_query: &str, name: &str) -> Option<String> {
    let (_, query) = path_and_query.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k != name || v.is_empty() {
            return None;
        }
        urlencoding::decode(v).ok().map(|v| v.into_owned())
    })
}
