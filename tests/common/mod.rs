#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async, WebSocketStream};

use ws_asr_gateway::config::{EngineKind, ProtocolConfig};
use ws_asr_gateway::engine::{EngineInfo, EngineRegistry, MockModel, RecognizerStats};
use ws_asr_gateway::server::{ConnectionError, ConnectionSummary, ConnectionSupervisor, Shutdown};

pub type Client = WebSocketStream<DuplexStream>;
pub type ServerTask = JoinHandle<Result<ConnectionSummary, ConnectionError>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// `cn`（既定）と `en` のモックエンジンを持つレジストリ
pub struct MockGateway {
    pub registry: Arc<EngineRegistry>,
    pub cn: Arc<RecognizerStats>,
    pub en: Arc<RecognizerStats>,
}

impl MockGateway {
    pub fn new() -> Self {
        let cn = MockModel::new();
        let en = MockModel::new();
        let (cn_stats, en_stats) = (cn.stats(), en.stats());
        let registry = EngineRegistry::builder()
            .register(EngineInfo::new("cn", EngineKind::Mock), Arc::new(cn))
            .register(EngineInfo::new("en", EngineKind::Mock), Arc::new(en))
            .default_engine("cn")
            .build()
            .expect("registry");
        Self {
            registry: Arc::new(registry),
            cn: cn_stats,
            en: en_stats,
        }
    }

    pub fn supervisor(&self, protocol: ProtocolConfig) -> ConnectionSupervisor {
        ConnectionSupervisor::new(self.registry.clone(), 16_000, protocol)
    }
}

/// メモリ上のストリームでサーバ側とクライアント側を接続
pub async fn connect(
    supervisor: &ConnectionSupervisor,
    path: &str,
    shutdown: Shutdown,
) -> (Client, ServerTask) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let supervisor = supervisor.clone();
    let server =
        tokio::spawn(async move { supervisor.serve_connection(server_io, None, shutdown).await });
    let (client, _resp) = client_async(format!("ws://localhost{path}"), client_io)
        .await
        .expect("client handshake");
    (client, server)
}

/// 接続メッセージまで読み進めた状態のクライアント
pub async fn connect_active(
    supervisor: &ConnectionSupervisor,
    path: &str,
) -> (Client, ServerTask, Value) {
    let (mut client, server) = connect(supervisor, path, Shutdown::never()).await;
    let welcome = recv_json(&mut client).await;
    assert_eq!(welcome["type"], "connection");
    (client, server, welcome)
}

pub async fn send_text(client: &mut Client, text: &str) {
    client
        .send(Message::Text(text.to_string()))
        .await
        .expect("send text");
}

pub async fn send_audio(client: &mut Client, frame: &[u8]) {
    client
        .send(Message::Binary(frame.to_vec()))
        .await
        .expect("send binary");
}

pub async fn recv_message(client: &mut Client) -> Option<Message> {
    loop {
        let next = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for server");
        match next {
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(msg)) => return Some(msg),
            Some(Err(_)) | None => return None,
        }
    }
}

pub async fn recv_json(client: &mut Client) -> Value {
    match recv_message(client).await {
        Some(Message::Text(text)) => serde_json::from_str(&text).expect("server sends JSON"),
        other => panic!("expected text message, got {other:?}"),
    }
}

/// Close フレームが届くまで読み捨てる
pub async fn recv_close(client: &mut Client) -> Option<CloseFrame<'static>> {
    loop {
        match recv_message(client).await {
            Some(Message::Close(frame)) => return frame,
            Some(_) => continue,
            None => return None,
        }
    }
}

/// それまでに送ったメッセージが処理済みであることを `ping` の応答で確かめる
pub async fn roundtrip_ping(client: &mut Client) {
    send_text(client, r#"{"type":"ping"}"#).await;
    let pong = recv_json(client).await;
    assert_eq!(pong["command"], "ping", "unexpected event before pong: {pong}");
    assert_eq!(pong["status"], "pong");
}

/// クライアントを閉じてサーバ側タスクの結果を受け取る
pub async fn finish(mut client: Client, server: ServerTask) -> ConnectionSummary {
    let _ = client.close(None).await;
    drop(client);
    tokio::time::timeout(RECV_TIMEOUT, server)
        .await
        .expect("server task finished")
        .expect("server task panicked")
        .expect("connection succeeded")
}
