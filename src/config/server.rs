use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// WebSocketゲートウェイのバインドアドレス（例: 0.0.0.0:8765）
    pub ws_bind_addr: String,
    /// 受け付けるハンドシェイクのパス（`/` なら任意のパスを受け付ける）
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

fn default_ws_path() -> String {
    "/".to_string()
}
