mod error;
mod shutdown;
mod supervisor;

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub use error::{ConnectionError, ServerError};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use supervisor::{CloseReason, ConnectRequest, ConnectionSummary, ConnectionSupervisor};

/// accept 失敗（EMFILE 等）の後、次の accept まで待つ時間
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// 指定アドレスにバインドしてWSサーバを起動
pub async fn bind_and_run(
    bind_addr: &str,
    supervisor: ConnectionSupervisor,
    shutdown: Shutdown,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(bind_addr).await.map_err(ServerError::Bind)?;
    run_with_listener(listener, supervisor, shutdown).await;
    Ok(())
}

/// 既存の`TcpListener`でWSサーバを起動（テストでも使用）
pub async fn run_with_listener(
    listener: TcpListener,
    supervisor: ConnectionSupervisor,
    shutdown: Shutdown,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "WebSocket ASR gateway listening");
    }

    let incoming = futures_util::stream::unfold(listener, |listener| async move {
        let accepted = listener.accept().await.map(|(stream, peer)| {
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, error = %e, "set_nodelay failed");
            }
            (stream, Some(peer))
        });
        Some((accepted, listener))
    });
    serve_incoming(incoming, supervisor, shutdown).await;
}

/// 受け付けた接続ごとにタスクを起動する
///
/// accept の失敗は警告して続行する。停止が通知されるか `incoming` が終わると受付を止め、
/// 各接続が Close を送り終えるまで待ってから戻る。
pub async fn serve_incoming<I, S>(incoming: I, supervisor: ConnectionSupervisor, mut shutdown: Shutdown)
where
    I: Stream<Item = io::Result<(S, Option<SocketAddr>)>>,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::pin!(incoming);
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = incoming.next() => match accepted {
                Some(Ok((stream, peer))) => {
                    let supervisor = supervisor.clone();
                    let conn_shutdown = shutdown.clone();
                    connections.spawn(async move {
                        match supervisor.serve_connection(stream, peer, conn_shutdown).await {
                            Ok(summary) => debug!(peer = ?peer, session_id = %summary.session_id, "connection finished"),
                            Err(e) => warn!(peer = ?peer, error = %e, "connection handling failed"),
                        }
                    });
                }
                Some(Err(e)) => {
                    warn!(error = %e, "accept failed, retrying");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
                None => break,
            },
        }
    }

    info!(remaining = connections.len(), "draining connections");
    while connections.join_next().await.is_some() {}
}
