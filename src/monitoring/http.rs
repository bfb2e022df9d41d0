//! メトリクス/ヘルスチェック用HTTPエンドポイント
//!
//! - `GET <scrape_path>` Prometheus テキスト形式
//! - `GET /healthz`      登録エンジンと生存セッションのJSON
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::GatewayMetrics;
use crate::engine::{EngineInfo, EngineRegistry};
use crate::session::{SessionSummary, SessionTracker};

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub default_engine: String,
    pub engines: Vec<EngineInfo>,
    pub active_sessions: usize,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug)]
struct MetricsApp {
    metrics: GatewayMetrics,
    tracker: SessionTracker,
    registry: Arc<EngineRegistry>,
    scrape_path: String,
}

impl MetricsApp {
    fn route(&self, req: &Request<Body>) -> Response<Body> {
        if req.method() != Method::GET {
            return respond(StatusCode::METHOD_NOT_ALLOWED, "text/plain", "method not allowed");
        }
        let path = req.uri().path();
        if path == self.scrape_path {
            return match self.metrics.render() {
                Ok(text) => respond(StatusCode::OK, "text/plain; version=0.0.4", text),
                Err(e) => {
                    error!(error = %e, "metrics render failed");
                    respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "metrics unavailable")
                }
            };
        }
        if path == "/healthz" {
            let report = self.health();
            return match serde_json::to_string(&report) {
                Ok(json) => respond(StatusCode::OK, "application/json", json),
                Err(e) => {
                    error!(error = %e, "health report encoding failed");
                    respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "health unavailable")
                }
            };
        }
        respond(StatusCode::NOT_FOUND, "text/plain", "not found")
    }

    fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            default_engine: self.registry.default_key().to_string(),
            engines: self.registry.engines().cloned().collect(),
            active_sessions: self.tracker.active_sessions(),
            sessions: self.tracker.snapshot(),
        }
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response<Body> {
    let mut resp = Response::new(body.into());
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

/// 指定アドレスへHTTPサーバをバインドして起動
pub async fn serve_metrics(
    bind_addr: &str,
    metrics: GatewayMetrics,
    tracker: SessionTracker,
    registry: Arc<EngineRegistry>,
    scrape_path: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    serve_metrics_with_listener(listener, metrics, tracker, registry, scrape_path).await
}

async fn serve_metrics_with_listener(
    listener: TcpListener,
    metrics: GatewayMetrics,
    tracker: SessionTracker,
    registry: Arc<EngineRegistry>,
    scrape_path: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = Arc::new(MetricsApp {
        metrics,
        tracker,
        registry,
        scrape_path: scrape_path.to_string(),
    });
    let make_svc = make_service_fn(move |_| {
        let app = app.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let app = app.clone();
                async move { Ok::<_, Infallible>(app.route(&req)) }
            }))
        }
    });

    let local = listener.local_addr()?;
    info!(%local, "metrics endpoint listening");
    Server::from_tcp(listener.into_std()?)?.serve(make_svc).await?;
    Ok(())
}
