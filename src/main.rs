use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ws_asr_gateway::config::ConfigSet;
use ws_asr_gateway::engine::EngineRegistry;
use ws_asr_gateway::monitoring::{self, GatewayMetrics};
use ws_asr_gateway::server::{self, ConnectionSupervisor, Shutdown};
use ws_asr_gateway::session::SessionTracker;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match ConfigSet::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = ?err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    info!(root = ?config.root(), "configuration loaded");

    let registry = match EngineRegistry::from_config(&config.engines) {
        Ok(registry) => Arc::new(registry),
        Err(err) => {
            error!(error = %err, "no recognition engine could be loaded");
            std::process::exit(1);
        }
    };
    info!(
        engines = ?registry.keys(),
        default = registry.default_key(),
        sample_rate_hz = config.engines.sample_rate_hz,
        "engine registry ready"
    );

    let tracker = SessionTracker::new();
    let mut supervisor =
        ConnectionSupervisor::from_config(&config, registry.clone()).with_tracker(tracker.clone());

    let exporter = &config.monitoring.metrics;
    if exporter.enabled {
        match GatewayMetrics::new() {
            Ok(metrics) => {
                supervisor = supervisor.with_metrics(metrics.clone());
                let listen = exporter.listen.clone();
                let scrape_path = exporter.scrape_path.clone();
                let registry = registry.clone();
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        monitoring::serve_metrics(&listen, metrics, tracker, registry, &scrape_path).await
                    {
                        error!(error = %e, "metrics endpoint stopped");
                    }
                });
            }
            Err(e) => warn!(error = %e, "metrics disabled"),
        }
    }

    let (trigger, shutdown) = Shutdown::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        trigger.trigger();
    });

    let ws_addr = config.server.ws_bind_addr.clone();
    info!(addr = %ws_addr, path = %config.server.ws_path, "starting websocket ASR gateway");
    if let Err(e) = server::bind_and_run(&ws_addr, supervisor, shutdown).await {
        error!(error = %e, "server stopped with error");
        std::process::exit(1);
    }
    info!("server stopped");
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}
