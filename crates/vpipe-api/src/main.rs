//! API server binary.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vpipe_api::{create_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("vpipe=info".parse().unwrap()))
        .init();

    info!("Starting vpipe-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let state = match AppState::new(config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {e}");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let mut depth_task = None;
    let metrics_handle = if metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        let handle = metrics::init_metrics();
        depth_task = Some(metrics::spawn_queue_depth_updater(
            state.dispatcher.queue().clone(),
            Duration::from_secs(15),
            shutdown_rx.clone(),
        ));
        Some(handle)
    } else {
        None
    };

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .unwrap();

    if let Some(task) = depth_task {
        task.await.ok();
    }

    info!("Server shutdown complete");
}

/// Resolves on CTRL+C, flipping the shared shutdown signal for background
/// tasks before axum starts draining connections.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);
}
