//! Transcode worker binary.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vpipe_queue::{LeaseRegistry, QueueConfig, WorkQueue};
use vpipe_storage::ObjectStore;
use vpipe_store::{JobStore, StoreConfig};
use vpipe_worker::{metrics, Sweeper, Worker, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vpipe=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting vpipe-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Err(e) = tokio::fs::create_dir_all(&config.work_dir).await {
        error!("Failed to create work directory {}: {e}", config.work_dir);
        std::process::exit(1);
    }

    if let Err(e) = vpipe_media::check_ffmpeg() {
        error!("{e}");
        std::process::exit(1);
    }

    let store_config = match StoreConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load store config: {e}");
            std::process::exit(1);
        }
    };
    let pool = match vpipe_store::connect(&store_config).await {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };
    let store = JobStore::new(pool);

    let queue_config = QueueConfig::from_env();
    let queue = match WorkQueue::new(queue_config.clone()) {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create work queue: {e}");
            std::process::exit(1);
        }
    };
    let leases = match LeaseRegistry::new(queue_config) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to create lease registry: {e}");
            std::process::exit(1);
        }
    };

    let objects = ObjectStore::from_env();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Every worker process runs a sweeper; duplicate sweeps are idempotent.
    let sweeper = Sweeper::new(
        store.clone(),
        queue.clone(),
        leases.clone(),
        config.clone(),
    );
    let sweeper_shutdown = shutdown_rx.clone();
    let sweeper_task = tokio::spawn(async move { sweeper.run(sweeper_shutdown).await });

    let depth_task = metrics::spawn_queue_depth_updater(
        queue.clone(),
        config.metrics_interval,
        shutdown_rx.clone(),
    );

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal, draining");
        let _ = shutdown_tx.send(true);
    });

    let worker = Worker::new(store, queue, leases, objects, config, shutdown_rx);

    if let Err(e) = worker.run().await {
        error!("Worker error: {e}");
        std::process::exit(1);
    }

    sweeper_task.await.ok();
    depth_task.await.ok();

    info!("Worker shutdown complete");
}
