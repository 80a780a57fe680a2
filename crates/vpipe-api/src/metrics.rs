//! Prometheus metrics for the API server.

use std::time::Duration;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use vpipe_queue::WorkQueue;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle used to render the `/metrics` response.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_CREATED_TOTAL: &str = "vpipe_jobs_created_total";
    pub const QUEUE_DEPTH: &str = "vpipe_queue_depth";
    pub const DEAD_LETTER_DEPTH: &str = "vpipe_dead_letter_depth";
}

/// Record a job submission.
pub fn record_job_created() {
    counter!(names::JOBS_CREATED_TOTAL).increment(1);
}

/// Periodically refresh the queue depth gauges from the coordination
/// service.
///
/// Runs until the shutdown signal flips.
pub fn spawn_queue_depth_updater(
    queue: WorkQueue,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match queue.len().await {
                        Ok(depth) => gauge!(names::QUEUE_DEPTH).set(depth as f64),
                        Err(e) => warn!("Failed to read queue depth: {e}"),
                    }
                    match queue.dead_letter_len().await {
                        Ok(depth) => gauge!(names::DEAD_LETTER_DEPTH).set(depth as f64),
                        Err(e) => warn!("Failed to read dead-letter depth: {e}"),
                    }
                }
            }
        }
    })
}
