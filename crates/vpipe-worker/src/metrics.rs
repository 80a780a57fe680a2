//! Worker metrics.
//!
//! Free functions over the `metrics` facade; the recorder is installed by
//! whichever binary wants an exporter, so tests and library users run with
//! a no-op recorder.

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use vpipe_queue::WorkQueue;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_PROCESSED_TOTAL: &str = "vpipe_jobs_processed_total";
    pub const JOB_DURATION_SECONDS: &str = "vpipe_job_duration_seconds";
    pub const TRANSCODE_ERRORS_TOTAL: &str = "vpipe_transcode_errors_total";
    pub const QUEUE_DEPTH: &str = "vpipe_queue_depth";
    pub const DEAD_LETTER_DEPTH: &str = "vpipe_dead_letter_depth";
    pub const ACTIVE_JOBS: &str = "vpipe_active_jobs";
    pub const JOBS_RETRIED_TOTAL: &str = "vpipe_jobs_retried_total";
}

/// Record a job reaching a terminal state.
pub fn record_job_processed(status: &str) {
    let labels = [("status", status.to_string())];
    counter!(names::JOBS_PROCESSED_TOTAL, &labels).increment(1);
}

/// Record end-to-end processing duration for a job.
pub fn record_job_duration(duration: Duration) {
    histogram!(names::JOB_DURATION_SECONDS).record(duration.as_secs_f64());
}

/// Record a per-rendition transcode failure.
pub fn record_transcode_error(resolution: &str) {
    let labels = [("resolution", resolution.to_string())];
    counter!(names::TRANSCODE_ERRORS_TOTAL, &labels).increment(1);
}

/// Record a retry being scheduled.
pub fn record_job_retried() {
    counter!(names::JOBS_RETRIED_TOTAL).increment(1);
}

/// Track the number of jobs currently being processed.
pub fn inc_active_jobs() {
    gauge!(names::ACTIVE_JOBS).increment(1.0);
}

pub fn dec_active_jobs() {
    gauge!(names::ACTIVE_JOBS).decrement(1.0);
}

/// Periodically refresh the queue depth gauges.
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
