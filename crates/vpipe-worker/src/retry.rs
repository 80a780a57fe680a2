//! Retry policy for failed plans.
//!
//! A failed attempt either consumes a retry and is re-enqueued after a
//! backoff delay, or, with the budget exhausted, is dead-lettered and
//! finalized `failed`. The deferral is a spawned task so the worker returns
//! to its loop immediately.

use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use vpipe_queue::WorkQueue;
use vpipe_store::{JobOutcome, JobStore};

use crate::metrics;

/// Delay before the next attempt.
///
/// `retry_count` is the just-incremented counter, so the first retry uses
/// the first entry. Counts past the end of the schedule reuse the last
/// entry.
pub fn backoff_delay(schedule: &[Duration], retry_count: i32) -> Duration {
    if schedule.is_empty() {
        return Duration::ZERO;
    }
    let index = (retry_count.max(1) as usize - 1).min(schedule.len() - 1);
    schedule[index]
}

/// Resolve a failed attempt for a job this worker owns.
///
/// All store/queue errors in here are logged rather than propagated: the
/// job row stays `processing` on failure, and the sweeper re-queues it
/// after the stall horizon.
pub async fn handle_failure(
    store: &JobStore,
    queue: &WorkQueue,
    job_id: Uuid,
    schedule: &[Duration],
    reason: &str,
) {
    let job = match store.get_job(job_id).await {
        Ok(job) => job,
        Err(e) => {
            error!(job_id = %job_id, "Failed to load job for retry accounting: {e}");
            return;
        }
    };

    if !job.can_retry() {
        let token = job_id.to_string();
        if let Err(e) = queue.push_dead_letter(&token).await {
            error!(job_id = %job_id, "Failed to dead-letter job: {e}");
        }
        let message = format!("exceeded max retries: {reason}");
        match store
            .finalize_job(job_id, JobOutcome::Failed, Some(&message))
            .await
        {
            Ok(_) => {
                warn!(job_id = %job_id, max_retries = job.max_retries, "Job failed permanently");
                metrics::record_job_processed("failed");
            }
            Err(e) => error!(job_id = %job_id, "Failed to finalize job: {e}"),
        }
        return;
    }

    let requeued = match store.increment_retry(job_id).await {
        Ok(job) => job,
        Err(e) => {
            error!(job_id = %job_id, "Failed to increment retry: {e}");
            return;
        }
    };

    let delay = backoff_delay(schedule, requeued.retry_count);
    info!(
        job_id = %job_id,
        attempt = requeued.retry_count,
        max_retries = requeued.max_retries,
        delay_secs = delay.as_secs(),
        "Job re-queued for retry: {reason}"
    );
    metrics::record_job_retried();

    // Deferred re-enqueue; the worker goes back to popping right away. A
    // lost push here is reconciled by the sweeper's queued-jobs scan.
    let queue = queue.clone();
    let token = job_id.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = queue.push(&token).await {
            warn!(job_id = %token, "Deferred re-enqueue failed: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEDULE: &[Duration] = &[
        Duration::from_secs(10),
        Duration::from_secs(30),
        Duration::from_secs(60),
    ];

    #[test]
    fn test_backoff_first_retry_uses_first_entry() {
        assert_eq!(backoff_delay(SCHEDULE, 1), Duration::from_secs(10));
        assert_eq!(backoff_delay(SCHEDULE, 2), Duration::from_secs(30));
        assert_eq!(backoff_delay(SCHEDULE, 3), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_reuses_last_entry_past_the_end() {
        assert_eq!(backoff_delay(SCHEDULE, 4), Duration::from_secs(60));
        assert_eq!(backoff_delay(SCHEDULE, 17), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_degenerate_inputs() {
        assert_eq!(backoff_delay(&[], 1), Duration::ZERO);
        // A zero count is clamped rather than panicking on underflow.
        assert_eq!(backoff_delay(SCHEDULE, 0), Duration::from_secs(10));
    }
}
