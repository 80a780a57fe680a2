//! Pending and dead-letter job lists.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::error::QueueResult;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// List key for pending job ids
    pub pending_key: String,
    /// List key for dead-lettered job ids
    pub dead_letter_key: String,
    /// Prefix for per-job lease keys
    pub lock_prefix: String,
    /// Lease time-to-live
    pub lease_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            pending_key: "jobs:pending".to_string(),
            dead_letter_key: "jobs:dead".to_string(),
            lock_prefix: "job:lock:".to_string(),
            lease_ttl: Duration::from_secs(300),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            pending_key: std::env::var("QUEUE_PENDING_KEY").unwrap_or(defaults.pending_key),
            dead_letter_key: std::env::var("QUEUE_DEAD_LETTER_KEY")
                .unwrap_or(defaults.dead_letter_key),
            lock_prefix: std::env::var("QUEUE_LOCK_PREFIX").unwrap_or(defaults.lock_prefix),
            lease_ttl: Duration::from_secs(
                std::env::var("LEASE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }
}

/// FIFO handoff of job ids from submission to workers.
///
/// Producers LPUSH, consumers BRPOP; together with retries landing behind
/// fresh submissions this gives FIFO ordering modulo backoff delays.
#[derive(Clone)]
pub struct WorkQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl WorkQueue {
    /// Create a new work queue client.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Append a job id to the pending queue.
    pub async fn push(&self, job_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lpush::<_, _, ()>(&self.config.pending_key, job_id)
            .await?;
        debug!(job_id, "Pushed job to pending queue");
        Ok(())
    }

    /// Pop the next job id, blocking up to `timeout`.
    ///
    /// Returns `None` when the timeout elapsed without work.
    pub async fn blocking_pop(&self, timeout: Duration) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<(String, String)> = conn
            .brpop(&self.config.pending_key, timeout.as_secs_f64())
            .await?;

        Ok(result.map(|(_key, job_id)| job_id))
    }

    /// Move a job id to the dead-letter queue.
    ///
    /// Dead-lettered ids are never drained automatically; they exist for
    /// operator inspection.
    pub async fn push_dead_letter(&self, job_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lpush::<_, _, ()>(&self.config.dead_letter_key, job_id)
            .await?;
        warn!(job_id, "Pushed job to dead-letter queue");
        Ok(())
    }

    /// Observed depth of the pending queue (approximate under mutation).
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.llen(&self.config.pending_key).await?)
    }

    /// Observed depth of the dead-letter queue.
    pub async fn dead_letter_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.llen(&self.config.dead_letter_key).await?)
    }

    /// Snapshot of every id currently in the pending queue.
    ///
    /// Used by the dispatch reconciler to find `queued` jobs that never made
    /// it into the list.
    pub async fn pending_ids(&self) -> QueueResult<Vec<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.lrange(&self.config.pending_key, 0, -1).await?)
    }

    /// Snapshot of the dead-letter queue contents.
    pub async fn dead_letter_ids(&self) -> QueueResult<Vec<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.lrange(&self.config.dead_letter_key, 0, -1).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    // These tests require a running Redis instance.
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    fn test_config(suffix: &str) -> QueueConfig {
        QueueConfig {
            pending_key: format!("test:jobs:pending:{suffix}"),
            dead_letter_key: format!("test:jobs:dead:{suffix}"),
            lock_prefix: format!("test:job:lock:{suffix}:"),
            ..QueueConfig::default()
        }
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_push_pop_fifo() {
        let queue = WorkQueue::new(test_config(&Uuid::new_v4().to_string())).unwrap();

        let first = Uuid::new_v4().to_string();
        let second = Uuid::new_v4().to_string();
        queue.push(&first).await.unwrap();
        queue.push(&second).await.unwrap();

        assert_eq!(queue.len().await.unwrap(), 2);
        assert_eq!(
            queue.blocking_pop(Duration::from_secs(1)).await.unwrap(),
            Some(first)
        );
        assert_eq!(
            queue.blocking_pop(Duration::from_secs(1)).await.unwrap(),
            Some(second)
        );
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_pop_times_out_empty() {
        let queue = WorkQueue::new(test_config(&Uuid::new_v4().to_string())).unwrap();
        let popped = queue.blocking_pop(Duration::from_secs(1)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_dead_letter_is_separate() {
        let queue = WorkQueue::new(test_config(&Uuid::new_v4().to_string())).unwrap();

        let job_id = Uuid::new_v4().to_string();
        queue.push_dead_letter(&job_id).await.unwrap();

        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(queue.dead_letter_len().await.unwrap(), 1);
        assert_eq!(queue.dead_letter_ids().await.unwrap(), vec![job_id]);
    }
}
