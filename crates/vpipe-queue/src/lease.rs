//! Advisory per-job ownership leases.
//!
//! The lease layer suppresses duplicate work when the same token reaches two
//! healthy workers; the database claim remains the authoritative arbiter.
//! Extend and release verify ownership server-side in one round trip, never
//! as a client-side read-then-write.

use std::time::Duration;

use redis::Script;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::queue::QueueConfig;

/// Atomically check the lease owner and refresh the TTL.
const EXTEND_SCRIPT: &str = r#"
local owner = redis.call("GET", KEYS[1])
if owner == false then
    return -1
end
if owner == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
end
return 0
"#;

/// Atomically check the lease owner and delete the key.
const RELEASE_SCRIPT: &str = r#"
local owner = redis.call("GET", KEYS[1])
if owner == false then
    return -1
end
if owner == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// TTL-bearing ownership table keyed by job id.
#[derive(Clone)]
pub struct LeaseRegistry {
    client: redis::Client,
    config: QueueConfig,
}

impl LeaseRegistry {
    /// Create a new lease registry client.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    fn lock_key(&self, job_id: &str) -> String {
        format!("{}{}", self.config.lock_prefix, job_id)
    }

    /// Try to acquire the lease for a job.
    ///
    /// Set-if-absent with expiry; returns `false` when another worker
    /// already holds the lease.
    pub async fn acquire(&self, job_id: &str, worker_id: &str) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let acquired: bool = redis::cmd("SET")
            .arg(self.lock_key(job_id))
            .arg(worker_id)
            .arg("NX")
            .arg("EX")
            .arg(self.config.lease_ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        if acquired {
            debug!(job_id, worker_id, "Acquired lease");
        }
        Ok(acquired)
    }

    /// Refresh the lease TTL, verifying ownership server-side.
    pub async fn extend(&self, job_id: &str, worker_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: i64 = Script::new(EXTEND_SCRIPT)
            .key(self.lock_key(job_id))
            .arg(worker_id)
            .arg(self.config.lease_ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        match result {
            -1 => Err(QueueError::LeaseNotFound),
            0 => Err(QueueError::LeaseNotOwner),
            _ => Ok(()),
        }
    }

    /// Release the lease, verifying ownership server-side.
    pub async fn release(&self, job_id: &str, worker_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: i64 = Script::new(RELEASE_SCRIPT)
            .key(self.lock_key(job_id))
            .arg(worker_id)
            .invoke_async(&mut conn)
            .await?;

        match result {
            -1 => Err(QueueError::LeaseNotFound),
            0 => Err(QueueError::LeaseNotOwner),
            _ => {
                debug!(job_id, worker_id, "Released lease");
                Ok(())
            }
        }
    }

    /// Current lease holder, if any. Read-only; used by the sweeper to skip
    /// jobs with a claim in flight.
    pub async fn holder(&self, job_id: &str) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let holder: Option<String> = redis::cmd("GET")
            .arg(self.lock_key(job_id))
            .query_async(&mut conn)
            .await?;
        Ok(holder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use uuid::Uuid;

    // These tests require a running Redis instance.

    fn test_registry() -> LeaseRegistry {
        let config = QueueConfig {
            lock_prefix: format!("test:job:lock:{}:", Uuid::new_v4()),
            lease_ttl: Duration::from_secs(30),
            ..QueueConfig::default()
        };
        LeaseRegistry::new(config).unwrap()
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_acquire_is_exclusive() {
        let leases = test_registry();
        let job_id = Uuid::new_v4().to_string();

        assert!(leases.acquire(&job_id, "worker-a").await.unwrap());
        assert!(!leases.acquire(&job_id, "worker-b").await.unwrap());
        assert_eq!(
            leases.holder(&job_id).await.unwrap().as_deref(),
            Some("worker-a")
        );
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_extend_checks_ownership() {
        let leases = test_registry();
        let job_id = Uuid::new_v4().to_string();

        leases.acquire(&job_id, "worker-a").await.unwrap();
        leases.extend(&job_id, "worker-a").await.unwrap();

        let err = leases.extend(&job_id, "worker-b").await.unwrap_err();
        assert!(matches!(err, QueueError::LeaseNotOwner));

        let missing = Uuid::new_v4().to_string();
        let err = leases.extend(&missing, "worker-a").await.unwrap_err();
        assert!(matches!(err, QueueError::LeaseNotFound));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_release_frees_the_lease() {
        let leases = test_registry();
        let job_id = Uuid::new_v4().to_string();

        leases.acquire(&job_id, "worker-a").await.unwrap();

        let err = leases.release(&job_id, "worker-b").await.unwrap_err();
        assert!(matches!(err, QueueError::LeaseNotOwner));

        leases.release(&job_id, "worker-a").await.unwrap();
        assert!(leases.holder(&job_id).await.unwrap().is_none());

        // Released leases can be re-acquired by anyone.
        assert!(leases.acquire(&job_id, "worker-b").await.unwrap());
    }
}
