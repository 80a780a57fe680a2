//! Crash-recovery and retry-policy integration tests.
//!
//! These exercise the lifecycle machinery (claim, retry, sweeper) against
//! real PostgreSQL and Redis, without the encoder or object store in the
//! loop. Run with:
//!   docker run -d -p 5432:5432 -e POSTGRES_PASSWORD=postgres postgres:16-alpine
//!   docker run -d -p 6379:6379 redis:7-alpine

use std::time::Duration;

use uuid::Uuid;
use vpipe_models::JobStatus;
use vpipe_queue::{LeaseRegistry, QueueConfig, WorkQueue};
use vpipe_store::{connect, JobStore, StoreConfig, StoreError};
use vpipe_worker::{retry, Sweeper, WorkerConfig};

const HORIZON: Duration = Duration::from_secs(600);

async fn test_store() -> JobStore {
    dotenvy::dotenv().ok();
    let config = StoreConfig::from_env().expect("DATABASE_URL must be set");
    let pool = connect(&config).await.expect("Failed to connect to PostgreSQL");
    sqlx::raw_sql(include_str!("../../vpipe-store/schema.sql"))
        .execute(&pool)
        .await
        .expect("Failed to apply schema");
    JobStore::new(pool)
}

fn test_queue_config() -> QueueConfig {
    let suffix = Uuid::new_v4();
    QueueConfig {
        pending_key: format!("test:jobs:pending:{suffix}"),
        dead_letter_key: format!("test:jobs:dead:{suffix}"),
        lock_prefix: format!("test:job:lock:{suffix}:"),
        ..QueueConfig::default()
    }
}

async fn backdate_claim(id: Uuid, secs: i64) {
    let config = StoreConfig::from_env().unwrap();
    let pool = connect(&config).await.unwrap();
    sqlx::query("UPDATE jobs SET started_at = now() - make_interval(secs => $2) WHERE id = $1")
        .bind(id)
        .bind(secs as f64)
        .execute(&pool)
        .await
        .unwrap();
}

/// The full retry budget: initial attempt plus max_retries retries, then
/// dead-letter and terminal failure.
#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_retries_exhaust_into_dead_letter() {
    let store = test_store().await;
    let queue = WorkQueue::new(test_queue_config()).unwrap();
    let schedule = [Duration::from_millis(10)];

    let job = store
        .create_job("uploads/a/v.mp4", &["480p".to_string()], 2)
        .await
        .unwrap();
    let token = job.id.to_string();

    // Attempt 1 (initial) and attempt 2 (first retry) fail with budget left.
    for expected_count in 1..=2 {
        store.claim_job(job.id, "worker-a", HORIZON).await.unwrap();
        retry::handle_failure(&store, &queue, job.id, &schedule, "encoder exploded").await;

        let current = store.get_job(job.id).await.unwrap();
        assert_eq!(current.status, JobStatus::Queued);
        assert_eq!(current.retry_count, expected_count);
        assert!(current.worker_id.is_none());

        // The deferred push lands after the (tiny) backoff delay.
        let popped = queue.blocking_pop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(popped.as_deref(), Some(token.as_str()));
    }

    // Attempt 3: budget exhausted.
    store.claim_job(job.id, "worker-a", HORIZON).await.unwrap();
    retry::handle_failure(&store, &queue, job.id, &schedule, "encoder exploded").await;

    let terminal = store.get_job(job.id).await.unwrap();
    assert_eq!(terminal.status, JobStatus::Failed);
    assert_eq!(terminal.retry_count, 2);
    assert!(terminal
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("exceeded max retries"));

    assert!(queue.dead_letter_ids().await.unwrap().contains(&token));
    // Nothing further lands in the pending queue.
    assert!(queue
        .blocking_pop(Duration::from_secs(1))
        .await
        .unwrap()
        .is_none());
}

/// A crashed worker's job is swept back into the queue and claimed by a
/// successor without consuming a retry.
#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_sweeper_recovers_stalled_job() {
    let store = test_store().await;
    let queue_config = test_queue_config();
    let queue = WorkQueue::new(queue_config.clone()).unwrap();
    let leases = LeaseRegistry::new(queue_config).unwrap();
    let sweeper = Sweeper::new(
        store.clone(),
        queue.clone(),
        leases,
        WorkerConfig::default(),
    );

    let job = store
        .create_job("uploads/a/v.mp4", &["480p".to_string()], 3)
        .await
        .unwrap();
    let token = job.id.to_string();

    // Worker claims, then "crashes" (does nothing further).
    store.claim_job(job.id, "worker-a", HORIZON).await.unwrap();
    backdate_claim(job.id, 700).await;

    sweeper.sweep_once().await.unwrap();
    assert!(queue.pending_ids().await.unwrap().contains(&token));

    // The claim predicate transfers ownership to the successor; the crash
    // was not a plan failure, so the retry count is untouched.
    let stolen = store.claim_job(job.id, "worker-b", HORIZON).await.unwrap();
    assert_eq!(stolen.worker_id.as_deref(), Some("worker-b"));
    assert_eq!(stolen.retry_count, 0);
}

/// A dispatch push lost after commit is reconciled by the sweeper, while
/// queued jobs with an active lease are left alone.
#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_sweeper_reconciles_lost_dispatch() {
    let store = test_store().await;
    let queue_config = test_queue_config();
    let queue = WorkQueue::new(queue_config.clone()).unwrap();
    let leases = LeaseRegistry::new(queue_config).unwrap();
    let sweeper = Sweeper::new(
        store.clone(),
        queue.clone(),
        leases.clone(),
        WorkerConfig::default(),
    );

    // Committed to the store, but the dispatcher's push never happened.
    let lost = store
        .create_job("uploads/lost/v.mp4", &["480p".to_string()], 3)
        .await
        .unwrap();

    // This one is mid-handoff: still queued, but a worker holds its lease.
    let leased = store
        .create_job("uploads/leased/v.mp4", &["480p".to_string()], 3)
        .await
        .unwrap();
    leases
        .acquire(&leased.id.to_string(), "worker-a")
        .await
        .unwrap();

    sweeper.sweep_once().await.unwrap();

    let pending = queue.pending_ids().await.unwrap();
    assert!(pending.contains(&lost.id.to_string()));
    assert!(!pending.contains(&leased.id.to_string()));
}

/// Exactly one of two racing workers wins a re-queued token.
#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_claim_race_has_one_winner() {
    let store = test_store().await;

    let job = store
        .create_job("uploads/a/v.mp4", &["480p".to_string()], 3)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        store.claim_job(job.id, "worker-a", HORIZON),
        store.claim_job(job.id, "worker-b", HORIZON),
    );

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser.unwrap_err(), StoreError::AlreadyClaimed(_)));
}
