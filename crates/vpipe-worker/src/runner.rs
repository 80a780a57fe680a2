//! The worker claim loop.
//!
//! One job at a time per worker process; fleet concurrency comes from
//! running more workers. The loop layers three defenses against duplicate
//! work: the queue pop (at-least-once), the advisory lease (suppresses
//! obvious duplicates), and the database claim (authoritative).

use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vpipe_queue::{LeaseRegistry, QueueError, WorkQueue};
use vpipe_storage::ObjectStore;
use vpipe_store::{JobOutcome, JobStore, StoreError};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::plan;
use crate::retry;

/// A single worker process.
pub struct Worker {
    worker_id: String,
    store: JobStore,
    queue: WorkQueue,
    leases: LeaseRegistry,
    objects: ObjectStore,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    /// Create a worker with a fresh process-unique id.
    pub fn new(
        store: JobStore,
        queue: WorkQueue,
        leases: LeaseRegistry,
        objects: ObjectStore,
        config: WorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            worker_id: Uuid::new_v4().to_string(),
            store,
            queue,
            leases,
            objects,
            config,
            shutdown,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run the claim loop until shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(worker_id = %self.worker_id, "Worker ready, waiting for jobs");

        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let popped = tokio::select! {
                _ = shutdown.changed() => continue,
                popped = self.queue.blocking_pop(self.config.queue_pop_timeout) => popped,
            };

            let token = match popped {
                Ok(Some(token)) => token,
                Ok(None) => continue,
                Err(e) => {
                    error!(worker_id = %self.worker_id, "Error popping from queue: {e}");
                    continue;
                }
            };

            let job_id = match Uuid::parse_str(&token) {
                Ok(id) => id,
                Err(_) => {
                    warn!(%token, "Discarding malformed queue token");
                    continue;
                }
            };

            self.handle_token(job_id).await;
        }

        info!(worker_id = %self.worker_id, "Worker stopped");
        Ok(())
    }

    /// Take a popped token through lease, claim, plan, and resolution.
    async fn handle_token(&self, job_id: Uuid) {
        let token = job_id.to_string();

        match self.leases.acquire(&token, &self.worker_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(job_id = %job_id, "Lease held by another worker, discarding token");
                return;
            }
            Err(e) => {
                // The token is lost, but the job is still `queued`; the
                // sweeper's reconcile pass re-pushes it.
                warn!(job_id = %job_id, "Failed to acquire lease: {e}");
                return;
            }
        }

        let job = match self
            .store
            .claim_job(job_id, &self.worker_id, self.config.stall_horizon)
            .await
        {
            Ok(job) => job,
            Err(StoreError::AlreadyClaimed(_)) => {
                debug!(job_id = %job_id, "Lost the claim race, releasing lease");
                self.release_lease(&token).await;
                return;
            }
            Err(StoreError::NotFound(_)) => {
                // Orphan token: no backing row. Discard, never retry.
                warn!(job_id = %job_id, "Popped token with no job row, discarding");
                self.release_lease(&token).await;
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, "Claim failed: {e}");
                self.release_lease(&token).await;
                return;
            }
        };

        info!(
            job_id = %job_id,
            worker_id = %self.worker_id,
            input_key = %job.input_key,
            attempt = job.retry_count,
            "Claimed job"
        );

        metrics::inc_active_jobs();
        let started = Instant::now();
        let renewal = self.spawn_renewal(token.clone());

        let result = plan::execute(
            &self.store,
            &self.objects,
            &self.config.work_dir,
            &job,
            self.shutdown.clone(),
        )
        .await;

        match result {
            Ok(report) => {
                match self
                    .store
                    .finalize_job(job_id, JobOutcome::Completed, None)
                    .await
                {
                    Ok(_) => {
                        metrics::record_job_processed("completed");
                        metrics::record_job_duration(started.elapsed());
                        info!(
                            job_id = %job_id,
                            produced = report.produced.len(),
                            failed = report.failures.len(),
                            "Job completed"
                        );
                    }
                    Err(e) => error!(job_id = %job_id, "Failed to finalize completed job: {e}"),
                }
            }
            Err(e) if e.bypasses_retry() => {
                // Shutdown or broken invariant: leave the row `processing`
                // for the sweeper, no retry is consumed.
                warn!(job_id = %job_id, "Abandoning job without retry: {e}");
            }
            Err(e) => {
                error!(job_id = %job_id, "Plan failed: {e}");
                retry::handle_failure(
                    &self.store,
                    &self.queue,
                    job_id,
                    &self.config.backoff_schedule,
                    &e.to_string(),
                )
                .await;
            }
        }

        renewal.stop().await;
        self.release_lease(&token).await;
        metrics::dec_active_jobs();
    }

    async fn release_lease(&self, token: &str) {
        match self.leases.release(token, &self.worker_id).await {
            Ok(()) => {}
            // Expired or stolen leases are expected after long jobs; the DB
            // claim was the real ownership record all along.
            Err(QueueError::LeaseNotFound) | Err(QueueError::LeaseNotOwner) => {
                debug!(job_id = %token, "Lease already gone at release")
            }
            Err(e) => warn!(job_id = %token, "Failed to release lease: {e}"),
        }
    }

    /// Start the lease-renewal companion for an in-flight job.
    fn spawn_renewal(&self, token: String) -> RenewalHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let leases = self.leases.clone();
        let worker_id = self.worker_id.clone();
        let renew_interval = self.config.lease_renew_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(renew_interval);
            // The first tick fires immediately; the lease was just acquired.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match leases.extend(&token, &worker_id).await {
                            Ok(()) => debug!(job_id = %token, "Extended lease"),
                            // Renewal failures do not abort the job; the DB
                            // claim remains the ownership record.
                            Err(e) => warn!(job_id = %token, "Lease renewal failed: {e}"),
                        }
                    }
                }
            }
        });

        RenewalHandle {
            stop: stop_tx,
            handle,
        }
    }
}

/// Handle to a running lease-renewal companion.
struct RenewalHandle {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RenewalHandle {
    async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}
