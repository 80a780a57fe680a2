//! Stale-job sweeper and dispatch reconciler.
//!
//! A stateless background pass that keeps the system live under crashes and
//! lost queue pushes:
//! - `processing` rows older than the stall horizon go back into the
//!   pending queue; the claim predicate legally transfers ownership on the
//!   next dequeue.
//! - `queued` rows missing from the pending list (a dispatch push that
//!   failed after commit, or a token lost mid-handoff) are re-pushed.
//!
//! Duplicate re-pushes are harmless: the lease registry and the claim CAS
//! absorb them. Running one sweeper per worker process is safe, just
//! slightly wasteful.

use std::collections::HashSet;

use tokio::sync::watch;
use tracing::{error, info, warn};

use vpipe_queue::{LeaseRegistry, WorkQueue};
use vpipe_store::JobStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

pub struct Sweeper {
    store: JobStore,
    queue: WorkQueue,
    leases: LeaseRegistry,
    config: WorkerConfig,
}

impl Sweeper {
    pub fn new(
        store: JobStore,
        queue: WorkQueue,
        leases: LeaseRegistry,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            leases,
            config,
        }
    }

    /// Run the periodic sweep until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.sweeper_interval.as_secs(),
            "Starting stale-job sweeper"
        );

        let mut ticker = tokio::time::interval(self.config.sweeper_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("Sweep failed: {e}");
                    }
                }
            }
        }

        info!("Sweeper stopped");
    }

    /// One sweep pass. Returns (stalled re-pushed, queued re-pushed).
    pub async fn sweep_once(&self) -> WorkerResult<(usize, usize)> {
        let stalled = self.store.find_stalled(self.config.stall_horizon).await?;
        for job in &stalled {
            warn!(
                job_id = %job.id,
                worker_id = ?job.worker_id,
                started_at = ?job.started_at,
                "Re-queueing stalled job"
            );
            self.queue.push(&job.id.to_string()).await?;
        }

        let requeued = self.reconcile_dispatch().await?;

        if !stalled.is_empty() || requeued > 0 {
            info!(
                stalled = stalled.len(),
                requeued, "Sweep complete"
            );
        }

        Ok((stalled.len(), requeued))
    }

    /// Re-push `queued` jobs that are in neither the pending list nor a
    /// lease. A leased id means a worker is between pop and claim; pushing
    /// it again would only create churn.
    async fn reconcile_dispatch(&self) -> WorkerResult<usize> {
        let pending: HashSet<String> = self.queue.pending_ids().await?.into_iter().collect();
        let queued = self.store.queued_job_ids().await?;

        let mut repushed = 0;
        for id in queued {
            let token = id.to_string();
            if pending.contains(&token) {
                continue;
            }
            if self.leases.holder(&token).await?.is_some() {
                continue;
            }
            warn!(job_id = %id, "Re-queueing job missing from pending queue");
            self.queue.push(&token).await?;
            repushed += 1;
        }

        Ok(repushed)
    }
}
