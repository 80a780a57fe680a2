//! Dispatcher: pending-queue push after a successful job insert.

use tracing::{debug, error};
use uuid::Uuid;

use vpipe_queue::WorkQueue;

/// Moves a freshly persisted job id into the pending queue, once per
/// successful `create_job`.
#[derive(Clone)]
pub struct Dispatcher {
    queue: WorkQueue,
}

impl Dispatcher {
    pub fn new(queue: WorkQueue) -> Self {
        Self { queue }
    }

    /// Enqueue the job id. A queue failure is logged but never reverses the
    /// database insert; the sweeper re-pushes undispatched `queued` jobs
    /// within one sweep interval.
    pub async fn dispatch(&self, job_id: Uuid) {
        match self.queue.push(&job_id.to_string()).await {
            Ok(()) => debug!(job_id = %job_id, "Dispatched job"),
            Err(e) => {
                error!(job_id = %job_id, "Failed to push job to queue, sweeper will reconcile: {e}")
            }
        }
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }
}
