//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Shutdown observed mid-job. The job stays `processing`; the sweeper
    /// re-queues it after the stall horizon.
    #[error("Shutting down")]
    ShuttingDown,

    /// State the worker believed impossible, e.g. a claimed job vanishing.
    /// The job is abandoned without retry accounting; the sweeper recovers.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Store error: {0}")]
    Store(#[from] vpipe_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vpipe_queue::QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] vpipe_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] vpipe_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Errors that must not feed the retry state machine: the job row is
    /// left untouched for the sweeper instead.
    pub fn bypasses_retry(&self) -> bool {
        matches!(self, WorkerError::ShuttingDown | WorkerError::Invariant(_))
    }
}
