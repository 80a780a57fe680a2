//! Job row and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a job.
///
/// `Completed` and `Failed` are terminal: once a job reaches either, its
/// status never changes again and its renditions stop mutating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the pending queue for a worker
    #[default]
    Queued,
    /// Claimed by a worker and being transcoded
    Processing,
    /// At least one rendition was produced and uploaded
    Completed,
    /// Retries exhausted or administratively failed
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A submitted transcoding request.
///
/// Nullable columns are `Option` so that `None` always means "never set in
/// this processing epoch": `worker_id` and `started_at` are cleared whenever
/// the job goes back to `queued`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    /// Unique job ID
    pub id: Uuid,
    /// Object-store locator of the source media
    pub input_key: String,
    /// Current lifecycle state
    pub status: JobStatus,
    /// Set once, on the transition into `failed`
    pub error_message: Option<String>,
    /// Attempts consumed so far; never exceeds `max_retries`
    pub retry_count: i32,
    /// Retry budget, fixed at creation
    pub max_retries: i32,
    /// When the current owner claimed the job
    pub started_at: Option<DateTime<Utc>>,
    /// UUID of the worker currently holding the claim
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the retry budget allows another attempt.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serde_round_trip() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let back: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, JobStatus::Processing);
    }

    #[test]
    fn test_retry_budget() {
        let job = Job {
            id: Uuid::new_v4(),
            input_key: "uploads/a/v.mp4".to_string(),
            status: JobStatus::Processing,
            error_message: None,
            retry_count: 2,
            max_retries: 3,
            started_at: Some(Utc::now()),
            worker_id: Some(Uuid::new_v4().to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(job.can_retry());

        let exhausted = Job {
            retry_count: 3,
            ..job
        };
        assert!(!exhausted.can_retry());
    }
}
