//! Rendition row: one requested output resolution of a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One output resolution of a job.
///
/// `(job_id, resolution)` is unique. `output_key`, once set, is stable: the
/// locator is derived deterministically from the job, so a repeated run of
/// the same job writes the same value.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rendition {
    pub id: Uuid,
    pub job_id: Uuid,
    /// Transcode profile name, e.g. `480p`
    pub resolution: String,
    /// Object-store locator of the produced file; `None` until uploaded
    pub output_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Rendition {
    /// Check whether this rendition has been produced and uploaded.
    pub fn is_complete(&self) -> bool {
        self.output_key.is_some()
    }
}
