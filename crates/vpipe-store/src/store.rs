//! Job store operations.
//!
//! Every status mutation here is a single server-evaluated statement. In
//! particular `claim_job` is the only place a job may move into
//! `processing`, and its WHERE clause is what arbitrates ownership between
//! racing workers.

use std::collections::HashSet;
use std::time::Duration;

use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use vpipe_models::{Job, JobStatus, Rendition};

use crate::error::{StoreError, StoreResult};

const JOB_COLUMNS: &str =
    "id, input_key, status, error_message, retry_count, max_retries, started_at, worker_id, created_at, updated_at";

const RENDITION_COLUMNS: &str = "id, job_id, resolution, output_key, created_at";

/// Terminal outcome passed to [`JobStore::finalize_job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

impl JobOutcome {
    fn status(self) -> JobStatus {
        match self {
            JobOutcome::Completed => JobStatus::Completed,
            JobOutcome::Failed => JobStatus::Failed,
        }
    }
}

/// Filter for [`JobStore::list_jobs`].
#[derive(Debug, Clone, Default)]
pub struct ListJobsFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Durable, transactional record of jobs and renditions.
#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a job in `queued` with one rendition per requested resolution.
    ///
    /// Atomic: either the job and all renditions commit, or nothing does.
    /// Fails with `InvalidInput` when `resolutions` is empty or contains
    /// duplicates.
    pub async fn create_job(
        &self,
        input_key: &str,
        resolutions: &[String],
        max_retries: i32,
    ) -> StoreResult<Job> {
        if input_key.is_empty() {
            return Err(StoreError::invalid_input("input_key must not be empty"));
        }
        validate_resolutions(resolutions)?;

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO jobs (input_key, max_retries) VALUES ($1, $2) RETURNING {JOB_COLUMNS}"
        );
        let job: Job = sqlx::query_as(&sql)
            .bind(input_key)
            .bind(max_retries)
            .fetch_one(&mut *tx)
            .await?;

        for resolution in resolutions {
            sqlx::query("INSERT INTO renditions (job_id, resolution) VALUES ($1, $2)")
                .bind(job.id)
                .bind(resolution)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(job_id = %job.id, renditions = resolutions.len(), "Created job");
        Ok(job)
    }

    /// Look up a job by id.
    pub async fn get_job(&self, id: Uuid) -> StoreResult<Job> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("job {id}")))
    }

    /// List jobs, newest first.
    pub async fn list_jobs(&self, filter: &ListJobsFilter) -> StoreResult<Vec<Job>> {
        let limit = filter.limit.unwrap_or(50);
        let offset = filter.offset.unwrap_or(0);

        let jobs = match filter.status {
            Some(status) => {
                let sql = format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3"
                );
                sqlx::query_as(&sql)
                    .bind(status)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT $1 OFFSET $2"
                );
                sqlx::query_as(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(jobs)
    }

    /// List a job's renditions, ordered by resolution ascending.
    pub async fn list_renditions(&self, job_id: Uuid) -> StoreResult<Vec<Rendition>> {
        let sql = format!(
            "SELECT {RENDITION_COLUMNS} FROM renditions WHERE job_id = $1 ORDER BY resolution"
        );
        Ok(sqlx::query_as(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Atomically claim a job for a worker.
    ///
    /// Succeeds iff the row is `queued`, or `processing` with `started_at`
    /// older than `stall_horizon` (a previous owner is presumed dead). On
    /// success the row carries the new owner; no row matching means another
    /// worker owns the job and the caller must back off.
    pub async fn claim_job(
        &self,
        id: Uuid,
        worker_id: &str,
        stall_horizon: Duration,
    ) -> StoreResult<Job> {
        let sql = format!(
            "UPDATE jobs \
             SET status = 'processing', worker_id = $2, started_at = now(), \
                 error_message = NULL, updated_at = now() \
             WHERE id = $1 \
               AND (status = 'queued' \
                    OR (status = 'processing' AND started_at < now() - make_interval(secs => $3))) \
             RETURNING {JOB_COLUMNS}"
        );

        let claimed: Option<Job> = sqlx::query_as(&sql)
            .bind(id)
            .bind(worker_id)
            .bind(stall_horizon.as_secs_f64())
            .fetch_optional(&self.pool)
            .await?;

        match claimed {
            Some(job) => Ok(job),
            None => {
                // Distinguish a lost race from a token with no backing row.
                let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM jobs WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
                match exists {
                    Some(_) => Err(StoreError::already_claimed(format!("job {id}"))),
                    None => Err(StoreError::not_found(format!("job {id}"))),
                }
            }
        }
    }

    /// Record a rendition's uploaded output locator.
    ///
    /// Idempotent: writing the same locator twice is a no-op success. A
    /// locator, once set, is never rewritten to a different value, and only
    /// renditions of a `processing` job accept a first write.
    pub async fn complete_rendition(&self, rendition_id: Uuid, output_key: &str) -> StoreResult<()> {
        let updated: Option<(Uuid,)> = sqlx::query_as(
            "UPDATE renditions r SET output_key = $2 \
             FROM jobs j \
             WHERE r.id = $1 AND j.id = r.job_id \
               AND j.status = 'processing' \
               AND (r.output_key IS NULL OR r.output_key = $2) \
             RETURNING r.id",
        )
        .bind(rendition_id)
        .bind(output_key)
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_some() {
            return Ok(());
        }

        let existing: Option<(Option<String>,)> =
            sqlx::query_as("SELECT output_key FROM renditions WHERE id = $1")
                .bind(rendition_id)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            None => Err(StoreError::not_found(format!("rendition {rendition_id}"))),
            Some((Some(current),)) if current == output_key => Ok(()),
            Some((Some(_),)) => Err(StoreError::Conflict(format!(
                "rendition {rendition_id} output_key already set to a different value"
            ))),
            Some((None,)) => Err(StoreError::already_claimed(format!(
                "rendition {rendition_id}: parent job is not processing"
            ))),
        }
    }

    /// Move a job into a terminal state.
    ///
    /// Only a `processing` row transitions; finalizing an already-terminal
    /// job returns the row unchanged so a terminal status can never regress.
    pub async fn finalize_job(
        &self,
        id: Uuid,
        outcome: JobOutcome,
        error: Option<&str>,
    ) -> StoreResult<Job> {
        let sql = format!(
            "UPDATE jobs SET status = $2, error_message = $3, updated_at = now() \
             WHERE id = $1 AND status = 'processing' \
             RETURNING {JOB_COLUMNS}"
        );

        let finalized: Option<Job> = sqlx::query_as(&sql)
            .bind(id)
            .bind(outcome.status())
            .bind(error)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(job) = finalized {
            return Ok(job);
        }

        let job = self.get_job(id).await?;
        if job.is_terminal() {
            Ok(job)
        } else {
            Err(StoreError::already_claimed(format!(
                "job {id} is {} and cannot be finalized",
                job.status
            )))
        }
    }

    /// Requeue a failed attempt, consuming one retry.
    ///
    /// Clears ownership (`worker_id`, `started_at`) and bumps `retry_count`
    /// in one statement. The caller is responsible for checking
    /// `retry_count < max_retries` beforehand. Guarded on `processing` so a
    /// terminal job can never be resurrected.
    pub async fn increment_retry(&self, id: Uuid) -> StoreResult<Job> {
        let sql = format!(
            "UPDATE jobs \
             SET status = 'queued', worker_id = NULL, started_at = NULL, \
                 retry_count = retry_count + 1, updated_at = now() \
             WHERE id = $1 AND status = 'processing' \
             RETURNING {JOB_COLUMNS}"
        );

        let job: Option<Job> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match job {
            Some(job) => Ok(job),
            None => {
                let current = self.get_job(id).await?;
                Err(StoreError::already_claimed(format!(
                    "job {id} is {} and cannot be retried",
                    current.status
                )))
            }
        }
    }

    /// Find `processing` jobs whose claim is older than `horizon`.
    pub async fn find_stalled(&self, horizon: Duration) -> StoreResult<Vec<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status = 'processing' AND started_at < now() - make_interval(secs => $1) \
             ORDER BY started_at"
        );
        Ok(sqlx::query_as(&sql)
            .bind(horizon.as_secs_f64())
            .fetch_all(&self.pool)
            .await?)
    }

    /// Ids of all `queued` jobs, for dispatch reconciliation.
    pub async fn queued_job_ids(&self) -> StoreResult<Vec<Uuid>> {
        Ok(
            sqlx::query_scalar("SELECT id FROM jobs WHERE status = 'queued' ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}

/// Reject an empty or duplicate-bearing resolution list.
fn validate_resolutions(resolutions: &[String]) -> StoreResult<()> {
    if resolutions.is_empty() {
        return Err(StoreError::invalid_input(
            "at least one resolution is required",
        ));
    }

    let mut seen = HashSet::new();
    for resolution in resolutions {
        if !seen.insert(resolution.as_str()) {
            return Err(StoreError::invalid_input(format!(
                "duplicate resolution: {resolution}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolutions(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_resolutions_accepts_distinct() {
        assert!(validate_resolutions(&resolutions(&["480p", "720p", "1080p"])).is_ok());
    }

    #[test]
    fn test_validate_resolutions_rejects_empty() {
        let err = validate_resolutions(&[]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn test_validate_resolutions_rejects_duplicates() {
        let err = validate_resolutions(&resolutions(&["480p", "480p"])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }
}
