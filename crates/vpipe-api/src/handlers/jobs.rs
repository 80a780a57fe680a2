//! Job submission and inspection handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vpipe_models::{Job, JobStatus, Rendition};
use vpipe_store::ListJobsFilter;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Applied when a submission names no resolutions.
const DEFAULT_RESOLUTIONS: &[&str] = &["480p", "720p", "1080p"];

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub input_key: String,
    #[serde(default)]
    pub resolutions: Vec<String>,
}

#[derive(Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub input_key: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: String,
    pub updated_at: String,
    pub renditions: Vec<RenditionResponse>,
}

#[derive(Serialize)]
pub struct RenditionResponse {
    pub id: Uuid,
    pub resolution: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

fn job_to_response(job: Job, renditions: Vec<Rendition>) -> JobResponse {
    JobResponse {
        id: job.id,
        input_key: job.input_key,
        status: job.status,
        error_message: job.error_message,
        retry_count: job.retry_count,
        max_retries: job.max_retries,
        created_at: job.created_at.to_rfc3339(),
        updated_at: job.updated_at.to_rfc3339(),
        renditions: renditions
            .into_iter()
            .map(|r| RenditionResponse {
                id: r.id,
                resolution: r.resolution,
                output_key: r.output_key,
            })
            .collect(),
    }
}

/// Apply the default resolution set to empty submissions.
fn effective_resolutions(requested: Vec<String>) -> Vec<String> {
    if requested.is_empty() {
        DEFAULT_RESOLUTIONS.iter().map(|s| s.to_string()).collect()
    } else {
        requested
    }
}

/// POST /jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    if request.input_key.trim().is_empty() {
        return Err(ApiError::bad_request("input_key is required"));
    }

    let resolutions = effective_resolutions(request.resolutions);

    let job = state
        .store
        .create_job(
            &request.input_key,
            &resolutions,
            state.config.max_retries_default,
        )
        .await?;

    metrics::record_job_created();

    // Best-effort: a failed push is logged and reconciled by the sweeper.
    state.dispatcher.dispatch(job.id).await;

    let renditions = state.store.list_renditions(job.id).await?;

    Ok((StatusCode::CREATED, Json(job_to_response(job, renditions))))
}

/// GET /jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.store.get_job(id).await?;
    let renditions = state.store.list_renditions(job.id).await?;
    Ok(Json(job_to_response(job, renditions)))
}

#[derive(Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<JobResponse>>> {
    let filter = ListJobsFilter {
        status: query.status,
        limit: query.limit,
        offset: query.offset,
    };

    let jobs = state.store.list_jobs(&filter).await?;

    let mut response = Vec::with_capacity(jobs.len());
    for job in jobs {
        let renditions = state.store.list_renditions(job.id).await?;
        response.push(job_to_response(job, renditions));
    }

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_submission_gets_default_resolutions() {
        let resolutions = effective_resolutions(vec![]);
        assert_eq!(resolutions, vec!["480p", "720p", "1080p"]);
    }

    #[test]
    fn test_explicit_resolutions_pass_through() {
        let resolutions = effective_resolutions(vec!["720p".to_string()]);
        assert_eq!(resolutions, vec!["720p"]);
    }

    #[test]
    fn test_request_deserializes_without_resolutions() {
        let request: CreateJobRequest =
            serde_json::from_str(r#"{"input_key": "uploads/a/v.mp4"}"#).unwrap();
        assert_eq!(request.input_key, "uploads/a/v.mp4");
        assert!(request.resolutions.is_empty());
    }
}
