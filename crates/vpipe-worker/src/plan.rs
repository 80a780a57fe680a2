//! The idempotent per-job plan.
//!
//! Everything here is safe to run more than once for the same job: output
//! locators are a pure function of the job, uploads overwrite in place, and
//! `complete_rendition` tolerates duplicate writes of the same locator.

use std::path::Path;

use tokio::sync::watch;
use tracing::{info, warn};

use vpipe_media::{profile_for, transcode};
use vpipe_models::Job;
use vpipe_storage::ObjectStore;
use vpipe_store::JobStore;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// What the plan produced for one job.
#[derive(Debug, Default)]
pub struct PlanReport {
    /// Renditions whose output is uploaded and recorded
    pub produced: Vec<String>,
    /// Per-rendition failures, resolution -> reason
    pub failures: Vec<(String, String)>,
}

impl PlanReport {
    /// Partial success is success: one produced rendition is enough to
    /// finalize the job `completed`.
    pub fn is_success(&self) -> bool {
        !self.produced.is_empty()
    }

    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(|(resolution, reason)| format!("{resolution}: {reason}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Source file extension taken from the input key; `.mp4` when absent.
fn input_extension(input_key: &str) -> String {
    Path::new(input_key)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".mp4".to_string())
}

/// Deterministic output locator for a rendition.
///
/// Determinism is what makes re-runs overwrite rather than duplicate:
/// `outputs/{job_id}/{basename}_{resolution}.mp4`.
pub fn output_key(job: &Job, resolution: &str) -> String {
    let stem = Path::new(&job.input_key)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string());
    format!("outputs/{}/{}_{}.mp4", job.id, stem, resolution)
}

fn ensure_running(cancel: &watch::Receiver<bool>) -> WorkerResult<()> {
    if *cancel.borrow() {
        Err(WorkerError::ShuttingDown)
    } else {
        Ok(())
    }
}

/// Execute the plan for a claimed job.
///
/// A single rendition failure does not abort the job; the loop records the
/// error and continues. Only zero produced renditions fails the plan.
pub async fn execute(
    store: &JobStore,
    objects: &ObjectStore,
    work_dir: &str,
    job: &Job,
    cancel: watch::Receiver<bool>,
) -> WorkerResult<PlanReport> {
    // Scratch space is per job and removed on every exit path by the
    // TempDir drop guard.
    let scratch = tempfile::Builder::new()
        .prefix(&format!("transcode-{}-", job.id))
        .tempdir_in(work_dir)?;

    let ext = input_extension(&job.input_key);
    let input_path = scratch.path().join(format!("input{ext}"));

    ensure_running(&cancel)?;
    info!(job_id = %job.id, input_key = %job.input_key, "Downloading input");
    objects.download(&job.input_key, &input_path).await?;

    let renditions = store.list_renditions(job.id).await?;
    if renditions.is_empty() {
        return Err(WorkerError::invariant(format!(
            "job {} has no renditions",
            job.id
        )));
    }

    let mut report = PlanReport::default();

    for rendition in &renditions {
        ensure_running(&cancel)?;

        let key = output_key(job, &rendition.resolution);

        // An output left behind by a previous attempt counts as produced;
        // re-transcoding it would only rewrite the same bytes.
        match objects.exists(&key).await {
            Ok(true) => {
                info!(job_id = %job.id, resolution = %rendition.resolution, "Output already present, skipping transcode");
                store.complete_rendition(rendition.id, &key).await?;
                report.produced.push(rendition.resolution.clone());
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(job_id = %job.id, resolution = %rendition.resolution, "Existence probe failed, transcoding anyway: {e}");
            }
        }

        let profile = match profile_for(&rendition.resolution) {
            Ok(p) => p,
            Err(e) => {
                warn!(job_id = %job.id, resolution = %rendition.resolution, "No profile: {e}");
                metrics::record_transcode_error(&rendition.resolution);
                report.failures.push((rendition.resolution.clone(), e.to_string()));
                continue;
            }
        };

        let output_path = scratch
            .path()
            .join(format!("{}.mp4", rendition.resolution));

        info!(job_id = %job.id, resolution = %rendition.resolution, "Transcoding rendition");
        if let Err(e) = transcode(&input_path, &output_path, &profile, cancel.clone()).await {
            if matches!(e, vpipe_media::MediaError::Cancelled) {
                return Err(WorkerError::ShuttingDown);
            }
            warn!(job_id = %job.id, resolution = %rendition.resolution, "Transcode failed: {e}");
            metrics::record_transcode_error(&rendition.resolution);
            report.failures.push((rendition.resolution.clone(), e.to_string()));
            continue;
        }

        if let Err(e) = objects.upload(&output_path, &key).await {
            warn!(job_id = %job.id, resolution = %rendition.resolution, "Upload failed: {e}");
            report.failures.push((rendition.resolution.clone(), e.to_string()));
            continue;
        }

        // The rendition only counts once the locator is durably recorded.
        if let Err(e) = store.complete_rendition(rendition.id, &key).await {
            warn!(job_id = %job.id, resolution = %rendition.resolution, "Failed to record output key: {e}");
            report.failures.push((rendition.resolution.clone(), e.to_string()));
            continue;
        }

        info!(job_id = %job.id, resolution = %rendition.resolution, output_key = %key, "Rendition completed");
        report.produced.push(rendition.resolution.clone());
    }

    if report.is_success() {
        Ok(report)
    } else {
        Err(WorkerError::job_failed(format!(
            "no renditions produced: {}",
            report.failure_summary()
        )))
    }
}
