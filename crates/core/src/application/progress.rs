// Job progress tracker
//
// Two failure tiers:
// - create / complete / fail return errors. A job whose start or end was not
//   recorded must not be treated as tracked.
// - progress, phase and metrics updates are soft. Failures are logged and
//   swallowed so the lead processing that reports them keeps going.

use crate::domain::{Job, JobId, JobMetrics, JobOutcome, JobPatch, NewJob};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobRepository, TimeProvider};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct JobProgressTracker {
    job_repo: Arc<dyn JobRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobProgressTracker {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_repo,
            id_provider,
            time_provider,
        }
    }

    /// Start tracking a run. The job is created `running` at 0%.
    pub async fn create(&self, new_job: NewJob) -> Result<Job> {
        if new_job.client.trim().is_empty() {
            return Err(AppError::Validation("Job requires a client".to_string()));
        }

        let job = Job::start(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            new_job,
        );
        self.job_repo.insert(&job).await?;

        info!(
            job_id = %job.id,
            client = %job.client,
            job_type = %job.job_type,
            "Started job"
        );
        Ok(job)
    }

    /// Merge metric fields into the job's metrics
    pub async fn update_progress(&self, id: &JobId, metrics: JobMetrics) {
        self.soft_patch(id, JobPatch::metrics(metrics)).await;
    }

    /// Record `processed` of `total` items as a percentage. `total == 0` counts as done.
    pub async fn update_progress_counts(&self, id: &JobId, processed: u64, total: u64) {
        let pct = if total == 0 {
            100
        } else {
            (u128::from(processed.min(total)) * 100 / u128::from(total)) as i64
        };
        self.update_progress_percentage(id, pct).await;
    }

    /// Record a raw percentage, clamped to 0..=100
    pub async fn update_progress_percentage(&self, id: &JobId, pct: i64) {
        self.soft_patch(id, JobPatch::progress(pct)).await;
    }

    pub async fn update_phase(&self, id: &JobId, phase: &str) {
        self.soft_patch(id, JobPatch::phase(phase)).await;
    }

    /// Progress, phase and any extra metrics in one write
    pub async fn update_progress_and_phase(
        &self,
        id: &JobId,
        pct: i64,
        phase: &str,
        metrics: JobMetrics,
    ) {
        let mut patch = JobPatch {
            phase: Some(phase.to_string()),
            ..JobPatch::progress(pct)
        };
        if !metrics.is_empty() {
            patch = patch.with_metrics(metrics);
        }
        self.soft_patch(id, patch).await;
    }

    /// Mark the job completed, merging final metrics
    pub async fn complete(&self, id: &JobId, metrics: JobMetrics) -> Result<Job> {
        let job = self
            .job_repo
            .finish(id, &JobOutcome::Completed { metrics }, self.time_provider.now_millis())
            .await?;
        info!(job_id = %id, "Job completed");
        Ok(job)
    }

    /// Mark the job failed with a reason
    pub async fn fail(&self, id: &JobId, message: impl Into<String>) -> Result<Job> {
        let message = message.into();
        let job = self
            .job_repo
            .finish(
                id,
                &JobOutcome::Failed {
                    message: message.clone(),
                },
                self.time_provider.now_millis(),
            )
            .await?;
        warn!(job_id = %id, error = %message, "Job failed");
        Ok(job)
    }

    pub async fn get_by_id(&self, id: &JobId) -> Result<Job> {
        self.job_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))
    }

    /// Running and pending jobs for `client`, newest first
    pub async fn get_active_jobs(&self, client: &str) -> Result<Vec<Job>> {
        self.job_repo.find_active(client).await
    }

    async fn soft_patch(&self, id: &JobId, patch: JobPatch) {
        if patch.is_empty() {
            return;
        }
        match self.job_repo.apply_patch(id, &patch).await {
            Ok(()) => {
                debug!(job_id = %id, progress = ?patch.progress, phase = ?patch.phase, "Updated job");
            }
            Err(AppError::InvalidState(msg)) => {
                warn!(job_id = %id, "Ignoring update for finished job: {}", msg);
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "Failed to update job progress");
            }
        }
    }
}
