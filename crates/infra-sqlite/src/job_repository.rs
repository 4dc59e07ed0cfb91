// SQLite JobRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use leadflow_core::domain::{
    clamp_progress, Job, JobId, JobMetrics, JobOutcome, JobPatch, JobStatus, JobType,
};
use leadflow_core::error::{AppError, Result};
use leadflow_core::port::JobRepository;
use sqlx::SqlitePool;

const NOT_TERMINAL: &str = "status NOT IN ('completed', 'failed')";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Explain why a conditional write matched no row
    async fn rejected(&self, id: &JobId) -> AppError {
        let status: std::result::Result<Option<String>, AppError> =
            sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error("load job status"));

        match status {
            Ok(None) => AppError::NotFound(format!("Job {} not found", id)),
            Ok(Some(status)) => {
                AppError::InvalidState(format!("Job {} is already {}", id, status))
            }
            Err(e) => e,
        }
    }
}

fn metrics_json(metrics: &JobMetrics) -> String {
    serde_json::Value::Object(metrics.clone()).to_string()
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, client, job_type, status, progress, current_phase,
                metrics, error_message, created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.client)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(i64::from(job.progress))
        .bind(&job.current_phase)
        .bind(metrics_json(&job.metrics))
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error("create job"))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error("load job"))?;

        row.map(JobRow::into_job).transpose()
    }

    async fn apply_patch(&self, id: &JobId, patch: &JobPatch) -> Result<()> {
        // Conditional update: finished jobs are never rewritten
        let sql = format!(
            r#"
            UPDATE jobs
            SET progress = CASE WHEN ?1 IS NULL THEN progress ELSE MAX(progress, ?1) END,
                current_phase = COALESCE(?2, current_phase),
                metrics = CASE WHEN ?3 IS NULL THEN metrics ELSE json_patch(metrics, ?3) END
            WHERE id = ?4 AND {NOT_TERMINAL}
            "#
        );

        let result = sqlx::query(&sql)
            .bind(patch.progress.map(i64::from))
            .bind(&patch.phase)
            .bind(patch.metrics.as_ref().map(metrics_json))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error("update job"))?;

        if result.rows_affected() == 0 {
            return Err(self.rejected(id).await);
        }
        Ok(())
    }

    async fn finish(&self, id: &JobId, outcome: &JobOutcome, now_millis: i64) -> Result<Job> {
        let (metrics, message) = match outcome {
            JobOutcome::Completed { metrics } => (Some(metrics_json(metrics)), None),
            JobOutcome::Failed { message } => (None, Some(message.as_str())),
        };

        let sql = format!(
            r#"
            UPDATE jobs
            SET status = ?1,
                completed_at = ?2,
                error_message = COALESCE(?3, error_message),
                metrics = CASE WHEN ?4 IS NULL THEN metrics ELSE json_patch(metrics, ?4) END
            WHERE id = ?5 AND {NOT_TERMINAL}
            RETURNING *
            "#
        );

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(outcome.status().as_str())
            .bind(now_millis)
            .bind(message)
            .bind(metrics)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error("finish job"))?;

        match row {
            Some(row) => row.into_job(),
            None => Err(self.rejected(id).await),
        }
    }

    async fn find_active(&self, client: &str) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE client = ? AND status IN (?, ?)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(client)
        .bind(JobStatus::ACTIVE[0].as_str())
        .bind(JobStatus::ACTIVE[1].as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error("find active jobs"))?;

        rows.into_iter().map(JobRow::into_job).collect()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    client: String,
    job_type: String,
    status: String,
    progress: i64,
    current_phase: Option<String>,
    metrics: String, // JSON object
    error_message: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            job_type: self.job_type.parse::<JobType>()?,
            status: self.status.parse::<JobStatus>()?,
            progress: clamp_progress(self.progress),
            metrics: serde_json::from_str::<JobMetrics>(&self.metrics)?,
            id: self.id,
            client: self.client,
            current_phase: self.current_phase,
            error_message: self.error_message,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}
