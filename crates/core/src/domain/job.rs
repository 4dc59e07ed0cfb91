// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::lead::LeadStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Arbitrary per-job metrics (e.g. `processed`, `failed`, `total_leads`)
pub type JobMetrics = serde_json::Map<String, serde_json::Value>;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Statuses reported by `get_active_jobs`
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Running, JobStatus::Pending];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownJobStatus(s.to_string()))
    }
}

/// Pipeline stage a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Ingestion,
    FindymailEnrichment,
    AiEnrichment,
    Upload,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::Ingestion,
        JobType::FindymailEnrichment,
        JobType::AiEnrichment,
        JobType::Upload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Ingestion => "ingestion",
            JobType::FindymailEnrichment => "findymail_enrichment",
            JobType::AiEnrichment => "ai_enrichment",
            JobType::Upload => "upload",
        }
    }

    /// Lead status this stage consumes. Ingestion creates leads instead of claiming them.
    pub fn input_status(&self) -> Option<LeadStatus> {
        match self {
            JobType::Ingestion => None,
            JobType::FindymailEnrichment => Some(LeadStatus::Pending),
            JobType::AiEnrichment => Some(LeadStatus::FindymailEnriched),
            JobType::Upload => Some(LeadStatus::AiEnriched),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobType::ALL
            .into_iter()
            .find(|job_type| job_type.as_str() == s)
            .ok_or_else(|| DomainError::UnknownJobType(s.to_string()))
    }
}

/// Clamp a raw percentage to 0..=100
pub fn clamp_progress(pct: i64) -> u8 {
    pct.clamp(0, 100) as u8
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub client: String,
    pub job_type: JobType,
    pub status: JobStatus,

    /// 0..=100, never decreases while running
    pub progress: u8,
    pub current_phase: Option<String>,
    pub metrics: JobMetrics,
    pub error_message: Option<String>,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

/// Job creation input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub client: String,
    pub job_type: JobType,
    #[serde(default)]
    pub metrics: JobMetrics,
}

impl NewJob {
    pub fn new(client: impl Into<String>, job_type: JobType) -> Self {
        Self {
            client: client.into(),
            job_type,
            metrics: JobMetrics::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: JobMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Job {
    /// Start a new run
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `now_millis` - Start timestamp in epoch ms (injected, not system time)
    /// * `new_job` - Creation input
    pub fn start(id: impl Into<String>, now_millis: i64, new_job: NewJob) -> Self {
        Self {
            id: id.into(),
            client: new_job.client,
            job_type: new_job.job_type,
            status: JobStatus::Running,
            progress: 0,
            current_phase: None,
            metrics: new_job.metrics,
            error_message: None,
            created_at: now_millis,
            started_at: Some(now_millis),
            completed_at: None,
        }
    }
}

/// Partial job write. Only `Some` fields are touched.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub progress: Option<u8>,
    pub phase: Option<String>,
    pub metrics: Option<JobMetrics>,
}

impl JobPatch {
    pub fn progress(pct: i64) -> Self {
        Self {
            progress: Some(clamp_progress(pct)),
            ..Default::default()
        }
    }

    pub fn phase(phase: impl Into<String>) -> Self {
        Self {
            phase: Some(phase.into()),
            ..Default::default()
        }
    }

    pub fn metrics(metrics: JobMetrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..Default::default()
        }
    }

    pub fn with_metrics(mut self, metrics: JobMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.progress.is_none() && self.phase.is_none() && self.metrics.is_none()
    }
}

/// Terminal transition for a job
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed { metrics: JobMetrics },
    Failed { message: String },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }
}
