// Job Repository Port (Interface)

use crate::domain::{Job, JobId, JobOutcome, JobPatch};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Job persistence
///
/// Terminal jobs (`completed`, `failed`) are immutable: `apply_patch` and
/// `finish` are conditional on a non-terminal stored status.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// Merge a partial update. Progress is written as max(stored, new).
    ///
    /// # Errors
    /// - `AppError::NotFound` if the job does not exist
    /// - `AppError::InvalidState` if the job is already terminal
    async fn apply_patch(&self, id: &JobId, patch: &JobPatch) -> Result<()>;

    /// Move to a terminal status and stamp completed_at
    async fn finish(&self, id: &JobId, outcome: &JobOutcome, now_millis: i64) -> Result<Job>;

    /// Jobs in `running` or `pending` for `client`, newest first
    async fn find_active(&self, client: &str) -> Result<Vec<Job>>;
}
