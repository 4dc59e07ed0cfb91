// Lead Repository Port (Interface)

use crate::domain::{ClaimLease, Lead, LeadPage, LeadPhase, LeadState, LeadStatus, LeadUpdate};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Lead persistence
///
/// Every method is a single store round trip (or one store transaction).
/// Implementations must make `claim_next_batch` atomic with respect to
/// selection: two concurrent callers never receive the same lead.
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Insert freshly ingested leads (all or nothing)
    async fn insert_batch(&self, leads: &[Lead]) -> Result<()>;

    /// Find lead by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Lead>>;

    /// Apply a planned transition if the stored status still equals
    /// `update.expected_status`. Stamps are written with keep-if-set semantics.
    /// Releases the lead's claim.
    ///
    /// # Errors
    /// - `AppError::NotFound` if the lead does not exist
    /// - `AppError::Conflict` if the status changed since it was read
    async fn apply_update(&self, update: &LeadUpdate) -> Result<Lead>;

    /// Change the phase if the stored (status, phase) still equals `expected`.
    /// Keeps the claim.
    async fn set_phase(&self, id: &str, expected: LeadState, phase: LeadPhase) -> Result<Lead>;

    /// Atomically add one to retry_count and return the new value
    async fn increment_retry_count(&self, id: &str) -> Result<u32>;

    /// Select-and-mark up to `limit` unclaimed (or lease-expired) leads in
    /// `status` for `client`, oldest first. An empty result is not an error.
    async fn claim_next_batch(
        &self,
        client: &str,
        status: LeadStatus,
        limit: u32,
        lease: &ClaimLease,
    ) -> Result<Vec<Lead>>;

    /// Release a claim held by `worker_id`. Returns false if not held.
    async fn release_claim(&self, id: &str, worker_id: &str) -> Result<bool>;

    /// Clear every claim whose lease expired at or before `now_millis`
    async fn release_expired_claims(&self, now_millis: i64) -> Result<Vec<Lead>>;

    /// Failed, unclaimed leads with retry_count < max_retries, oldest first
    async fn find_retryable(
        &self,
        client: &str,
        max_retries: u32,
        limit: u32,
        now_millis: i64,
    ) -> Result<Vec<Lead>>;

    /// Leads at `phase` for `client`, oldest first
    async fn find_by_phase(&self, client: &str, phase: LeadPhase, limit: u32)
        -> Result<Vec<Lead>>;

    /// One page of a job's leads, oldest first
    async fn find_by_job_id(&self, job_id: &str, limit: u32, offset: u32) -> Result<LeadPage>;
}
