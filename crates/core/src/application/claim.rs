// Batch claimer
//
// Hands out disjoint batches of leads to concurrent workers. The store does
// the selection and the claim in one statement, so two workers calling at the
// same time never receive the same lead while its lease is live.

use crate::config::{BatchSizes, DEFAULT_CLAIM_LEASE_MS};
use crate::domain::{ClaimLease, JobType, Lead, LeadStatus};
use crate::error::{AppError, Result};
use crate::port::{LeadRepository, TimeProvider};
use std::sync::Arc;
use tracing::{debug, info};

pub struct BatchClaimer {
    lead_repo: Arc<dyn LeadRepository>,
    time_provider: Arc<dyn TimeProvider>,
    worker_id: String,
    lease_ms: i64,
    batch_sizes: BatchSizes,
}

impl BatchClaimer {
    pub fn new(
        lead_repo: Arc<dyn LeadRepository>,
        time_provider: Arc<dyn TimeProvider>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            lead_repo,
            time_provider,
            worker_id: worker_id.into(),
            lease_ms: DEFAULT_CLAIM_LEASE_MS,
            batch_sizes: BatchSizes::default(),
        }
    }

    pub fn with_lease_ms(mut self, lease_ms: i64) -> Self {
        self.lease_ms = lease_ms;
        self
    }

    pub fn with_batch_sizes(mut self, batch_sizes: BatchSizes) -> Self {
        self.batch_sizes = batch_sizes;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim up to `limit` unclaimed leads of `client` in `status`, oldest first.
    ///
    /// An empty result is normal and means there is no work.
    pub async fn claim_next_batch(
        &self,
        client: &str,
        status: LeadStatus,
        limit: u32,
    ) -> Result<Vec<Lead>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let lease = ClaimLease::new(
            self.worker_id.clone(),
            self.time_provider.now_millis(),
            self.lease_ms,
        );
        let batch = self
            .lead_repo
            .claim_next_batch(client, status, limit, &lease)
            .await?;

        if batch.is_empty() {
            debug!(client, status = %status, "No leads to claim");
        } else {
            info!(
                client,
                status = %status,
                worker_id = %self.worker_id,
                count = batch.len(),
                expires_at = lease.expires_at,
                "Claimed {} leads",
                batch.len()
            );
        }
        Ok(batch)
    }

    /// Claim the input batch for a pipeline stage using its configured size
    pub async fn claim_for_stage(&self, client: &str, stage: JobType) -> Result<Vec<Lead>> {
        let status = stage.input_status().ok_or_else(|| {
            AppError::Validation(format!("Stage {} has no input leads to claim", stage))
        })?;
        self.claim_next_batch(client, status, self.batch_sizes.for_stage(stage))
            .await
    }

    /// Give a lead back without changing its status. Returns false if this
    /// worker did not hold the claim.
    pub async fn release(&self, lead_id: &str) -> Result<bool> {
        let released = self.lead_repo.release_claim(lead_id, &self.worker_id).await?;
        if released {
            debug!(lead_id, worker_id = %self.worker_id, "Released lead claim");
        }
        Ok(released)
    }
}
