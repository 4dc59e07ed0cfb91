// Claim recovery
//
// A worker that dies mid-batch leaves its leads claimed. Claims carry a lease,
// so those leads become claimable again once it expires; this service also
// clears the stale claim markers, on startup and periodically afterwards.

use crate::application::shutdown::ShutdownToken;
use crate::error::Result;
use crate::port::{LeadRepository, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

pub struct ClaimRecoveryService {
    lead_repo: Arc<dyn LeadRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ClaimRecoveryService {
    /// # Example
    /// ```ignore
    /// let recovery = ClaimRecoveryService::new(lead_repo, time_provider);
    /// recovery.recover_expired_claims().await?;
    /// tokio::spawn(async move { recovery.run(interval, shutdown).await });
    /// ```
    pub fn new(lead_repo: Arc<dyn LeadRepository>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            lead_repo,
            time_provider,
        }
    }

    /// Release every claim whose lease has expired
    ///
    /// # Returns
    /// Number of leads released
    pub async fn recover_expired_claims(&self) -> Result<usize> {
        let now = self.time_provider.now_millis();
        let released = self.lead_repo.release_expired_claims(now).await?;

        for lead in &released {
            warn!(
                lead_id = %lead.id,
                client = %lead.client,
                status = %lead.status,
                "Released expired claim"
            );
        }

        if !released.is_empty() {
            info!(released = released.len(), "Expired claim recovery complete");
        }
        Ok(released.len())
    }

    /// Sweep every `interval` until shutdown. Sweep errors are logged and the
    /// loop continues.
    pub async fn run(&self, interval: Duration, mut shutdown: ShutdownToken) {
        info!(interval_ms = interval.as_millis() as u64, "Claim reaper started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            tokio::select! {
                _ = sleep(interval) => {
                    if let Err(e) = self.recover_expired_claims().await {
                        error!(error = %e, "Expired claim recovery failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
        info!("Claim reaper stopped");
    }
}
