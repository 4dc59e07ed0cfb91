// Claim Lease
//
// A claim reserves a lead for one worker until `expires_at`. Expired claims
// are claimable again, so a crashed worker never strands a lead.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLease {
    pub worker_id: String,
    pub claimed_at: i64, // epoch ms
    pub expires_at: i64, // epoch ms
}

impl ClaimLease {
    pub fn new(worker_id: impl Into<String>, now_millis: i64, lease_ms: i64) -> Self {
        Self {
            worker_id: worker_id.into(),
            claimed_at: now_millis,
            expires_at: now_millis.saturating_add(lease_ms.max(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_expiry() {
        let lease = ClaimLease::new("worker-a", 1_000, 600_000);
        assert_eq!(lease.expires_at, 601_000);
    }

    #[test]
    fn test_negative_lease_expires_immediately() {
        let lease = ClaimLease::new("worker-a", 1_000, -5);
        assert_eq!(lease.expires_at, 1_000);
    }
}
