//! Shared fixtures for store-backed tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use leadflow_core::application::{BatchClaimer, JobProgressTracker, LeadLifecycle};
use leadflow_core::port::id_provider::UuidProvider;
use leadflow_core::port::mocks::ManualClock;
use leadflow_infra_sqlite::SqliteStore;

pub const CLIENT: &str = "acme";
pub const LEASE_MS: i64 = 60_000;

/// File-backed store so several pool connections see the same database.
/// The file is removed on drop.
pub struct TestStore {
    pub store: SqliteStore,
    pub clock: Arc<ManualClock>,
    pub url: String,
    path: PathBuf,
}

impl TestStore {
    pub async fn open() -> Self {
        let path = std::env::temp_dir().join(format!("leadflow-it-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());
        let store = SqliteStore::open(&url).await.expect("open test store");
        Self {
            store,
            clock: Arc::new(ManualClock::new(1_700_000_000_000)),
            url,
            path,
        }
    }

    pub fn lifecycle(&self) -> LeadLifecycle {
        LeadLifecycle::new(self.store.leads(), Arc::new(UuidProvider), self.clock.clone())
    }

    pub fn claimer(&self, worker_id: &str) -> BatchClaimer {
        BatchClaimer::new(self.store.leads(), self.clock.clone(), worker_id).with_lease_ms(LEASE_MS)
    }

    pub fn tracker(&self) -> JobProgressTracker {
        JobProgressTracker::new(self.store.jobs(), Arc::new(UuidProvider), self.clock.clone())
    }
}

impl Drop for TestStore {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}
