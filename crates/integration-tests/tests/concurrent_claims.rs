//! Claim exclusivity across concurrent workers and store handles

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{TestStore, CLIENT, LEASE_MS};
use futures::future::join_all;
use leadflow_core::application::{BatchClaimer, ClaimRecoveryService, LeadLifecycle};
use leadflow_core::domain::{LeadStatus, NewLead, TransitionExtras};
use leadflow_core::port::id_provider::UuidProvider;
use leadflow_core::AppError;
use leadflow_infra_sqlite::SqliteStore;

async fn seed(t: &TestStore, count: usize) {
    let leads = (0..count)
        .map(|_| NewLead::new(CLIENT, "job-1"))
        .collect();
    t.lifecycle().ingest(leads).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_are_disjoint() {
    let t = TestStore::open().await;
    seed(&t, 200).await;

    let handles: Vec<_> = (0..4)
        .map(|w| {
            let claimer = t.claimer(&format!("worker-{}", w));
            tokio::spawn(async move {
                claimer
                    .claim_next_batch(CLIENT, LeadStatus::Pending, 50)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for batch in join_all(handles).await {
        let batch = batch.unwrap();
        assert_eq!(batch.len(), 50);
        for lead in batch {
            assert!(seen.insert(lead.id.clone()), "lead {} claimed twice", lead.id);
        }
    }
    assert_eq!(seen.len(), 200);

    let leftover = t
        .claimer("worker-late")
        .claim_next_batch(CLIENT, LeadStatus::Pending, 50)
        .await
        .unwrap();
    assert!(leftover.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_store_handles_never_overlap() {
    let t = TestStore::open().await;
    seed(&t, 60).await;

    // A second pool on the same file stands in for another worker process
    let other = SqliteStore::open(&t.url).await.unwrap();
    let a = t.claimer("process-a");
    let b = BatchClaimer::new(other.leads(), t.clock.clone(), "process-b").with_lease_ms(LEASE_MS);

    let mut seen = HashSet::new();
    loop {
        let (left, right) = tokio::join!(
            a.claim_next_batch(CLIENT, LeadStatus::Pending, 7),
            b.claim_next_batch(CLIENT, LeadStatus::Pending, 7)
        );
        let (left, right) = (left.unwrap(), right.unwrap());
        if left.is_empty() && right.is_empty() {
            break;
        }
        for lead in left.into_iter().chain(right) {
            assert!(seen.insert(lead.id.clone()), "lead {} claimed twice", lead.id);
        }
    }
    assert_eq!(seen.len(), 60);
    other.close().await;
}

#[tokio::test]
async fn test_crashed_worker_leads_come_back_after_lease() {
    let t = TestStore::open().await;
    seed(&t, 5).await;

    let crashed = t
        .claimer("worker-crashed")
        .claim_next_batch(CLIENT, LeadStatus::Pending, 5)
        .await
        .unwrap();
    assert_eq!(crashed.len(), 5);

    let survivor = t.claimer("worker-2");
    assert!(survivor
        .claim_next_batch(CLIENT, LeadStatus::Pending, 5)
        .await
        .unwrap()
        .is_empty());

    let recovery = ClaimRecoveryService::new(t.store.leads(), t.clock.clone());
    assert_eq!(recovery.recover_expired_claims().await.unwrap(), 0);

    t.clock.advance(LEASE_MS);
    assert_eq!(recovery.recover_expired_claims().await.unwrap(), 5);

    let reclaimed = survivor
        .claim_next_batch(CLIENT, LeadStatus::Pending, 5)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 5);
    assert!(reclaimed
        .iter()
        .all(|l| l.claimed_by.as_deref() == Some("worker-2")));
}

#[tokio::test]
async fn test_release_returns_lead_to_pool() {
    let t = TestStore::open().await;
    seed(&t, 1).await;

    let holder = t.claimer("worker-1");
    let lead = holder
        .claim_next_batch(CLIENT, LeadStatus::Pending, 1)
        .await
        .unwrap()
        .remove(0);

    assert!(!t.claimer("worker-2").release(&lead.id).await.unwrap());
    assert!(holder.release(&lead.id).await.unwrap());

    let again = t
        .claimer("worker-2")
        .claim_next_batch(CLIENT, LeadStatus::Pending, 1)
        .await
        .unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].id, lead.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retry_increments_are_serialized() {
    const HANDLES: usize = 4;
    const PER_HANDLE: usize = 20;

    let t = TestStore::open().await;
    seed(&t, 1).await;
    let lead_id = t
        .lifecycle()
        .find_by_job_id("job-1", 1, 0)
        .await
        .unwrap()
        .leads
        .remove(0)
        .id;

    let mut stores = Vec::new();
    for _ in 0..HANDLES {
        stores.push(SqliteStore::open(&t.url).await.unwrap());
    }

    let mut handles = Vec::new();
    for store in &stores {
        let lifecycle = Arc::new(LeadLifecycle::new(
            store.leads(),
            Arc::new(UuidProvider),
            t.clock.clone(),
        ));
        for _ in 0..PER_HANDLE {
            let lifecycle = Arc::clone(&lifecycle);
            let lead_id = lead_id.clone();
            handles.push(tokio::spawn(async move {
                lifecycle.increment_retry_count(&lead_id).await.unwrap()
            }));
        }
    }

    let mut counts: Vec<u32> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    counts.sort_unstable();

    let total = (HANDLES * PER_HANDLE) as u32;
    assert_eq!(counts, (1..=total).collect::<Vec<_>>());
    assert_eq!(t.lifecycle().get_by_id(&lead_id).await.unwrap().retry_count, total);

    for store in &stores {
        store.close().await;
    }
}

#[tokio::test]
async fn test_stale_worker_cannot_overwrite_new_claim() {
    let t = TestStore::open().await;
    seed(&t, 1).await;
    let lifecycle = t.lifecycle();

    let stale = t.claimer("worker-stale");
    let lead = stale
        .claim_next_batch(CLIENT, LeadStatus::Pending, 1)
        .await
        .unwrap()
        .remove(0);

    t.clock.advance(LEASE_MS);
    let current = t.claimer("worker-current");
    assert_eq!(
        current
            .claim_next_batch(CLIENT, LeadStatus::Pending, 1)
            .await
            .unwrap()
            .len(),
        1
    );

    let late = lifecycle
        .update_status(
            &lead.id,
            LeadStatus::FindymailEnriched,
            TransitionExtras::default().held_by(stale.worker_id()),
        )
        .await;
    assert!(matches!(late, Err(AppError::Conflict(_))));

    let stored = lifecycle.get_by_id(&lead.id).await.unwrap();
    assert_eq!(stored.status, LeadStatus::Pending);
    assert_eq!(stored.claimed_by.as_deref(), Some("worker-current"));

    let done = lifecycle
        .update_status(
            &lead.id,
            LeadStatus::FindymailEnriched,
            TransitionExtras::default().held_by(current.worker_id()),
        )
        .await
        .unwrap();
    assert_eq!(done.status, LeadStatus::FindymailEnriched);
    assert_eq!(done.claimed_by, None);
}
