// Lead lifecycle service
//
// All lead mutations go through here. Each transition is planned against the
// lead as read (`Lead::plan_transition`) and written as one conditional store
// update, so a lead that changed in between fails with `AppError::Conflict`
// instead of being silently overwritten.
//
// Failures are hard: every error is returned to the caller.

use crate::config::DEFAULT_INGESTION_BATCH;
use crate::domain::{
    ErrorStage, Lead, LeadPage, LeadPhase, LeadStatus, NewLead, TransitionExtras,
};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, LeadRepository, TimeProvider};
use std::sync::Arc;
use tracing::{debug, info};

pub struct LeadLifecycle {
    lead_repo: Arc<dyn LeadRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    ingestion_batch: usize,
}

impl LeadLifecycle {
    pub fn new(
        lead_repo: Arc<dyn LeadRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            lead_repo,
            id_provider,
            time_provider,
            ingestion_batch: DEFAULT_INGESTION_BATCH as usize,
        }
    }

    /// Rows per insert statement during ingestion
    pub fn with_ingestion_batch(mut self, batch: u32) -> Self {
        self.ingestion_batch = batch.max(1) as usize;
        self
    }

    /// Create leads in `pending`/`pending`. Each chunk is inserted atomically.
    pub async fn ingest(&self, new_leads: Vec<NewLead>) -> Result<Vec<Lead>> {
        if let Some(bad) = new_leads
            .iter()
            .find(|l| l.client.trim().is_empty() || l.job_id.trim().is_empty())
        {
            return Err(AppError::Validation(format!(
                "Lead requires client and job_id (client={:?}, job_id={:?})",
                bad.client, bad.job_id
            )));
        }

        let now = self.time_provider.now_millis();
        let leads: Vec<Lead> = new_leads
            .into_iter()
            .map(|new_lead| Lead::new(self.id_provider.generate_id(), now, new_lead))
            .collect();

        for chunk in leads.chunks(self.ingestion_batch) {
            self.lead_repo.insert_batch(chunk).await?;
        }

        info!(count = leads.len(), "Created {} new leads", leads.len());
        Ok(leads)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Lead> {
        self.lead_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))
    }

    /// Move a lead to `status`, stamping the stage completion time the first
    /// time a success status is reached. Releases the lead's claim.
    pub async fn update_status(
        &self,
        id: &str,
        status: LeadStatus,
        extras: TransitionExtras,
    ) -> Result<Lead> {
        let lead = self.get_by_id(id).await?;
        let update = lead.plan_transition(status, extras, self.time_provider.now_millis())?;
        let updated = self.lead_repo.apply_update(&update).await?;

        info!(
            lead_id = %id,
            from = %update.expected_status,
            status = %updated.status,
            phase = %updated.current_phase,
            "Updated lead {} to status {}",
            id,
            updated.status
        );
        Ok(updated)
    }

    pub async fn update_status_and_phase(
        &self,
        id: &str,
        status: LeadStatus,
        phase: LeadPhase,
        extras: TransitionExtras,
    ) -> Result<Lead> {
        self.update_status(id, status, extras.with_phase(phase)).await
    }

    /// Mark the lead `${stage}_failed` and record why
    pub async fn update_error(
        &self,
        id: &str,
        stage: ErrorStage,
        message: impl Into<String>,
    ) -> Result<Lead> {
        let extras = TransitionExtras::default().with_error(stage, message);
        self.update_status(id, stage.failed_status(), extras).await
    }

    /// Change the fine-grained phase without changing status. Keeps the claim.
    pub async fn update_phase(&self, id: &str, phase: LeadPhase) -> Result<Lead> {
        let lead = self.get_by_id(id).await?;
        let current = lead.state()?;
        let next = current.advance_phase(phase)?;
        let updated = self.lead_repo.set_phase(id, current, next.phase()).await?;

        debug!(lead_id = %id, phase = %phase, "Updated lead {} to phase {}", id, phase);
        Ok(updated)
    }

    /// Returns the new retry count
    pub async fn increment_retry_count(&self, id: &str) -> Result<u32> {
        let count = self.lead_repo.increment_retry_count(id).await?;
        debug!(lead_id = %id, retry_count = count, "Incremented lead retry count");
        Ok(count)
    }

    /// Failed leads with `retry_count < max_retries`, oldest first
    pub async fn find_retryable_leads(
        &self,
        client: &str,
        max_retries: u32,
        limit: u32,
    ) -> Result<Vec<Lead>> {
        self.lead_repo
            .find_retryable(client, max_retries, limit, self.time_provider.now_millis())
            .await
    }

    pub async fn find_by_phase(
        &self,
        client: &str,
        phase: LeadPhase,
        limit: u32,
    ) -> Result<Vec<Lead>> {
        self.lead_repo.find_by_phase(client, phase, limit).await
    }

    pub async fn find_by_job_id(&self, job_id: &str, limit: u32, offset: u32) -> Result<LeadPage> {
        self.lead_repo.find_by_job_id(job_id, limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClaimLease, DomainError};
    use crate::port::mocks::{InMemoryLeadRepository, ManualClock, SequentialIdProvider};

    struct Fixture {
        repo: Arc<InMemoryLeadRepository>,
        clock: Arc<ManualClock>,
        lifecycle: LeadLifecycle,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryLeadRepository::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let lifecycle = LeadLifecycle::new(
            repo.clone(),
            Arc::new(SequentialIdProvider::new("lead")),
            clock.clone(),
        );
        Fixture {
            repo,
            clock,
            lifecycle,
        }
    }

    async fn ingest_one(f: &Fixture) -> Lead {
        f.lifecycle
            .ingest(vec![NewLead::new("acme", "job-1")])
            .await
            .unwrap()
            .remove(0)
    }

    #[tokio::test]
    async fn test_ingest_creates_pending_leads() {
        let f = fixture();
        let leads = f
            .lifecycle
            .ingest(vec![
                NewLead::new("acme", "job-1").with_data(serde_json::json!({"email": "a@acme.io"})),
                NewLead::new("acme", "job-1"),
            ])
            .await
            .unwrap();

        assert_eq!(leads.len(), 2);
        assert_eq!(f.repo.len(), 2);
        for lead in &leads {
            assert_eq!(lead.status, LeadStatus::Pending);
            assert_eq!(lead.current_phase, LeadPhase::Pending);
            assert_eq!(lead.retry_count, 0);
        }
        assert_eq!(leads[0].data["email"], "a@acme.io");
    }

    #[tokio::test]
    async fn test_ingest_rejects_missing_client() {
        let f = fixture();
        let result = f.lifecycle.ingest(vec![NewLead::new("", "job-1")]).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(f.repo.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_in_chunks() {
        let f = fixture();
        let lifecycle = LeadLifecycle::new(
            f.repo.clone(),
            Arc::new(SequentialIdProvider::new("chunk")),
            f.clock.clone(),
        )
        .with_ingestion_batch(2);

        let input = (0..5).map(|_| NewLead::new("acme", "job-1")).collect();
        let leads = lifecycle.ingest(input).await.unwrap();
        assert_eq!(leads.len(), 5);
        assert_eq!(f.repo.len(), 5);
    }

    #[tokio::test]
    async fn test_enriched_stamp_set_once() {
        let f = fixture();
        let lead = ingest_one(&f).await;

        f.clock.advance(500);
        let enriched = f
            .lifecycle
            .update_status(&lead.id, LeadStatus::FindymailEnriched, TransitionExtras::default())
            .await
            .unwrap();
        assert_eq!(enriched.findymail_enriched_at, Some(1_500));

        // Rewriting the same status (phase change) must not move the stamp
        f.clock.advance(500);
        let again = f
            .lifecycle
            .update_status_and_phase(
                &lead.id,
                LeadStatus::FindymailEnriched,
                LeadPhase::Scraping,
                TransitionExtras::default(),
            )
            .await
            .unwrap();
        assert_eq!(again.findymail_enriched_at, Some(1_500));
        assert_eq!(again.current_phase, LeadPhase::Scraping);

        f.clock.advance(500);
        let ai = f
            .lifecycle
            .update_status(&lead.id, LeadStatus::AiEnriched, TransitionExtras::default())
            .await
            .unwrap();
        assert_eq!(ai.findymail_enriched_at, Some(1_500));
        assert_eq!(ai.ai_enriched_at, Some(2_500));
        assert_eq!(ai.current_phase, LeadPhase::Completed);
    }

    #[tokio::test]
    async fn test_update_error_sets_failed_status() {
        let f = fixture();
        let lead = ingest_one(&f).await;

        let failed = f
            .lifecycle
            .update_error(&lead.id, ErrorStage::Findymail, "mailbox not found")
            .await
            .unwrap();

        assert_eq!(failed.status, LeadStatus::FindymailFailed);
        assert_eq!(failed.error_stage, Some(ErrorStage::Findymail));
        assert_eq!(failed.error_message.as_deref(), Some("mailbox not found"));
    }

    #[tokio::test]
    async fn test_successful_retry_clears_error() {
        let f = fixture();
        let lead = ingest_one(&f).await;
        f.lifecycle
            .update_error(&lead.id, ErrorStage::Findymail, "timeout")
            .await
            .unwrap();

        let recovered = f
            .lifecycle
            .update_status(&lead.id, LeadStatus::FindymailEnriched, TransitionExtras::default())
            .await
            .unwrap();
        assert_eq!(recovered.error_stage, None);
        assert_eq!(recovered.error_message, None);
        assert!(recovered.findymail_enriched_at.is_some());
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let f = fixture();
        let lead = ingest_one(&f).await;

        let result = f
            .lifecycle
            .update_status(&lead.id, LeadStatus::Uploaded, TransitionExtras::default())
            .await;
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::InvalidStateTransition { .. }))
        ));
        assert!(!result.unwrap_err().is_transient());

        let unchanged = f.lifecycle.get_by_id(&lead.id).await.unwrap();
        assert_eq!(unchanged.status, LeadStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_stage_string_is_rejected() {
        let parsed: Result<ErrorStage> = "mailfinder".parse::<ErrorStage>().map_err(AppError::from);
        assert!(matches!(
            parsed,
            Err(AppError::Domain(DomainError::UnknownStage(_)))
        ));
    }

    #[tokio::test]
    async fn test_update_phase_forward_only() {
        let f = fixture();
        let lead = ingest_one(&f).await;
        f.lifecycle
            .update_status(&lead.id, LeadStatus::FindymailEnriched, TransitionExtras::default())
            .await
            .unwrap();

        let lead = f
            .lifecycle
            .update_phase(&lead.id, LeadPhase::Researching)
            .await
            .unwrap();
        assert_eq!(lead.current_phase, LeadPhase::Researching);

        let back = f.lifecycle.update_phase(&lead.id, LeadPhase::Scraping).await;
        assert!(matches!(
            back,
            Err(AppError::Domain(DomainError::PhaseRegression { .. }))
        ));

        let completed = f.lifecycle.update_phase(&lead.id, LeadPhase::Completed).await;
        assert!(matches!(
            completed,
            Err(AppError::Domain(DomainError::InvalidStatePair { .. }))
        ));
    }

    #[tokio::test]
    async fn test_update_phase_keeps_claim() {
        let f = fixture();
        let lead = ingest_one(&f).await;
        f.lifecycle
            .update_status(&lead.id, LeadStatus::FindymailEnriched, TransitionExtras::default())
            .await
            .unwrap();

        let lease = ClaimLease::new("worker-a", 1_000, 60_000);
        f.repo
            .claim_next_batch("acme", LeadStatus::FindymailEnriched, 1, &lease)
            .await
            .unwrap();

        let scraping = f
            .lifecycle
            .update_phase(&lead.id, LeadPhase::Scraping)
            .await
            .unwrap();
        assert_eq!(scraping.claimed_by.as_deref(), Some("worker-a"));

        let done = f
            .lifecycle
            .update_status(&lead.id, LeadStatus::AiEnriched, TransitionExtras::default())
            .await
            .unwrap();
        assert_eq!(done.claimed_by, None);
    }

    #[tokio::test]
    async fn test_transition_by_former_holder_conflicts() {
        let f = fixture();
        let lead = ingest_one(&f).await;
        f.repo
            .claim_next_batch("acme", LeadStatus::Pending, 1, &ClaimLease::new("worker-a", 1_000, 10))
            .await
            .unwrap();
        f.clock.advance(10);
        f.repo
            .claim_next_batch("acme", LeadStatus::Pending, 1, &ClaimLease::new("worker-b", 1_010, 60_000))
            .await
            .unwrap();

        // Without a holder the write is not checked against the claim
        f.lifecycle
            .update_error(&lead.id, ErrorStage::Findymail, "timeout")
            .await
            .unwrap();

        let lead = ingest_one(&f).await;
        f.repo
            .claim_next_batch("acme", LeadStatus::Pending, 1, &ClaimLease::new("worker-b", 1_010, 60_000))
            .await
            .unwrap();
        let result = f
            .lifecycle
            .update_status(
                &lead.id,
                LeadStatus::FindymailEnriched,
                TransitionExtras::default().held_by("worker-a"),
            )
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(
            f.lifecycle.get_by_id(&lead.id).await.unwrap().claimed_by.as_deref(),
            Some("worker-b")
        );
    }

    #[tokio::test]
    async fn test_increment_retry_count_by_one() {
        let f = fixture();
        let lead = ingest_one(&f).await;

        assert_eq!(f.lifecycle.increment_retry_count(&lead.id).await.unwrap(), 1);
        assert_eq!(f.lifecycle.increment_retry_count(&lead.id).await.unwrap(), 2);
        assert_eq!(f.lifecycle.get_by_id(&lead.id).await.unwrap().retry_count, 2);
    }

    #[tokio::test]
    async fn test_find_retryable_leads_filters() {
        let f = fixture();
        let leads = f
            .lifecycle
            .ingest((0..3).map(|_| NewLead::new("acme", "job-1")).collect())
            .await
            .unwrap();

        // failed, retry_count 0 -> eligible
        f.lifecycle
            .update_error(&leads[0].id, ErrorStage::Findymail, "x")
            .await
            .unwrap();
        // failed, retry_count 3 -> exhausted
        f.lifecycle
            .update_error(&leads[1].id, ErrorStage::Findymail, "x")
            .await
            .unwrap();
        for _ in 0..3 {
            f.lifecycle.increment_retry_count(&leads[1].id).await.unwrap();
        }
        // leads[2] stays pending -> not failed

        let retryable = f.lifecycle.find_retryable_leads("acme", 3, 10).await.unwrap();
        let ids: Vec<&str> = retryable.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec![leads[0].id.as_str()]);

        assert!(f
            .lifecycle
            .find_retryable_leads("other", 3, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_transition_merges_data() {
        let f = fixture();
        let lead = f
            .lifecycle
            .ingest(vec![NewLead::new("acme", "job-1")
                .with_data(serde_json::json!({"name": "Ada"}))])
            .await
            .unwrap()
            .remove(0);

        let mut data = serde_json::Map::new();
        data.insert("email".into(), serde_json::json!("ada@acme.io"));
        let enriched = f
            .lifecycle
            .update_status(
                &lead.id,
                LeadStatus::FindymailEnriched,
                TransitionExtras::default().with_data(data),
            )
            .await
            .unwrap();

        assert_eq!(enriched.data["name"], "Ada");
        assert_eq!(enriched.data["email"], "ada@acme.io");
    }

    #[tokio::test]
    async fn test_find_by_job_id_pages() {
        let f = fixture();
        f.lifecycle
            .ingest((0..5).map(|_| NewLead::new("acme", "job-1")).collect())
            .await
            .unwrap();

        let page = f.lifecycle.find_by_job_id("job-1", 2, 0).await.unwrap();
        assert_eq!(page.leads.len(), 2);
        assert_eq!(page.total, 5);
        assert!(page.has_more);

        let last = f.lifecycle.find_by_job_id("job-1", 2, 4).await.unwrap();
        assert_eq!(last.leads.len(), 1);
        assert!(!last.has_more);
    }

    #[tokio::test]
    async fn test_missing_lead_is_not_found() {
        let f = fixture();
        let result = f
            .lifecycle
            .update_status("nope", LeadStatus::FindymailEnriched, TransitionExtras::default())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
