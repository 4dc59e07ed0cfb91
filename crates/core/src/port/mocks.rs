// ============================================================================
// In-Memory Port Implementations for Testing
// ============================================================================
//
// Used by application-service tests. Each repository serializes access with a
// single mutex, which gives the same atomicity the SQLite adapter gets from
// single-statement writes.

use crate::domain::{
    merge_patch, ClaimLease, ErrorUpdate, Job, JobId, JobOutcome, JobPatch, JobStatus, Lead, LeadPage,
    LeadPhase, LeadState, LeadStatus, LeadUpdate, StageStamp,
};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobRepository, LeadRepository, TimeProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

/// Clock that only moves when told to
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeProvider for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Deterministic IDs: `{prefix}-1`, `{prefix}-2`, ...
pub struct SequentialIdProvider {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(1),
        }
    }
}

impl IdProvider for SequentialIdProvider {
    fn generate_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

fn merge_object(target: &mut serde_json::Value, patch: &serde_json::Map<String, serde_json::Value>) {
    if !target.is_object() {
        *target = serde_json::json!({});
    }
    if let Some(obj) = target.as_object_mut() {
        merge_patch(obj, patch);
    }
}

fn oldest_first(leads: &mut [Lead]) {
    leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// In-memory LeadRepository
#[derive(Default)]
pub struct InMemoryLeadRepository {
    leads: Mutex<HashMap<String, Lead>>,
}

impl InMemoryLeadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.leads.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sorted_where(&self, pred: impl Fn(&Lead) -> bool) -> Vec<Lead> {
        let leads = self.leads.lock().unwrap();
        let mut found: Vec<Lead> = leads.values().filter(|l| pred(l)).cloned().collect();
        oldest_first(&mut found);
        found
    }
}

#[async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn insert_batch(&self, leads: &[Lead]) -> Result<()> {
        let mut store = self.leads.lock().unwrap();
        if let Some(dup) = leads.iter().find(|l| store.contains_key(&l.id)) {
            return Err(AppError::Database(format!(
                "Failed to create leads: duplicate id {}",
                dup.id
            )));
        }
        for lead in leads {
            store.insert(lead.id.clone(), lead.clone());
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Lead>> {
        Ok(self.leads.lock().unwrap().get(id).cloned())
    }

    async fn apply_update(&self, update: &LeadUpdate) -> Result<Lead> {
        let mut store = self.leads.lock().unwrap();
        let lead = store
            .get_mut(&update.lead_id)
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", update.lead_id)))?;

        if lead.status != update.expected_status {
            return Err(AppError::Conflict(format!(
                "Lead {} is {}, expected {}",
                lead.id, lead.status, update.expected_status
            )));
        }
        if let (Some(holder), Some(current)) = (&update.holder, &lead.claimed_by) {
            if holder != current {
                return Err(AppError::Conflict(format!(
                    "Lead {} is claimed by another worker",
                    lead.id
                )));
            }
        }

        lead.status = update.status;
        lead.current_phase = update.phase;
        match update.stamp {
            Some(StageStamp::FindymailEnrichedAt) => {
                lead.findymail_enriched_at.get_or_insert(update.now_millis);
            }
            Some(StageStamp::AiEnrichedAt) => {
                lead.ai_enriched_at.get_or_insert(update.now_millis);
            }
            Some(StageStamp::UploadedAt) => {
                lead.uploaded_at.get_or_insert(update.now_millis);
            }
            None => {}
        }
        match &update.error {
            ErrorUpdate::Keep => {}
            ErrorUpdate::Clear => {
                lead.error_stage = None;
                lead.error_message = None;
            }
            ErrorUpdate::Set(err) => {
                lead.error_stage = Some(err.stage);
                lead.error_message = Some(err.message.clone());
            }
        }
        if let Some(data) = &update.data {
            merge_object(&mut lead.data, data);
        }
        lead.claimed_by = None;
        lead.claim_expires_at = None;

        Ok(lead.clone())
    }

    async fn set_phase(&self, id: &str, expected: LeadState, phase: LeadPhase) -> Result<Lead> {
        let mut store = self.leads.lock().unwrap();
        let lead = store
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;

        if lead.status != expected.status() || lead.current_phase != expected.phase() {
            return Err(AppError::Conflict(format!(
                "Lead {} changed to {}/{}",
                id, lead.status, lead.current_phase
            )));
        }
        lead.current_phase = phase;
        Ok(lead.clone())
    }

    async fn increment_retry_count(&self, id: &str) -> Result<u32> {
        let mut store = self.leads.lock().unwrap();
        let lead = store
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;
        lead.retry_count += 1;
        Ok(lead.retry_count)
    }

    async fn claim_next_batch(
        &self,
        client: &str,
        status: LeadStatus,
        limit: u32,
        lease: &ClaimLease,
    ) -> Result<Vec<Lead>> {
        let mut store = self.leads.lock().unwrap();
        let mut candidates: Vec<Lead> = store
            .values()
            .filter(|l| {
                l.client == client && l.status == status && !l.is_claimed(lease.claimed_at)
            })
            .cloned()
            .collect();
        oldest_first(&mut candidates);
        candidates.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(lead) = store.get_mut(&candidate.id) {
                lead.claimed_by = Some(lease.worker_id.clone());
                lead.claim_expires_at = Some(lease.expires_at);
                claimed.push(lead.clone());
            }
        }
        Ok(claimed)
    }

    async fn release_claim(&self, id: &str, worker_id: &str) -> Result<bool> {
        let mut store = self.leads.lock().unwrap();
        match store.get_mut(id) {
            Some(lead) if lead.claimed_by.as_deref() == Some(worker_id) => {
                lead.claimed_by = None;
                lead.claim_expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_expired_claims(&self, now_millis: i64) -> Result<Vec<Lead>> {
        let mut store = self.leads.lock().unwrap();
        let mut released = Vec::new();
        for lead in store.values_mut() {
            if lead.claimed_by.is_some() && !lead.is_claimed(now_millis) {
                lead.claimed_by = None;
                lead.claim_expires_at = None;
                released.push(lead.clone());
            }
        }
        oldest_first(&mut released);
        Ok(released)
    }

    async fn find_retryable(
        &self,
        client: &str,
        max_retries: u32,
        limit: u32,
        now_millis: i64,
    ) -> Result<Vec<Lead>> {
        let mut found = self.sorted_where(|l| {
            l.client == client && l.is_retryable(max_retries) && !l.is_claimed(now_millis)
        });
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn find_by_phase(
        &self,
        client: &str,
        phase: LeadPhase,
        limit: u32,
    ) -> Result<Vec<Lead>> {
        let mut found = self.sorted_where(|l| l.client == client && l.current_phase == phase);
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn find_by_job_id(&self, job_id: &str, limit: u32, offset: u32) -> Result<LeadPage> {
        let all = self.sorted_where(|l| l.job_id == job_id);
        let total = all.len() as i64;
        let leads: Vec<Lead> = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(LeadPage {
            leads,
            total,
            has_more: (offset as i64 + limit as i64) < total,
        })
    }
}

/// In-memory JobRepository. `fail_writes(true)` makes every write fail like
/// an unreachable store.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<HashMap<String, Job>>,
    fail_writes: AtomicBool,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("store unavailable".to_string()));
        }
        Ok(())
    }
}

fn guard_mutable<'a>(jobs: &'a mut HashMap<String, Job>, id: &str) -> Result<&'a mut Job> {
    let job = jobs
        .get_mut(id)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;
    if job.status.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "Job {} is already {}",
            id, job.status
        )));
    }
    Ok(job)
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        self.check_writable()?;
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(id).cloned())
    }

    async fn apply_patch(&self, id: &JobId, patch: &JobPatch) -> Result<()> {
        self.check_writable()?;
        let mut jobs = self.jobs.lock().unwrap();
        let job = guard_mutable(&mut jobs, id)?;

        if let Some(progress) = patch.progress {
            job.progress = job.progress.max(progress);
        }
        if let Some(phase) = &patch.phase {
            job.current_phase = Some(phase.clone());
        }
        if let Some(metrics) = &patch.metrics {
            merge_patch(&mut job.metrics, metrics);
        }
        Ok(())
    }

    async fn finish(&self, id: &JobId, outcome: &JobOutcome, now_millis: i64) -> Result<Job> {
        self.check_writable()?;
        let mut jobs = self.jobs.lock().unwrap();
        let job = guard_mutable(&mut jobs, id)?;

        job.status = outcome.status();
        job.completed_at = Some(now_millis);
        match outcome {
            JobOutcome::Completed { metrics } => {
                merge_patch(&mut job.metrics, metrics);
            }
            JobOutcome::Failed { message } => {
                job.error_message = Some(message.clone());
            }
        }
        Ok(job.clone())
    }

    async fn find_active(&self, client: &str) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap();
        let mut active: Vec<Job> = jobs
            .values()
            .filter(|j| j.client == client && JobStatus::ACTIVE.contains(&j.status))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(active)
    }
}
