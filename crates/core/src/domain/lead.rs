// Lead Domain Model
//
// A lead carries two correlated state machines: the coarse `status` (one
// enriched/failed pair per pipeline stage) and the fine-grained `phase` used
// inside the AI stage. Both are validated together as a `LeadState`.

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lead ID (UUID v4)
pub type LeadId = String;

/// Lead status (coarse, per pipeline stage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Pending,
    IngestionFailed,
    FindymailEnriched,
    FindymailFailed,
    AiEnriched,
    AiFailed,
    Uploaded,
    UploadFailed,
}

/// Completion timestamp column owned by a successful status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageStamp {
    FindymailEnrichedAt,
    AiEnrichedAt,
    UploadedAt,
}

impl StageStamp {
    /// Column name in the leads table
    pub fn column(&self) -> &'static str {
        match self {
            StageStamp::FindymailEnrichedAt => "findymail_enriched_at",
            StageStamp::AiEnrichedAt => "ai_enriched_at",
            StageStamp::UploadedAt => "uploaded_at",
        }
    }
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 8] = [
        LeadStatus::Pending,
        LeadStatus::IngestionFailed,
        LeadStatus::FindymailEnriched,
        LeadStatus::FindymailFailed,
        LeadStatus::AiEnriched,
        LeadStatus::AiFailed,
        LeadStatus::Uploaded,
        LeadStatus::UploadFailed,
    ];

    /// Statuses eligible for retry
    pub const FAILED: [LeadStatus; 4] = [
        LeadStatus::IngestionFailed,
        LeadStatus::FindymailFailed,
        LeadStatus::AiFailed,
        LeadStatus::UploadFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::IngestionFailed => "ingestion_failed",
            LeadStatus::FindymailEnriched => "findymail_enriched",
            LeadStatus::FindymailFailed => "findymail_failed",
            LeadStatus::AiEnriched => "ai_enriched",
            LeadStatus::AiFailed => "ai_failed",
            LeadStatus::Uploaded => "uploaded",
            LeadStatus::UploadFailed => "upload_failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        Self::FAILED.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LeadStatus::Uploaded)
    }

    /// Timestamp stamped the first time this status is reached
    pub fn completion_stamp(&self) -> Option<StageStamp> {
        match self {
            LeadStatus::FindymailEnriched => Some(StageStamp::FindymailEnrichedAt),
            LeadStatus::AiEnriched => Some(StageStamp::AiEnrichedAt),
            LeadStatus::Uploaded => Some(StageStamp::UploadedAt),
            _ => None,
        }
    }

    /// Phases that may accompany this status
    pub fn allowed_phases(&self) -> &'static [LeadPhase] {
        use LeadPhase::*;
        match self {
            LeadStatus::Pending | LeadStatus::IngestionFailed | LeadStatus::FindymailFailed => {
                &[Pending]
            }
            LeadStatus::FindymailEnriched | LeadStatus::AiFailed => {
                &[Pending, Scraping, Researching, Qualifying, Generating]
            }
            LeadStatus::AiEnriched | LeadStatus::Uploaded | LeadStatus::UploadFailed => {
                &[Completed]
            }
        }
    }

    /// Phase used when a transition does not name one and the current phase is not allowed
    pub fn canonical_phase(&self) -> LeadPhase {
        self.allowed_phases()[0]
    }

    pub fn allows_phase(&self, phase: LeadPhase) -> bool {
        self.allowed_phases().contains(&phase)
    }

    /// Status edges. Every non-terminal status may also be rewritten in place.
    pub fn can_transition_to(&self, next: LeadStatus) -> bool {
        use LeadStatus::*;
        if *self == next {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, FindymailEnriched)
                | (Pending, FindymailFailed)
                | (Pending, IngestionFailed)
                | (IngestionFailed, Pending)
                | (FindymailFailed, FindymailEnriched)
                | (FindymailEnriched, AiEnriched)
                | (FindymailEnriched, AiFailed)
                | (AiFailed, AiEnriched)
                | (AiEnriched, Uploaded)
                | (AiEnriched, UploadFailed)
                | (UploadFailed, Uploaded)
        )
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        LeadStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

/// Lead phase (fine-grained, ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadPhase {
    Pending,
    Scraping,
    Researching,
    Qualifying,
    Generating,
    Completed,
}

impl LeadPhase {
    pub const ALL: [LeadPhase; 6] = [
        LeadPhase::Pending,
        LeadPhase::Scraping,
        LeadPhase::Researching,
        LeadPhase::Qualifying,
        LeadPhase::Generating,
        LeadPhase::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadPhase::Pending => "pending",
            LeadPhase::Scraping => "scraping",
            LeadPhase::Researching => "researching",
            LeadPhase::Qualifying => "qualifying",
            LeadPhase::Generating => "generating",
            LeadPhase::Completed => "completed",
        }
    }
}

impl fmt::Display for LeadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadPhase {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        LeadPhase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| DomainError::UnknownPhase(s.to_string()))
    }
}

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Ingestion,
    Findymail,
    AiEnrichment,
    Upload,
}

impl ErrorStage {
    pub const ALL: [ErrorStage; 4] = [
        ErrorStage::Ingestion,
        ErrorStage::Findymail,
        ErrorStage::AiEnrichment,
        ErrorStage::Upload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Ingestion => "ingestion",
            ErrorStage::Findymail => "findymail",
            ErrorStage::AiEnrichment => "ai_enrichment",
            ErrorStage::Upload => "upload",
        }
    }

    /// `${stage}_failed`
    pub fn failed_status(&self) -> LeadStatus {
        match self {
            ErrorStage::Ingestion => LeadStatus::IngestionFailed,
            ErrorStage::Findymail => LeadStatus::FindymailFailed,
            ErrorStage::AiEnrichment => LeadStatus::AiFailed,
            ErrorStage::Upload => LeadStatus::UploadFailed,
        }
    }
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorStage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        ErrorStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStage(s.to_string()))
    }
}

/// Composite (status, phase) state. Only constructible for allowed pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadState {
    status: LeadStatus,
    phase: LeadPhase,
}

impl LeadState {
    pub fn new(status: LeadStatus, phase: LeadPhase) -> Result<Self> {
        if !status.allows_phase(phase) {
            return Err(DomainError::InvalidStatePair {
                status: status.to_string(),
                phase: phase.to_string(),
            });
        }
        Ok(Self { status, phase })
    }

    pub fn initial() -> Self {
        Self {
            status: LeadStatus::Pending,
            phase: LeadPhase::Pending,
        }
    }

    pub fn status(&self) -> LeadStatus {
        self.status
    }

    pub fn phase(&self) -> LeadPhase {
        self.phase
    }

    /// Move to `next`, keeping the current phase when it is still allowed
    pub fn transition(&self, next: LeadStatus, phase: Option<LeadPhase>) -> Result<Self> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        let phase = match phase {
            Some(p) => p,
            None if next.allows_phase(self.phase) => self.phase,
            None => next.canonical_phase(),
        };

        Self::new(next, phase)
    }

    /// Change phase without changing status. Forward-only unless the lead is being retried.
    pub fn advance_phase(&self, phase: LeadPhase) -> Result<Self> {
        if phase < self.phase && !self.status.is_failed() {
            return Err(DomainError::PhaseRegression {
                from: self.phase.to_string(),
                to: phase.to_string(),
            });
        }
        Self::new(self.status, phase)
    }
}

/// Error recorded on a failed lead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadError {
    pub stage: ErrorStage,
    pub message: String,
}

/// Lead entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub client: String,
    pub job_id: String,

    pub status: LeadStatus,
    pub current_phase: LeadPhase,
    pub retry_count: u32,

    pub error_stage: Option<ErrorStage>,
    pub error_message: Option<String>,

    // Completion stamps (epoch ms), written once
    pub findymail_enriched_at: Option<i64>,
    pub ai_enriched_at: Option<i64>,
    pub uploaded_at: Option<i64>,

    pub created_at: i64,

    /// Contact and enrichment fields (JSON object)
    pub data: serde_json::Value,

    // Claim lease
    pub claimed_by: Option<String>,
    pub claim_expires_at: Option<i64>,
}

/// Ingestion input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLead {
    pub client: String,
    pub job_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl NewLead {
    pub fn new(client: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            job_id: job_id.into(),
            data: serde_json::json!({}),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

impl Lead {
    /// Create a freshly ingested lead
    ///
    /// # Arguments
    ///
    /// * `id` - Unique lead ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `new_lead` - Ingestion input
    pub fn new(id: impl Into<String>, created_at: i64, new_lead: NewLead) -> Self {
        let state = LeadState::initial();
        let data = match new_lead.data {
            serde_json::Value::Null => serde_json::json!({}),
            other => other,
        };

        Self {
            id: id.into(),
            client: new_lead.client,
            job_id: new_lead.job_id,
            status: state.status(),
            current_phase: state.phase(),
            retry_count: 0,
            error_stage: None,
            error_message: None,
            findymail_enriched_at: None,
            ai_enriched_at: None,
            uploaded_at: None,
            created_at,
            data,
            claimed_by: None,
            claim_expires_at: None,
        }
    }

    /// Composite state as stored. Fails if the row was written inconsistently.
    pub fn state(&self) -> Result<LeadState> {
        LeadState::new(self.status, self.current_phase)
    }

    pub fn is_claimed(&self, now_millis: i64) -> bool {
        self.claimed_by.is_some() && self.claim_expires_at.is_some_and(|exp| exp > now_millis)
    }

    pub fn is_retryable(&self, max_retries: u32) -> bool {
        self.status.is_failed() && self.retry_count < max_retries
    }

    /// Plan a status transition as a single conditional write
    pub fn plan_transition(
        &self,
        next: LeadStatus,
        extras: TransitionExtras,
        now_millis: i64,
    ) -> Result<LeadUpdate> {
        let target = self.state()?.transition(next, extras.phase)?;

        let error = match extras.error {
            Some(err) => ErrorUpdate::Set(err),
            None if next.is_failed() => ErrorUpdate::Keep,
            None => ErrorUpdate::Clear,
        };

        Ok(LeadUpdate {
            lead_id: self.id.clone(),
            expected_status: self.status,
            status: target.status(),
            phase: target.phase(),
            stamp: next.completion_stamp(),
            error,
            data: extras.data,
            holder: extras.holder,
            now_millis,
        })
    }
}

/// Optional fields written alongside a status transition
#[derive(Debug, Clone, Default)]
pub struct TransitionExtras {
    pub phase: Option<LeadPhase>,
    pub error: Option<LeadError>,
    /// Merged into `Lead::data` as a JSON merge patch
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    /// Worker that claimed the lead. When set, the write is rejected if
    /// another worker holds the claim now.
    pub holder: Option<String>,
}

impl TransitionExtras {
    pub fn with_phase(mut self, phase: LeadPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_error(mut self, stage: ErrorStage, message: impl Into<String>) -> Self {
        self.error = Some(LeadError {
            stage,
            message: message.into(),
        });
        self
    }

    pub fn with_data(mut self, data: serde_json::Map<String, serde_json::Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn held_by(mut self, worker_id: impl Into<String>) -> Self {
        self.holder = Some(worker_id.into());
        self
    }
}

/// What happens to error_stage/error_message on a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorUpdate {
    Keep,
    Clear,
    Set(LeadError),
}

/// Conditional write produced by `Lead::plan_transition`.
/// Applied only if the stored status still equals `expected_status` and,
/// when `holder` is set, the lead is unclaimed or claimed by `holder`.
#[derive(Debug, Clone)]
pub struct LeadUpdate {
    pub lead_id: LeadId,
    pub expected_status: LeadStatus,
    pub status: LeadStatus,
    pub phase: LeadPhase,
    pub stamp: Option<StageStamp>,
    pub error: ErrorUpdate,
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    pub holder: Option<String>,
    pub now_millis: i64,
}

/// One page of leads for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadPage {
    pub leads: Vec<Lead>,
    pub total: i64,
    pub has_more: bool,
}
