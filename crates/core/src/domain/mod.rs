// Domain Layer - Pure business logic and entities

pub mod claim;
pub mod error;
pub mod job;
pub mod lead;
pub mod merge;

// Re-exports
pub use claim::ClaimLease;
pub use error::DomainError;
pub use job::{
    clamp_progress, Job, JobId, JobMetrics, JobOutcome, JobPatch, JobStatus, JobType, NewJob,
};
pub use lead::{
    ErrorStage, ErrorUpdate, Lead, LeadError, LeadId, LeadPage, LeadPhase, LeadState, LeadStatus,
    LeadUpdate, NewLead, StageStamp, TransitionExtras,
};
pub use merge::merge_patch;
