// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid lead status transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Status {status} cannot be combined with phase {phase}")]
    InvalidStatePair { status: String, phase: String },

    #[error("Phase cannot move backwards: {from} -> {to}")]
    PhaseRegression { from: String, to: String },

    #[error("Unknown lead status: {0}")]
    UnknownStatus(String),

    #[error("Unknown lead phase: {0}")]
    UnknownPhase(String),

    #[error("Unknown error stage: {0}")]
    UnknownStage(String),

    #[error("Unknown job status: {0}")]
    UnknownJobStatus(String),

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
