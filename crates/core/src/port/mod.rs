// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod job_repository;
pub mod lead_repository;
#[cfg(any(test, feature = "test-util"))]
pub mod mocks;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use job_repository::JobRepository;
pub use lead_repository::LeadRepository;
pub use time_provider::TimeProvider;
