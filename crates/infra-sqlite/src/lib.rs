// Leadflow Infrastructure - SQLite Adapter
// Implements: LeadRepository, JobRepository

mod connection;
mod error;
mod job_repository;
mod lead_repository;
mod migration;
mod store;

pub use connection::create_pool;
pub use job_repository::SqliteJobRepository;
pub use lead_repository::SqliteLeadRepository;
pub use migration::run_migrations;
pub use store::SqliteStore;

// sqlx::Error cannot implement From for AppError here (orphan rules);
// errors are converted through error::map_sqlx_error instead.
