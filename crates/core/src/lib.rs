// Leadflow Core - Domain Logic & Ports
// No storage dependencies: adapters live in leadflow-infra-sqlite

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
