// Application Layer - Use Cases and Business Logic

pub mod claim;
pub mod lifecycle;
pub mod progress;
pub mod recovery;
pub mod retry;
pub mod shutdown;

// Re-exports
pub use claim::BatchClaimer;
pub use lifecycle::LeadLifecycle;
pub use progress::JobProgressTracker;
pub use recovery::ClaimRecoveryService;
pub use retry::{with_retry, RetryOptions};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
