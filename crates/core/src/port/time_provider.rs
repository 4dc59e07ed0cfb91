// Time Provider Port
//
// All lead and job timestamps are epoch milliseconds taken from this port, so
// claim leases and completion stamps can be driven by a manual clock in tests.

pub trait TimeProvider: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;
}

/// Wall clock (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
