// Retry executor
//
// Fixed-delay bounded retry around any async fallible operation. No jitter
// and no exponential backoff: every wait is exactly `delay`. Lead-level
// retries (a failed lead re-claimed later) are accounted separately through
// `LeadLifecycle::increment_retry_count`.

use crate::config::{RetryConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
use crate::error::AppError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

type RetryCallback<'a, E> = Box<dyn FnMut(u32, &E) + Send + 'a>;
type RetryPredicate<'a, E> = Box<dyn Fn(&E) -> bool + Send + Sync + 'a>;

/// Options for `with_retry`
///
/// # Example
/// ```text
/// let opts = RetryOptions::new()
///     .max_attempts(3)
///     .delay(Duration::from_secs(5))
///     .on_retry(|attempt, err| metrics.record(attempt, err));
/// let lead = with_retry(|| repo.find_by_id(&id), opts).await?;
/// ```
pub struct RetryOptions<'a, E> {
    max_attempts: u32,
    delay: Duration,
    on_retry: Option<RetryCallback<'a, E>>,
    retry_if: Option<RetryPredicate<'a, E>>,
}

impl<E> Default for RetryOptions<'_, E> {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            on_retry: None,
            retry_if: None,
        }
    }
}

impl<'a, E> RetryOptions<'a, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new()
            .max_attempts(config.max_attempts)
            .delay(config.delay())
    }

    /// Total attempts including the first. 0 is treated as 1.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Called with the failed attempt number and its error, before the delay
    pub fn on_retry(mut self, callback: impl FnMut(u32, &E) + Send + 'a) -> Self {
        self.on_retry = Some(Box::new(callback));
        self
    }

    /// Errors for which `predicate` is false are returned immediately
    pub fn retry_if(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'a) -> Self {
        self.retry_if = Some(Box::new(predicate));
        self
    }
}

impl RetryOptions<'_, AppError> {
    /// Only retry store/IO failures
    pub fn transient_only(self) -> Self {
        self.retry_if(AppError::is_transient)
    }
}

/// Run `operation` until it succeeds or attempts run out.
///
/// On exhaustion the last error is returned unchanged.
pub async fn with_retry<T, E, F, Fut>(mut operation: F, options: RetryOptions<'_, E>) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let RetryOptions {
        max_attempts,
        delay,
        mut on_retry,
        retry_if,
    } = options;
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if let Some(predicate) = &retry_if {
            if !predicate(&err) {
                debug!(attempt, error = %err, "Error is not retryable");
                return Err(err);
            }
        }

        if attempt >= max_attempts {
            return Err(err);
        }

        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Attempt {} failed, retrying in {}ms",
            attempt,
            delay.as_millis()
        );

        if let Some(callback) = on_retry.as_mut() {
            callback(attempt, &err);
        }

        sleep(delay).await;
        attempt += 1;
    }
}
