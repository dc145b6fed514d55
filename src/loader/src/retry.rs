//! Bounded retry for fallible async operations.
//!
//! Only call sites that explicitly wrap an operation are retried. The delay
//! between attempts comes from an injectable [`Backoff`] and races the
//! cancellation token, so a cancelled load never waits out a sleep.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nydus_load_core::error::{LoadError, Result};
use nydus_load_core::RetryConfig;
use tokio_util::sync::CancellationToken;

/// Default number of attempts, including the first one.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Delay strategy between attempts.
pub trait Backoff: Send + Sync + fmt::Debug {
    /// Delay to wait after the `attempt`-th failure (1-based).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Same delay after every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    interval: Duration,
}

impl FixedBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// No delay at all; retries run back to back.
    pub fn zero() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_INTERVAL)
    }
}

impl Backoff for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

/// Attempt budget plus backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Arc<dyn Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, FixedBackoff::default())
    }
}

impl RetryPolicy {
    /// `max_attempts` below one is treated as one.
    pub fn new(max_attempts: u32, backoff: impl Backoff + 'static) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, FixedBackoff::new(config.interval()))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Run `op` until it succeeds or the attempt budget is spent.
///
/// Returns the first `Ok`. On exhaustion the last error is returned as is.
/// A warning is logged before each retry wait, not before giving up.
/// Cancellation, before an attempt or during the wait, returns
/// `LoadError::Cancelled` immediately.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled(format!(
                "operation cancelled before attempt {}",
                attempt
            )));
        }

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= policy.max_attempts {
            return Err(err);
        }

        let delay = policy.backoff.delay(attempt);
        tracing::warn!(
            attempt = attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retry due to error"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(LoadError::Cancelled(format!(
                    "retry aborted after attempt {}: {}",
                    attempt, err
                )));
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}
