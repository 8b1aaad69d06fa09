//! Retry with exponential backoff
//!
//! Only errors classified as retryable by [`StorageError::is_retryable`]
//! are retried. The delay before attempt `n + 1` is
//! `base_delay * 2^(n - 1)`, capped at `max_delay`, plus up to
//! `max_jitter` of random delay so that workers throttled together do not
//! retry together. A `Retry-After` hint from the provider is a lower
//! bound on the result.

use std::future::Future;
use std::time::Duration;

use drivemig_core::config::MigrationConfig;
use drivemig_core::ports::StorageError;
use rand::Rng;
use tracing::{info, warn};

/// Random delay added on top of the exponential backoff
pub const DEFAULT_JITTER: Duration = Duration::from_secs(1);

/// Attempt budget and backoff shape for one kind of remote operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random delay added to every backoff
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            max_jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: config.retry_delay(),
            max_delay: config.max_backoff(),
            max_jitter: DEFAULT_JITTER,
        }
    }

    /// Same policy without the random component
    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Capped exponential delay after failed attempt `attempt`, before jitter
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32, error: &StorageError) -> Duration {
        let delay = self.base_backoff(attempt) + self.jitter();
        match error.retry_after() {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Runs `operation` until it succeeds, fails permanently or the attempt
/// budget is spent
///
/// The closure receives the 1-based attempt number, which lets callers
/// check for the effects of an earlier attempt before repeating a
/// non-idempotent call.
///
/// # Errors
///
/// Returns the last error once it is not retryable or no attempts remain.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, StorageError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff(attempt, &err);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
