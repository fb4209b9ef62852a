use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::models::RetryConfig;

/// Bounded retry policy with exponential backoff.
///
/// Backoff doubles after every failed attempt, starting from
/// `initial_backoff` and capped at `max_backoff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one, at least 1
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

/// Final error of a retried operation.
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    /// Attempts actually made
    pub attempts: u32,
    /// False when the operation stopped on a non-retryable error
    pub exhausted: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
        }
    }

    /// `retries` extra attempts after the first one.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries.saturating_add(1),
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    /// Same backoff, different number of retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_attempts = retries.saturating_add(1);
        self
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 0, 0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before attempt `attempt + 1`, where `attempt` counts failures so far.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, returns a non-retryable error, or
    /// the attempts are used up. The operation receives the 1-based attempt
    /// number.
    pub async fn execute<F, Fut, T, E, R>(
        &self,
        mut operation: F,
        should_retry: R,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(error) if !should_retry(&error) => {
                    debug!(attempt, error = %error, "Permanent error, not retrying");
                    return Err(RetryError {
                        error,
                        attempts: attempt,
                        exhausted: false,
                    });
                }
                Err(error) if attempt >= self.max_attempts => {
                    warn!(attempts = attempt, error = %error, "Operation failed after all attempts");
                    return Err(RetryError {
                        error,
                        attempts: attempt,
                        exhausted: true,
                    });
                }
                Err(error) => {
                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Attempt failed, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
