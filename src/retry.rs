//! Bounded retry with backoff for vendor round-trips.

use crate::error::FetchError;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry settings for one vendor round-trip.
///
/// Only errors classified transient are retried. Attempt `n` (0-based) waits
/// `base_delay * backoff_factor^n` unless the vendor supplied a `Retry-After`,
/// which is capped at `max_retry_after_secs`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    30
}

fn default_backoff_factor() -> u32 {
    2
}

fn default_max_retry_after_secs() -> u64 {
    300
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            backoff_factor: default_backoff_factor(),
            max_retry_after_secs: default_max_retry_after_secs(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_secs: 0,
            backoff_factor: 1,
            max_retry_after_secs: 0,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_factor.max(1)).saturating_pow(attempt.min(6));
        Duration::from_secs(self.base_delay_secs.saturating_mul(factor))
    }

    /// Wait before retrying `attempt` after `error`.
    pub fn delay_after(&self, error: &FetchError, attempt: u32) -> Duration {
        match error.retry_after() {
            Some(hint) => hint.min(Duration::from_secs(self.max_retry_after_secs)),
            None => self.delay_for(attempt),
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
    ///
    /// Permanent errors are returned as-is. Running out of attempts on a
    /// transient error yields [`FetchError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(
                            operation = %what,
                            attempts = attempt,
                            error = %e,
                            "Retries exhausted"
                        );
                        return Err(FetchError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.delay_after(&e, attempt - 1);
                    warn!(
                        operation = %what,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Transient failure, will retry"
                    );
                    if !delay.is_zero() {
                        debug!(operation = %what, "Backing off before retry");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
