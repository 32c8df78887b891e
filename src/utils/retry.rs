//! Retry utilities for provider calls
//!
//! Exponential backoff with multiplicative jitter. The sleep is a tokio
//! timer, so a worker waiting out a backoff never blocks its siblings.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,

    /// Jitter ratio; 0.3 spreads each delay over ±30%
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: 0.3,
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with custom delays and no jitter
    pub fn with_delays(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }

    /// Un-jittered delay before the given retry (1 = first retry)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let delay_ms = if retry == 0 {
            0
        } else {
            let exponential =
                self.base_delay_ms as f64 * self.backoff_multiplier.powi((retry - 1) as i32);
            (exponential as u64).min(self.max_delay_ms)
        };

        Duration::from_millis(delay_ms)
    }

    /// Delay with jitter applied, still capped at `max_delay_ms`
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.calculate_delay(retry);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }

        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        let ms = (base.as_millis() as f64 * factor) as u64;
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

/// Last error of a retried operation plus how many attempts were made
#[derive(Debug, Clone, PartialEq)]
pub struct RetryError<E> {
    pub last_error: E,
    pub attempts: u32,
}

/// Execute an operation with retry logic, using a custom retry predicate
///
/// The operation receives the 1-based attempt number. Errors for which
/// `should_retry` returns false are returned immediately.
///
/// # Example
///
/// ```no_run
/// use vidscout::utils::retry::{with_retry_if, RetryConfig};
///
/// # async fn example() {
/// let config = RetryConfig::default();
/// let result = with_retry_if(
///     &config,
///     |_attempt| async { Ok::<_, String>(42) },
///     |e: &String| e.contains("timeout"),
/// )
/// .await;
/// assert_eq!(result.ok(), Some(42));
/// # }
/// ```
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation: F,
    should_retry: P,
) -> Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    debug!(attempt, error = %e, "Non-retryable error encountered");
                    return Err(RetryError {
                        last_error: e,
                        attempts: attempt,
                    });
                }

                if attempt >= max_attempts {
                    warn!(attempt, max_attempts, error = %e, "Retries exhausted");
                    return Err(RetryError {
                        last_error: e,
                        attempts: attempt,
                    });
                }

                let delay = config.jittered_delay(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, will retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
