//! Retry logic with bounded attempts
//!
//! Provides the retry policy used by the request layer:
//! - A fixed number of extra attempts after the first
//! - Fixed delay between attempts (the default)
//! - Optional exponential backoff with jitter
//!
//! # Example
//!
//! ```rust,no_run
//! use caltracker_core::retry::{retry, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let config = RetryConfig::fixed(2, Duration::from_millis(10));
//! let result = retry(&config, |_attempt| async { Ok::<_, String>("success") }).await;
//! assert_eq!(result.unwrap().value, "success");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

/// Strategy for the delay between two attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay grows by `multiplier` per retry, capped at `max_delay`
    Exponential {
        /// Growth factor per retry
        multiplier: f64,
        /// Upper bound for a single delay
        max_delay: Duration,
        /// Add up to 25% random jitter
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed
    }
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first one
    pub retries: u32,
    /// Base delay between attempts
    pub delay: Duration,
    /// How the delay evolves across attempts
    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(1),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryConfig {
    /// Fixed-delay policy
    #[must_use]
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self {
            retries,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Exponential policy starting at `initial_delay`
    #[must_use]
    pub fn exponential(retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            retries,
            delay: initial_delay,
            backoff: Backoff::Exponential {
                multiplier: 2.0,
                max_delay,
                jitter: true,
            },
        }
    }

    /// Policy with a single attempt
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Total number of attempts, including the first
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Calculate delay before a given attempt (attempt 0 never waits)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        match &self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential {
                multiplier,
                max_delay,
                jitter,
            } => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let base = self.delay.as_secs_f64() * multiplier.powi(exponent);
                let capped = base.min(max_delay.as_secs_f64());

                let delay = if *jitter {
                    // Jitter stays inside the cap
                    (capped * (1.0 + rand_simple() * 0.25)).min(max_delay.as_secs_f64())
                } else {
                    capped
                };

                Duration::from_secs_f64(delay.max(0.0))
            }
        }
    }
}

/// Simple pseudo-random number generator (0.0 to 1.0)
fn rand_simple() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default(),
    );
    #[allow(clippy::cast_precision_loss)]
    let sample = (hasher.finish() % 1000) as f64;
    sample / 1000.0
}

/// Retry result with attempt information
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The successful result
    pub value: T,
    /// Number of attempts made
    pub attempts: u32,
    /// Total time spent, including delays
    pub total_duration: Duration,
}

/// Exhausted retry with the last error seen
#[derive(Debug)]
pub struct RetryError<E> {
    /// Error from the final attempt
    pub last_error: E,
    /// Number of attempts made
    pub attempts: u32,
}

/// Execute an async operation with retry logic
///
/// The closure receives the zero-based attempt number. Every error is retried
/// until the policy's attempts are used up.
pub async fn retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> std::result::Result<RetryResult<T>, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let max_attempts = config.max_attempts();
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                return Ok(RetryResult {
                    value,
                    attempts: attempt + 1,
                    total_duration: start.elapsed(),
                });
            }
            Err(error) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(RetryError {
                        last_error: error,
                        attempts: attempt,
                    });
                }

                let delay = config.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Attempt failed, retrying after delay"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
