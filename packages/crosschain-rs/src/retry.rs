//! Bounded retry with exponential backoff and jitter for transport calls.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::AdapterError;

/// Retry configuration for adapter transport calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth.
    pub backoff_multiplier: f64,
    /// Jitter fraction applied to each backoff (0.0 disables).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Backoff for a given attempt (0-indexed), exponential and capped,
    /// before jitter.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    /// Backoff with jitter applied, the value actually slept.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff_for_attempt(attempt).as_secs_f64();
        if self.jitter <= 0.0 {
            return Duration::from_secs_f64(base);
        }
        let spread = base * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((base + offset).max(0.0))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Classification of an adapter error for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Temporary failure, eligible for retry.
    Transient,
    /// Domain outcome or invalid input; retrying cannot help.
    Permanent,
}

pub fn classify_error(error: &AdapterError) -> ErrorClass {
    if error.is_transient() {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

/// Run `operation`, retrying transient failures with jittered exponential
/// backoff until it succeeds, a permanent error surfaces, or the retry
/// budget is exhausted.
pub async fn with_retry<F, T, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => match classify_error(&e) {
                ErrorClass::Permanent => {
                    debug!(error = %e, "Permanent error, not retrying");
                    return Err(e);
                }
                ErrorClass::Transient => {
                    if !config.should_retry(attempt) {
                        warn!(
                            attempt,
                            max = config.max_retries,
                            error = %e,
                            "Retry budget exhausted"
                        );
                        return Err(e);
                    }
                    let backoff = config.jittered_backoff(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max = config.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient error, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_calculation() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(8));
        assert_eq!(config.backoff_for_attempt(5), Duration::from_secs(60)); // capped
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig {
            jitter: 0.5,
            ..RetryConfig::default()
        };
        for _ in 0..100 {
            let jittered = config.jittered_backoff(1).as_secs_f64();
            assert!((2.0..=6.0).contains(&jittered), "out of range: {}", jittered);
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            classify_error(&AdapterError::Transport("refused".into())),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error(&AdapterError::InvalidSecret),
            ErrorClass::Permanent
        );
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(1),
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);

        let result = with_retry(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AdapterError::Transport("flaky".into()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_permanent() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::AlreadyWithdrawn) }
        })
        .await;

        assert_eq!(result.unwrap_err(), AdapterError::AlreadyWithdrawn);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_budget() {
        let config = RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::Timeout(30)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }
}
