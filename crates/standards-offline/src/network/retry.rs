//! Exponential backoff for operations a host retries, such as a failed install.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff policy: `base_delay * 2^n` after the n-th failure, capped at
/// `max_delay`, optionally scaled by a random factor in `0.5..1.5`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self
        }
    }

    pub fn with_base_delay(self, base_delay: Duration) -> Self {
        Self { base_delay, ..self }
    }

    pub fn with_max_delay(self, max_delay: Duration) -> Self {
        Self { max_delay, ..self }
    }

    pub fn with_jitter(self, jitter: bool) -> Self {
        Self { jitter, ..self }
    }

    /// Wait after the `failures`-th consecutive failure (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(30);
        let cap = self.max_delay.as_secs_f64();
        let mut secs = (self.base_delay.as_secs_f64() * f64::from(1u32 << exponent)).min(cap);
        if self.jitter {
            secs = (secs * rand::rng().random_range(0.5..1.5)).min(cap);
        }
        Duration::from_secs_f64(secs)
    }
}

/// What happened across the attempts of one retried operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Run `operation` until it succeeds, `should_retry` declines the error, or
/// the attempts run out.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();

    loop {
        stats.attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                stats.success = true;
                if stats.attempts > 1 {
                    debug!("Succeeded on attempt {}", stats.attempts);
                }
                return (Ok(value), stats);
            }
            Err(err) => err,
        };
        stats.last_error = Some(err.to_string());

        if !should_retry(&err) {
            debug!("Giving up on non-retryable error: {}", err);
            return (Err(err), stats);
        }
        if stats.attempts >= config.max_attempts {
            warn!("Giving up after {} attempts: {}", stats.attempts, err);
            return (Err(err), stats);
        }

        let delay = config.delay_after(stats.attempts);
        warn!(
            "Attempt {} of {} failed ({}), next in {:?}",
            stats.attempts, config.max_attempts, err, delay
        );
        stats.total_delay += delay;
        tokio::time::sleep(delay).await;
    }
}
