//! Bounded retry with configurable backoff and jitter.
//!
//! Only network downloads are retried. The download policy is three attempts
//! in total with a fixed three second pause and no jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^(attempt - 1)
    Exponential,
    /// delay = base * attempt
    Linear,
    /// delay = base
    #[default]
    Constant,
}

/// Jitter strategy applied to the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first.
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::download()
    }
}

impl RetryConfig {
    /// Creates the default (download) policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Three attempts, fixed three second delay.
    #[must_use]
    pub const fn download() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 3000,
            max_delay_ms: 3000,
            backoff_strategy: BackoffStrategy::Constant,
            jitter_strategy: JitterStrategy::None,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            backoff_strategy: BackoffStrategy::Constant,
            jitter_strategy: JitterStrategy::None,
        }
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay; raises the cap if needed.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self.max_delay_ms = self.max_delay_ms.max(delay);
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let base = self.base_delay_ms;
        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);

        let delay = match self.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(exponent)),
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64),
            BackoffStrategy::Constant => base,
        }
        .min(self.max_delay_ms);

        let jittered = match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Result of a retried operation and how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result: the first success or the last error.
    pub result: Result<T, E>,
    /// Number of times the operation was called.
    pub attempts: usize,
}

/// Runs `operation` until it succeeds or `max_attempts` calls have failed.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    key: &str,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if attempt >= max_attempts => {
                tracing::warn!(key, attempts = attempt, error = %e, "Giving up after final attempt");
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) => {
                let delay = config.delay_after(attempt);
                tracing::info!(
                    key,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_download_policy() {
        let config = RetryConfig::download();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.delay_after(1), Duration::from_secs(3));
        assert_eq!(config.delay_after(2), Duration::from_secs(3));
    }

    #[test]
    fn test_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_base_delay_ms(500)
            .with_max_delay_ms(10000)
            .with_backoff(BackoffStrategy::Exponential)
            .with_jitter(JitterStrategy::None);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.delay_after(1), Duration::from_millis(500));
        assert_eq!(config.delay_after(2), Duration::from_millis(1000));
        assert_eq!(config.delay_after(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_linear_and_cap() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_max_delay_ms(250)
            .with_backoff(BackoffStrategy::Linear);
        assert_eq!(config.delay_after(2), Duration::from_millis(200));
        assert_eq!(config.delay_after(3), Duration::from_millis(250));
    }

    #[test]
    fn test_full_jitter_bounded() {
        let config = RetryConfig::new().with_jitter(JitterStrategy::Full);
        for _ in 0..20 {
            assert!(config.delay_after(1) <= Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_twice_then_succeed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let start = tokio::time::Instant::now();

        let counter = Arc::clone(&calls);
        let outcome = with_retry(&RetryConfig::download(), "fetch", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {n} failed"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(outcome.result, Ok(3));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_calls_exactly_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let outcome: RetryOutcome<(), String> =
            with_retry(&RetryConfig::download(), "fetch", move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("attempt {attempt} failed")) }
            })
            .await;

        assert_eq!(outcome.result, Err("attempt 3 failed".to_string()));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let outcome: RetryOutcome<(), &str> =
            with_retry(&RetryConfig::none(), "once", |_| async { Err("boom") }).await;
        assert_eq!(outcome.attempts, 1);
    }
}
