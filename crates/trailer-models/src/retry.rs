//! Generic retry-with-backoff helper shared by every crate that makes
//! outbound HTTP calls (metadata resolver, iTunes, archive search).

use std::time::Duration;

use tracing::warn;

/// Configuration for exponential-backoff retry.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub operation_name: String,
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>, max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            operation_name: operation_name.into(),
        }
    }

    /// Two attempts, 1s/2s backoff — the cadence named in §4.8 for the
    /// Archive strategy's 502/503/504 retry, reused wherever the spec just
    /// says "retryable transient failure" without naming a different one.
    pub fn two_attempts(operation_name: impl Into<String>) -> Self {
        Self::new(operation_name, 2, Duration::from_secs(1), Duration::from_secs(2))
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(1 << attempt.min(16));
        scaled.min(self.max_delay)
    }
}

pub enum RetryResult<T, E> {
    Success(T),
    Failed(E),
}

/// Retry an async operation up to `config.max_retries` times with
/// exponential backoff, capped at `config.max_delay`.
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, mut op: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) => {
                if attempt >= config.max_retries {
                    return RetryResult::Failed(e);
                }
                warn!(
                    operation = %config.operation_name,
                    attempt,
                    error = %e,
                    "retrying after transient failure"
                );
                tokio::time::sleep(config.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// Tracks consecutive failures to suppress repetitive error logging —
/// logs the first few occurrences loudly, then falls silent until a
/// success resets the counter.
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Returns whether this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else {
            self.suppressed = true;
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_delay_doubles_and_caps() {
        let config = RetryConfig::new("test", 5, Duration::from_secs(1), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn failure_tracker_suppresses_after_threshold() {
        let mut tracker = FailureTracker::new(2);
        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        assert_eq!(tracker.failure_count(), 3);
        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
    }

    #[tokio::test]
    async fn retry_async_succeeds_immediately() {
        let config = RetryConfig::two_attempts("op");
        let result = retry_async(&config, || async { Ok::<_, String>(42) }).await;
        assert!(matches!(result, RetryResult::Success(42)));
    }

    #[tokio::test]
    async fn retry_async_eventually_succeeds() {
        let config = RetryConfig::new("op", 3, Duration::from_millis(1), Duration::from_millis(4));
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = retry_async(&config, || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("not yet".to_string())
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert!(matches!(result, RetryResult::Success(7)));
    }
}
