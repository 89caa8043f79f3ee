use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::ExecutionConfig;
use crate::error::{ExchangeError, OrderError};

/// Timeout and backoff settings for exchange calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline for each individual attempt
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ExecutionConfig> for RetryPolicy {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_backoff: Duration::from_millis(config.backoff_base_ms),
            max_backoff: Duration::from_millis(config.backoff_cap_ms),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry_count` (0-based): base * 2^n, capped
    pub fn backoff_duration(&self, retry_count: u32) -> Duration {
        let base_ms = self.base_backoff.as_millis() as u64;
        let delay = base_ms.saturating_mul(2u64.saturating_pow(retry_count));
        let capped = delay.min(self.max_backoff.as_millis() as u64);
        Duration::from_millis(capped)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Each attempt is bounded by `call_timeout`; a timeout counts as a
    /// transient failure, never as a definitive answer.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, OrderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let started = Instant::now();

            let err = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => OrderError::from(e),
                Err(_) => OrderError::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                },
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt >= self.max_attempts {
                return Err(OrderError::RetriesExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }

            let delay = self.backoff_duration(attempt - 1);
            warn!(
                "{} attempt {}/{} failed: {} (retrying in {}ms)",
                operation,
                attempt,
                self.max_attempts,
                err,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
