use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::FetchError;

/// Bounded retries with exponential backoff around a fetch attempt.
///
/// After failed attempt `n` (1-based) the policy waits `base_delay * 2^n`,
/// so with the defaults: 2s, then 4s. Nothing is slept after the last attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Runs `attempt_fn(attempt)` until it succeeds, the error is not
    /// transient, or attempts run out. Only the last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt_fn: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if attempt > 1 {
                tracing::info!("🔄 Retry attempt {}/{} for {}", attempt, max_attempts, label);
            }

            match attempt_fn(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.kind.is_transient() => {
                    tracing::warn!("🛑 {} not retried: {}", label, err);
                    return Err(err);
                }
                Err(err) if attempt >= max_attempts => {
                    tracing::warn!("❌ {} failed after {} attempts: {}", label, attempt, err);
                    return Err(err);
                }
                Err(err) => {
                    let wait = self.backoff(attempt);
                    tracing::warn!(
                        "⚠️ Attempt {}/{} for {} failed: {}. Waiting {:?}",
                        attempt,
                        max_attempts,
                        label,
                        err,
                        wait
                    );
                    sleep(wait).await;
                }
            }
            attempt += 1;
        }
    }
}
