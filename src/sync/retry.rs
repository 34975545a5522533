use std::{future::Future, time::Duration};

use tracing::warn;

use super::RetryConfig;

const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;
const DEFAULT_BACKOFF_FACTOR: u32 = 2;
const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_unit: Duration,
    pub backoff_factor: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries.unwrap_or(0),
            backoff_unit: Duration::from_millis(
                config.backoff_unit_ms.unwrap_or(DEFAULT_BACKOFF_UNIT_MS),
            ),
            backoff_factor: config.backoff_factor.unwrap_or(DEFAULT_BACKOFF_FACTOR),
            max_backoff: Duration::from_millis(
                config.max_backoff_ms.unwrap_or(DEFAULT_MAX_BACKOFF_MS),
            ),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (starting at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_factor
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);

        self.backoff_unit
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds or the retries are used up, returning the last error.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(x) => return Ok(x),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);

                    warn!(
                        "{what} failed (attempt {attempt}/{}), retrying in {delay:?}: {e}",
                        self.max_retries + 1
                    );

                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
