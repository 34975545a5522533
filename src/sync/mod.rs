use std::time::Duration;

use serde::Deserialize;

pub mod pipeline;
pub mod resync;
pub mod retry;
pub mod stages;
pub mod stats;

pub use retry::RetryPolicy;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_REORG_DEPTH: usize = 100;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    /// Max in-flight events between the pull and index stage
    pub queue_size: Option<usize>,

    /// How often the chain is polled for a new head
    pub poll_interval_ms: Option<u64>,

    /// Number of recent blocks the pull stage remembers to detect reverts
    pub max_reorg_depth: Option<usize>,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    pub fn max_reorg_depth(&self) -> usize {
        self.max_reorg_depth.unwrap_or(DEFAULT_MAX_REORG_DEPTH).max(1)
    }
}

/// How often a failed block export or revert is attempted again before it is skipped. Zero
/// retries (the default) logs the failure and moves on to the next event.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub backoff_unit_ms: Option<u64>,
    pub backoff_factor: Option<u32>,
    pub max_backoff_ms: Option<u64>,
}
