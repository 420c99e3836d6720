//! Orchestrator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-run scheduling limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Hard cycle budget; exceeding it ends the run
    #[serde(rename = "max-cycles")]
    pub max_cycles: u64,

    /// Worker pool for intra-cycle parallel dispatch (1 = strictly cooperative)
    pub workers: usize,

    /// Retry policy for transient tool failures
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_cycles: 1000,
            workers: 1,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded exponential backoff with jitter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,

    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        // 250ms -> 2s -> 8s
        Self {
            attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry `attempt` (1-based), jittered up to +25%
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(8);
        let base = self
            .base_delay_ms
            .saturating_mul(8u64.saturating_pow(exponent))
            .min(self.max_delay_ms);
        let jitter = if base == 0 {
            0
        } else {
            use rand::Rng;
            rand::rng().random_range(0..=base / 4)
        };
        Duration::from_millis(base + jitter)
    }
}
