//! Batch write engine configuration types.

use serde::Deserialize;

use super::ConfigError;
use crate::storage::BATCH_SIZE;

/// Ceiling on write passes over a batch.
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Batch write engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Requests per batch call. At most 25.
    pub batch_size: usize,
    /// Maximum write passes, counting the first.
    pub max_attempts: usize,
    /// Batch calls in flight at once within a pass.
    pub concurrency: usize,
    /// Delay between passes. Passes run back to back when unset.
    pub backoff: Option<BackoffConfig>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            concurrency: 1,
            backoff: None,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > BATCH_SIZE {
            return Err(ConfigError::invalid(
                "batch.batch_size",
                format!("must be between 1 and {}", BATCH_SIZE),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("batch.max_attempts", "must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("batch.concurrency", "must be at least 1"));
        }
        if let Some(backoff) = &self.backoff {
            if backoff.min_delay_ms > backoff.max_delay_ms {
                return Err(ConfigError::invalid(
                    "batch.backoff",
                    "min_delay_ms exceeds max_delay_ms",
                ));
            }
        }
        Ok(())
    }
}

/// Exponential backoff between write passes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 50,
            max_delay_ms: 2_000,
            jitter: true,
        }
    }
}
