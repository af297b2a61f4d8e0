//! Backoff between batch write passes.
//!
//! Uses `backon` for exponential backoff with optional jitter.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

use crate::config::BackoffConfig;

/// Backoff yielding one delay before each retry pass.
///
/// A run of `max_attempts` passes has `max_attempts - 1` gaps, so the
/// builder stops after that many delays.
pub fn batch_backoff(config: &BackoffConfig, max_attempts: usize) -> ExponentialBuilder {
    let builder = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_max_times(max_attempts.saturating_sub(1));

    if config.jitter {
        builder.with_jitter()
    } else {
        builder
    }
}

/// Delays for a full run, in order.
pub fn pass_delays(config: &BackoffConfig, max_attempts: usize) -> Vec<Duration> {
    batch_backoff(config, max_attempts).build().collect()
}
