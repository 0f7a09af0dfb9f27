//! Backoff for transient lock contention.
//!
//! - Exponential: `initial_delay * 2^step`, capped at `max_delay`
//! - Down-jitter: multiplier in `[1 - jitter_factor, 1.0]`

use std::time::Duration;

use bizpass_config::RetrySettings;

/// Delay before the retry that follows `backoff_step` (0 before the first retry).
#[must_use]
pub fn retry_delay(backoff_step: u32, config: &RetrySettings) -> Duration {
    let exponent = backoff_step.min(16) as i32;
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor.clamp(0.0, 1.0);
    Duration::from_secs_f64(capped * jitter)
}
