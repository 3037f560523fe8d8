//! Backoff policy for failed status queries.

use std::time::Duration;

/// Decides how long the poller waits after a failed status query.
///
/// Exponential: `base_delay * multiplier^(failures - 1)`, clamped to
/// `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    pub multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next query after `failures` consecutive failures
    /// (1-indexed). `failures == 0` reads as the first failure.
    ///
    /// With base=2s, multiplier=2.0, max=30s: 2s, 4s, 8s, 16s, 30s, 30s, ...
    pub fn next_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}
