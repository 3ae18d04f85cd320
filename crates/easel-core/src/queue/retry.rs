//! Retry policy: decides backoff delays between attempts.

use std::time::Duration;

/// Exponential backoff for retryable failures.
///
/// delay = base_delay * multiplier^(attempts - 1), so with the defaults the
/// first retry waits 2s, the second 4s, the third 8s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Growth factor per subsequent retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts: a retried task is eligible again on the
    /// next drain pass.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before the next attempt, given how many attempts already ran.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs)
    }
}
