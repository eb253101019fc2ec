//! Exponential backoff between connection attempts

use std::time::Duration;

/// `delay(i) = min(max_delay, base^(initial_power + i))` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: u32,
    initial_power: u32,
    max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(base: u32, initial_power: u32, max_delay: Duration) -> Self {
        Self {
            base,
            initial_power,
            max_delay,
        }
    }

    /// Delay after the failure of attempt `attempt_index` (0-based)
    pub fn delay(&self, attempt_index: u32) -> Duration {
        let power = self.initial_power.saturating_add(attempt_index);
        let seconds = u64::from(self.base)
            .checked_pow(power)
            .unwrap_or(u64::MAX);
        Duration::from_secs(seconds).min(self.max_delay)
    }

    /// Delay before the next attempt, or `None` after the final one
    pub fn delay_before_next(&self, attempt_index: u32, max_retries: u32) -> Option<Duration> {
        (attempt_index < max_retries).then(|| self.delay(attempt_index))
    }

    /// Sum of every sleep a fully failing orchestration performs
    pub fn total_budget(&self, max_retries: u32) -> Duration {
        (0..max_retries).map(|attempt| self.delay(attempt)).sum()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(2, 2, Duration::from_secs(32))
    }
}
