//! Exponential backoff for publish retries and nack redelivery (spec §4.2).

use std::time::Duration;

/// base 100ms, factor 2, max 5s, max 6 attempts — the literal constants
/// spec §4.2 names for broker publish retries; also reused by C2's nack
/// redelivery loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    factor: u32,
    max: Duration,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, factor: u32, max: Duration, max_attempts: u32) -> Self {
        Self { base, factor, max, max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the given attempt (1-indexed). Saturates at `max`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.factor.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(exp).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 2, Duration::from_secs(5), 6)
    }
}
