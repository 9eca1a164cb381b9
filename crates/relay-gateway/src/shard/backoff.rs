//! Reconnect backoff
//!
//! Exponential growth from `base`, capped at `max`, with jitter drawn from the
//! upper half of the window so concurrent shards spread out.

use rand::Rng;
use std::time::Duration;

const MAX_EXPONENT: u32 = 16;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    /// Upper bound of the delay for the current attempt
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        let factor = 1u32 << self.attempt.min(MAX_EXPONENT);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before the next attempt; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling().as_millis() as u64;
        self.attempt = self.attempt.saturating_add(1);
        let millis = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
        Duration::from_millis(millis)
    }

    /// Back to the first delay after a successful session
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
