//! Global request gate
//!
//! Every request passes the gate before touching its bucket. The gate combines
//! the steady-state requests-per-second limit with a hard block set by global
//! 429 responses.

use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use parking_lot::Mutex;
use std::num::NonZeroU32;
use tokio::time::{Duration, Instant};

use crate::error::{HttpError, HttpResult};
use crate::route::BucketKey;

/// Shared gate in front of all buckets
pub struct GlobalGate {
    blocked_until: Mutex<Option<Instant>>,
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl std::fmt::Debug for GlobalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalGate")
            .field("blocked_until", &*self.blocked_until.lock())
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}

impl GlobalGate {
    /// Create a gate allowing `per_second` requests; zero disables the limiter
    #[must_use]
    pub fn new(per_second: u32) -> Self {
        let limiter = NonZeroU32::new(per_second).map(|n| RateLimiter::direct(Quota::per_second(n)));
        Self {
            blocked_until: Mutex::new(None),
            limiter,
        }
    }

    /// Block every request for `delay` (a global 429)
    pub fn block_for(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut blocked = self.blocked_until.lock();
        if blocked.is_none_or(|current| current < until) {
            *blocked = Some(until);
        }
        tracing::warn!(retry_after_ms = delay.as_millis() as u64, "Global rate limit hit");
    }

    /// Remaining time of a global block
    #[must_use]
    pub fn blocked_for(&self, now: Instant) -> Option<Duration> {
        let until = *self.blocked_until.lock();
        until.filter(|until| *until > now).map(|until| until - now)
    }

    /// Wait until a request may pass
    ///
    /// Fails with `Timeout` instead of waiting past `deadline`.
    pub async fn wait(&self, bucket: &BucketKey, deadline: Option<Instant>) -> HttpResult<()> {
        let now = Instant::now();
        if let Some(delay) = self.blocked_for(now) {
            if deadline.is_some_and(|d| now + delay > d) {
                return Err(HttpError::Timeout {
                    bucket: bucket.to_string(),
                });
            }
            tracing::debug!(bucket = %bucket, wait_ms = delay.as_millis() as u64, "Waiting on global limit");
            tokio::time::sleep(delay).await;
        }

        if let Some(limiter) = &self.limiter {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, limiter.until_ready())
                    .await
                    .map_err(|_| HttpError::Timeout {
                        bucket: bucket.to_string(),
                    })?,
                None => limiter.until_ready().await,
            }
        }
        Ok(())
    }
}
