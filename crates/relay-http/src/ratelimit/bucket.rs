//! Per-route rate limit buckets
//!
//! A bucket's state sits behind an async mutex that the client holds for the
//! whole request, so requests on one bucket run one at a time while separate
//! buckets never contend.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio::time::{Duration, Instant};

use super::headers::RateLimitHeaders;
use crate::route::BucketKey;

/// Mutable limit state of one bucket
#[derive(Debug, Clone, Default)]
pub struct BucketState {
    pub remaining: Option<u32>,
    pub limit: Option<u32>,
    pub reset_at: Option<Instant>,
    /// Server-side bucket hash from `X-RateLimit-Bucket`
    pub hash: Option<String>,
}

impl BucketState {
    /// How long a request must wait before it may be sent
    #[must_use]
    pub fn wait_time(&self, now: Instant) -> Option<Duration> {
        match (self.remaining, self.reset_at) {
            (Some(0), Some(reset_at)) if reset_at > now => Some(reset_at - now),
            _ => None,
        }
    }

    /// Refill after the reset instant has passed
    pub fn refill(&mut self, now: Instant) {
        if self.reset_at.is_some_and(|reset_at| reset_at <= now) {
            self.remaining = self.limit;
            self.reset_at = None;
        }
    }

    /// Record the limits reported by a response
    pub fn update(&mut self, headers: &RateLimitHeaders, now: Instant) {
        if let Some(limit) = headers.limit {
            self.limit = Some(limit);
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = Some(remaining);
        }
        if let Some(reset_after) = headers.reset_after {
            self.reset_at = Some(now + reset_after);
        }
        if let Some(hash) = &headers.bucket {
            self.hash = Some(hash.clone());
        }
    }

    /// Block the bucket for `delay` after a 429
    pub fn block_for(&mut self, delay: Duration, now: Instant) {
        self.remaining = Some(0);
        self.reset_at = Some(now + delay);
    }
}

/// A rate limit bucket
#[derive(Debug)]
pub struct Bucket {
    key: BucketKey,
    state: AsyncMutex<BucketState>,
    last_used: Mutex<Instant>,
}

impl Bucket {
    #[must_use]
    pub fn new(key: BucketKey) -> Self {
        Self {
            key,
            state: AsyncMutex::new(BucketState::default()),
            last_used: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> &BucketKey {
        &self.key
    }

    /// Take exclusive use of the bucket
    pub async fn acquire(&self) -> MutexGuard<'_, BucketState> {
        let guard = self.state.lock().await;
        self.touch();
        guard
    }

    pub fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    #[must_use]
    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    /// Check if the bucket has been unused for at least `ttl` and is free
    #[must_use]
    pub fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_used()) >= ttl && self.state.try_lock().is_ok()
    }

    /// Copy of the current state, if nobody holds the bucket
    #[must_use]
    pub fn peek(&self) -> Option<BucketState> {
        self.state.try_lock().ok().map(|state| state.clone())
    }
}

/// Lazily populated bucket registry
#[derive(Debug)]
pub struct BucketRegistry {
    buckets: DashMap<BucketKey, Arc<Bucket>>,
    idle_ttl: Duration,
    last_sweep: Mutex<Instant>,
}

impl BucketRegistry {
    #[must_use]
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            idle_ttl,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Get the bucket for `key`, creating it on first use
    #[must_use]
    pub fn get_or_create(&self, key: &BucketKey) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }
        let bucket = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Bucket::new(key.clone())));
        Arc::clone(bucket.value())
    }

    #[must_use]
    pub fn get(&self, key: &BucketKey) -> Option<Arc<Bucket>> {
        self.buckets.get(key).map(|b| Arc::clone(b.value()))
    }

    /// Drop buckets unused for the idle TTL; returns how many were removed
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| Arc::strong_count(bucket) > 1 || !bucket.is_idle(now, self.idle_ttl));
        *self.last_sweep.lock() = now;
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.buckets.len(), "Swept idle rate limit buckets");
        }
        removed
    }

    /// Sweep at most once per idle TTL
    pub fn maybe_sweep(&self, now: Instant) -> usize {
        let due = now.saturating_duration_since(*self.last_sweep.lock()) >= self.idle_ttl;
        if due {
            self.sweep(now)
        } else {
            0
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
