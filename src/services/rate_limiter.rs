use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Per-key token-bucket admission control.
///
/// Buckets are created lazily on first observation of a key (identity id for
/// authenticated requests, origin address otherwise) and refill continuously:
/// the available tokens are recomputed from elapsed time at check time, never
/// on a schedule. Keys map to buckets through a sharded concurrent map, so
/// admits for different keys do not contend; admits for the same key
/// serialize on that key's shard entry.
///
/// Idle buckets are evicted by `sweep_idle`, which the server runs
/// periodically; without it the key map grows without bound.
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    refill_per_sec: f64,
}

#[derive(Debug)]
struct TokenBucket {
    /// Fractional for smooth continuous refill.
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_per_sec: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: capacity as f64,
            refill_per_sec: capacity as f64 / window.as_secs_f64(),
        }
    }

    /// Consumes one token for `key` if available.
    pub fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Instant::now())
    }

    fn admit_at(&self, key: &str, now: Instant) -> bool {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, now));
        bucket.try_acquire(self.capacity, self.refill_per_sec, now)
    }

    /// Evicts buckets that have not been touched for `ttl`. Returns the
    /// number of evicted keys. An evicted key that reappears starts over
    /// with a full bucket, which only ever errs in the caller's favor.
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) < ttl);
        before - self.buckets.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
