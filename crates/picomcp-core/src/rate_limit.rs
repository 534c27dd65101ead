//! Token-bucket rate limiting, global and per-key.
//!
//! Refill is lazy: each acquire first credits `elapsed × rate` tokens,
//! capped at the burst capacity. The keyed variant holds a fixed pool of
//! buckets and evicts the least-recently-used bucket on overflow.

use serde_json::Value;

use crate::clock::SharedClock;

/// A single token bucket.
pub struct RateLimiter {
    clock: SharedClock,
    enabled: bool,
    rps: f64,
    capacity: usize,
    tokens: f64,
    last_refill: u64,
    total_allowed: u64,
    total_denied: u64,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("rps", &self.rps)
            .field("capacity", &self.capacity)
            .field("tokens", &self.tokens)
            .finish()
    }
}

impl RateLimiter {
    /// Create a disabled limiter; call [`configure`](Self::configure) to arm it.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            enabled: false,
            rps: 0.0,
            capacity: 0,
            tokens: 0.0,
            last_refill: 0,
            total_allowed: 0,
            total_denied: 0,
        }
    }

    /// Configure and enable the limiter. The bucket starts full.
    pub fn configure(&mut self, requests_per_second: f64, burst_capacity: usize) {
        self.rps = requests_per_second;
        self.capacity = burst_capacity;
        self.tokens = burst_capacity as f64;
        self.last_refill = self.clock.now_ms();
        self.enabled = true;
        self.total_allowed = 0;
        self.total_denied = 0;
    }

    /// Disable rate limiting; every acquire passes.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Whether the limiter is armed.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn refill(&mut self) {
        let now = self.clock.now_ms();
        let elapsed = now.saturating_sub(self.last_refill);
        if elapsed == 0 {
            return;
        }
        self.last_refill = now;
        self.tokens += (elapsed as f64 / 1000.0) * self.rps;
        let cap = self.capacity as f64;
        if self.tokens > cap {
            self.tokens = cap;
        }
    }

    /// Try to consume `cost` tokens. A non-positive cost always passes.
    pub fn try_acquire(&mut self, cost: f64) -> bool {
        if !self.enabled || cost <= 0.0 {
            return true;
        }
        self.refill();
        if self.tokens >= cost {
            self.tokens -= cost;
            self.total_allowed += 1;
            return true;
        }
        self.total_denied += 1;
        false
    }

    /// Current token count.
    pub fn available_tokens(&self) -> f64 {
        self.tokens
    }

    /// Configured sustained rate.
    pub fn requests_per_second(&self) -> f64 {
        self.rps
    }

    /// Configured burst capacity.
    pub fn burst_capacity(&self) -> usize {
        self.capacity
    }

    /// Requests allowed since configuration or the last stats reset.
    pub fn total_allowed(&self) -> u64 {
        self.total_allowed
    }

    /// Requests denied since configuration or the last stats reset.
    pub fn total_denied(&self) -> u64 {
        self.total_denied
    }

    /// Zero the allowed/denied counters.
    pub fn reset_stats(&mut self) {
        self.total_allowed = 0;
        self.total_denied = 0;
    }

    /// Estimated milliseconds until one token is available; 0 when tokens
    /// are available or the limiter is disabled.
    pub fn retry_after_ms(&self) -> u64 {
        if !self.enabled || self.tokens >= 1.0 || self.rps <= 0.0 {
            return 0;
        }
        let deficit = 1.0 - self.tokens;
        ((deficit / self.rps) * 1000.0) as u64 + 1
    }

    /// Diagnostic snapshot.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "enabled": self.enabled,
            "requestsPerSecond": self.rps,
            "burstCapacity": self.capacity,
            "availableTokens": self.tokens,
            "totalAllowed": self.total_allowed,
            "totalDenied": self.total_denied,
        })
    }
}

#[derive(Debug)]
struct Bucket {
    key: String,
    tokens: f64,
    last_refill: u64,
    last_access: u64,
    denied: u64,
}

/// Per-key rate limiter backed by a fixed bucket pool with LRU eviction.
pub struct KeyedRateLimiter {
    clock: SharedClock,
    enabled: bool,
    rps: f64,
    capacity: usize,
    max_keys: usize,
    buckets: Vec<Bucket>,
    total_allowed: u64,
    total_denied: u64,
    evictions: u64,
}

impl std::fmt::Debug for KeyedRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedRateLimiter")
            .field("enabled", &self.enabled)
            .field("rps", &self.rps)
            .field("active_keys", &self.buckets.len())
            .field("max_keys", &self.max_keys)
            .finish()
    }
}

impl KeyedRateLimiter {
    /// Create a keyed limiter: per-key rate and burst, with at most
    /// `max_keys` tracked keys (clamped to 1).
    pub fn new(
        requests_per_second: f64,
        burst_capacity: usize,
        max_keys: usize,
        clock: SharedClock,
    ) -> Self {
        Self {
            clock,
            enabled: true,
            rps: requests_per_second,
            capacity: burst_capacity,
            max_keys: max_keys.max(1),
            buckets: Vec::new(),
            total_allowed: 0,
            total_denied: 0,
            evictions: 0,
        }
    }

    /// Enable or disable gating.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether gating is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Try to consume `cost` tokens for `key`. Empty keys are not gated.
    pub fn try_acquire(&mut self, key: &str, cost: f64) -> bool {
        if !self.enabled || key.is_empty() || cost <= 0.0 {
            return true;
        }
        let now = self.clock.now_ms();
        let rps = self.rps;
        let cap = self.capacity as f64;

        let idx = self.find_or_create(key, now);
        let bucket = &mut self.buckets[idx];

        let elapsed = now.saturating_sub(bucket.last_refill);
        if elapsed > 0 {
            bucket.last_refill = now;
            bucket.tokens = (bucket.tokens + (elapsed as f64 / 1000.0) * rps).min(cap);
        }

        if bucket.tokens >= cost {
            bucket.tokens -= cost;
            bucket.last_access = now;
            self.total_allowed += 1;
            return true;
        }
        bucket.denied += 1;
        self.total_denied += 1;
        false
    }

    fn find_or_create(&mut self, key: &str, now: u64) -> usize {
        if let Some(idx) = self.buckets.iter().position(|b| b.key == key) {
            return idx;
        }
        if self.buckets.len() < self.max_keys {
            self.buckets.push(Bucket {
                key: key.to_string(),
                tokens: self.capacity as f64,
                last_refill: now,
                last_access: now,
                denied: 0,
            });
            return self.buckets.len() - 1;
        }
        // Evict the least-recently-used bucket; its counters are lost.
        let lru = self
            .buckets
            .iter()
            .enumerate()
            .min_by_key(|(_, b)| b.last_access)
            .map(|(i, _)| i)
            .expect("pool is non-empty");
        self.evictions += 1;
        tracing::debug!(evicted = %self.buckets[lru].key, key, "rate-limit pool evicting LRU bucket");
        self.buckets[lru] = Bucket {
            key: key.to_string(),
            tokens: self.capacity as f64,
            last_refill: now,
            last_access: now,
            denied: 0,
        };
        lru
    }

    /// Number of tracked keys.
    pub fn active_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Pool capacity.
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// Total allowed acquisitions across all keys.
    pub fn total_allowed(&self) -> u64 {
        self.total_allowed
    }

    /// Total denied acquisitions across all keys.
    pub fn total_denied(&self) -> u64 {
        self.total_denied
    }

    /// Number of LRU evictions.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// True when the key currently has a bucket.
    pub fn has_key(&self, key: &str) -> bool {
        self.buckets.iter().any(|b| b.key == key)
    }

    /// Stop tracking a key. Returns true if it was tracked.
    pub fn remove_key(&mut self, key: &str) -> bool {
        let before = self.buckets.len();
        self.buckets.retain(|b| b.key != key);
        self.buckets.len() != before
    }

    /// Per-key retry-after estimate; 0 for unknown keys.
    pub fn retry_after_ms(&self, key: &str) -> u64 {
        let Some(bucket) = self.buckets.iter().find(|b| b.key == key) else {
            return 0;
        };
        if bucket.tokens >= 1.0 || self.rps <= 0.0 {
            return 0;
        }
        let deficit = 1.0 - bucket.tokens;
        ((deficit / self.rps) * 1000.0) as u64 + 1
    }

    /// Drop all buckets and counters.
    pub fn reset(&mut self) {
        self.buckets.clear();
        self.total_allowed = 0;
        self.total_denied = 0;
        self.evictions = 0;
    }

    /// Reconfigure rates; existing buckets are refilled to the new burst.
    pub fn configure(&mut self, requests_per_second: f64, burst_capacity: usize) {
        self.rps = requests_per_second;
        self.capacity = burst_capacity;
        for bucket in &mut self.buckets {
            bucket.tokens = burst_capacity as f64;
        }
    }

    /// Diagnostic snapshot.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "enabled": self.enabled,
            "requestsPerSecond": self.rps,
            "burstCapacity": self.capacity,
            "activeKeys": self.buckets.len(),
            "maxKeys": self.max_keys,
            "totalAllowed": self.total_allowed,
            "totalDenied": self.total_denied,
            "evictions": self.evictions,
        })
    }
}
