//! Per-key circuit breakers with timed recovery.
//!
//! Three states: closed (calls pass), open (calls rejected until the
//! recovery window elapses), half-open (a probe is allowed; success closes
//! the circuit, failure re-opens it). A fixed-size LRU registry maps
//! resource keys to breakers.

use serde_json::Value;
use std::sync::Arc;

use crate::clock::SharedClock;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Probing for recovery.
    HalfOpen,
}

impl CircuitState {
    /// The wire string for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Callback fired on every state transition.
pub type StateChangeCallback = Arc<dyn Fn(&str, CircuitState) + Send + Sync>;

/// A single circuit breaker.
pub struct CircuitBreaker {
    clock: SharedClock,
    key: String,
    failure_threshold: usize,
    recovery_timeout_ms: u64,
    half_open_success_threshold: usize,
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    last_failure_ms: u64,
    last_state_change_ms: u64,
    total_failures: u64,
    total_successes: u64,
    total_rejected: u64,
    trip_count: u64,
    on_state_change: Option<StateChangeCallback>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("failure_count", &self.failure_count)
            .field("trip_count", &self.trip_count)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker for `key`.
    pub fn new(
        key: &str,
        failure_threshold: usize,
        recovery_timeout_ms: u64,
        half_open_success_threshold: usize,
        clock: SharedClock,
    ) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            key: key.to_string(),
            failure_threshold,
            recovery_timeout_ms,
            half_open_success_threshold,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_ms: 0,
            last_state_change_ms: now,
            total_failures: 0,
            total_successes: 0,
            total_rejected: 0,
            trip_count: 0,
            on_state_change: None,
        }
    }

    fn transition(&mut self, new_state: CircuitState, now: u64) {
        let old = self.state;
        self.state = new_state;
        self.last_state_change_ms = now;
        if old != new_state {
            tracing::debug!(key = %self.key, from = old.as_str(), to = new_state.as_str(), "circuit transition");
            if let Some(callback) = &self.on_state_change {
                callback(&self.key, new_state);
            }
        }
    }

    /// Whether a request may pass. Transitions open → half-open once the
    /// recovery window has elapsed and allows the probe through.
    pub fn allow_request(&mut self) -> bool {
        let now = self.clock.now_ms();
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if now.saturating_sub(self.last_failure_ms) >= self.recovery_timeout_ms {
                    self.transition(CircuitState::HalfOpen, now);
                    return true;
                }
                self.total_rejected += 1;
                false
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Record a successful call.
    pub fn record_success(&mut self) {
        self.total_successes += 1;
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.success_count += 1;
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.half_open_success_threshold {
                    let now = self.clock.now_ms();
                    self.transition(CircuitState::Closed, now);
                    self.failure_count = 0;
                    self.success_count = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&mut self) {
        let now = self.clock.now_ms();
        self.total_failures += 1;
        self.last_failure_ms = now;
        self.failure_count += 1;
        self.success_count = 0;

        match self.state {
            CircuitState::Closed => {
                if self.failure_count >= self.failure_threshold {
                    self.transition(CircuitState::Open, now);
                    self.trip_count += 1;
                }
            }
            CircuitState::HalfOpen => {
                self.transition(CircuitState::Open, now);
                self.trip_count += 1;
            }
            CircuitState::Open => {}
        }
    }

    /// Manually return to closed.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.last_failure_ms = 0;
        self.last_state_change_ms = self.clock.now_ms();
    }

    /// Manually force open.
    pub fn trip(&mut self) {
        let now = self.clock.now_ms();
        self.last_failure_ms = now;
        self.transition(CircuitState::Open, now);
        self.trip_count += 1;
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// The breaker's resource key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Consecutive failures in the current window.
    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    /// Configured failure threshold.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Lifetime failure total.
    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    /// Lifetime success total.
    pub fn total_successes(&self) -> u64 {
        self.total_successes
    }

    /// Lifetime rejections while open.
    pub fn total_rejected(&self) -> u64 {
        self.total_rejected
    }

    /// Lifetime trips to open.
    pub fn trip_count(&self) -> u64 {
        self.trip_count
    }

    /// Milliseconds until the recovery probe; 0 unless open.
    pub fn retry_after_ms(&self) -> u64 {
        if self.state != CircuitState::Open {
            return 0;
        }
        let elapsed = self.clock.now_ms().saturating_sub(self.last_failure_ms);
        self.recovery_timeout_ms.saturating_sub(elapsed)
    }

    /// Install the state-change callback.
    pub fn on_state_change(&mut self, callback: StateChangeCallback) {
        self.on_state_change = Some(callback);
    }

    /// Diagnostic snapshot.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "key": self.key,
            "state": self.state.as_str(),
            "failureCount": self.failure_count,
            "failureThreshold": self.failure_threshold,
            "recoveryTimeoutMs": self.recovery_timeout_ms,
            "retryAfterMs": self.retry_after_ms(),
            "totalFailures": self.total_failures,
            "totalSuccesses": self.total_successes,
            "totalRejected": self.total_rejected,
            "tripCount": self.trip_count,
        })
    }
}

struct RegistryEntry {
    breaker: CircuitBreaker,
    last_access_ms: u64,
}

/// Fixed-size LRU registry of named circuit breakers sharing one
/// configuration.
pub struct CircuitBreakerRegistry {
    clock: SharedClock,
    failure_threshold: usize,
    recovery_timeout_ms: u64,
    half_open_success_threshold: usize,
    max_breakers: usize,
    entries: Vec<RegistryEntry>,
    on_state_change: Option<StateChangeCallback>,
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("count", &self.entries.len())
            .field("max_breakers", &self.max_breakers)
            .finish()
    }
}

impl CircuitBreakerRegistry {
    /// Create a registry. New breakers inherit the supplied thresholds.
    pub fn new(
        failure_threshold: usize,
        recovery_timeout_ms: u64,
        max_breakers: usize,
        half_open_success_threshold: usize,
        clock: SharedClock,
    ) -> Self {
        Self {
            clock,
            failure_threshold,
            recovery_timeout_ms,
            half_open_success_threshold,
            max_breakers: max_breakers.max(1),
            entries: Vec::new(),
            on_state_change: None,
        }
    }

    /// Get or create the breaker for `key`, updating its LRU stamp.
    pub fn get(&mut self, key: &str) -> &mut CircuitBreaker {
        let now = self.clock.now_ms();
        if let Some(idx) = self.entries.iter().position(|e| e.breaker.key() == key) {
            self.entries[idx].last_access_ms = now;
            return &mut self.entries[idx].breaker;
        }

        let mut breaker = CircuitBreaker::new(
            key,
            self.failure_threshold,
            self.recovery_timeout_ms,
            self.half_open_success_threshold,
            self.clock.clone(),
        );
        if let Some(callback) = &self.on_state_change {
            breaker.on_state_change(callback.clone());
        }

        let idx = if self.entries.len() < self.max_breakers {
            self.entries.push(RegistryEntry {
                breaker,
                last_access_ms: now,
            });
            self.entries.len() - 1
        } else {
            let lru = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_access_ms)
                .map(|(i, _)| i)
                .expect("registry is non-empty");
            tracing::debug!(evicted = %self.entries[lru].breaker.key(), key, "breaker registry evicting LRU entry");
            self.entries[lru] = RegistryEntry {
                breaker,
                last_access_ms: now,
            };
            lru
        };
        &mut self.entries[idx].breaker
    }

    /// True when a breaker exists for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.breaker.key() == key)
    }

    /// Remove a breaker. Returns true if found.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.breaker.key() != key);
        self.entries.len() != before
    }

    /// Reset every breaker to closed.
    pub fn reset_all(&mut self) {
        for entry in &mut self.entries {
            entry.breaker.reset();
        }
    }

    /// Number of breakers.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Registry capacity.
    pub fn max_breakers(&self) -> usize {
        self.max_breakers
    }

    /// Number of breakers currently open.
    pub fn open_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.breaker.state() == CircuitState::Open)
            .count()
    }

    /// Install a callback on every current and future breaker.
    pub fn on_state_change(&mut self, callback: impl Fn(&str, CircuitState) + Send + Sync + 'static) {
        let callback: StateChangeCallback = Arc::new(callback);
        for entry in &mut self.entries {
            entry.breaker.on_state_change(callback.clone());
        }
        self.on_state_change = Some(callback);
    }

    /// Diagnostic snapshot of the whole registry.
    pub fn to_json(&self) -> Value {
        let breakers: Vec<Value> = self.entries.iter().map(|e| e.breaker.to_json()).collect();
        serde_json::json!({
            "count": self.entries.len(),
            "maxBreakers": self.max_breakers,
            "openCount": self.open_count(),
            "breakers": breakers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn breaker(threshold: usize, recovery_ms: u64) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        (
            CircuitBreaker::new("dev", threshold, recovery_ms, 1, clock.clone()),
            clock,
        )
    }

    #[test]
    fn trips_open_at_threshold() {
        let (mut cb, _) = breaker(3, 1000);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.trip_count(), 1);
    }

    #[test]
    fn threshold_one_trips_on_single_failure() {
        let (mut cb, _) = breaker(1, 1000);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_consecutive_failures_when_closed() {
        let (mut cb, _) = breaker(3, 1000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn open_rejects_until_recovery_window() {
        let (mut cb, clock) = breaker(1, 1000);
        cb.record_failure();
        assert!(!cb.allow_request());
        assert!(!cb.allow_request());
        assert_eq!(cb.total_rejected(), 2);
        assert!(cb.retry_after_ms() > 0);

        clock.advance(1000);
        assert!(cb.allow_request()); // probe
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes() {
        let (mut cb, clock) = breaker(1, 1000);
        cb.record_failure();
        clock.advance(1000);
        assert!(cb.allow_request());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let (mut cb, clock) = breaker(1, 1000);
        cb.record_failure();
        clock.advance(1000);
        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.trip_count(), 2);
    }

    #[test]
    fn multi_success_half_open_threshold() {
        let clock = ManualClock::shared();
        let mut cb = CircuitBreaker::new("dev", 1, 1000, 2, clock.clone());
        cb.record_failure();
        clock.advance(1000);
        assert!(cb.allow_request());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn manual_trip_and_reset() {
        let (mut cb, _) = breaker(5, 1000);
        cb.trip();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn state_change_callback_fires_on_transitions() {
        let (mut cb, clock) = breaker(1, 1000);
        let log: Arc<Mutex<Vec<(String, CircuitState)>>> = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        cb.on_state_change(Arc::new(move |key, state| {
            log2.lock().unwrap().push((key.to_string(), state));
        }));
        cb.record_failure();
        clock.advance(1000);
        cb.allow_request();
        cb.record_success();
        let log = log.lock().unwrap();
        assert_eq!(
            log.iter().map(|(_, s)| *s).collect::<Vec<_>>(),
            vec![CircuitState::Open, CircuitState::HalfOpen, CircuitState::Closed]
        );
        assert!(log.iter().all(|(k, _)| k == "dev"));
    }

    #[test]
    fn registry_creates_and_reuses() {
        let clock = ManualClock::shared();
        let mut registry = CircuitBreakerRegistry::new(2, 1000, 4, 1, clock);
        registry.get("i2c").record_failure();
        registry.get("i2c").record_failure();
        assert_eq!(registry.get("i2c").state(), CircuitState::Open);
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.open_count(), 1);
        assert!(registry.has("i2c"));
    }

    #[test]
    fn registry_lru_eviction() {
        let clock = ManualClock::shared();
        let mut registry = CircuitBreakerRegistry::new(2, 1000, 2, 1, clock.clone());
        registry.get("a");
        clock.advance(10);
        registry.get("b");
        clock.advance(10);
        registry.get("a"); // refresh a
        clock.advance(10);
        registry.get("c"); // evicts b
        assert!(registry.has("a"));
        assert!(!registry.has("b"));
        assert!(registry.has("c"));
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn registry_callback_applies_to_new_breakers() {
        let clock = ManualClock::shared();
        let mut registry = CircuitBreakerRegistry::new(1, 1000, 4, 1, clock);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        registry.on_state_change(move |_, _| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        registry.get("x").record_failure();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registry_remove_and_reset_all() {
        let clock = ManualClock::shared();
        let mut registry = CircuitBreakerRegistry::new(1, 1000, 4, 1, clock);
        registry.get("a").record_failure();
        registry.get("b");
        assert!(registry.remove("b"));
        assert!(!registry.remove("b"));
        registry.reset_all();
        assert_eq!(registry.get("a").state(), CircuitState::Closed);
    }
}
