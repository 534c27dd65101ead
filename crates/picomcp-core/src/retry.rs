//! Retry policies and the backoff executor.
//!
//! Operations return a three-valued [`RetryOutcome`]: success, retryable
//! failure, or fatal failure. The executor loops for up to
//! `max_retries + 1` attempts, sleeping an exponentially growing, optionally
//! jittered delay between attempts and respecting a total-time budget.
//! A registry assigns named policies (per tool or peripheral) with LRU
//! eviction and accumulated per-key statistics.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::clock::SharedClock;

/// Jitter strategy applied to the computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterMode {
    /// Pure exponential backoff.
    #[default]
    None,
    /// Uniform in `[0, delay)`.
    Full,
    /// `delay/2 + uniform[0, delay/2)`.
    Equal,
    /// `uniform[base_delay, min(max_delay, previous_delay × 3))`.
    Decorrelated,
}

impl JitterMode {
    /// The wire string for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Full => "full",
            Self::Equal => "equal",
            Self::Decorrelated => "decorrelated",
        }
    }
}

/// Result of one attempt of a retryable operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The operation succeeded with a value.
    Success(String),
    /// The operation failed but may be retried.
    Retryable(String),
    /// The operation failed and must not be retried.
    Fatal(String),
}

impl RetryOutcome {
    /// Success constructor.
    pub fn success(value: impl Into<String>) -> Self {
        Self::Success(value.into())
    }

    /// Retryable-failure constructor.
    pub fn retryable(error: impl Into<String>) -> Self {
        Self::Retryable(error.into())
    }

    /// Fatal-failure constructor.
    pub fn fatal(error: impl Into<String>) -> Self {
        Self::Fatal(error.into())
    }

    /// True for `Success`.
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The error message for either failure variant.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Retryable(e) | Self::Fatal(e) => Some(e),
        }
    }
}

/// Parameters of a retry run. Stateless input to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt.
    pub max_retries: usize,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Exponential multiplier.
    pub multiplier: f64,
    /// Ceiling on the computed delay.
    pub max_delay_ms: u64,
    /// Total time budget in milliseconds (0 = unbounded).
    pub total_timeout_ms: u64,
    /// Jitter strategy.
    pub jitter: JitterMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            total_timeout_ms: 0,
            jitter: JitterMode::None,
        }
    }
}

impl RetryPolicy {
    /// Compute the (jittered) delay for a 0-based attempt index.
    /// `last_delay_ms` feeds the decorrelated mode; 0 seeds it from the
    /// base delay.
    pub fn delay_for_attempt(&self, attempt: usize, last_delay_ms: u64) -> u64 {
        let mut delay = self.base_delay_ms;
        for _ in 0..attempt {
            delay = (delay as f64 * self.multiplier) as u64;
            if delay > self.max_delay_ms {
                delay = self.max_delay_ms;
                break;
            }
        }
        delay = delay.min(self.max_delay_ms);

        let mut rng = rand::thread_rng();
        match self.jitter {
            JitterMode::None => delay,
            JitterMode::Full => {
                if delay > 0 {
                    rng.gen_range(0..delay)
                } else {
                    0
                }
            }
            JitterMode::Equal => {
                let half = delay / 2;
                if half > 0 {
                    half + rng.gen_range(0..half)
                } else {
                    half
                }
            }
            JitterMode::Decorrelated => {
                let prev = if last_delay_ms > 0 {
                    last_delay_ms
                } else {
                    self.base_delay_ms
                };
                let upper = (prev.saturating_mul(3)).min(self.max_delay_ms);
                let lower = self.base_delay_ms.min(upper);
                if upper > lower {
                    lower + rng.gen_range(0..upper - lower)
                } else {
                    lower
                }
            }
        }
    }

    /// Diagnostic snapshot.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "maxRetries": self.max_retries,
            "baseDelayMs": self.base_delay_ms,
            "multiplier": self.multiplier,
            "maxDelayMs": self.max_delay_ms,
            "totalTimeoutMs": self.total_timeout_ms,
            "jitter": self.jitter.as_str(),
        })
    }
}

/// Accumulated statistics of retry runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RetryStats {
    /// Attempts made, including first tries.
    pub total_attempts: u64,
    /// Runs that ended in success.
    pub total_successes: u64,
    /// Sleeps taken between attempts.
    pub total_retries: u64,
    /// Runs that exhausted their retries.
    pub total_failures: u64,
    /// Runs ended by a fatal error.
    pub total_fatal_errors: u64,
    /// Runs ended by the total-time budget.
    pub total_timeouts: u64,
    /// Cumulative backoff sleep in milliseconds.
    pub total_delay_ms: u64,
}

impl RetryStats {
    /// Zero all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Add another run's counters onto this one.
    pub fn merge(&mut self, other: &RetryStats) {
        self.total_attempts += other.total_attempts;
        self.total_successes += other.total_successes;
        self.total_retries += other.total_retries;
        self.total_failures += other.total_failures;
        self.total_fatal_errors += other.total_fatal_errors;
        self.total_timeouts += other.total_timeouts;
        self.total_delay_ms += other.total_delay_ms;
    }
}

/// Callback fired before each backoff sleep: `(attempt, error, delay_ms)`.
pub type RetryCallback = Box<dyn Fn(usize, &str, u64) + Send + Sync>;
/// Callback fired when retries are exhausted: `(attempts, last_error)`.
pub type GiveUpCallback = Box<dyn Fn(usize, &str) + Send + Sync>;

/// Executes operations under a retry policy.
pub struct RetryExecutor {
    clock: SharedClock,
    policy: RetryPolicy,
    stats: RetryStats,
    on_retry: Option<RetryCallback>,
    on_give_up: Option<GiveUpCallback>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("stats", &self.stats)
            .finish()
    }
}

impl RetryExecutor {
    /// Create an executor with the given policy.
    pub fn new(policy: RetryPolicy, clock: SharedClock) -> Self {
        Self {
            clock,
            policy,
            stats: RetryStats::default(),
            on_retry: None,
            on_give_up: None,
        }
    }

    /// Replace the policy.
    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    /// The active policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Accumulated statistics.
    pub fn stats(&self) -> &RetryStats {
        &self.stats
    }

    /// Zero the statistics.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Install the per-retry callback.
    pub fn on_retry(&mut self, callback: RetryCallback) {
        self.on_retry = Some(callback);
    }

    /// Install the give-up callback.
    pub fn on_give_up(&mut self, callback: GiveUpCallback) {
        self.on_give_up = Some(callback);
    }

    /// Run `op` under the policy, sleeping between retryable failures.
    pub async fn execute<F>(&mut self, mut op: F) -> RetryOutcome
    where
        F: FnMut() -> RetryOutcome,
    {
        let start_ms = self.clock.now_ms();
        let mut last_delay_ms = 0u64;

        for attempt in 0..=self.policy.max_retries {
            self.stats.total_attempts += 1;

            if self.policy.total_timeout_ms > 0 && attempt > 0 {
                let elapsed = self.clock.now_ms().saturating_sub(start_ms);
                if elapsed >= self.policy.total_timeout_ms {
                    self.stats.total_timeouts += 1;
                    return RetryOutcome::fatal("total timeout exceeded");
                }
            }

            let result = op();

            match &result {
                RetryOutcome::Success(_) => {
                    self.stats.total_successes += 1;
                    return result;
                }
                RetryOutcome::Fatal(_) => {
                    self.stats.total_fatal_errors += 1;
                    return result;
                }
                RetryOutcome::Retryable(error) => {
                    if attempt >= self.policy.max_retries {
                        self.stats.total_failures += 1;
                        if let Some(callback) = &self.on_give_up {
                            callback(attempt + 1, error);
                        }
                        return result;
                    }

                    let mut delay = self.policy.delay_for_attempt(attempt, last_delay_ms);

                    if self.policy.total_timeout_ms > 0 {
                        let elapsed = self.clock.now_ms().saturating_sub(start_ms);
                        let remaining = self.policy.total_timeout_ms.saturating_sub(elapsed);
                        delay = delay.min(remaining);
                    }

                    self.stats.total_retries += 1;
                    self.stats.total_delay_ms += delay;
                    last_delay_ms = delay;

                    if let Some(callback) = &self.on_retry {
                        callback(attempt, error, delay);
                    }
                    tracing::debug!(attempt, delay_ms = delay, error, "retrying after backoff");

                    if delay > 0 {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        self.stats.total_failures += 1;
        RetryOutcome::fatal("max retries exceeded")
    }
}

struct RegistryEntry {
    key: String,
    policy: RetryPolicy,
    stats: RetryStats,
    last_access_ms: u64,
}

/// Named retry-policy registry with LRU eviction and per-key stats.
pub struct RetryRegistry {
    clock: SharedClock,
    max_policies: usize,
    entries: Vec<RegistryEntry>,
}

impl std::fmt::Debug for RetryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryRegistry")
            .field("count", &self.entries.len())
            .field("max_policies", &self.max_policies)
            .finish()
    }
}

impl RetryRegistry {
    /// Create a registry holding at most `max_policies` entries.
    pub fn new(max_policies: usize, clock: SharedClock) -> Self {
        Self {
            clock,
            max_policies: max_policies.max(1),
            entries: Vec::new(),
        }
    }

    /// Set (or replace) the policy for a key; replacing resets its stats.
    pub fn set(&mut self, key: &str, policy: RetryPolicy) {
        let now = self.clock.now_ms();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            entry.policy = policy;
            entry.stats.reset();
            entry.last_access_ms = now;
            return;
        }
        if self.entries.len() >= self.max_policies {
            let lru = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_access_ms)
                .map(|(i, _)| i)
                .expect("registry is non-empty");
            self.entries.remove(lru);
        }
        self.entries.push(RegistryEntry {
            key: key.to_string(),
            policy,
            stats: RetryStats::default(),
            last_access_ms: now,
        });
    }

    /// The policy for a key, if registered.
    pub fn get(&self, key: &str) -> Option<&RetryPolicy> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.policy)
    }

    /// True when a policy is registered for the key.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Accumulated stats for a key.
    pub fn stats(&self, key: &str) -> Option<&RetryStats> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.stats)
    }

    /// Remove a policy. Returns true if found.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        self.entries.len() != before
    }

    /// Reset stats on every entry.
    pub fn reset_all_stats(&mut self) {
        for entry in &mut self.entries {
            entry.stats.reset();
        }
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registered policies.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Run `op` under the key's policy (or `default_policy` when the key is
    /// unregistered), accumulating stats onto the key's entry.
    pub async fn execute<F>(
        &mut self,
        key: &str,
        default_policy: RetryPolicy,
        op: F,
    ) -> (RetryOutcome, RetryStats)
    where
        F: FnMut() -> RetryOutcome,
    {
        let policy = self.get(key).cloned().unwrap_or(default_policy);
        let mut executor = RetryExecutor::new(policy, self.clock.clone());
        let result = executor.execute(op).await;
        let run_stats = *executor.stats();

        self.record_run(key, &run_stats);
        (result, run_stats)
    }

    /// Merge a completed run's stats onto a key's entry and refresh its
    /// LRU stamp. Unregistered keys are ignored.
    pub fn record_run(&mut self, key: &str, run_stats: &RetryStats) {
        let now = self.clock.now_ms();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            entry.last_access_ms = now;
            entry.stats.merge(run_stats);
        }
    }

    /// Diagnostic snapshot of the registry.
    pub fn to_json(&self) -> Value {
        let entries: Vec<Value> = self
            .entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "key": e.key,
                    "policy": e.policy.to_json(),
                    "stats": serde_json::to_value(e.stats).unwrap_or(Value::Null),
                })
            })
            .collect();
        serde_json::json!({
            "count": self.entries.len(),
            "maxPolicies": self.max_policies,
            "entries": entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, MonotonicClock};
    use std::sync::Arc;

    fn policy_ms(max_retries: usize, base: u64, multiplier: f64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: base,
            multiplier,
            max_delay_ms: 10_000,
            total_timeout_ms: 0,
            jitter: JitterMode::None,
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let mut executor = RetryExecutor::new(policy_ms(3, 1, 2.0), MonotonicClock::shared());
        let result = executor.execute(|| RetryOutcome::success("23.5")).await;
        assert_eq!(result, RetryOutcome::Success("23.5".into()));
        assert_eq!(executor.stats().total_attempts, 1);
        assert_eq!(executor.stats().total_retries, 0);
    }

    #[tokio::test]
    async fn retryable_twice_then_success() {
        let mut executor = RetryExecutor::new(policy_ms(5, 1, 2.0), MonotonicClock::shared());
        let mut calls = 0;
        let result = executor
            .execute(|| {
                calls += 1;
                if calls <= 2 {
                    RetryOutcome::retryable("sensor NAK")
                } else {
                    RetryOutcome::success("23.5")
                }
            })
            .await;
        assert_eq!(result, RetryOutcome::Success("23.5".into()));
        let stats = executor.stats();
        assert_eq!(stats.total_retries, 2);
        assert_eq!(stats.total_attempts, 3);
        // 1 ms then 2 ms of backoff.
        assert_eq!(stats.total_delay_ms, 3);
    }

    #[tokio::test]
    async fn attempts_equal_retries_plus_one_on_success() {
        let mut executor = RetryExecutor::new(policy_ms(4, 0, 2.0), MonotonicClock::shared());
        let mut calls = 0;
        let result = executor
            .execute(|| {
                calls += 1;
                if calls < 3 {
                    RetryOutcome::retryable("nak")
                } else {
                    RetryOutcome::success("ok")
                }
            })
            .await;
        assert!(result.succeeded());
        let stats = executor.stats();
        assert_eq!(stats.total_attempts, stats.total_retries + 1);
        assert!(stats.total_retries <= 4);
    }

    #[tokio::test]
    async fn fatal_stops_immediately() {
        let mut executor = RetryExecutor::new(policy_ms(5, 1, 2.0), MonotonicClock::shared());
        let mut calls = 0;
        let result = executor
            .execute(|| {
                calls += 1;
                RetryOutcome::fatal("bus fault")
            })
            .await;
        assert_eq!(result, RetryOutcome::Fatal("bus fault".into()));
        assert_eq!(calls, 1);
        assert_eq!(executor.stats().total_fatal_errors, 1);
    }

    #[tokio::test]
    async fn zero_max_retries_means_one_attempt_no_sleep() {
        let mut executor = RetryExecutor::new(policy_ms(0, 100, 2.0), MonotonicClock::shared());
        let mut calls = 0;
        let result = executor
            .execute(|| {
                calls += 1;
                RetryOutcome::retryable("nak")
            })
            .await;
        assert_eq!(calls, 1);
        assert!(!result.succeeded());
        assert_eq!(executor.stats().total_retries, 0);
        assert_eq!(executor.stats().total_delay_ms, 0);
        assert_eq!(executor.stats().total_failures, 1);
    }

    #[tokio::test]
    async fn give_up_callback_receives_attempt_count() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let mut executor = RetryExecutor::new(policy_ms(2, 0, 2.0), MonotonicClock::shared());
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts2 = attempts.clone();
        executor.on_give_up(Box::new(move |n, error| {
            assert_eq!(error, "nak");
            attempts2.store(n, Ordering::SeqCst);
        }));
        let result = executor.execute(|| RetryOutcome::retryable("nak")).await;
        assert_eq!(result, RetryOutcome::Retryable("nak".into()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn total_timeout_aborts_run() {
        let clock = ManualClock::shared();
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay_ms: 0,
            multiplier: 1.0,
            max_delay_ms: 10,
            total_timeout_ms: 50,
            jitter: JitterMode::None,
        };
        let mut executor = RetryExecutor::new(policy, clock.clone());
        let clock2 = clock.clone();
        let result = executor
            .execute(move || {
                clock2.advance(30);
                RetryOutcome::retryable("slow")
            })
            .await;
        assert_eq!(result, RetryOutcome::Fatal("total timeout exceeded".into()));
        assert_eq!(executor.stats().total_timeouts, 1);
    }

    #[test]
    fn delay_grows_exponentially_and_clamps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 500,
            total_timeout_ms: 0,
            jitter: JitterMode::None,
        };
        assert_eq!(policy.delay_for_attempt(0, 0), 100);
        assert_eq!(policy.delay_for_attempt(1, 0), 200);
        assert_eq!(policy.delay_for_attempt(2, 0), 400);
        assert_eq!(policy.delay_for_attempt(3, 0), 500);
        assert_eq!(policy.delay_for_attempt(9, 0), 500);
    }

    #[test]
    fn full_jitter_stays_below_delay() {
        let policy = RetryPolicy {
            jitter: JitterMode::Full,
            base_delay_ms: 100,
            ..Default::default()
        };
        for _ in 0..50 {
            assert!(policy.delay_for_attempt(0, 0) < 100);
        }
    }

    #[test]
    fn equal_jitter_stays_in_upper_half() {
        let policy = RetryPolicy {
            jitter: JitterMode::Equal,
            base_delay_ms: 100,
            ..Default::default()
        };
        for _ in 0..50 {
            let d = policy.delay_for_attempt(0, 0);
            assert!((50..100).contains(&d), "d = {d}");
        }
    }

    #[test]
    fn decorrelated_jitter_bounds() {
        let policy = RetryPolicy {
            jitter: JitterMode::Decorrelated,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            ..Default::default()
        };
        for _ in 0..50 {
            let d = policy.delay_for_attempt(3, 200);
            assert!((100..600).contains(&d), "d = {d}");
        }
    }

    #[tokio::test]
    async fn registry_execute_accumulates_stats() {
        let mut registry = RetryRegistry::new(4, MonotonicClock::shared());
        registry.set(
            "i2c",
            policy_ms(5, 0, 2.0),
        );
        let mut calls = 0;
        let (result, run) = registry
            .execute("i2c", RetryPolicy::default(), || {
                calls += 1;
                if calls <= 1 {
                    RetryOutcome::retryable("nak")
                } else {
                    RetryOutcome::success("ok")
                }
            })
            .await;
        assert!(result.succeeded());
        assert_eq!(run.total_retries, 1);
        assert_eq!(registry.stats("i2c").unwrap().total_retries, 1);
    }

    #[tokio::test]
    async fn registry_falls_back_to_default_policy() {
        let mut registry = RetryRegistry::new(4, MonotonicClock::shared());
        let (result, run) = registry
            .execute("unknown", policy_ms(0, 0, 2.0), || {
                RetryOutcome::retryable("nak")
            })
            .await;
        assert!(!result.succeeded());
        assert_eq!(run.total_attempts, 1);
        assert!(registry.stats("unknown").is_none());
    }

    #[test]
    fn registry_lru_eviction() {
        let clock = ManualClock::shared();
        let mut registry = RetryRegistry::new(2, clock.clone());
        registry.set("a", RetryPolicy::default());
        clock.advance(10);
        registry.set("b", RetryPolicy::default());
        clock.advance(10);
        registry.set("a", RetryPolicy::default()); // refresh a
        clock.advance(10);
        registry.set("c", RetryPolicy::default()); // evicts b
        assert!(registry.has("a"));
        assert!(!registry.has("b"));
        assert!(registry.has("c"));
    }
}
