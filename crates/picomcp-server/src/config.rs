//! Server configuration.
//!
//! A single `ServerConfig` gathers identity, pagination, capacity bounds,
//! and the toggles for each stage of the tool-call pipeline. Reliability
//! settings mirror the primitives in `picomcp-core`.

use picomcp_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Which caller-identifying key feeds the per-key rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKeySource {
    /// The API key from the transport (falls back to client id).
    #[default]
    ApiKey,
    /// The client id (session id).
    ClientId,
    /// The tool name being invoked.
    ToolName,
}

/// Global token-bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalRateLimit {
    /// Sustained requests per second.
    pub requests_per_second: f64,
    /// Burst capacity.
    pub burst: usize,
}

/// Per-key token-bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedRateLimit {
    /// Per-key sustained requests per second.
    pub requests_per_second: f64,
    /// Per-key burst capacity.
    pub burst: usize,
    /// Bucket pool size (LRU-evicted).
    pub max_keys: usize,
    /// How the caller key is derived.
    pub key_source: RateLimitKeySource,
}

/// Circuit-breaker registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Whether breakers gate tool calls.
    pub enabled: bool,
    /// Consecutive failures before tripping open.
    pub failure_threshold: usize,
    /// Milliseconds in open before the recovery probe.
    pub recovery_timeout_ms: u64,
    /// Registry capacity (LRU-evicted).
    pub max_breakers: usize,
    /// Successes in half-open required to close.
    pub half_open_successes: usize,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            max_breakers: 16,
            half_open_successes: 1,
        }
    }
}

/// Task-engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSettings {
    /// Whether the tasks method set is advertised and served.
    pub enabled: bool,
    /// Soft cap on live tasks; total is reaped at twice this.
    pub max_tasks: usize,
    /// Recommended poll interval returned on task creation, in ms.
    pub default_poll_interval_ms: i64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tasks: 16,
            default_poll_interval_ms: 5_000,
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name advertised at initialize.
    pub name: String,
    /// Server version advertised at initialize.
    pub version: String,
    /// Optional usage instructions returned at initialize.
    pub instructions: Option<String>,
    /// Page size for every list method.
    pub page_size: usize,
    /// Maximum concurrent sessions (0 = unlimited).
    pub max_sessions: usize,
    /// Session idle timeout in ms (0 = none).
    pub session_idle_timeout_ms: u64,
    /// Global rate limit; None disables the stage.
    pub rate_limit: Option<GlobalRateLimit>,
    /// Per-key rate limit; None disables the stage.
    pub keyed_rate_limit: Option<KeyedRateLimit>,
    /// Validate tool arguments against the input schema.
    pub validate_input: bool,
    /// Validate structured output against the output schema.
    pub validate_output: bool,
    /// Circuit-breaker settings.
    pub breakers: BreakerSettings,
    /// Default retry policy for tools whose resource key has none
    /// registered.
    pub default_retry: RetryPolicy,
    /// Task-engine settings.
    pub tasks: TaskSettings,
    /// Event-store ring capacity.
    pub event_capacity: usize,
    /// State-store entry cap (0 = unlimited).
    pub state_capacity: usize,
    /// Audit-log ring capacity.
    pub audit_capacity: usize,
    /// Watchdog table capacity.
    pub watchdog_capacity: usize,
    /// Retry-policy registry capacity.
    pub retry_capacity: usize,
    /// Scheduler task capacity.
    pub scheduler_capacity: usize,
    /// Bound on the remembered cancelled-request list.
    pub cancelled_capacity: usize,
    /// Timeout for pending sampling requests, in ms.
    pub sampling_timeout_ms: u64,
    /// Timeout for pending elicitation requests, in ms.
    pub elicitation_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: crate::SERVER_NAME.to_string(),
            version: crate::SERVER_VERSION.to_string(),
            instructions: None,
            page_size: 50,
            max_sessions: 4,
            session_idle_timeout_ms: 30 * 60 * 1000,
            rate_limit: None,
            keyed_rate_limit: None,
            validate_input: true,
            validate_output: true,
            breakers: BreakerSettings::default(),
            default_retry: RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            },
            tasks: TaskSettings::default(),
            event_capacity: 64,
            state_capacity: 128,
            audit_capacity: 64,
            watchdog_capacity: 16,
            retry_capacity: 16,
            scheduler_capacity: 32,
            cancelled_capacity: 32,
            sampling_timeout_ms: 60_000,
            elicitation_timeout_ms: 120_000,
        }
    }
}
