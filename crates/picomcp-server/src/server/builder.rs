//! Server builder.

use parking_lot::{Mutex, RwLock};

use picomcp_core::{
    AuditLog, CircuitBreakerRegistry, EventStore, KeyedRateLimiter, MonotonicClock, RateLimiter,
    RetryRegistry, Scheduler, SessionManager, SharedClock, StateStore, Watchdog,
};
use picomcp_protocol::types::logging::LogLevel;

use crate::config::{GlobalRateLimit, KeyedRateLimit, RateLimitKeySource, ServerConfig};
use crate::registry::Registry;
use crate::server::core::{McpServer, ServerState};
use crate::tasks::TaskEngine;
use crate::tracker::RequestTracker;

/// Builder for [`McpServer`].
#[derive(Debug)]
pub struct ServerBuilder {
    config: ServerConfig,
    clock: Option<SharedClock>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            clock: None,
        }
    }

    /// Start from an explicit configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            clock: None,
        }
    }

    /// Set the advertised server name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the advertised server version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Set the usage instructions returned at initialize.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    /// Set the page size for every list method.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size.max(1);
        self
    }

    /// Set the session capacity and idle timeout.
    pub fn sessions(mut self, max_sessions: usize, idle_timeout_ms: u64) -> Self {
        self.config.max_sessions = max_sessions;
        self.config.session_idle_timeout_ms = idle_timeout_ms;
        self
    }

    /// Enable the global rate limit.
    pub fn rate_limit(mut self, requests_per_second: f64, burst: usize) -> Self {
        self.config.rate_limit = Some(GlobalRateLimit {
            requests_per_second,
            burst,
        });
        self
    }

    /// Enable the per-key rate limit.
    pub fn keyed_rate_limit(
        mut self,
        requests_per_second: f64,
        burst: usize,
        max_keys: usize,
        key_source: RateLimitKeySource,
    ) -> Self {
        self.config.keyed_rate_limit = Some(KeyedRateLimit {
            requests_per_second,
            burst,
            max_keys,
            key_source,
        });
        self
    }

    /// Toggle input validation.
    pub fn validate_input(mut self, enabled: bool) -> Self {
        self.config.validate_input = enabled;
        self
    }

    /// Toggle output validation.
    pub fn validate_output(mut self, enabled: bool) -> Self {
        self.config.validate_output = enabled;
        self
    }

    /// Configure the circuit-breaker registry.
    pub fn breakers(mut self, failure_threshold: usize, recovery_timeout_ms: u64) -> Self {
        self.config.breakers.failure_threshold = failure_threshold;
        self.config.breakers.recovery_timeout_ms = recovery_timeout_ms;
        self
    }

    /// Toggle the breaker stage.
    pub fn breakers_enabled(mut self, enabled: bool) -> Self {
        self.config.breakers.enabled = enabled;
        self
    }

    /// Toggle the task engine.
    pub fn tasks_enabled(mut self, enabled: bool) -> Self {
        self.config.tasks.enabled = enabled;
        self
    }

    /// Set the event-store ring capacity.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Set the audit-log ring capacity.
    pub fn audit_capacity(mut self, capacity: usize) -> Self {
        self.config.audit_capacity = capacity;
        self
    }

    /// Inject a clock (tests use a manual clock).
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wire everything together.
    pub fn build(self) -> McpServer {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(MonotonicClock::shared);

        let mut sessions = SessionManager::new(clock.clone());
        sessions.set_max_sessions(config.max_sessions);
        sessions.set_idle_timeout(config.session_idle_timeout_ms);

        let mut rate_global = RateLimiter::new(clock.clone());
        if let Some(settings) = &config.rate_limit {
            rate_global.configure(settings.requests_per_second, settings.burst);
        }

        let rate_keyed = match &config.keyed_rate_limit {
            Some(settings) => KeyedRateLimiter::new(
                settings.requests_per_second,
                settings.burst,
                settings.max_keys,
                clock.clone(),
            ),
            None => {
                let mut limiter = KeyedRateLimiter::new(10.0, 5, 16, clock.clone());
                limiter.set_enabled(false);
                limiter
            }
        };

        let breakers = CircuitBreakerRegistry::new(
            config.breakers.failure_threshold,
            config.breakers.recovery_timeout_ms,
            config.breakers.max_breakers,
            config.breakers.half_open_successes,
            clock.clone(),
        );

        let state = ServerState {
            registry: Registry::new(),
            sessions: Mutex::new(sessions),
            access: RwLock::new(crate::access_control::AccessControl::new()),
            audit: Mutex::new(AuditLog::new(config.audit_capacity, clock.clone())),
            events: Mutex::new(EventStore::new(config.event_capacity, clock.clone())),
            state: Mutex::new(StateStore::new(config.state_capacity, clock.clone())),
            rate_global: Mutex::new(rate_global),
            rate_keyed: Mutex::new(rate_keyed),
            breakers: Mutex::new(breakers),
            retries: Mutex::new(RetryRegistry::new(config.retry_capacity, clock.clone())),
            watchdog: Mutex::new(Watchdog::new(config.watchdog_capacity)),
            scheduler: Mutex::new(Scheduler::new(config.scheduler_capacity, clock.clone())),
            tasks: TaskEngine::new(
                config.tasks.max_tasks,
                config.tasks.default_poll_interval_ms,
                clock.clone(),
            ),
            tracker: RequestTracker::new(config.cancelled_capacity, clock.clone()),
            log_filter: Mutex::new(LogLevel::Info),
            before_hook: RwLock::new(None),
            after_hook: RwLock::new(None),
            initialize_listener: RwLock::new(None),
            clock,
            config,
        };

        McpServer::from_state(state)
    }
}
