//! Multi-session tracking with capacity limits and idle timeouts.
//!
//! A session is created on a successful `initialize`, touched on every
//! subsequent request bearing its id, and destroyed on explicit close, idle
//! timeout, or most-idle eviction when the configured capacity is exceeded.

use serde_json::Value;
use std::collections::HashMap;

use crate::clock::SharedClock;

/// A live client session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque 128-bit hex identity.
    pub id: String,
    /// Client name from the initialize handshake.
    pub client_name: String,
    /// Clock milliseconds at creation.
    pub created_at: u64,
    /// Clock milliseconds of the most recent request.
    pub last_activity: u64,
    /// True once the initialize exchange completed.
    pub initialized: bool,
}

impl Session {
    /// Milliseconds since creation.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// Milliseconds since the last request.
    pub fn idle_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_activity)
    }
}

/// Capacity-bounded session set.
pub struct SessionManager {
    clock: SharedClock,
    sessions: HashMap<String, Session>,
    max_sessions: usize,
    idle_timeout_ms: u64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("active", &self.sessions.len())
            .field("max_sessions", &self.max_sessions)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .finish()
    }
}

impl SessionManager {
    /// Create a manager with the default limits (4 sessions, 30 minute
    /// idle timeout).
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            sessions: HashMap::new(),
            max_sessions: 4,
            idle_timeout_ms: 30 * 60 * 1000,
        }
    }

    /// Set the maximum concurrent sessions (0 = unlimited).
    pub fn set_max_sessions(&mut self, max: usize) {
        self.max_sessions = max;
    }

    /// Set the idle timeout in milliseconds (0 = no timeout).
    pub fn set_idle_timeout(&mut self, timeout_ms: u64) {
        self.idle_timeout_ms = timeout_ms;
    }

    /// Create a session for a client. Prunes expired sessions first and
    /// evicts the most-idle session at capacity. Returns None when every
    /// slot is held by a session that cannot be evicted.
    pub fn create_session(&mut self, client_name: &str) -> Option<String> {
        self.prune_expired();

        if self.max_sessions > 0
            && self.sessions.len() >= self.max_sessions
            && !self.evict_most_idle()
        {
            return None;
        }

        let now = self.clock.now_ms();
        let id = uuid::Uuid::new_v4().simple().to_string();
        tracing::info!(session = %id, client = client_name, "session created");
        self.sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                client_name: client_name.to_string(),
                created_at: now,
                last_activity: now,
                initialized: true,
            },
        );
        Some(id)
    }

    /// Validate and touch a session. Expired sessions fail validation and
    /// are removed.
    pub fn validate_session(&mut self, id: &str) -> bool {
        let now = self.clock.now_ms();
        let expired = match self.sessions.get_mut(id) {
            None => return false,
            Some(session) => {
                if self.idle_timeout_ms > 0 && session.idle_ms(now) > self.idle_timeout_ms {
                    true
                } else {
                    session.last_activity = now;
                    return true;
                }
            }
        };
        if expired {
            self.sessions.remove(id);
        }
        false
    }

    /// Remove a session (client disconnect or explicit close).
    pub fn remove_session(&mut self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Look up a session without touching it.
    pub fn get_session(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Remove sessions idle past the timeout.
    pub fn prune_expired(&mut self) {
        if self.idle_timeout_ms == 0 {
            return;
        }
        let now = self.clock.now_ms();
        let timeout = self.idle_timeout_ms;
        self.sessions.retain(|id, session| {
            let keep = session.idle_ms(now) <= timeout;
            if !keep {
                tracing::info!(session = %id, idle_ms = session.idle_ms(now), "session expired");
            }
            keep
        });
    }

    fn evict_most_idle(&mut self) -> bool {
        let now = self.clock.now_ms();
        let victim = self
            .sessions
            .values()
            .max_by_key(|s| s.idle_ms(now))
            .map(|s| s.id.clone());
        match victim {
            Some(id) => {
                tracing::info!(session = %id, "evicting most-idle session at capacity");
                self.sessions.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ids of every live session.
    pub fn ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Configured maximum (0 = unlimited).
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Configured idle timeout.
    pub fn idle_timeout(&self) -> u64 {
        self.idle_timeout_ms
    }

    /// Diagnostic summary.
    pub fn summary(&self) -> Value {
        let now = self.clock.now_ms();
        let sessions: Vec<Value> = self
            .sessions
            .values()
            .map(|s| {
                serde_json::json!({
                    "id": format!("{}...", &s.id[..8.min(s.id.len())]),
                    "client": s.client_name,
                    "idleMs": s.idle_ms(now),
                    "ageMs": s.age_ms(now),
                })
            })
            .collect();
        serde_json::json!({
            "activeSessions": self.sessions.len(),
            "maxSessions": self.max_sessions,
            "idleTimeoutMs": self.idle_timeout_ms,
            "sessions": sessions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Arc;

    fn manager() -> (SessionManager, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        (SessionManager::new(clock.clone()), clock)
    }

    #[test]
    fn ids_are_128_bit_hex() {
        let (mut mgr, _) = manager();
        let id = mgr.create_session("claude").unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn validate_touches_last_activity() {
        let (mut mgr, clock) = manager();
        let id = mgr.create_session("c").unwrap();
        clock.advance(1000);
        assert!(mgr.validate_session(&id));
        let session = mgr.get_session(&id).unwrap();
        assert_eq!(session.last_activity, 1000);
        assert_eq!(session.idle_ms(clock.now_ms()), 0);
    }

    #[test]
    fn unknown_session_fails_validation() {
        let (mut mgr, _) = manager();
        assert!(!mgr.validate_session("deadbeef"));
    }

    #[test]
    fn idle_sessions_expire() {
        let (mut mgr, clock) = manager();
        mgr.set_idle_timeout(1000);
        let id = mgr.create_session("c").unwrap();
        clock.advance(1001);
        assert!(!mgr.validate_session(&id));
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn capacity_bound_holds_under_churn() {
        let (mut mgr, clock) = manager();
        mgr.set_max_sessions(3);
        mgr.set_idle_timeout(0);
        for i in 0..10 {
            clock.advance(10);
            assert!(mgr.create_session(&format!("client-{i}")).is_some());
            assert!(mgr.active_count() <= 3);
        }
        assert_eq!(mgr.active_count(), 3);
    }

    #[test]
    fn eviction_removes_most_idle() {
        let (mut mgr, clock) = manager();
        mgr.set_max_sessions(2);
        mgr.set_idle_timeout(0);
        let a = mgr.create_session("a").unwrap();
        clock.advance(10);
        let b = mgr.create_session("b").unwrap();
        clock.advance(10);
        mgr.validate_session(&a); // a is now fresher than b
        clock.advance(10);
        let c = mgr.create_session("c").unwrap();

        assert!(mgr.get_session(&a).is_some());
        assert!(mgr.get_session(&b).is_none());
        assert!(mgr.get_session(&c).is_some());
    }

    #[test]
    fn remove_session() {
        let (mut mgr, _) = manager();
        let id = mgr.create_session("c").unwrap();
        assert!(mgr.remove_session(&id));
        assert!(!mgr.remove_session(&id));
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn prune_removes_only_expired() {
        let (mut mgr, clock) = manager();
        mgr.set_idle_timeout(100);
        let old = mgr.create_session("old").unwrap();
        clock.advance(90);
        let fresh = mgr.create_session("fresh").unwrap();
        clock.advance(20); // old idle 110 > 100, fresh idle 20
        mgr.prune_expired();
        assert!(mgr.get_session(&old).is_none());
        assert!(mgr.get_session(&fresh).is_some());
    }

    #[test]
    fn unlimited_capacity() {
        let (mut mgr, _) = manager();
        mgr.set_max_sessions(0);
        mgr.set_idle_timeout(0);
        for i in 0..20 {
            assert!(mgr.create_session(&format!("c{i}")).is_some());
        }
        assert_eq!(mgr.active_count(), 20);
    }

    #[test]
    fn summary_shape() {
        let (mut mgr, _) = manager();
        mgr.create_session("claude");
        let summary = mgr.summary();
        assert_eq!(summary["activeSessions"], 1);
        assert_eq!(summary["sessions"][0]["client"], "claude");
    }
}
