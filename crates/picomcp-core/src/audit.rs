//! Bounded security audit trail.
//!
//! A ring buffer of typed security events: tool calls, RBAC denials,
//! authentication attempts, session lifecycle, role changes, and custom
//! entries. The sequence counter survives `clear` and is only zeroed by
//! `reset`.

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;

use crate::clock::SharedClock;

/// Kind of a recorded security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A tool was invoked.
    ToolCall,
    /// A tool call was blocked by RBAC.
    AccessDenied,
    /// Successful authentication.
    AuthSuccess,
    /// Failed authentication attempt.
    AuthFailure,
    /// New session established.
    SessionStart,
    /// Session closed.
    SessionEnd,
    /// A role or mapping was modified.
    RoleChange,
    /// Application-defined event.
    Custom,
}

impl AuditAction {
    /// The wire string for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::AccessDenied => "access_denied",
            Self::AuthSuccess => "auth_success",
            Self::AuthFailure => "auth_failure",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::RoleChange => "role_change",
            Self::Custom => "custom",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Monotonic sequence number (1-based).
    pub seq: u32,
    /// Clock milliseconds at the time of the event.
    pub timestamp_ms: u64,
    /// What happened.
    pub action: AuditAction,
    /// Who did it (role, key, session id).
    pub actor: String,
    /// What was acted on (tool name, resource).
    pub target: String,
    /// Additional context.
    pub detail: String,
    /// Whether the action succeeded.
    pub success: bool,
}

type Listener = Box<dyn Fn(&AuditEntry) + Send + Sync>;

/// Ring-buffered audit log with a real-time listener hook.
pub struct AuditLog {
    clock: SharedClock,
    capacity: usize,
    seq: u32,
    enabled: bool,
    entries: VecDeque<AuditEntry>,
    listener: Option<Listener>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("capacity", &self.capacity)
            .field("count", &self.entries.len())
            .field("seq", &self.seq)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AuditLog {
    /// Create a log with the given ring capacity (clamped to 1).
    pub fn new(capacity: usize, clock: SharedClock) -> Self {
        Self {
            clock,
            capacity: capacity.max(1),
            seq: 0,
            enabled: true,
            entries: VecDeque::new(),
            listener: None,
        }
    }

    /// Enable or disable recording. While disabled, `log` is a no-op.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether recording is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ring capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Resize the ring; oldest entries beyond the new capacity are evicted.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Record an audit event.
    pub fn log(
        &mut self,
        action: AuditAction,
        actor: &str,
        target: &str,
        detail: &str,
        success: bool,
    ) {
        if !self.enabled {
            return;
        }
        self.seq += 1;
        let entry = AuditEntry {
            seq: self.seq,
            timestamp_ms: self.clock.now_ms(),
            action,
            actor: actor.to_string(),
            target: target.to_string(),
            detail: detail.to_string(),
            success,
        };
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        if !success {
            tracing::warn!(action = action.as_str(), actor, target, "audit failure recorded");
        }
        self.entries.push_back(entry);
        if let Some(listener) = &self.listener {
            listener(self.entries.back().expect("just pushed"));
        }
    }

    /// Record a tool invocation.
    pub fn log_tool_call(&mut self, actor: &str, tool: &str, params: &str, success: bool) {
        self.log(AuditAction::ToolCall, actor, tool, params, success);
    }

    /// Record an RBAC denial.
    pub fn log_access_denied(&mut self, actor: &str, tool: &str, reason: &str) {
        self.log(AuditAction::AccessDenied, actor, tool, reason, false);
    }

    /// Record an authentication attempt.
    pub fn log_auth(&mut self, identifier: &str, success: bool, detail: &str) {
        let action = if success {
            AuditAction::AuthSuccess
        } else {
            AuditAction::AuthFailure
        };
        self.log(action, identifier, "", detail, success);
    }

    /// Record session start/end.
    pub fn log_session(&mut self, session_id: &str, start: bool, detail: &str) {
        let action = if start {
            AuditAction::SessionStart
        } else {
            AuditAction::SessionEnd
        };
        self.log(action, session_id, "", detail, true);
    }

    /// Record a role or mapping change.
    pub fn log_role_change(&mut self, actor: &str, detail: &str) {
        self.log(AuditAction::RoleChange, actor, "", detail, true);
    }

    /// All buffered entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    /// Entries with a given action.
    pub fn by_action(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    /// Entries by a given actor.
    pub fn by_actor(&self, actor: &str) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.actor == actor)
            .cloned()
            .collect()
    }

    /// Entries with a given target.
    pub fn by_target(&self, target: &str) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.target == target)
            .cloned()
            .collect()
    }

    /// Entries at or after a timestamp.
    pub fn since(&self, ts_ms: u64) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.timestamp_ms >= ts_ms)
            .cloned()
            .collect()
    }

    /// Entries with sequence number strictly greater than `after_seq`.
    /// Note: exclusive, unlike the event store's inclusive convention.
    pub fn since_seq(&self, after_seq: u32) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.seq > after_seq)
            .cloned()
            .collect()
    }

    /// Failed entries only.
    pub fn failures(&self) -> Vec<AuditEntry> {
        self.entries.iter().filter(|e| !e.success).cloned().collect()
    }

    /// The most recent `n` entries, oldest first.
    pub fn last(&self, n: usize) -> Vec<AuditEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Count of entries with a given action.
    pub fn count_by_action(&self, action: AuditAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    /// Total events ever logged (survives clear).
    pub fn current_seq(&self) -> u32 {
        self.seq
    }

    /// Register the real-time listener (at most one).
    pub fn set_listener(&mut self, listener: impl Fn(&AuditEntry) + Send + Sync + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Remove the listener.
    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    /// Drop buffered entries; the sequence counter is preserved.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop buffered entries and zero the sequence counter.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.seq = 0;
    }

    /// Serialize all entries to a JSON array.
    pub fn to_json(&self) -> Value {
        let items: Vec<Value> = self
            .entries
            .iter()
            .map(|e| {
                let mut obj = serde_json::json!({
                    "seq": e.seq,
                    "time": e.timestamp_ms,
                    "action": e.action.as_str(),
                    "actor": e.actor,
                    "success": e.success,
                });
                if !e.target.is_empty() {
                    obj["target"] = Value::String(e.target.clone());
                }
                if !e.detail.is_empty() {
                    obj["detail"] = Value::String(e.detail.clone());
                }
                obj
            })
            .collect();
        Value::Array(items)
    }

    /// Summary statistics.
    pub fn stats_json(&self) -> Value {
        serde_json::json!({
            "total": self.seq,
            "buffered": self.entries.len(),
            "capacity": self.capacity,
            "tool_calls": self.count_by_action(AuditAction::ToolCall),
            "access_denied": self.count_by_action(AuditAction::AccessDenied),
            "auth_success": self.count_by_action(AuditAction::AuthSuccess),
            "auth_failure": self.count_by_action(AuditAction::AuthFailure),
            "failures": self.entries.iter().filter(|e| !e.success).count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn log(capacity: usize) -> AuditLog {
        AuditLog::new(capacity, ManualClock::shared())
    }

    #[test]
    fn sequence_starts_at_one_and_increments() {
        let mut audit = log(8);
        audit.log_tool_call("admin", "gpio_write", "{}", true);
        audit.log_access_denied("guest", "gpio_write", "");
        let entries: Vec<_> = audit.entries().collect();
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[1].seq, 2);
    }

    #[test]
    fn ring_evicts_oldest() {
        let mut audit = log(2);
        audit.log_tool_call("a", "t1", "", true);
        audit.log_tool_call("a", "t2", "", true);
        audit.log_tool_call("a", "t3", "", true);
        let entries: Vec<_> = audit.entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].target, "t2");
        assert_eq!(audit.current_seq(), 3);
    }

    #[test]
    fn clear_keeps_sequence_reset_zeroes_it() {
        let mut audit = log(8);
        audit.log_tool_call("a", "t", "", true);
        audit.clear();
        assert_eq!(audit.count(), 0);
        assert_eq!(audit.current_seq(), 1);
        audit.reset();
        assert_eq!(audit.current_seq(), 0);
    }

    #[test]
    fn since_seq_is_exclusive() {
        let mut audit = log(8);
        audit.log_tool_call("a", "t1", "", true);
        audit.log_tool_call("a", "t2", "", true);
        audit.log_tool_call("a", "t3", "", true);
        let after = audit.since_seq(1);
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].seq, 2);
    }

    #[test]
    fn action_and_actor_filters() {
        let mut audit = log(8);
        audit.log_tool_call("admin", "gpio_write", "", true);
        audit.log_access_denied("viewer", "gpio_write", "role not allowed");
        audit.log_auth("key-abc", false, "");

        assert_eq!(audit.by_action(AuditAction::AccessDenied).len(), 1);
        assert_eq!(audit.by_actor("viewer").len(), 1);
        assert_eq!(audit.by_target("gpio_write").len(), 2);
        assert_eq!(audit.failures().len(), 2);
    }

    #[test]
    fn disabled_log_records_nothing() {
        let mut audit = log(8);
        audit.set_enabled(false);
        audit.log_tool_call("a", "t", "", true);
        assert_eq!(audit.count(), 0);
        assert_eq!(audit.current_seq(), 0);
    }

    #[test]
    fn listener_fires_per_entry() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        let mut audit = log(8);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        audit.set_listener(move |entry| {
            assert!(entry.seq > 0);
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        audit.log_session("s1", true, "");
        audit.log_session("s1", false, "");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        audit.clear_listener();
        audit.log_role_change("admin", "added viewer");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn json_omits_empty_target_and_detail() {
        let mut audit = log(8);
        audit.log_auth("key-1", true, "");
        let json = audit.to_json();
        assert_eq!(json[0]["action"], "auth_success");
        assert!(json[0].get("target").is_none());
        assert!(json[0].get("detail").is_none());
    }

    #[test]
    fn stats_shape() {
        let mut audit = log(8);
        audit.log_tool_call("a", "t", "", true);
        audit.log_access_denied("b", "t", "");
        let stats = audit.stats_json();
        assert_eq!(stats["total"], 2);
        assert_eq!(stats["tool_calls"], 1);
        assert_eq!(stats["access_denied"], 1);
        assert_eq!(stats["failures"], 1);
    }
}
