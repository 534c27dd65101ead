//! Software watchdog: named deadline monitors.
//!
//! Work items register a name and a timeout, then periodically `kick` to
//! prove liveness. `check` scans every started, unpaused entry and fires
//! the per-entry and global callbacks once per expiry; a later kick returns
//! the entry to healthy.

use serde_json::Value;
use std::sync::Arc;

/// State of a watchdog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Deadline not missed.
    Healthy,
    /// Deadline missed; callback fired.
    Expired,
    /// Checks suppressed.
    Paused,
}

impl WatchdogState {
    /// The wire string for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Expired => "expired",
            Self::Paused => "paused",
        }
    }
}

/// Per-entry timeout callback.
pub type PerTaskCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Global timeout callback: `(name, timeout_count)`.
pub type TimeoutCallback = Arc<dyn Fn(&str, u32) + Send + Sync>;

struct Entry {
    name: String,
    timeout_ms: u64,
    last_kick_ms: u64,
    started: bool,
    state: WatchdogState,
    timeout_count: u32,
    callback: Option<PerTaskCallback>,
}

/// Fixed-capacity watchdog table.
pub struct Watchdog {
    max_entries: usize,
    entries: Vec<Entry>,
    global_callback: Option<TimeoutCallback>,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("count", &self.entries.len())
            .field("capacity", &self.max_entries)
            .finish()
    }
}

impl Watchdog {
    /// Create a watchdog holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: Vec::new(),
            global_callback: None,
        }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Register an entry. Fails on empty timeout, duplicate name, or a
    /// full table.
    pub fn add(&mut self, name: &str, timeout_ms: u64, callback: Option<PerTaskCallback>) -> bool {
        if name.is_empty() || timeout_ms == 0 {
            return false;
        }
        if self.find(name).is_some() || self.entries.len() >= self.max_entries {
            return false;
        }
        self.entries.push(Entry {
            name: name.to_string(),
            timeout_ms,
            last_kick_ms: 0,
            started: false,
            state: WatchdogState::Healthy,
            timeout_count: 0,
            callback,
        });
        true
    }

    /// Remove an entry by name.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Feed an entry, resetting its deadline. Paused entries refuse kicks.
    pub fn kick(&mut self, name: &str, now_ms: u64) -> bool {
        let Some(idx) = self.find(name) else {
            return false;
        };
        let entry = &mut self.entries[idx];
        if entry.state == WatchdogState::Paused {
            return false;
        }
        entry.last_kick_ms = now_ms;
        entry.started = true;
        entry.state = WatchdogState::Healthy;
        true
    }

    /// Scan every started, unpaused entry and fire callbacks for entries
    /// whose deadline has elapsed. Returns the number newly expired.
    pub fn check(&mut self, now_ms: u64) -> usize {
        let mut fired = 0;
        let global = self.global_callback.clone();
        for entry in &mut self.entries {
            if entry.state == WatchdogState::Paused || !entry.started {
                continue;
            }
            let elapsed = now_ms.saturating_sub(entry.last_kick_ms);
            if elapsed >= entry.timeout_ms && entry.state != WatchdogState::Expired {
                entry.state = WatchdogState::Expired;
                entry.timeout_count += 1;
                fired += 1;
                tracing::warn!(name = %entry.name, count = entry.timeout_count, "watchdog expired");
                if let Some(callback) = &entry.callback {
                    callback(&entry.name);
                }
                if let Some(callback) = &global {
                    callback(&entry.name, entry.timeout_count);
                }
            }
        }
        fired
    }

    /// Suppress checks on an entry.
    pub fn pause(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(idx) => {
                self.entries[idx].state = WatchdogState::Paused;
                true
            }
            None => false,
        }
    }

    /// Resume a paused entry with a fresh deadline.
    pub fn resume(&mut self, name: &str, now_ms: u64) -> bool {
        let Some(idx) = self.find(name) else {
            return false;
        };
        let entry = &mut self.entries[idx];
        if entry.state != WatchdogState::Paused {
            return false;
        }
        entry.state = WatchdogState::Healthy;
        entry.last_kick_ms = now_ms;
        entry.started = true;
        true
    }

    /// The state of an entry; unknown names read as expired.
    pub fn state(&self, name: &str) -> WatchdogState {
        match self.find(name) {
            Some(idx) => self.entries[idx].state,
            None => WatchdogState::Expired,
        }
    }

    /// Lifetime expiry count for an entry.
    pub fn timeout_count(&self, name: &str) -> u32 {
        self.find(name)
            .map(|idx| self.entries[idx].timeout_count)
            .unwrap_or(0)
    }

    /// The configured timeout for an entry.
    pub fn timeout(&self, name: &str) -> u64 {
        self.find(name)
            .map(|idx| self.entries[idx].timeout_ms)
            .unwrap_or(0)
    }

    /// Update an entry's timeout; takes effect at the next check.
    pub fn set_timeout(&mut self, name: &str, timeout_ms: u64) -> bool {
        if timeout_ms == 0 {
            return false;
        }
        match self.find(name) {
            Some(idx) => {
                self.entries[idx].timeout_ms = timeout_ms;
                true
            }
            None => false,
        }
    }

    /// Zero the expiry count for an entry.
    pub fn reset_count(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(idx) => {
                self.entries[idx].timeout_count = 0;
                true
            }
            None => false,
        }
    }

    /// Install the global timeout listener.
    pub fn on_timeout(&mut self, callback: impl Fn(&str, u32) + Send + Sync + 'static) {
        self.global_callback = Some(Arc::new(callback));
    }

    /// True when a named entry exists.
    pub fn exists(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Number of entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Table capacity.
    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Number of expired entries.
    pub fn expired_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == WatchdogState::Expired)
            .count()
    }

    /// Number of healthy entries.
    pub fn healthy_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == WatchdogState::Healthy)
            .count()
    }

    /// Number of paused entries.
    pub fn paused_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == WatchdogState::Paused)
            .count()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serialize the table to JSON.
    pub fn to_json(&self) -> Value {
        let entries: Vec<Value> = self
            .entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "timeoutMs": e.timeout_ms,
                    "state": e.state.as_str(),
                    "timeoutCount": e.timeout_count,
                    "started": e.started,
                })
            })
            .collect();
        serde_json::json!({
            "entries": entries,
            "count": self.entries.len(),
            "capacity": self.max_entries,
        })
    }
}
