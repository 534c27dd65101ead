//! Key-value state store with change notification, TTL, dirty tracking,
//! bounded capacity, and transactional commit.
//!
//! Keys are arbitrary strings; hierarchical prefixes (`sensor.temp`) are a
//! convention, not a structure. Listeners receive `(key, old, new)` with an
//! empty string standing in for the absent side of an insert or removal,
//! and run synchronously inside the mutating call.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::clock::SharedClock;

#[derive(Debug, Clone)]
struct StateEntry {
    value: String,
    last_access: u64,
    created_at: u64,
    ttl_ms: u64,
    dirty: bool,
}

#[derive(Debug, Clone)]
struct TxEntry {
    value: String,
    ttl_ms: u64,
}

type ChangeListener = Box<dyn Fn(&str, &str, &str) + Send + Sync>;

/// Bounded key-value store with listeners and transactions.
pub struct StateStore {
    clock: SharedClock,
    entries: BTreeMap<String, StateEntry>,
    listeners: Vec<(u64, ChangeListener)>,
    next_listener_id: u64,
    max_entries: usize,
    in_transaction: bool,
    tx_buffer: BTreeMap<String, TxEntry>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("count", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

impl StateStore {
    /// Create a store with a maximum entry count (0 = unlimited).
    pub fn new(max_entries: usize, clock: SharedClock) -> Self {
        Self {
            clock,
            entries: BTreeMap::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
            max_entries,
            in_transaction: false,
            tx_buffer: BTreeMap::new(),
        }
    }

    fn expired(&self, entry: &StateEntry, now: u64) -> bool {
        entry.ttl_ms > 0 && now.saturating_sub(entry.created_at) > entry.ttl_ms
    }

    fn notify(&self, key: &str, old: &str, new: &str) {
        for (_, listener) in &self.listeners {
            listener(key, old, new);
        }
    }

    /// Set a key. Inside a transaction the write is buffered. Returns true
    /// when the write was (or will be) a change; a set that leaves value
    /// and TTL identical is a no-op returning false.
    pub fn set(&mut self, key: &str, value: &str, ttl_ms: u64) -> bool {
        if key.is_empty() {
            return false;
        }
        if self.in_transaction {
            self.tx_buffer.insert(
                key.to_string(),
                TxEntry {
                    value: value.to_string(),
                    ttl_ms,
                },
            );
            return true;
        }
        self.apply_set(key, value, ttl_ms)
    }

    fn apply_set(&mut self, key: &str, value: &str, ttl_ms: u64) -> bool {
        let now = self.clock.now_ms();

        if let Some(entry) = self.entries.get_mut(key) {
            if entry.value == value && entry.ttl_ms == ttl_ms {
                entry.last_access = now;
                return false;
            }
            let old = std::mem::replace(&mut entry.value, value.to_string());
            entry.last_access = now;
            entry.ttl_ms = ttl_ms;
            if ttl_ms > 0 {
                entry.created_at = now;
            }
            entry.dirty = true;
            self.notify(key, &old, value);
            return true;
        }

        if self.max_entries > 0 && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }

        self.entries.insert(
            key.to_string(),
            StateEntry {
                value: value.to_string(),
                last_access: now,
                created_at: now,
                ttl_ms,
                dirty: true,
            },
        );
        self.notify(key, "", value);
        true
    }

    fn evict_oldest(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone());
        if let Some(key) = victim {
            if let Some(entry) = self.entries.remove(&key) {
                tracing::debug!(key = %key, "state store evicting least-recently-used entry");
                self.notify(&key, &entry.value, "");
            }
        }
    }

    /// Get a value. Absent and expired keys return None. Touches the
    /// entry's last-access time. Inside a transaction, buffered writes are
    /// not visible.
    pub fn get(&mut self, key: &str) -> Option<String> {
        let now = self.clock.now_ms();
        let entry = self.entries.get_mut(key)?;
        if entry.ttl_ms > 0 && now.saturating_sub(entry.created_at) > entry.ttl_ms {
            return None;
        }
        entry.last_access = now;
        Some(entry.value.clone())
    }

    /// True when the key is present and not expired.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        match self.entries.get(key) {
            Some(entry) => !self.expired(entry, now),
            None => false,
        }
    }

    /// Remove a key, notifying listeners. Returns true if it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.notify(key, &entry.value, "");
                true
            }
            None => false,
        }
    }

    /// Keys matching a prefix (empty prefix = all), excluding expired
    /// entries.
    pub fn keys(&self, prefix: &str) -> Vec<String> {
        let now = self.clock.now_ms();
        self.entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !self.expired(e, now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of entries, including not-yet-purged expired ones.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Configured capacity (0 = unlimited).
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Remove every expired entry, notifying listeners. Returns the number
    /// purged.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now_ms();
        let victims: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| self.expired(e, now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &victims {
            if let Some(entry) = self.entries.remove(key) {
                self.notify(key, &entry.value, "");
            }
        }
        victims.len()
    }

    /// Remove every entry, notifying listeners for each.
    pub fn clear(&mut self) {
        let drained: Vec<(String, StateEntry)> = std::mem::take(&mut self.entries)
            .into_iter()
            .collect();
        for (key, entry) in drained {
            self.notify(&key, &entry.value, "");
        }
    }

    /// Register a change listener. Returns a removal id.
    pub fn on_change(&mut self, listener: impl Fn(&str, &str, &str) + Send + Sync + 'static) -> u64 {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a change listener by id.
    pub fn remove_listener(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Keys changed since the last `clear_dirty`.
    pub fn dirty_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// True when any entry is dirty.
    pub fn is_dirty(&self) -> bool {
        self.entries.values().any(|e| e.dirty)
    }

    /// Clear the dirty flag on every entry.
    pub fn clear_dirty(&mut self) {
        for entry in self.entries.values_mut() {
            entry.dirty = false;
        }
    }

    /// Begin a transaction: subsequent sets buffer until commit.
    pub fn begin(&mut self) {
        self.in_transaction = true;
        self.tx_buffer.clear();
    }

    /// Apply buffered writes. Returns the number of applied changes; each
    /// applied change fires exactly one notification.
    pub fn commit(&mut self) -> usize {
        if !self.in_transaction {
            return 0;
        }
        self.in_transaction = false;
        let buffer = std::mem::take(&mut self.tx_buffer);
        let mut applied = 0;
        for (key, tx) in buffer {
            if self.apply_set(&key, &tx.value, tx.ttl_ms) {
                applied += 1;
            }
        }
        applied
    }

    /// Discard buffered writes.
    pub fn rollback(&mut self) {
        self.in_transaction = false;
        self.tx_buffer.clear();
    }

    /// True while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Export the visible (non-expired) view as a flat JSON object.
    pub fn to_json(&self) -> Value {
        let now = self.clock.now_ms();
        let mut map = serde_json::Map::new();
        for (key, entry) in &self.entries {
            if self.expired(entry, now) {
                continue;
            }
            map.insert(key.clone(), Value::String(entry.value.clone()));
        }
        Value::Object(map)
    }

    /// Import a flat `{key: value}` JSON object, merging into the current
    /// state. Returns the number of keys imported.
    pub fn from_json(&mut self, json: &str) -> usize {
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(json) else {
            return 0;
        };
        let mut imported = 0;
        for (key, value) in map {
            if let Value::String(s) = value {
                self.set(&key, &s, 0);
                imported += 1;
            }
        }
        imported
    }

    /// Summary statistics.
    pub fn stats_json(&self) -> Value {
        let dirty = self.entries.values().filter(|e| e.dirty).count();
        serde_json::json!({
            "count": self.entries.len(),
            "maxEntries": self.max_entries,
            "dirty": dirty,
            "listeners": self.listeners.len(),
            "inTransaction": self.in_transaction,
        })
    }
}
