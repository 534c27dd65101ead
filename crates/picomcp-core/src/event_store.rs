//! Bounded ring-buffer event log.
//!
//! Tools and server internals emit tagged events (sensor readings, state
//! changes, errors) into a fixed-capacity ring; the oldest entry is evicted
//! on overflow. Sequence numbers are assigned monotonically and survive
//! eviction. Listeners fire synchronously inside `emit` and must not
//! re-enter the store.

use serde_json::Value;

use crate::clock::SharedClock;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventSeverity {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Something worth attention.
    Warning,
    /// A failure.
    Error,
    /// A failure demanding immediate action.
    Critical,
}

impl EventSeverity {
    /// The wire string for this severity.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Parse from a wire string; unknown strings map to Info.
    pub fn parse(s: &str) -> Self {
        match s {
            "debug" => Self::Debug,
            "warning" => Self::Warning,
            "error" => Self::Error,
            "critical" => Self::Critical,
            _ => Self::Info,
        }
    }
}

/// A stored event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Monotonic sequence number.
    pub seq: u32,
    /// Clock milliseconds when emitted.
    pub timestamp_ms: u64,
    /// Category tag, e.g. `temperature` or `gpio`.
    pub tag: String,
    /// Payload string, typically JSON.
    pub data: String,
    /// Severity level.
    pub severity: EventSeverity,
}

type Listener = Box<dyn Fn(&Event) + Send + Sync>;

/// Fixed-capacity event log with tag/severity/time/sequence filters.
pub struct EventStore {
    clock: SharedClock,
    capacity: usize,
    seq: u32,
    count: usize,
    head: usize,
    events: Vec<Option<Event>>,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("capacity", &self.capacity)
            .field("count", &self.count)
            .field("next_seq", &self.seq)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventStore {
    /// Create a store retaining at most `capacity` events (clamped to 1).
    pub fn new(capacity: usize, clock: SharedClock) -> Self {
        let capacity = capacity.max(1);
        Self {
            clock,
            capacity,
            seq: 0,
            count: 0,
            head: 0,
            events: (0..capacity).map(|_| None).collect(),
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// Store a new event, evicting the oldest at capacity. Listeners are
    /// notified before returning. Returns the assigned sequence number.
    pub fn emit(&mut self, tag: &str, data: &str, severity: EventSeverity) -> u32 {
        let seq = self.seq;
        self.seq += 1;

        let event = Event {
            seq,
            timestamp_ms: self.clock.now_ms(),
            tag: tag.to_string(),
            data: data.to_string(),
            severity,
        };

        let idx = self.head;
        self.events[idx] = Some(event);
        self.head = (self.head + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }

        let stored = self.events[idx].as_ref().expect("just stored");
        for (_, listener) in &self.listeners {
            listener(stored);
        }

        seq
    }

    fn collect(&self, pred: impl Fn(&Event) -> bool) -> Vec<Event> {
        let mut result = Vec::new();
        if self.count == 0 {
            return result;
        }
        let start = if self.count < self.capacity {
            0
        } else {
            self.head
        };
        for i in 0..self.count {
            let idx = (start + i) % self.capacity;
            if let Some(event) = &self.events[idx] {
                if pred(event) {
                    result.push(event.clone());
                }
            }
        }
        result
    }

    /// All stored events, oldest first.
    pub fn all(&self) -> Vec<Event> {
        self.collect(|_| true)
    }

    /// Events with a matching tag.
    pub fn by_tag(&self, tag: &str) -> Vec<Event> {
        self.collect(|e| e.tag == tag)
    }

    /// Events with severity >= `min`.
    pub fn by_severity(&self, min: EventSeverity) -> Vec<Event> {
        self.collect(|e| e.severity >= min)
    }

    /// Events emitted at or after `since_ms`.
    pub fn since(&self, since_ms: u64) -> Vec<Event> {
        self.collect(|e| e.timestamp_ms >= since_ms)
    }

    /// Events with sequence number >= `since_seq`. Note: inclusive, unlike
    /// the audit log's strictly-greater convention.
    pub fn since_seq(&self, since_seq: u32) -> Vec<Event> {
        self.collect(|e| e.seq >= since_seq)
    }

    /// The most recent `n` events, oldest first.
    pub fn last(&self, n: usize) -> Vec<Event> {
        let mut result = self.all();
        if result.len() > n {
            result.drain(..result.len() - n);
        }
        result
    }

    /// Combined filter: tag (empty = any), minimum severity, since
    /// timestamp (0 = any).
    pub fn query(&self, tag: &str, min_severity: EventSeverity, since_ms: u64) -> Vec<Event> {
        self.collect(|e| {
            if !tag.is_empty() && e.tag != tag {
                return false;
            }
            if e.severity < min_severity {
                return false;
            }
            if since_ms > 0 && e.timestamp_ms < since_ms {
                return false;
            }
            true
        })
    }

    /// Distinct tags currently in the store, in first-seen order.
    pub fn tags(&self) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for event in self.all() {
            if !result.iter().any(|t| *t == event.tag) {
                result.push(event.tag);
            }
        }
        result
    }

    /// Register a listener called on every emit. Returns a removal id.
    pub fn on_event(&mut self, listener: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener by id.
    pub fn remove_listener(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Drop all listeners.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Drop all events and reset the sequence counter to 0.
    pub fn clear(&mut self) {
        self.count = 0;
        self.head = 0;
        self.seq = 0;
        for slot in &mut self.events {
            *slot = None;
        }
    }

    /// Number of stored events.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Ring capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The sequence number the next emit will be assigned.
    pub fn next_seq(&self) -> u32 {
        self.seq
    }

    /// True when the oldest events are being evicted.
    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    /// Serialize events to a JSON array. Payloads that are themselves JSON
    /// objects or arrays are embedded raw, so JSON stays JSON.
    pub fn to_json(&self, events: &[Event]) -> Value {
        let items: Vec<Value> = events
            .iter()
            .map(|e| {
                let data = if e.data.starts_with('{') || e.data.starts_with('[') {
                    serde_json::from_str(&e.data)
                        .unwrap_or_else(|_| Value::String(e.data.clone()))
                } else {
                    Value::String(e.data.clone())
                };
                serde_json::json!({
                    "seq": e.seq,
                    "ts": e.timestamp_ms,
                    "tag": e.tag,
                    "severity": e.severity.as_str(),
                    "data": data,
                })
            })
            .collect();
        Value::Array(items)
    }

    /// Serialize every stored event.
    pub fn to_json_all(&self) -> Value {
        self.to_json(&self.all())
    }

    /// Summary statistics: counts, capacity, eviction count, per-severity
    /// tallies.
    pub fn stats_json(&self) -> Value {
        let mut counts = [0usize; 5];
        for event in self.all() {
            counts[event.severity as usize] += 1;
        }
        let evicted = (self.seq as usize).saturating_sub(self.capacity);
        serde_json::json!({
            "count": self.count,
            "capacity": self.capacity,
            "nextSeq": self.seq,
            "full": self.is_full(),
            "evicted": evicted,
            "bySeverity": {
                "debug": counts[0],
                "info": counts[1],
                "warning": counts[2],
                "error": counts[3],
                "critical": counts[4],
            }
        })
    }
}
