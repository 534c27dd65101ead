//! Request tracking, per-session outboxes, and server-initiated requests.
//!
//! The tracker holds the in-flight request-id → progress-token map and a
//! bounded list of recently cancelled ids that long-running handlers
//! consult at checkpoints. Server-initiated messages (progress and log
//! notifications, sampling and elicitation requests) are appended to a
//! per-session outbox that the transport drains on its own cadence;
//! sampling and elicitation correlate responses through id spaces disjoint
//! from client ids and expire through periodic pruning.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};

use picomcp_core::SharedClock;
use picomcp_protocol::jsonrpc::{JsonRpcNotification, JsonRpcRequest};
use picomcp_protocol::types::elicitation::ElicitRequest;
use picomcp_protocol::types::progress::ProgressParams;
use picomcp_protocol::types::sampling::CreateMessageParams;
use picomcp_protocol::RequestId;

/// First correlation id for server-initiated sampling requests.
const SAMPLING_ID_BASE: i64 = 5000;
/// First correlation id for server-initiated elicitation requests.
const ELICITATION_ID_BASE: i64 = 8000;

/// Callback invoked with the client's result, or None on an error
/// response.
pub type ResponseCallback = Box<dyn FnOnce(Option<&Value>) + Send>;

/// What kind of server-initiated request a pending entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// sampling/createMessage.
    Sampling,
    /// elicitation/create.
    Elicitation,
}

struct PendingRequest {
    id: i64,
    kind: PendingKind,
    sent_at_ms: u64,
    callback: ResponseCallback,
}

/// Tracker for in-flight ids, cancellations, outboxes, subscriptions, and
/// pending server-initiated requests.
pub struct RequestTracker {
    clock: SharedClock,
    in_flight: DashMap<String, String>,
    cancelled: Mutex<VecDeque<String>>,
    cancelled_capacity: usize,
    outboxes: DashMap<String, VecDeque<String>>,
    subscriptions: DashMap<String, BTreeSet<String>>,
    pending: Mutex<Vec<PendingRequest>>,
    next_sampling_id: AtomicI64,
    next_elicitation_id: AtomicI64,
}

impl std::fmt::Debug for RequestTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTracker")
            .field("in_flight", &self.in_flight.len())
            .field("outboxes", &self.outboxes.len())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl RequestTracker {
    /// Create a tracker remembering at most `cancelled_capacity` cancelled
    /// ids.
    pub fn new(cancelled_capacity: usize, clock: SharedClock) -> Self {
        Self {
            clock,
            in_flight: DashMap::new(),
            cancelled: Mutex::new(VecDeque::new()),
            cancelled_capacity: cancelled_capacity.max(1),
            outboxes: DashMap::new(),
            subscriptions: DashMap::new(),
            pending: Mutex::new(Vec::new()),
            next_sampling_id: AtomicI64::new(SAMPLING_ID_BASE),
            next_elicitation_id: AtomicI64::new(ELICITATION_ID_BASE),
        }
    }

    // ── In-flight requests & cancellation ──────────────────────────────

    /// Register an in-flight request with its progress token ("" = none).
    pub fn track_request(&self, request_id: &str, progress_token: &str) {
        self.in_flight
            .insert(request_id.to_string(), progress_token.to_string());
    }

    /// The progress token of an in-flight request.
    pub fn progress_token(&self, request_id: &str) -> Option<String> {
        self.in_flight.get(request_id).map(|t| t.clone())
    }

    /// Remove a completed request from tracking.
    pub fn complete_request(&self, request_id: &str) {
        self.in_flight.remove(request_id);
    }

    /// Move an in-flight request to the cancelled list. Returns true when
    /// it was in flight.
    pub fn cancel_request(&self, request_id: &str) -> bool {
        if self.in_flight.remove(request_id).is_none() {
            return false;
        }
        let mut cancelled = self.cancelled.lock();
        if cancelled.len() >= self.cancelled_capacity {
            cancelled.pop_front();
        }
        cancelled.push_back(request_id.to_string());
        true
    }

    /// True when the request was cancelled. Handlers consult this at
    /// checkpoints.
    pub fn is_cancelled(&self, request_id: &str) -> bool {
        self.cancelled.lock().iter().any(|id| id == request_id)
    }

    /// Forget a cancellation record.
    pub fn clear_cancelled(&self, request_id: &str) {
        self.cancelled.lock().retain(|id| id != request_id);
    }

    /// Number of in-flight requests.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    // ── Per-session outboxes ───────────────────────────────────────────

    /// Append a notification to a session's outbox.
    pub fn push_notification(&self, session_id: &str, method: &str, params: Option<Value>) {
        let notification = JsonRpcNotification::new(method, params);
        let payload = serde_json::to_string(&notification).expect("notification serializes");
        self.outboxes
            .entry(session_id.to_string())
            .or_default()
            .push_back(payload);
    }

    /// Append a raw payload (e.g. a server-initiated request) to a
    /// session's outbox.
    pub fn push_raw(&self, session_id: &str, payload: String) {
        self.outboxes
            .entry(session_id.to_string())
            .or_default()
            .push_back(payload);
    }

    /// Take every queued payload for a session, in emission order.
    pub fn drain_outbox(&self, session_id: &str) -> Vec<String> {
        match self.outboxes.get_mut(session_id) {
            Some(mut queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Number of queued payloads for a session.
    pub fn outbox_len(&self, session_id: &str) -> usize {
        self.outboxes.get(session_id).map(|q| q.len()).unwrap_or(0)
    }

    /// Synthesize and enqueue a notifications/progress message.
    pub fn report_progress(
        &self,
        session_id: &str,
        progress_token: &str,
        progress: f64,
        total: f64,
        message: &str,
    ) {
        if progress_token.is_empty() {
            return;
        }
        let params = ProgressParams {
            progress_token: progress_token.to_string(),
            progress,
            total: if total > 0.0 { Some(total) } else { None },
            message: if message.is_empty() {
                None
            } else {
                Some(message.to_string())
            },
        };
        self.push_notification(
            session_id,
            "notifications/progress",
            Some(serde_json::to_value(params).expect("progress params serialize")),
        );
    }

    /// Drop a session's outbox and subscriptions.
    pub fn drop_session(&self, session_id: &str) {
        self.outboxes.remove(session_id);
        for mut entry in self.subscriptions.iter_mut() {
            entry.value_mut().remove(session_id);
        }
    }

    // ── Resource subscriptions ─────────────────────────────────────────

    /// Record a session's interest in a resource URI.
    pub fn subscribe(&self, uri: &str, session_id: &str) {
        self.subscriptions
            .entry(uri.to_string())
            .or_default()
            .insert(session_id.to_string());
    }

    /// Remove a session's interest in a resource URI.
    pub fn unsubscribe(&self, uri: &str, session_id: &str) {
        if let Some(mut subscribers) = self.subscriptions.get_mut(uri) {
            subscribers.remove(session_id);
        }
    }

    /// Sessions subscribed to a resource URI.
    pub fn subscribers(&self, uri: &str) -> Vec<String> {
        self.subscriptions
            .get(uri)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    // ── Server-initiated requests ──────────────────────────────────────

    /// Queue a sampling/createMessage request to a session. Returns the
    /// correlation id.
    pub fn queue_sampling(
        &self,
        session_id: &str,
        params: CreateMessageParams,
        callback: ResponseCallback,
    ) -> i64 {
        let id = self.next_sampling_id.fetch_add(1, Ordering::SeqCst);
        self.queue_request(
            session_id,
            "sampling/createMessage",
            serde_json::to_value(params).expect("sampling params serialize"),
            id,
            PendingKind::Sampling,
            callback,
        );
        id
    }

    /// Queue an elicitation/create request to a session. Returns the
    /// correlation id.
    pub fn queue_elicitation(
        &self,
        session_id: &str,
        request: ElicitRequest,
        callback: ResponseCallback,
    ) -> i64 {
        let id = self.next_elicitation_id.fetch_add(1, Ordering::SeqCst);
        self.queue_request(
            session_id,
            "elicitation/create",
            serde_json::to_value(request).expect("elicit request serializes"),
            id,
            PendingKind::Elicitation,
            callback,
        );
        id
    }

    fn queue_request(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
        id: i64,
        kind: PendingKind,
        callback: ResponseCallback,
    ) {
        let request = JsonRpcRequest::new(method, Some(params), RequestId::Number(id));
        let payload = serde_json::to_string(&request).expect("request serializes");
        self.push_raw(session_id, payload);
        self.pending.lock().push(PendingRequest {
            id,
            kind,
            sent_at_ms: self.clock.now_ms(),
            callback,
        });
    }

    /// Route a client response to the pending request it answers. Returns
    /// true when a pending entry matched.
    pub fn handle_response(&self, id: i64, result: Option<&Value>) -> bool {
        let entry = {
            let mut pending = self.pending.lock();
            match pending.iter().position(|p| p.id == id) {
                Some(idx) => Some(pending.remove(idx)),
                None => None,
            }
        };
        match entry {
            Some(entry) => {
                (entry.callback)(result);
                true
            }
            None => false,
        }
    }

    /// Discard pending requests older than their kind's timeout. Returns
    /// the number discarded.
    pub fn prune_expired(&self, sampling_timeout_ms: u64, elicitation_timeout_ms: u64) -> usize {
        let now = self.clock.now_ms();
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|p| {
            let timeout = match p.kind {
                PendingKind::Sampling => sampling_timeout_ms,
                PendingKind::Elicitation => elicitation_timeout_ms,
            };
            now.saturating_sub(p.sent_at_ms) <= timeout
        });
        before - pending.len()
    }

    /// Number of pending server-initiated requests.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
