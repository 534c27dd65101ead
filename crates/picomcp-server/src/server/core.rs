//! Server state and the transport-facing receive path.

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::Value;
use std::sync::Arc;

use picomcp_core::{
    AuditLog, CircuitBreakerRegistry, EventStore, KeyedRateLimiter, RateLimiter, RetryRegistry,
    Scheduler, SessionManager, SharedClock, StateStore, Watchdog,
};
use picomcp_protocol::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcResponse, JsonRpcResponsePayload, JsonRpcVersion,
    ResponseId,
};
use picomcp_protocol::types::core::Implementation;
use picomcp_protocol::types::elicitation::{ElicitRequest, ElicitResult};
use picomcp_protocol::types::logging::LogLevel;
use picomcp_protocol::types::sampling::CreateMessageParams;
use picomcp_protocol::RequestId;

use crate::access_control::AccessControl;
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::registry::{AfterHook, BeforeHook, PromptDef, Registry, ResourceDef, TemplateDef, ToolDef};
use crate::routing::{self, RequestCtx};
use crate::server::transport::{RequestEnvelope, Transport};
use crate::tasks::TaskEngine;
use crate::tracker::RequestTracker;

/// Listener invoked after a successful initialize: `(session_id,
/// client_info)`.
pub type InitializeListener = Arc<dyn Fn(&str, &Implementation) + Send + Sync>;

/// All server components, shared behind one `Arc`.
pub struct ServerState {
    /// Server configuration.
    pub config: ServerConfig,
    /// The time seam shared by every timed component.
    pub clock: SharedClock,
    /// The catalog.
    pub registry: Registry,
    /// Live sessions.
    pub sessions: Mutex<SessionManager>,
    /// Role-based access control.
    pub access: RwLock<AccessControl>,
    /// Security audit trail.
    pub audit: Mutex<AuditLog>,
    /// Bounded event log.
    pub events: Mutex<EventStore>,
    /// Key-value state store.
    pub state: Mutex<StateStore>,
    /// Global token bucket.
    pub rate_global: Mutex<RateLimiter>,
    /// Per-key token buckets.
    pub rate_keyed: Mutex<KeyedRateLimiter>,
    /// Circuit breakers by resource key.
    pub breakers: Mutex<CircuitBreakerRegistry>,
    /// Retry policies by resource key.
    pub retries: Mutex<RetryRegistry>,
    /// Software watchdog.
    pub watchdog: Mutex<Watchdog>,
    /// Polled scheduler.
    pub scheduler: Mutex<Scheduler>,
    /// Task engine.
    pub tasks: TaskEngine,
    /// Request tracker, outboxes, and pending server-initiated requests.
    pub tracker: RequestTracker,
    /// Minimum level forwarded as notifications/message.
    pub log_filter: Mutex<LogLevel>,
    /// Optional hook run before tool execution.
    pub before_hook: RwLock<Option<BeforeHook>>,
    /// Optional hook run after the tool-call pipeline.
    pub after_hook: RwLock<Option<AfterHook>>,
    /// Optional initialize listener.
    pub initialize_listener: RwLock<Option<InitializeListener>>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("name", &self.config.name)
            .field("sessions", &self.sessions.lock().active_count())
            .field("registry", &self.registry)
            .finish()
    }
}

/// Result of delivering one payload to the server.
#[derive(Debug, Clone, Default)]
pub struct ReceiveOutcome {
    /// The response payload, when the message warranted one.
    pub response: Option<String>,
    /// A session id created by this message (initialize); transports echo
    /// it back in their session header.
    pub session_id: Option<String>,
}

/// The PicoMCP server.
#[derive(Clone, Debug)]
pub struct McpServer {
    state: Arc<ServerState>,
}

impl McpServer {
    pub(crate) fn from_state(state: ServerState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// The shared component state.
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// The shared clock.
    pub fn clock(&self) -> SharedClock {
        self.state.clock.clone()
    }

    // ── Receive path ───────────────────────────────────────────────────

    /// Deliver one payload. Returns the response payload (absent for
    /// notifications and responses) and a freshly created session id when
    /// the message was an initialize.
    pub async fn receive(&self, envelope: RequestEnvelope) -> ReceiveOutcome {
        let message: JsonRpcMessage = match serde_json::from_str(&envelope.payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "rejecting unparseable payload");
                let response = JsonRpcResponse::parse_error("Parse error");
                return ReceiveOutcome {
                    response: Some(serde_json::to_string(&response).expect("response serializes")),
                    session_id: None,
                };
            }
        };

        let ctx = RequestCtx {
            session_id: envelope.session_id.clone(),
            api_key: envelope.api_key.clone(),
            client_id: envelope.client_id.clone(),
        };

        match message {
            JsonRpcMessage::Request(request) => {
                let outcome = routing::dispatch(&self.state, request, &ctx).await;
                ReceiveOutcome {
                    response: Some(
                        serde_json::to_string(&outcome.response).expect("response serializes"),
                    ),
                    session_id: outcome.new_session,
                }
            }
            JsonRpcMessage::Notification(notification) => {
                routing::handle_notification(&self.state, &notification, &ctx);
                ReceiveOutcome::default()
            }
            JsonRpcMessage::Response(response) => {
                self.route_client_response(&response);
                ReceiveOutcome::default()
            }
            JsonRpcMessage::Batch(items) => self.receive_batch(items, &ctx).await,
        }
    }

    async fn receive_batch(&self, items: Vec<JsonRpcMessage>, ctx: &RequestCtx) -> ReceiveOutcome {
        if items.is_empty() {
            let response = JsonRpcResponse {
                jsonrpc: JsonRpcVersion,
                payload: JsonRpcResponsePayload::Error {
                    error: JsonRpcError::new(-32600, "Invalid Request"),
                },
                id: ResponseId::null(),
            };
            return ReceiveOutcome {
                response: Some(serde_json::to_string(&response).expect("response serializes")),
                session_id: None,
            };
        }

        let mut responses = Vec::new();
        let mut new_session = None;
        for item in items {
            match item {
                JsonRpcMessage::Request(request) => {
                    let outcome = routing::dispatch(&self.state, request, ctx).await;
                    if new_session.is_none() {
                        new_session = outcome.new_session;
                    }
                    responses
                        .push(serde_json::to_value(&outcome.response).expect("response serializes"));
                }
                JsonRpcMessage::Notification(notification) => {
                    routing::handle_notification(&self.state, &notification, ctx);
                }
                JsonRpcMessage::Response(response) => {
                    self.route_client_response(&response);
                }
                JsonRpcMessage::Batch(_) => {
                    // Nested batches are not a thing in JSON-RPC 2.0.
                }
            }
        }

        ReceiveOutcome {
            response: if responses.is_empty() {
                None
            } else {
                Some(Value::Array(responses).to_string())
            },
            session_id: new_session,
        }
    }

    fn route_client_response(&self, response: &JsonRpcResponse) {
        let Some(RequestId::Number(id)) = response.id.0.as_ref() else {
            return;
        };
        let matched = self.state.tracker.handle_response(*id, response.result());
        if !matched {
            tracing::debug!(id, "dropping response with no pending request");
        }
    }

    /// Explicitly close a session (client disconnect or DELETE).
    pub fn close_session(&self, session_id: &str) -> bool {
        let removed = self.state.sessions.lock().remove_session(session_id);
        if removed {
            self.state.tracker.drop_session(session_id);
            self.state.audit.lock().log_session(session_id, false, "");
        }
        removed
    }

    /// Periodic housekeeping: prune idle sessions and expired pending
    /// requests, purge expired state entries, run due scheduler tasks, and
    /// check watchdog deadlines. Call from the owning event loop.
    pub fn maintain(&self) {
        self.state.sessions.lock().prune_expired();
        self.state.tracker.prune_expired(
            self.state.config.sampling_timeout_ms,
            self.state.config.elicitation_timeout_ms,
        );
        self.state.state.lock().purge_expired();
        self.state.scheduler.lock().loop_once();
        let now = self.state.clock.now_ms();
        self.state.watchdog.lock().check(now);
    }

    // ── Catalog management ─────────────────────────────────────────────

    /// Register a tool and notify sessions of the catalog change.
    pub fn add_tool(&self, def: ToolDef) -> ServerResult<()> {
        self.state.registry.add_tool(def)?;
        self.broadcast("notifications/tools/list_changed", None);
        Ok(())
    }

    /// Remove a tool and notify sessions when it existed.
    pub fn remove_tool(&self, name: &str) -> bool {
        let removed = self.state.registry.remove_tool(name);
        if removed {
            self.broadcast("notifications/tools/list_changed", None);
        }
        removed
    }

    /// Register a static resource and notify sessions.
    pub fn add_resource(&self, def: ResourceDef) -> ServerResult<()> {
        self.state.registry.add_resource(def)?;
        self.broadcast("notifications/resources/list_changed", None);
        Ok(())
    }

    /// Register a resource template and notify sessions.
    pub fn add_template(&self, def: TemplateDef) {
        self.state.registry.add_template(def);
        self.broadcast("notifications/resources/list_changed", None);
    }

    /// Register a prompt and notify sessions.
    pub fn add_prompt(&self, def: PromptDef) -> ServerResult<()> {
        self.state.registry.add_prompt(def)?;
        self.broadcast("notifications/prompts/list_changed", None);
        Ok(())
    }

    /// Register a root and notify sessions.
    pub fn add_root(&self, uri: impl Into<String>, name: Option<String>) {
        self.state.registry.add_root(uri, name);
        self.broadcast("notifications/roots/list_changed", None);
    }

    /// The catalog.
    pub fn registry(&self) -> &Registry {
        &self.state.registry
    }

    // ── Component access ───────────────────────────────────────────────

    /// Role-based access control (write access).
    pub fn access_control(&self) -> parking_lot::RwLockWriteGuard<'_, AccessControl> {
        self.state.access.write()
    }

    /// The audit trail.
    pub fn audit(&self) -> MutexGuard<'_, AuditLog> {
        self.state.audit.lock()
    }

    /// The event store.
    pub fn events(&self) -> MutexGuard<'_, EventStore> {
        self.state.events.lock()
    }

    /// The key-value state store.
    pub fn state_store(&self) -> MutexGuard<'_, StateStore> {
        self.state.state.lock()
    }

    /// The global rate limiter.
    pub fn rate_limiter(&self) -> MutexGuard<'_, RateLimiter> {
        self.state.rate_global.lock()
    }

    /// The per-key rate limiter.
    pub fn keyed_rate_limiter(&self) -> MutexGuard<'_, KeyedRateLimiter> {
        self.state.rate_keyed.lock()
    }

    /// The circuit-breaker registry.
    pub fn breakers(&self) -> MutexGuard<'_, CircuitBreakerRegistry> {
        self.state.breakers.lock()
    }

    /// The retry-policy registry.
    pub fn retries(&self) -> MutexGuard<'_, RetryRegistry> {
        self.state.retries.lock()
    }

    /// The software watchdog.
    pub fn watchdog(&self) -> MutexGuard<'_, Watchdog> {
        self.state.watchdog.lock()
    }

    /// The polled scheduler.
    pub fn scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.state.scheduler.lock()
    }

    /// The session manager.
    pub fn sessions(&self) -> MutexGuard<'_, SessionManager> {
        self.state.sessions.lock()
    }

    /// The task engine.
    pub fn tasks(&self) -> &TaskEngine {
        &self.state.tasks
    }

    /// The request tracker.
    pub fn tracker(&self) -> &RequestTracker {
        &self.state.tracker
    }

    // ── Hooks ──────────────────────────────────────────────────────────

    /// Install the before-hook run ahead of every tool execution.
    pub fn set_before_hook(
        &self,
        hook: impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + 'static,
    ) {
        *self.state.before_hook.write() = Some(Arc::new(hook));
    }

    /// Install the after-hook run after every tool-call pipeline.
    pub fn set_after_hook(&self, hook: impl Fn(&str, bool) + Send + Sync + 'static) {
        *self.state.after_hook.write() = Some(Arc::new(hook));
    }

    /// Install the initialize listener.
    pub fn on_initialize(&self, listener: impl Fn(&str, &Implementation) + Send + Sync + 'static) {
        *self.state.initialize_listener.write() = Some(Arc::new(listener));
    }

    // ── Server-initiated messages ──────────────────────────────────────

    /// Append a notification to every live session's outbox.
    pub fn broadcast(&self, method: &str, params: Option<Value>) {
        for session_id in self.session_ids() {
            self.state
                .tracker
                .push_notification(&session_id, method, params.clone());
        }
    }

    fn session_ids(&self) -> Vec<String> {
        self.state.sessions.lock().ids()
    }

    /// Emit a log record to every session whose filter admits it.
    pub fn log_message(&self, level: LogLevel, logger: &str, data: Value) {
        if level < *self.state.log_filter.lock() {
            return;
        }
        let params = serde_json::json!({
            "level": level.as_str(),
            "logger": logger,
            "data": data,
        });
        self.broadcast("notifications/message", Some(params));
    }

    /// Notify subscribed sessions that a resource changed.
    pub fn publish_resource_changed(&self, uri: &str) {
        for session_id in self.state.tracker.subscribers(uri) {
            self.state.tracker.push_notification(
                &session_id,
                "notifications/resources/updated",
                Some(serde_json::json!({ "uri": uri })),
            );
        }
    }

    /// Queue a sampling request to a session. The callback runs when the
    /// client responds (None on error or never, if pruned).
    pub fn request_sampling(
        &self,
        session_id: &str,
        params: CreateMessageParams,
        callback: impl FnOnce(Option<&Value>) + Send + 'static,
    ) -> i64 {
        self.state
            .tracker
            .queue_sampling(session_id, params, Box::new(callback))
    }

    /// Queue an elicitation request to a session. The callback receives
    /// the parsed result (None on error, malformed content, or pruning).
    pub fn request_elicitation(
        &self,
        session_id: &str,
        request: ElicitRequest,
        callback: impl FnOnce(Option<ElicitResult>) + Send + 'static,
    ) -> i64 {
        self.state.tracker.queue_elicitation(
            session_id,
            request,
            Box::new(move |value| {
                let parsed =
                    value.and_then(|v| serde_json::from_value::<ElicitResult>(v.clone()).ok());
                callback(parsed);
            }),
        )
    }

    /// Synthesize a progress notification for an in-flight request.
    pub fn report_progress(
        &self,
        session_id: &str,
        request_id: &str,
        progress: f64,
        total: f64,
        message: &str,
    ) {
        let Some(token) = self.state.tracker.progress_token(request_id) else {
            return;
        };
        self.state
            .tracker
            .report_progress(session_id, &token, progress, total, message);
    }

    /// Drain a session's outbox (pull-style transports).
    pub fn take_notifications(&self, session_id: &str) -> Vec<String> {
        self.state.tracker.drain_outbox(session_id)
    }

    /// Aggregate diagnostics across every component, suitable for exposing
    /// as a device resource.
    pub fn stats_json(&self) -> Value {
        serde_json::json!({
            "server": {
                "name": self.state.config.name,
                "version": self.state.config.version,
            },
            "sessions": self.state.sessions.lock().summary(),
            "events": self.state.events.lock().stats_json(),
            "state": self.state.state.lock().stats_json(),
            "audit": self.state.audit.lock().stats_json(),
            "rateLimit": self.state.rate_global.lock().to_json(),
            "keyedRateLimit": self.state.rate_keyed.lock().to_json(),
            "breakers": self.state.breakers.lock().to_json(),
            "retries": self.state.retries.lock().to_json(),
            "watchdog": self.state.watchdog.lock().to_json(),
            "scheduler": self.state.scheduler.lock().to_json(),
            "accessControl": self.state.access.read().to_json(),
            "tasks": { "count": self.state.tasks.count(), "maxTasks": self.state.tasks.max_tasks() },
            "inFlight": self.state.tracker.in_flight_count(),
            "pendingRequests": self.state.tracker.pending_count(),
        })
    }

    /// Flush every session's outbox through a push-style transport.
    pub async fn flush_notifications(&self, transport: &dyn Transport) {
        for session_id in self.session_ids() {
            for payload in self.state.tracker.drain_outbox(&session_id) {
                transport.push(&session_id, payload).await;
            }
        }
    }
}
