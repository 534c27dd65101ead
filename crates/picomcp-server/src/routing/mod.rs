//! Request routing and handler dispatch.
//!
//! One handler module per MCP method family, following the pipeline order
//! of the tool-call path. Requests within a session are processed in
//! arrival order; notifications produce no response.

mod handlers;
pub mod utils;

use picomcp_protocol::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use picomcp_protocol::McpError;

use crate::server::ServerState;
use utils::error_response;

/// Caller identification extracted by the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestCtx {
    /// The session id presented with the request.
    pub session_id: Option<String>,
    /// The API key presented with the request.
    pub api_key: Option<String>,
    /// Transport-level client identifier.
    pub client_id: Option<String>,
}

/// A routed response, plus the session created by an initialize.
#[derive(Debug)]
pub struct RouteOutcome {
    /// The response to send.
    pub response: JsonRpcResponse,
    /// Set when this request created a session.
    pub new_session: Option<String>,
}

impl RouteOutcome {
    fn response(response: JsonRpcResponse) -> Self {
        Self {
            response,
            new_session: None,
        }
    }
}

/// Route one request to its handler.
pub async fn dispatch(state: &ServerState, request: JsonRpcRequest, ctx: &RequestCtx) -> RouteOutcome {
    tracing::debug!(method = %request.method, "dispatching request");

    // Presented sessions are validated and touched on every non-initialize
    // request; an unknown or expired id is rejected up front.
    if request.method != "initialize" {
        if let Some(session_id) = &ctx.session_id {
            if !state.sessions.lock().validate_session(session_id) {
                return RouteOutcome::response(error_response(
                    &request,
                    McpError::invalid_request("Unknown or expired session"),
                ));
            }
        }
    }

    let response = match request.method.as_str() {
        "initialize" => return handlers::initialize::handle(state, request, ctx),

        "ping" => handlers::ping::handle(state, request, ctx),

        "tools/list" => handlers::tools::handle_list(state, request, ctx),
        "tools/call" => handlers::tools::handle_call(state, request, ctx).await,

        "resources/list" => handlers::resources::handle_list(state, request, ctx),
        "resources/templates/list" => handlers::resources::handle_list_templates(state, request, ctx),
        "resources/read" => handlers::resources::handle_read(state, request, ctx),
        "resources/subscribe" => handlers::resources::handle_subscribe(state, request, ctx),
        "resources/unsubscribe" => handlers::resources::handle_unsubscribe(state, request, ctx),

        "prompts/list" => handlers::prompts::handle_list(state, request, ctx),
        "prompts/get" => handlers::prompts::handle_get(state, request, ctx),

        "roots/list" => handlers::roots::handle_list(state, request, ctx),

        "completion/complete" => handlers::completion::handle(state, request, ctx),

        "logging/setLevel" => handlers::logging::handle_set_level(state, request, ctx),

        "tasks/list" | "tasks/get" | "tasks/result" | "tasks/cancel" => {
            handlers::tasks::handle(state, request, ctx)
        }

        _ => error_response(&request, McpError::method_not_found(&request.method)),
    };

    RouteOutcome::response(response)
}

/// Handle an inbound notification (no response).
pub fn handle_notification(state: &ServerState, notification: &JsonRpcNotification, ctx: &RequestCtx) {
    match notification.method.as_str() {
        "notifications/initialized" => {
            if let Some(session_id) = &ctx.session_id {
                state.sessions.lock().validate_session(session_id);
            }
        }
        "notifications/cancelled" => {
            let Some(params) = &notification.params else {
                return;
            };
            if let Some(request_id) = params.get("requestId") {
                let id = match request_id {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                state.tracker.cancel_request(&id);
                tracing::debug!(request = %id, "request cancelled by client");
            }
            // A task-augmented call is cancelled through its task id.
            if let Some(task_id) = params.get("taskId").and_then(|v| v.as_str()) {
                let _ = state.tasks.cancel_task(task_id);
            }
        }
        other => {
            tracing::debug!(method = other, "ignoring unknown notification");
        }
    }
}
