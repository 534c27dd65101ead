//! The initialize handshake.

use picomcp_protocol::jsonrpc::JsonRpcRequest;
use picomcp_protocol::types::core::Implementation;
use picomcp_protocol::types::initialization::{InitializeRequest, InitializeResult};
use picomcp_protocol::{McpError, PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};

use crate::capabilities::server_capabilities;
use crate::routing::utils::{error_response, parse_params, success_response};
use crate::routing::{RequestCtx, RouteOutcome};
use crate::server::ServerState;

/// Negotiate the protocol version, create a session, and advertise
/// capabilities.
pub fn handle(state: &ServerState, request: JsonRpcRequest, _ctx: &RequestCtx) -> RouteOutcome {
    let params: InitializeRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => {
            return RouteOutcome {
                response: error_response(&request, err),
                new_session: None,
            }
        }
    };

    let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str())
    {
        params.protocol_version.clone()
    } else {
        PROTOCOL_VERSION.to_string()
    };

    let session_id = match state
        .sessions
        .lock()
        .create_session(&params.client_info.name)
    {
        Some(id) => id,
        None => {
            return RouteOutcome {
                response: error_response(
                    &request,
                    McpError::application("Session limit reached"),
                ),
                new_session: None,
            }
        }
    };

    state.audit.lock().log_session(&session_id, true, &params.client_info.name);

    if let Some(listener) = state.initialize_listener.read().clone() {
        listener(&session_id, &params.client_info);
    }

    tracing::info!(
        session = %session_id,
        client = %params.client_info.name,
        version = %protocol_version,
        "client initialized"
    );

    let result = InitializeResult {
        protocol_version,
        capabilities: server_capabilities(&state.config),
        server_info: Implementation {
            name: state.config.name.clone(),
            version: state.config.version.clone(),
        },
        instructions: state.config.instructions.clone(),
    };

    RouteOutcome {
        response: success_response(&request, result),
        new_session: Some(session_id),
    }
}
