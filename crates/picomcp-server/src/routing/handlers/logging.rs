//! The logging/setLevel method.

use picomcp_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use picomcp_protocol::types::logging::SetLevelRequest;

use crate::routing::utils::{error_response, parse_params, success_response};
use crate::routing::RequestCtx;
use crate::server::ServerState;

/// Update the in-memory minimum level for notifications/message.
pub fn handle_set_level(
    state: &ServerState,
    request: JsonRpcRequest,
    _ctx: &RequestCtx,
) -> JsonRpcResponse {
    let params: SetLevelRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    *state.log_filter.lock() = params.level;
    tracing::debug!(level = params.level.as_str(), "log filter updated");
    success_response(&request, serde_json::json!({}))
}
