//! The ping keep-alive.

use picomcp_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};

use crate::routing::utils::success_response;
use crate::routing::RequestCtx;
use crate::server::ServerState;

/// Answer with an empty result.
pub fn handle(_state: &ServerState, request: JsonRpcRequest, _ctx: &RequestCtx) -> JsonRpcResponse {
    success_response(&request, serde_json::json!({}))
}
