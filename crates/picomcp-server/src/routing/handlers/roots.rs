//! The roots/list method.

use picomcp_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use picomcp_protocol::types::roots::ListRootsResult;

use crate::routing::utils::{error_response, optional_params, paginate, parse_cursor, success_response, ListParams};
use crate::routing::RequestCtx;
use crate::server::ServerState;

/// One page of roots, in registration order.
pub fn handle_list(state: &ServerState, request: JsonRpcRequest, _ctx: &RequestCtx) -> JsonRpcResponse {
    let params: ListParams = match optional_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    let offset = match parse_cursor(params.cursor.as_deref()) {
        Ok(offset) => offset,
        Err(err) => return error_response(&request, err),
    };

    let roots = state.registry.roots_wire();
    let (page, next_cursor) = paginate(&roots, offset, state.config.page_size);
    success_response(
        &request,
        ListRootsResult {
            roots: page,
            next_cursor,
        },
    )
}
