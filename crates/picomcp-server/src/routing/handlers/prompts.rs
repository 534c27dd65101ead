//! Prompt methods: list and get.

use std::collections::HashMap;

use picomcp_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use picomcp_protocol::types::prompts::{GetPromptRequest, GetPromptResult, ListPromptsResult};

use crate::routing::utils::{
    error_response, optional_params, paginate, parse_cursor, parse_params, success_response,
    ListParams,
};
use crate::routing::RequestCtx;
use crate::server::ServerState;

/// One page of prompts, in registration order.
pub fn handle_list(state: &ServerState, request: JsonRpcRequest, _ctx: &RequestCtx) -> JsonRpcResponse {
    let params: ListParams = match optional_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    let offset = match parse_cursor(params.cursor.as_deref()) {
        Ok(offset) => offset,
        Err(err) => return error_response(&request, err),
    };

    let prompts = state.registry.prompts_wire();
    let (page, next_cursor) = paginate(&prompts, offset, state.config.page_size);
    success_response(
        &request,
        ListPromptsResult {
            prompts: page,
            next_cursor,
        },
    )
}

/// Render a prompt with the supplied argument bindings.
pub fn handle_get(state: &ServerState, request: JsonRpcRequest, _ctx: &RequestCtx) -> JsonRpcResponse {
    let params: GetPromptRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    let args = params.arguments.unwrap_or_else(HashMap::new);

    match state.registry.render_prompt(&params.name, &args) {
        Ok((description, messages)) => success_response(
            &request,
            GetPromptResult {
                description,
                messages,
            },
        ),
        Err(err) => error_response(&request, err),
    }
}
