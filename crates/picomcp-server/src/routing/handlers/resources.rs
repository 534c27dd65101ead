//! Resource methods: list, templates/list, read, subscribe, unsubscribe.

use picomcp_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use picomcp_protocol::types::content::ResourceContents;
use picomcp_protocol::types::resources::{
    ListResourcesResult, ListResourceTemplatesResult, ReadResourceRequest, ReadResourceResult,
    SubscribeRequest, UnsubscribeRequest,
};
use picomcp_protocol::McpError;

use crate::routing::utils::{
    error_response, optional_params, paginate, parse_cursor, parse_params, success_response,
    ListParams,
};
use crate::routing::RequestCtx;
use crate::server::ServerState;

/// One page of static resources, in registration order.
pub fn handle_list(state: &ServerState, request: JsonRpcRequest, _ctx: &RequestCtx) -> JsonRpcResponse {
    let params: ListParams = match optional_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    let offset = match parse_cursor(params.cursor.as_deref()) {
        Ok(offset) => offset,
        Err(err) => return error_response(&request, err),
    };

    let resources = state.registry.resources_wire();
    let (page, next_cursor) = paginate(&resources, offset, state.config.page_size);
    success_response(
        &request,
        ListResourcesResult {
            resources: page,
            next_cursor,
        },
    )
}

/// One page of resource templates, in registration order.
pub fn handle_list_templates(
    state: &ServerState,
    request: JsonRpcRequest,
    _ctx: &RequestCtx,
) -> JsonRpcResponse {
    let params: ListParams = match optional_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    let offset = match parse_cursor(params.cursor.as_deref()) {
        Ok(offset) => offset,
        Err(err) => return error_response(&request, err),
    };

    let templates = state.registry.templates_wire();
    let (page, next_cursor) = paginate(&templates, offset, state.config.page_size);
    success_response(
        &request,
        ListResourceTemplatesResult {
            resource_templates: page,
            next_cursor,
        },
    )
}

/// Resolve a URI against static resources, then templates.
pub fn handle_read(state: &ServerState, request: JsonRpcRequest, _ctx: &RequestCtx) -> JsonRpcResponse {
    let params: ReadResourceRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };

    match state.registry.read_resource(&params.uri) {
        Some((content, mime_type)) => success_response(
            &request,
            ReadResourceResult {
                contents: vec![ResourceContents {
                    uri: params.uri,
                    mime_type,
                    text: Some(content),
                    blob: None,
                }],
            },
        ),
        None => error_response(
            &request,
            McpError::invalid_params(format!("Unknown resource: {}", params.uri)),
        ),
    }
}

/// Record a session's interest in a resource URI.
pub fn handle_subscribe(
    state: &ServerState,
    request: JsonRpcRequest,
    ctx: &RequestCtx,
) -> JsonRpcResponse {
    let params: SubscribeRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    let Some(session_id) = &ctx.session_id else {
        return error_response(&request, McpError::invalid_request("Missing session"));
    };
    if !state.registry.resource_exists(&params.uri) {
        return error_response(
            &request,
            McpError::invalid_params(format!("Unknown resource: {}", params.uri)),
        );
    }
    state.tracker.subscribe(&params.uri, session_id);
    success_response(&request, serde_json::json!({}))
}

/// Remove a session's interest in a resource URI.
pub fn handle_unsubscribe(
    state: &ServerState,
    request: JsonRpcRequest,
    ctx: &RequestCtx,
) -> JsonRpcResponse {
    let params: UnsubscribeRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    let Some(session_id) = &ctx.session_id else {
        return error_response(&request, McpError::invalid_request("Missing session"));
    };
    state.tracker.unsubscribe(&params.uri, session_id);
    success_response(&request, serde_json::json!({}))
}
