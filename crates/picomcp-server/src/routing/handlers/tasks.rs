//! Task methods: list, get, result, cancel.

use picomcp_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use picomcp_protocol::types::tasks::{CancelTaskRequest, GetTaskRequest, ListTasksResult};
use picomcp_protocol::McpError;
use serde_json::Value;

use crate::routing::utils::{
    error_response, optional_params, parse_cursor, parse_params, success_response, ListParams,
};
use crate::routing::RequestCtx;
use crate::server::ServerState;

/// Route a tasks/* method. Answers method-not-found when the task engine
/// is disabled.
pub fn handle(state: &ServerState, request: JsonRpcRequest, _ctx: &RequestCtx) -> JsonRpcResponse {
    if !state.config.tasks.enabled {
        return error_response(&request, McpError::method_not_found(&request.method));
    }
    match request.method.as_str() {
        "tasks/list" => handle_list(state, request),
        "tasks/get" => handle_get(state, request),
        "tasks/result" => handle_result(state, request),
        "tasks/cancel" => handle_cancel(state, request),
        other => error_response(&request, McpError::method_not_found(other)),
    }
}

fn handle_list(state: &ServerState, request: JsonRpcRequest) -> JsonRpcResponse {
    let params: ListParams = match optional_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    let offset = match parse_cursor(params.cursor.as_deref()) {
        Ok(offset) => offset,
        Err(err) => return error_response(&request, err),
    };

    let (tasks, next_cursor) = state.tasks.list(offset, state.config.page_size);
    success_response(&request, ListTasksResult { tasks, next_cursor })
}

fn handle_get(state: &ServerState, request: JsonRpcRequest) -> JsonRpcResponse {
    let params: GetTaskRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    match state.tasks.get_task(&params.task_id) {
        Some(task) => success_response(&request, task),
        None => error_response(
            &request,
            McpError::invalid_params(format!("Unknown task: {}", params.task_id)),
        ),
    }
}

fn handle_result(state: &ServerState, request: JsonRpcRequest) -> JsonRpcResponse {
    let params: GetTaskRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    match state.tasks.task_result(&params.task_id) {
        Ok(result_json) => {
            // Stored results are serialized CallToolResult payloads; pass
            // them through as structured JSON where possible.
            let value: Value = serde_json::from_str(&result_json)
                .unwrap_or_else(|_| Value::String(result_json));
            success_response(&request, value)
        }
        Err(err) => error_response(&request, err),
    }
}

fn handle_cancel(state: &ServerState, request: JsonRpcRequest) -> JsonRpcResponse {
    let params: CancelTaskRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    match state.tasks.cancel_task(&params.task_id) {
        Ok(task) => success_response(&request, task),
        Err(err) => error_response(&request, err),
    }
}
