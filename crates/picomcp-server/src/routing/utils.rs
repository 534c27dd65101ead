//! Parsing, pagination, and response helpers shared by the handlers.

use picomcp_protocol::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use picomcp_protocol::McpError;

use crate::error::ServerResult;

/// Deserialize required request parameters.
pub fn parse_params<T>(request: &JsonRpcRequest) -> ServerResult<T>
where
    T: serde::de::DeserializeOwned,
{
    match &request.params {
        Some(params) => serde_json::from_value(params.clone())
            .map_err(|err| McpError::invalid_params(format!("Invalid parameters: {err}"))),
        None => Err(McpError::invalid_params("Missing required parameters")),
    }
}

/// Deserialize optional request parameters, defaulting when absent.
pub fn optional_params<T>(request: &JsonRpcRequest) -> ServerResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match &request.params {
        Some(params) => serde_json::from_value(params.clone())
            .map_err(|err| McpError::invalid_params(format!("Invalid parameters: {err}"))),
        None => Ok(T::default()),
    }
}

/// Build a success response.
pub fn success_response<T>(request: &JsonRpcRequest, result: T) -> JsonRpcResponse
where
    T: serde::Serialize,
{
    JsonRpcResponse::success(
        serde_json::to_value(result).expect("result serializes"),
        request.id.clone(),
    )
}

/// Build an error response from the unified error type.
pub fn error_response(request: &JsonRpcRequest, error: McpError) -> JsonRpcResponse {
    let mut rpc_error = JsonRpcError::new(error.jsonrpc_code(), error.message.clone());
    rpc_error.data = error.data;
    JsonRpcResponse::error_response(rpc_error, request.id.clone())
}

/// Decode a pagination cursor: absent means offset 0; anything the server
/// previously emitted is a base-10 offset.
pub fn parse_cursor(cursor: Option<&str>) -> ServerResult<usize> {
    match cursor {
        None => Ok(0),
        Some(text) => text
            .parse::<usize>()
            .map_err(|_| McpError::invalid_params(format!("Invalid cursor: {text}"))),
    }
}

/// Slice one page out of a catalog snapshot. Returns the page and the
/// cursor of the next item when the listing is incomplete.
pub fn paginate<T: Clone>(items: &[T], offset: usize, page_size: usize) -> (Vec<T>, Option<String>) {
    let page: Vec<T> = items.iter().skip(offset).take(page_size).cloned().collect();
    let next = offset + page.len();
    let next_cursor = if next < items.len() {
        Some(next.to_string())
    } else {
        None
    };
    (page, next_cursor)
}

/// Cursor-bearing parameters accepted by every list method.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ListParams {
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
}
