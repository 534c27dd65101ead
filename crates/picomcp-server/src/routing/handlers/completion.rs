//! The completion/complete method.
//!
//! Providers are registered as `prompt:<name>:<arg>` or
//! `template:<uriTemplate>:<var>`; results are prefix-filtered by the
//! partial value and truncated with a more-available flag.

use picomcp_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use picomcp_protocol::types::completion::{
    CompleteRequest, CompleteResult, Completion, CompletionReference,
};

use crate::routing::utils::{error_response, parse_params, success_response};
use crate::routing::RequestCtx;
use crate::server::ServerState;

/// Maximum completion values returned in one response.
const MAX_COMPLETIONS: usize = 100;

/// Route to the registered completion provider.
pub fn handle(state: &ServerState, request: JsonRpcRequest, _ctx: &RequestCtx) -> JsonRpcResponse {
    let params: CompleteRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };

    let key = match &params.reference {
        CompletionReference::Prompt { name } => {
            format!("prompt:{name}:{}", params.argument.name)
        }
        CompletionReference::Resource { uri } => {
            format!("template:{uri}:{}", params.argument.name)
        }
    };

    let (values, has_more) = state.registry.complete(
        &key,
        &params.argument.name,
        &params.argument.value,
        MAX_COMPLETIONS,
    );

    success_response(
        &request,
        CompleteResult {
            completion: Completion {
                total: Some(values.len()),
                has_more: Some(has_more),
                values,
            },
        },
    )
}
