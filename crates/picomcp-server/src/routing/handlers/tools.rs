//! Tool methods: list and the guarded call pipeline.
//!
//! The call pipeline applies, strictly in order: session validity, tool
//! lookup, access control, global rate limit, per-key rate limit, input
//! validation, then the retry-wrapped execution block (circuit breaker,
//! before-hook, watchdog kick, handler), output validation, audit, and the
//! after-hook. The first rejecting stage wins. Anything produced inside
//! the tool handler becomes an `isError` result, never a JSON-RPC error.

use parking_lot::Mutex;
use picomcp_core::{RetryExecutor, RetryOutcome};
use picomcp_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use picomcp_protocol::types::tasks::TaskSupport;
use picomcp_protocol::types::tools::{CallToolRequest, CallToolResult, ListToolsResult};
use picomcp_protocol::{validate_arguments, validate_value, McpError};
use serde_json::Value;

use crate::config::RateLimitKeySource;
use crate::registry::ToolEntry;
use crate::routing::utils::{
    error_response, optional_params, paginate, parse_cursor, parse_params, success_response,
    ListParams,
};
use crate::routing::RequestCtx;
use crate::server::ServerState;

/// One page of tools, in registration order.
pub fn handle_list(state: &ServerState, request: JsonRpcRequest, _ctx: &RequestCtx) -> JsonRpcResponse {
    let params: ListParams = match optional_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    let offset = match parse_cursor(params.cursor.as_deref()) {
        Ok(offset) => offset,
        Err(err) => return error_response(&request, err),
    };

    let tools = state.registry.tools_wire();
    let (page, next_cursor) = paginate(&tools, offset, state.config.page_size);
    success_response(
        &request,
        ListToolsResult {
            tools: page,
            next_cursor,
        },
    )
}

/// The guarded tools/call pipeline.
pub async fn handle_call(
    state: &ServerState,
    request: JsonRpcRequest,
    ctx: &RequestCtx,
) -> JsonRpcResponse {
    let params: CallToolRequest = match parse_params(&request) {
        Ok(params) => params,
        Err(err) => return error_response(&request, err),
    };
    let tool_name = params.name.clone();

    // 1. Session validity. The dispatch prologue already validated and
    // touched a presented session; here a session is mandatory.
    match &ctx.session_id {
        Some(session_id) => {
            let sessions = state.sessions.lock();
            match sessions.get_session(session_id) {
                Some(session) if session.initialized => {}
                _ => {
                    return error_response(
                        &request,
                        McpError::invalid_request("Unknown or expired session"),
                    )
                }
            }
        }
        None => {
            return error_response(&request, McpError::invalid_request("Missing session"));
        }
    }

    // 2. Tool exists.
    let Some(entry) = state.registry.get_tool(&tool_name) else {
        return error_response(
            &request,
            McpError::invalid_params(format!("Unknown tool: {tool_name}")),
        );
    };

    let api_key = ctx.api_key.as_deref();
    let role = state.access.read().resolve_role(api_key);

    // 3. Access control.
    {
        let access = state.access.read();
        if access.is_enabled() && !access.can_access(&tool_name, api_key) {
            let required = access.tool_allowed_roles(&tool_name);
            drop(access);
            state
                .audit
                .lock()
                .log_access_denied(&role, &tool_name, "role not allowed");
            return error_response(&request, McpError::access_denied(&tool_name, &role, &required));
        }
    }

    // 4. Global rate limit.
    if state.config.rate_limit.is_some() {
        let mut limiter = state.rate_global.lock();
        if limiter.is_enabled() && !limiter.try_acquire(1.0) {
            let retry_after = limiter.retry_after_ms();
            drop(limiter);
            return error_response(&request, McpError::rate_limited(retry_after));
        }
    }

    // 5. Per-key rate limit.
    if let Some(settings) = &state.config.keyed_rate_limit {
        let key = match settings.key_source {
            RateLimitKeySource::ApiKey => ctx
                .api_key
                .clone()
                .or_else(|| ctx.client_id.clone())
                .unwrap_or_default(),
            RateLimitKeySource::ClientId => ctx
                .client_id
                .clone()
                .or_else(|| ctx.session_id.clone())
                .unwrap_or_default(),
            RateLimitKeySource::ToolName => tool_name.clone(),
        };
        let mut limiter = state.rate_keyed.lock();
        if !limiter.try_acquire(&key, 1.0) {
            let retry_after = limiter.retry_after_ms(&key);
            drop(limiter);
            return error_response(&request, McpError::rate_limited(retry_after));
        }
    }

    // 6. Input validation.
    let args = params.arguments.clone().unwrap_or_else(|| Value::Object(Default::default()));
    if state.config.validate_input {
        let result = validate_arguments(&args, &entry.input_schema);
        if !result.is_valid() {
            return error_response(&request, McpError::validation(&result.errors));
        }
    }

    // Track the request for progress and cancellation.
    let request_id = request.id.to_string();
    let progress_token = params.progress_token().unwrap_or_default();
    state.tracker.track_request(&request_id, &progress_token);

    // 10 (task path). A task envelope dispatches through the task engine
    // unless the tool forbids it; `required` without an envelope rejects.
    if entry.task_support != TaskSupport::Forbidden {
        match &params.task {
            Some(envelope) => {
                if !state.config.tasks.enabled {
                    state.tracker.complete_request(&request_id);
                    return error_response(
                        &request,
                        McpError::application("Task execution is disabled"),
                    );
                }
                let response = dispatch_as_task(state, &entry, &tool_name, &args, envelope.ttl, &role, &request);
                state.tracker.complete_request(&request_id);
                run_after_hook(state, &tool_name, true);
                return response;
            }
            None if entry.task_support == TaskSupport::Required => {
                state.tracker.complete_request(&request_id);
                return error_response(
                    &request,
                    McpError::invalid_params(format!(
                        "Tool '{tool_name}' requires task execution"
                    )),
                );
            }
            None => {}
        }
    }

    // Synchronous path.
    let Some(handler) = entry.handler.clone() else {
        state.tracker.complete_request(&request_id);
        return error_response(
            &request,
            McpError::invalid_params(format!("Tool '{tool_name}' requires task execution")),
        );
    };

    let resource_key = entry.resource_key.clone();
    let breaker_gated = state.config.breakers.enabled && resource_key.is_some();
    let hook_rejection: Mutex<Option<String>> = Mutex::new(None);

    // 7–10, run once per attempt: breaker gate, before-hook, watchdog
    // kick, execution, breaker transition.
    let attempt = || -> RetryOutcome {
        if breaker_gated {
            let key = resource_key.as_deref().expect("breaker gate implies key");
            let mut breakers = state.breakers.lock();
            let breaker = breakers.get(key);
            if !breaker.allow_request() {
                let retry_after = breaker.retry_after_ms();
                return RetryOutcome::retryable(format!(
                    "Circuit open for '{key}', retry in {retry_after} ms"
                ));
            }
        }

        if let Some(hook) = state.before_hook.read().clone() {
            if let Err(reason) = hook(&tool_name, &args) {
                *hook_rejection.lock() = Some(reason.clone());
                return RetryOutcome::fatal(reason);
            }
        }

        if let Some(watchdog_name) = &entry.watchdog {
            let now = state.clock.now_ms();
            state.watchdog.lock().kick(watchdog_name, now);
        }

        let outcome = handler(&args);

        if breaker_gated {
            let key = resource_key.as_deref().expect("breaker gate implies key");
            let mut breakers = state.breakers.lock();
            let breaker = breakers.get(key);
            match &outcome {
                RetryOutcome::Success(_) => breaker.record_success(),
                RetryOutcome::Retryable(_) | RetryOutcome::Fatal(_) => breaker.record_failure(),
            }
        }

        outcome
    };

    // 11. Retry wrap, when a policy is registered for the tool's key.
    let retry_policy = resource_key
        .as_deref()
        .and_then(|key| state.retries.lock().get(key).cloned());
    let outcome = match retry_policy {
        Some(policy) => {
            let mut executor = RetryExecutor::new(policy, state.clock.clone());
            let outcome = executor.execute(attempt).await;
            let run_stats = *executor.stats();
            if let Some(key) = resource_key.as_deref() {
                state.retries.lock().record_run(key, &run_stats);
            }
            outcome
        }
        None => attempt(),
    };

    state.tracker.complete_request(&request_id);

    // A before-hook rejection short-circuits with an application error.
    let rejection = hook_rejection.lock().take();
    if let Some(reason) = rejection {
        audit_call(state, &role, &tool_name, &args, false);
        run_after_hook(state, &tool_name, false);
        return error_response(
            &request,
            McpError::application(format!("Call rejected: {reason}")),
        );
    }

    let (result, success) = match outcome {
        RetryOutcome::Success(output) => build_success_result(state, &entry, output),
        RetryOutcome::Retryable(error) | RetryOutcome::Fatal(error) => {
            (serde_json::to_value(CallToolResult::error(error)).expect("result serializes"), false)
        }
    };

    // 13–14. Audit, then the after-hook.
    audit_call(state, &role, &tool_name, &args, success);
    run_after_hook(state, &tool_name, success);

    success_response(&request, result)
}

/// Create the task, hand it to the task handler (or fold a sync handler
/// through the engine), and answer with the current snapshot, which may
/// already be terminal.
fn dispatch_as_task(
    state: &ServerState,
    entry: &ToolEntry,
    tool_name: &str,
    args: &Value,
    ttl: Option<i64>,
    role: &str,
    request: &JsonRpcRequest,
) -> JsonRpcResponse {
    let snapshot = state.tasks.create_task(tool_name, ttl.unwrap_or(-1));
    let task_id = snapshot.task_id.clone();

    if let Some(task_handler) = entry.task_handler.clone() {
        task_handler(&task_id, args, &state.tasks);
    } else if let Some(handler) = entry.handler.clone() {
        match handler(args) {
            RetryOutcome::Success(output) => {
                let result = normalize_task_result(&output);
                state.tasks.complete_task(&task_id, &result);
            }
            RetryOutcome::Retryable(error) | RetryOutcome::Fatal(error) => {
                state.tasks.fail_task(&task_id, &error);
            }
        }
    }

    audit_call(state, role, tool_name, args, true);
    let current = state.tasks.get_task(&task_id).unwrap_or(snapshot);
    success_response(request, serde_json::json!({ "task": current }))
}

/// Ensure a stored task result is a serialized content-list payload.
fn normalize_task_result(output: &str) -> String {
    match serde_json::from_str::<Value>(output) {
        Ok(Value::Object(obj)) if obj.contains_key("content") => {
            Value::Object(obj).to_string()
        }
        _ => serde_json::to_value(CallToolResult::text(output))
            .expect("result serializes")
            .to_string(),
    }
}

/// Wrap a handler's output: content lists pass through unchanged, plain
/// output becomes a text block, and declared output schemas are enforced.
fn build_success_result(state: &ServerState, entry: &ToolEntry, output: String) -> (Value, bool) {
    let parsed: Option<Value> = serde_json::from_str(&output).ok();

    if let Some(Value::Object(obj)) = &parsed {
        if obj.contains_key("content") {
            return (Value::Object(obj.clone()), true);
        }
    }

    // 12. Output validation against the declared schema.
    if state.config.validate_output {
        if let Some(schema) = &entry.output_schema {
            let structured = parsed.clone().unwrap_or_else(|| Value::String(output.clone()));
            let validation = validate_value(&structured, schema);
            if !validation.is_valid() {
                let result = CallToolResult::error(format!(
                    "Output validation failed: {}",
                    validation.summary()
                ));
                return (serde_json::to_value(result).expect("result serializes"), false);
            }
            let result = CallToolResult {
                content: vec![picomcp_protocol::types::content::Content::text(output)],
                is_error: None,
                structured_content: Some(structured),
            };
            return (serde_json::to_value(result).expect("result serializes"), true);
        }
    }

    (
        serde_json::to_value(CallToolResult::text(output)).expect("result serializes"),
        true,
    )
}

fn audit_call(state: &ServerState, role: &str, tool_name: &str, args: &Value, success: bool) {
    let mut digest = args.to_string();
    if digest.len() > 120 {
        digest = digest.chars().take(120).collect();
    }
    state
        .audit
        .lock()
        .log_tool_call(role, tool_name, &digest, success);
}

fn run_after_hook(state: &ServerState, tool_name: &str, success: bool) {
    if let Some(hook) = state.after_hook.read().clone() {
        hook(tool_name, success);
    }
}
