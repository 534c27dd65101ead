//! Unified error type shared by every PicoMCP crate.
//!
//! A single `McpError` carries an [`ErrorKind`], a human-readable message,
//! and optional structured data that is attached to the JSON-RPC error
//! response. Constructor helpers cover the error kinds the dispatcher and
//! the reliability layer produce.

use serde_json::Value;
use thiserror::Error;

use crate::validation::ValidationError;

/// Result alias used throughout the workspace.
pub type McpResult<T> = Result<T, McpError>;

/// Classification of an error, mapped 1:1 onto a JSON-RPC error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The payload was not valid JSON (−32700).
    Parse,
    /// The message was not a well-formed JSON-RPC request (−32600).
    InvalidRequest,
    /// No handler is registered for the method (−32601).
    MethodNotFound,
    /// Parameters failed structural or schema validation (−32602).
    InvalidParams,
    /// Unexpected server-side failure (−32603).
    Internal,
    /// The caller's role is not allowed to invoke the tool (−32000).
    AccessDenied,
    /// A token bucket refused the request (−32000).
    RateLimited,
    /// A circuit breaker is open for the tool's resource key (−32000).
    CircuitOpen,
    /// Generic application error (−32000).
    Application,
}

impl ErrorKind {
    /// The JSON-RPC error code for this kind.
    pub fn jsonrpc_code(self) -> i32 {
        match self {
            Self::Parse => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
            Self::AccessDenied | Self::RateLimited | Self::CircuitOpen | Self::Application => {
                -32000
            }
        }
    }
}

/// The unified error type.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct McpError {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Structured data attached to the JSON-RPC error response.
    pub data: Option<Value>,
}

impl McpError {
    /// Create an error with an explicit kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data to the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Parse error (−32700).
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    /// Invalid request (−32600).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// Method not found (−32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorKind::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    /// Invalid params (−32602).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    /// Invalid params carrying the aggregated validation errors as data.
    pub fn validation(errors: &[ValidationError]) -> Self {
        let list: Vec<Value> = errors
            .iter()
            .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
            .collect();
        Self::new(ErrorKind::InvalidParams, "Invalid arguments")
            .with_data(serde_json::json!({ "validationErrors": list }))
    }

    /// Internal error (−32603).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Access denied (−32000) carrying caller role and required roles.
    pub fn access_denied(tool: &str, caller_role: &str, required: &[String]) -> Self {
        Self::new(
            ErrorKind::AccessDenied,
            format!("Access denied: role '{caller_role}' may not call '{tool}'"),
        )
        .with_data(serde_json::json!({
            "role": caller_role,
            "requiredRoles": required,
        }))
    }

    /// Rate limited (−32000) carrying a retry-after suggestion.
    pub fn rate_limited(retry_after_ms: u64) -> Self {
        Self::new(ErrorKind::RateLimited, "Rate limit exceeded")
            .with_data(serde_json::json!({ "retryAfterMs": retry_after_ms }))
    }

    /// Circuit open (−32000) carrying the remaining recovery window.
    pub fn circuit_open(key: &str, retry_after_ms: u64) -> Self {
        Self::new(
            ErrorKind::CircuitOpen,
            format!("Circuit open for '{key}'"),
        )
        .with_data(serde_json::json!({ "retryAfterMs": retry_after_ms }))
    }

    /// Generic application error (−32000).
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Application, message)
    }

    /// The JSON-RPC code this error maps to.
    pub fn jsonrpc_code(&self) -> i32 {
        self.kind.jsonrpc_code()
    }

    /// Whether the reliability layer may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::RateLimited | ErrorKind::CircuitOpen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_standard_codes() {
        assert_eq!(McpError::parse("bad json").jsonrpc_code(), -32700);
        assert_eq!(McpError::invalid_request("no method").jsonrpc_code(), -32600);
        assert_eq!(McpError::method_not_found("nope").jsonrpc_code(), -32601);
        assert_eq!(McpError::invalid_params("bad pin").jsonrpc_code(), -32602);
        assert_eq!(McpError::internal("boom").jsonrpc_code(), -32603);
        assert_eq!(McpError::rate_limited(100).jsonrpc_code(), -32000);
        assert_eq!(
            McpError::access_denied("t", "viewer", &["admin".into()]).jsonrpc_code(),
            -32000
        );
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = McpError::rate_limited(250);
        let data = err.data.unwrap();
        assert_eq!(data["retryAfterMs"], 250);
    }

    #[test]
    fn validation_errors_become_structured_data() {
        let errs = vec![ValidationError {
            field: "pin".into(),
            message: "must be integer, got string".into(),
        }];
        let err = McpError::validation(&errs);
        assert_eq!(err.jsonrpc_code(), -32602);
        let data = err.data.unwrap();
        assert_eq!(data["validationErrors"][0]["field"], "pin");
    }

    #[test]
    fn retryable_classification() {
        assert!(McpError::rate_limited(10).is_retryable());
        assert!(McpError::circuit_open("i2c", 500).is_retryable());
        assert!(!McpError::internal("boom").is_retryable());
        assert!(!McpError::access_denied("t", "guest", &[]).is_retryable());
    }
}
