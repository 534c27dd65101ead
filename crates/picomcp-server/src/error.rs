//! Server error handling.
//!
//! The server shares the unified `McpError` from the protocol crate; this
//! module re-exports it together with server-flavored constructor helpers.

pub use picomcp_protocol::{ErrorKind, McpError, McpResult};

/// Result alias for server operations.
pub type ServerResult<T> = McpResult<T>;

/// Server-specific constructor helpers on the unified error type.
pub trait ServerErrorExt {
    /// Catalog registration error.
    fn registry(message: impl Into<String>) -> McpError;
    /// Session-layer error.
    fn session(message: impl Into<String>) -> McpError;
}

impl ServerErrorExt for McpError {
    fn registry(message: impl Into<String>) -> McpError {
        McpError::internal(format!("Registry error: {}", message.into()))
    }

    fn session(message: impl Into<String>) -> McpError {
        McpError::invalid_request(format!("Session error: {}", message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_carry_component_prefix() {
        let err = McpError::registry("duplicate tool");
        assert!(err.message.contains("Registry error"));
        assert_eq!(err.jsonrpc_code(), -32603);

        let err = McpError::session("unknown session");
        assert_eq!(err.jsonrpc_code(), -32600);
    }
}
