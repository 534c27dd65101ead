//! # PicoMCP Protocol
//!
//! Wire-level types for the Model Context Protocol as spoken by PicoMCP
//! servers: JSON-RPC 2.0 messages, MCP request/result payloads, the unified
//! error type, and the practical JSON-Schema validation subset applied at
//! every tool boundary.
//!
//! This crate is transport-agnostic and does not depend on any runtime.

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod error;
pub mod jsonrpc;
pub mod types;
pub mod validation;

pub use error::{ErrorKind, McpError, McpResult};
pub use jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcVersion, ResponseId,
};
pub use types::core::RequestId;
pub use validation::{validate_arguments, validate_value, ValidationError, ValidationResult};

/// Protocol version implemented by this crate.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Protocol versions the server accepts from clients during negotiation.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];
