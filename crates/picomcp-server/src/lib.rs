//! # PicoMCP Server
//!
//! The MCP server core for constrained devices: a JSON-RPC 2.0 dispatcher
//! with multi-session tracking, a catalog of tools / resources / resource
//! templates / prompts / roots, role-based access control with a bounded
//! audit trail, a reliability layer around every tool call (rate limiting,
//! circuit breaking, retry with backoff, watchdog kicks), and an async task
//! engine for long-running tools.
//!
//! Transports are out of scope; they talk to the server through the
//! [`server::RequestEnvelope`] / outbox contract: deliver a JSON-RPC
//! payload, receive zero or one response payload, and drain server-initiated
//! notifications on their own cadence.
//!
//! ## Example
//!
//! ```no_run
//! use picomcp_server::{ServerBuilder, ToolDef};
//! use picomcp_core::RetryOutcome;
//!
//! let server = ServerBuilder::new()
//!     .name("bench-rig")
//!     .version("0.3.0")
//!     .build();
//!
//! server.add_tool(
//!     ToolDef::new("gpio_read", "Read a GPIO pin")
//!         .input_schema(r#"{"type":"object","properties":{"pin":{"type":"integer"}},"required":["pin"]}"#)
//!         .handler(|args| {
//!             let pin = args.get("pin").and_then(|v| v.as_i64()).unwrap_or(0);
//!             RetryOutcome::success(format!("{{\"pin\":{pin},\"state\":1}}"))
//!         }),
//! ).unwrap();
//! ```

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod access_control;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod registry;
pub mod routing;
pub mod server;
pub mod tasks;
pub mod tracker;

pub use access_control::AccessControl;
pub use config::{RateLimitKeySource, ServerConfig};
pub use error::{McpError, McpResult, ServerResult};
pub use registry::{PromptDef, Registry, ResourceDef, TemplateDef, ToolDef};
pub use server::{McpServer, RequestEnvelope, ServerBuilder, Transport};
pub use tasks::TaskEngine;
pub use tracker::RequestTracker;

/// Default server name advertised at initialize.
pub const SERVER_NAME: &str = "picomcp";
/// Server version advertised at initialize.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
