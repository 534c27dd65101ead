//! The server: component wiring, the transport-facing receive path, and
//! the builder.

mod builder;
mod core;
mod transport;

pub use builder::ServerBuilder;
pub use core::{McpServer, ReceiveOutcome, ServerState};
pub use transport::{RequestEnvelope, Transport};
