//! Root types and the roots/list payload.

use serde::{Deserialize, Serialize};

use super::core::Cursor;

/// A filesystem or logical root advertised by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    /// Root URI.
    pub uri: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of roots/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// One page of roots, in registration order.
    pub roots: Vec<Root>,
    /// Cursor for the next page.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}
