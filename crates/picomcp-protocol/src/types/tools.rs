//! Tool definitions and the tools/list + tools/call payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::Content;
use super::core::Cursor;
use super::tasks::TaskMetadata;

/// Behavior hints attached to a tool definition.
///
/// Per the MCP spec these are hints only; clients must not base trust
/// decisions on them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolAnnotations {
    /// Display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Hint that the tool does not modify state. Default: false.
    #[serde(rename = "readOnlyHint", skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// Hint that the tool may perform destructive actions. Default: true.
    #[serde(rename = "destructiveHint", skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// Hint that repeated calls with the same arguments have no additional
    /// effect. Default: false.
    #[serde(rename = "idempotentHint", skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// Hint that the tool interacts with external systems. Default: true.
    #[serde(rename = "openWorldHint", skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

impl ToolAnnotations {
    /// Effective destructive hint, defaulting to true.
    pub fn destructive(&self) -> bool {
        self.destructive_hint.unwrap_or(true)
    }

    /// Effective open-world hint, defaulting to true.
    pub fn open_world(&self) -> bool {
        self.open_world_hint.unwrap_or(true)
    }
}

/// A tool as advertised in tools/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    /// Optional JSON Schema for the tool's structured output.
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Behavior hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
    /// Task-augmented execution support ("forbidden" / "optional" /
    /// "required"); omitted when forbidden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ToolExecution>,
}

/// Execution block advertising task support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    /// Task support level.
    #[serde(rename = "taskSupport")]
    pub task_support: String,
}

/// Parameters of a tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequest {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    /// Task envelope requesting task-augmented execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskMetadata>,
    /// Request metadata (progress token lives at `_meta.progressToken`).
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl CallToolRequest {
    /// The progress token from `_meta.progressToken`, rendered as a string.
    pub fn progress_token(&self) -> Option<String> {
        let token = self.meta.as_ref()?.get("progressToken")?;
        match token {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Result of a tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Content blocks produced by the tool.
    pub content: Vec<Content>,
    /// True when the tool itself failed; the call still succeeded at the
    /// protocol level.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Structured output validated against the tool's output schema.
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// A plain-text success result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: None,
            structured_content: None,
        }
    }

    /// A plain-text error result (`isError: true`).
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: Some(true),
            structured_content: None,
        }
    }
}

/// Result of a tools/list request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// One page of tools, in registration order.
    pub tools: Vec<Tool>,
    /// Cursor for the next page; absent when the listing is complete.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_defaults() {
        let ann = ToolAnnotations::default();
        assert!(ann.destructive());
        assert!(ann.open_world());
        let ann = ToolAnnotations {
            destructive_hint: Some(false),
            ..Default::default()
        };
        assert!(!ann.destructive());
    }

    #[test]
    fn progress_token_from_meta() {
        let req: CallToolRequest = serde_json::from_value(serde_json::json!({
            "name": "slow_read",
            "arguments": {},
            "_meta": { "progressToken": 17 }
        }))
        .unwrap();
        assert_eq!(req.progress_token().as_deref(), Some("17"));
    }

    #[test]
    fn call_result_error_shape() {
        let result = CallToolResult::error("sensor NAK");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isError"], true);
        assert_eq!(json["content"][0]["text"], "sensor NAK");
    }
}
