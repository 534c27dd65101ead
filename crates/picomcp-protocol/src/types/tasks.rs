//! Task types for durable long-running tool execution.
//!
//! Lifecycle: `working` → `input_required` ⇄ `working` → terminal, where
//! terminal is one of `completed`, `failed`, `cancelled`. Terminal states
//! are absorbing.

use serde::{Deserialize, Serialize};

use super::core::Cursor;

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Actively executing.
    Working,
    /// Waiting for input from the requestor.
    InputRequired,
    /// Terminal: finished successfully; a result is stored.
    Completed,
    /// Terminal: failed.
    Failed,
    /// Terminal: cancelled by request.
    Cancelled,
}

impl TaskStatus {
    /// True for completed, failed, and cancelled.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The wire string for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::InputRequired => "input_required",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Per-tool task-augmentation support level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSupport {
    /// The tool cannot run as a task.
    #[default]
    Forbidden,
    /// The tool may run directly or as a task.
    Optional,
    /// The tool must run as a task.
    Required,
}

impl TaskSupport {
    /// The wire string for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::Optional => "optional",
            Self::Required => "required",
        }
    }
}

/// Task envelope attached to a tools/call request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Requested task lifetime in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

/// A task snapshot as returned by tasks/get, tasks/list, and task-augmented
/// tools/call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque task identifier.
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// Current status.
    pub status: TaskStatus,
    /// Human-readable status message.
    #[serde(rename = "statusMessage", skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Creation timestamp (RFC 3339).
    #[serde(rename = "createdAt")]
    pub created_at: String,
    /// Last update timestamp (RFC 3339).
    #[serde(rename = "lastUpdatedAt")]
    pub last_updated_at: String,
    /// Task lifetime in milliseconds; omitted when unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    /// Recommended polling interval in milliseconds.
    #[serde(rename = "pollInterval")]
    pub poll_interval: i64,
}

/// Parameters of tasks/get and tasks/result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskRequest {
    /// Task identifier.
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// Parameters of tasks/cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelTaskRequest {
    /// Task identifier.
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// Result of tasks/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResult {
    /// One page of tasks.
    pub tasks: Vec<Task>,
    /// Cursor for the next page.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(!TaskStatus::Working.is_terminal());
        assert!(!TaskStatus::InputRequired.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_wire_strings() {
        assert_eq!(
            serde_json::to_value(TaskStatus::InputRequired).unwrap(),
            "input_required"
        );
        assert_eq!(serde_json::to_value(TaskStatus::Working).unwrap(), "working");
    }

    #[test]
    fn ttl_omitted_when_unlimited() {
        let task = Task {
            task_id: "task-1".into(),
            status: TaskStatus::Working,
            status_message: None,
            created_at: "1970-01-01T00:00:00Z".into(),
            last_updated_at: "1970-01-01T00:00:00Z".into(),
            ttl: None,
            poll_interval: 5000,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("ttl").is_none());
        assert_eq!(json["pollInterval"], 5000);
    }
}
