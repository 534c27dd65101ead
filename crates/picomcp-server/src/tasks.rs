//! The task engine: durable state machines for long-running tool calls.
//!
//! Tasks progress `working` → `input_required` ⇄ `working` → terminal
//! (`completed` / `failed` / `cancelled`); terminal states are absorbing
//! and post-terminal mutations are failed no-ops. Terminal tasks past
//! their TTL are pruned, and the total count is capped at twice the
//! configured maximum by removing the oldest terminal tasks first.

use chrono::Utc;
use parking_lot::Mutex;
use picomcp_core::SharedClock;
use picomcp_protocol::types::tasks::{Task, TaskStatus};
use picomcp_protocol::McpError;

use crate::error::ServerResult;

struct TaskRecord {
    task_id: String,
    tool_name: String,
    status: TaskStatus,
    status_message: String,
    created_at: String,
    last_updated_at: String,
    created_ms: u64,
    updated_ms: u64,
    ttl_ms: i64,
    poll_interval_ms: i64,
    result_json: Option<String>,
}

impl TaskRecord {
    fn snapshot(&self) -> Task {
        Task {
            task_id: self.task_id.clone(),
            status: self.status,
            status_message: if self.status_message.is_empty() {
                None
            } else {
                Some(self.status_message.clone())
            },
            created_at: self.created_at.clone(),
            last_updated_at: self.last_updated_at.clone(),
            ttl: if self.ttl_ms >= 0 { Some(self.ttl_ms) } else { None },
            poll_interval: self.poll_interval_ms,
        }
    }
}

struct Inner {
    tasks: Vec<TaskRecord>,
    next_id: u32,
}

/// Bounded registry of tasks with monotonic ids.
pub struct TaskEngine {
    clock: SharedClock,
    max_tasks: usize,
    default_poll_interval_ms: i64,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("count", &self.inner.lock().tasks.len())
            .field("max_tasks", &self.max_tasks)
            .finish()
    }
}

impl TaskEngine {
    /// Create an engine. `max_tasks` is a soft cap; the reaper holds the
    /// total at twice this value.
    pub fn new(max_tasks: usize, default_poll_interval_ms: i64, clock: SharedClock) -> Self {
        Self {
            clock,
            max_tasks: max_tasks.max(1),
            default_poll_interval_ms,
            inner: Mutex::new(Inner {
                tasks: Vec::new(),
                next_id: 1,
            }),
        }
    }

    fn now_rfc3339() -> String {
        Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    fn reap(&self, inner: &mut Inner) {
        let now = self.clock.now_ms();
        // Time-based expiry of terminal tasks.
        inner.tasks.retain(|t| {
            if !t.status.is_terminal() || t.ttl_ms <= 0 {
                return true;
            }
            let expiry = t.updated_ms.saturating_add(t.ttl_ms as u64);
            now < expiry
        });
        // Memory backstop: cap total tasks at twice the configured
        // maximum, removing oldest terminal tasks first.
        while inner.tasks.len() > self.max_tasks * 2 {
            match inner.tasks.iter().position(|t| t.status.is_terminal()) {
                Some(idx) => {
                    inner.tasks.remove(idx);
                }
                None => break,
            }
        }
    }

    /// Allocate a new task in the working state. `ttl_ms < 0` means
    /// unlimited.
    pub fn create_task(&self, tool_name: &str, ttl_ms: i64) -> Task {
        let mut inner = self.inner.lock();
        self.reap(&mut inner);

        let id = inner.next_id;
        inner.next_id += 1;
        let task_id = format!("task-{id}");
        let now_iso = Self::now_rfc3339();
        let now_ms = self.clock.now_ms();

        tracing::debug!(task = %task_id, tool = tool_name, ttl_ms, "task created");
        let record = TaskRecord {
            task_id: task_id.clone(),
            tool_name: tool_name.to_string(),
            status: TaskStatus::Working,
            status_message: "The operation is now in progress.".to_string(),
            created_at: now_iso.clone(),
            last_updated_at: now_iso,
            created_ms: now_ms,
            updated_ms: now_ms,
            ttl_ms,
            poll_interval_ms: self.default_poll_interval_ms,
            result_json: None,
        };
        let snapshot = record.snapshot();
        inner.tasks.push(record);
        snapshot
    }

    /// A snapshot of a task, or None when unknown or reaped.
    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        let mut inner = self.inner.lock();
        self.reap(&mut inner);
        inner
            .tasks
            .iter()
            .find(|t| t.task_id == task_id)
            .map(TaskRecord::snapshot)
    }

    /// The tool a task was created for.
    pub fn tool_for_task(&self, task_id: &str) -> Option<String> {
        self.inner
            .lock()
            .tasks
            .iter()
            .find(|t| t.task_id == task_id)
            .map(|t| t.tool_name.clone())
    }

    fn mutate(
        &self,
        task_id: &str,
        f: impl FnOnce(&mut TaskRecord),
    ) -> bool {
        let mut inner = self.inner.lock();
        let Some(record) = inner.tasks.iter_mut().find(|t| t.task_id == task_id) else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }
        f(record);
        record.last_updated_at = Self::now_rfc3339();
        record.updated_ms = self.clock.now_ms();
        true
    }

    /// Move a non-terminal task to a new status. Post-terminal calls are
    /// failed no-ops.
    pub fn update_status(&self, task_id: &str, status: TaskStatus, message: &str) -> bool {
        self.mutate(task_id, |record| {
            record.status = status;
            if !message.is_empty() {
                record.status_message = message.to_string();
            }
        })
    }

    /// Complete a task with a serialized result.
    pub fn complete_task(&self, task_id: &str, result_json: &str) -> bool {
        self.mutate(task_id, |record| {
            record.status = TaskStatus::Completed;
            record.status_message = "Task completed successfully.".to_string();
            record.result_json = Some(result_json.to_string());
        })
    }

    /// Fail a task with an error message.
    pub fn fail_task(&self, task_id: &str, error: &str) -> bool {
        self.mutate(task_id, |record| {
            record.status = TaskStatus::Failed;
            record.status_message = error.to_string();
        })
    }

    /// Cancel a non-terminal task, returning the updated snapshot.
    pub fn cancel_task(&self, task_id: &str) -> ServerResult<Task> {
        let cancelled = self.mutate(task_id, |record| {
            record.status = TaskStatus::Cancelled;
            record.status_message = "The task was cancelled by request.".to_string();
        });
        if cancelled {
            return Ok(self.get_task(task_id).expect("task just mutated"));
        }
        match self.get_task(task_id) {
            Some(task) => Err(McpError::invalid_params(format!(
                "Task {} is already {}",
                task_id,
                task.status.as_str()
            ))),
            None => Err(McpError::invalid_params(format!("Unknown task: {task_id}"))),
        }
    }

    /// The stored result of a completed task. Non-terminal tasks and
    /// failed/cancelled tasks error, the latter carrying the status
    /// message.
    pub fn task_result(&self, task_id: &str) -> ServerResult<String> {
        let inner = self.inner.lock();
        let record = inner
            .tasks
            .iter()
            .find(|t| t.task_id == task_id)
            .ok_or_else(|| McpError::invalid_params(format!("Unknown task: {task_id}")))?;
        match record.status {
            TaskStatus::Completed => record
                .result_json
                .clone()
                .ok_or_else(|| McpError::internal("Completed task has no stored result")),
            TaskStatus::Working | TaskStatus::InputRequired => Err(McpError::invalid_params(
                format!("Task {task_id} is not terminal"),
            )),
            TaskStatus::Failed | TaskStatus::Cancelled => Err(McpError::application(format!(
                "Task {} {}: {}",
                task_id,
                record.status.as_str(),
                record.status_message
            ))),
        }
    }

    /// One page of task snapshots, in creation order.
    pub fn list(&self, offset: usize, page_size: usize) -> (Vec<Task>, Option<String>) {
        let mut inner = self.inner.lock();
        self.reap(&mut inner);
        let total = inner.tasks.len();
        let page: Vec<Task> = inner
            .tasks
            .iter()
            .skip(offset)
            .take(page_size)
            .map(TaskRecord::snapshot)
            .collect();
        let next = offset + page.len();
        let next_cursor = if next < total {
            Some(next.to_string())
        } else {
            None
        };
        (page, next_cursor)
    }

    /// Number of live tasks.
    pub fn count(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// The configured soft cap.
    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }
}
