//! Polled task scheduler.
//!
//! Not a thread: the owning event loop calls [`Scheduler::loop_once`] and
//! due callbacks run inline. Supports repeating, one-shot, and
//! run-N-times tasks, managed by name.

use serde_json::Value;

use crate::clock::SharedClock;

type TaskFn = Box<dyn FnMut() + Send>;

struct ScheduledTask {
    name: String,
    callback: TaskFn,
    interval_ms: u64,
    next_run_ms: u64,
    last_run_ms: u64,
    exec_count: u64,
    max_executions: u64,
    paused: bool,
    one_shot: bool,
    active: bool,
}

/// Lightweight periodic + one-shot task runner.
pub struct Scheduler {
    clock: SharedClock,
    tasks: Vec<ScheduledTask>,
    max_tasks: usize,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("count", &self.count())
            .field("max_tasks", &self.max_tasks)
            .finish()
    }
}

impl Scheduler {
    /// Default task capacity.
    pub const DEFAULT_MAX_TASKS: usize = 32;

    /// Create a scheduler holding at most `max_tasks` tasks.
    pub fn new(max_tasks: usize, clock: SharedClock) -> Self {
        Self {
            clock,
            tasks: Vec::new(),
            max_tasks: max_tasks.max(1),
        }
    }

    /// Schedule a repeating task. Returns false when full or the interval
    /// is zero.
    pub fn every(
        &mut self,
        interval_ms: u64,
        callback: impl FnMut() + Send + 'static,
        name: &str,
    ) -> bool {
        if self.tasks.len() >= self.max_tasks || interval_ms == 0 {
            return false;
        }
        let now = self.clock.now_ms();
        self.tasks.push(ScheduledTask {
            name: name.to_string(),
            callback: Box::new(callback),
            interval_ms,
            next_run_ms: now + interval_ms,
            last_run_ms: 0,
            exec_count: 0,
            max_executions: 0,
            paused: false,
            one_shot: false,
            active: true,
        });
        true
    }

    /// Schedule a one-shot task at an absolute clock time.
    pub fn at(&mut self, at_ms: u64, callback: impl FnMut() + Send + 'static, name: &str) -> bool {
        if self.tasks.len() >= self.max_tasks {
            return false;
        }
        self.tasks.push(ScheduledTask {
            name: name.to_string(),
            callback: Box::new(callback),
            interval_ms: 0,
            next_run_ms: at_ms,
            last_run_ms: 0,
            exec_count: 0,
            max_executions: 0,
            paused: false,
            one_shot: true,
            active: true,
        });
        true
    }

    /// Schedule a task that runs `max_executions` times then removes
    /// itself.
    pub fn times(
        &mut self,
        interval_ms: u64,
        max_executions: u64,
        callback: impl FnMut() + Send + 'static,
        name: &str,
    ) -> bool {
        if !self.every(interval_ms, callback, name) {
            return false;
        }
        if let Some(task) = self.tasks.last_mut() {
            task.max_executions = max_executions;
        }
        true
    }

    /// Run every due task once. Call from the owning event loop. Returns
    /// the number of callbacks executed this tick; finished tasks are
    /// garbage-collected at the end of the tick.
    pub fn loop_once(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut executed = 0;

        for task in &mut self.tasks {
            if !task.active || task.paused {
                continue;
            }
            if now >= task.next_run_ms {
                (task.callback)();
                task.last_run_ms = now;
                task.exec_count += 1;
                executed += 1;

                if task.one_shot
                    || (task.max_executions > 0 && task.exec_count >= task.max_executions)
                {
                    task.active = false;
                } else {
                    task.next_run_ms = now + task.interval_ms;
                }
            }
        }

        if executed > 0 {
            self.tasks.retain(|t| t.active);
        }
        executed
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut ScheduledTask> {
        if name.is_empty() {
            return None;
        }
        self.tasks.iter_mut().find(|t| t.active && t.name == name)
    }

    /// Pause a task by name.
    pub fn pause(&mut self, name: &str) -> bool {
        match self.find_mut(name) {
            Some(task) => {
                task.paused = true;
                true
            }
            None => false,
        }
    }

    /// Resume a paused task by name.
    pub fn resume(&mut self, name: &str) -> bool {
        match self.find_mut(name) {
            Some(task) => {
                task.paused = false;
                true
            }
            None => false,
        }
    }

    /// Remove a task by name; the slot is reclaimed at the next tick.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.find_mut(name) {
            Some(task) => {
                task.active = false;
                true
            }
            None => false,
        }
    }

    /// Change a task's interval, resetting its next run from now.
    pub fn reschedule(&mut self, name: &str, new_interval_ms: u64) -> bool {
        if new_interval_ms == 0 {
            return false;
        }
        let now = self.clock.now_ms();
        match self.find_mut(name) {
            Some(task) => {
                task.interval_ms = new_interval_ms;
                task.next_run_ms = now + new_interval_ms;
                true
            }
            None => false,
        }
    }

    /// True when an active task with this name exists.
    pub fn exists(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t.active && t.name == name)
    }

    /// Execution count of a named task (0 when unknown).
    pub fn exec_count(&self, name: &str) -> u64 {
        self.tasks
            .iter()
            .find(|t| t.active && t.name == name)
            .map(|t| t.exec_count)
            .unwrap_or(0)
    }

    /// Number of active tasks.
    pub fn count(&self) -> usize {
        self.tasks.iter().filter(|t| t.active).count()
    }

    /// Task capacity.
    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    /// Remove every task.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Serialize scheduler status to JSON.
    pub fn to_json(&self) -> Value {
        let tasks: Vec<Value> = self
            .tasks
            .iter()
            .filter(|t| t.active)
            .map(|t| {
                let mut obj = serde_json::json!({
                    "name": t.name,
                    "intervalMs": t.interval_ms,
                    "execCount": t.exec_count,
                    "paused": t.paused,
                    "oneShot": t.one_shot,
                });
                if t.max_executions > 0 {
                    obj["maxExecutions"] = Value::from(t.max_executions);
                }
                obj
            })
            .collect();
        serde_json::json!({
            "taskCount": self.count(),
            "maxTasks": self.max_tasks,
            "tasks": tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn scheduler() -> (Scheduler, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        (Scheduler::new(8, clock.clone()), clock)
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        (count, move || {
            count2.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn repeating_task_fires_on_interval() {
        let (mut sched, clock) = scheduler();
        let (count, callback) = counter();
        assert!(sched.every(100, callback, "tick"));

        assert_eq!(sched.loop_once(), 0);
        clock.advance(100);
        assert_eq!(sched.loop_once(), 1);
        clock.advance(99);
        assert_eq!(sched.loop_once(), 0);
        clock.advance(1);
        assert_eq!(sched.loop_once(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(sched.exec_count("tick"), 2);
    }

    #[test]
    fn one_shot_runs_once_and_is_collected() {
        let (mut sched, clock) = scheduler();
        let (count, callback) = counter();
        assert!(sched.at(50, callback, "once"));
        clock.advance(50);
        assert_eq!(sched.loop_once(), 1);
        assert!(!sched.exists("once"));
        clock.advance(1000);
        assert_eq!(sched.loop_once(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn times_auto_removes_after_limit() {
        let (mut sched, clock) = scheduler();
        let (count, callback) = counter();
        assert!(sched.times(10, 3, callback, "triple"));
        for _ in 0..10 {
            clock.advance(10);
            sched.loop_once();
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!sched.exists("triple"));
    }

    #[test]
    fn pause_and_resume() {
        let (mut sched, clock) = scheduler();
        let (count, callback) = counter();
        sched.every(10, callback, "t");
        assert!(sched.pause("t"));
        assert!(sched.pause("t")); // idempotent
        clock.advance(100);
        assert_eq!(sched.loop_once(), 0);
        assert!(sched.resume("t"));
        assert!(sched.resume("t")); // idempotent
        assert_eq!(sched.loop_once(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_by_name() {
        let (mut sched, clock) = scheduler();
        let (count, callback) = counter();
        sched.every(10, callback, "t");
        assert!(sched.remove("t"));
        assert!(!sched.remove("t"));
        clock.advance(100);
        assert_eq!(sched.loop_once(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reschedule_resets_next_run() {
        let (mut sched, clock) = scheduler();
        let (count, callback) = counter();
        sched.every(1000, callback, "t");
        assert!(sched.reschedule("t", 10));
        assert!(!sched.reschedule("t", 0));
        clock.advance(10);
        assert_eq!(sched.loop_once(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn capacity_and_zero_interval_rejected() {
        let clock = ManualClock::shared();
        let mut sched = Scheduler::new(1, clock);
        assert!(!sched.every(0, || {}, "zero"));
        assert!(sched.every(10, || {}, "a"));
        assert!(!sched.every(10, || {}, "b"));
        assert_eq!(sched.max_tasks(), 1);
    }

    #[test]
    fn json_snapshot() {
        let (mut sched, _) = scheduler();
        sched.every(5000, || {}, "battery");
        sched.times(100, 2, || {}, "calibrate");
        let json = sched.to_json();
        assert_eq!(json["taskCount"], 2);
        assert_eq!(json["tasks"][0]["name"], "battery");
        assert!(json["tasks"][0].get("maxExecutions").is_none());
        assert_eq!(json["tasks"][1]["maxExecutions"], 2);
    }
}
