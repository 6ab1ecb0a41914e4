// src/dag/task.rs

//! Task metadata and per-run status.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::dag::action::Action;
use crate::errors::TaskError;
use crate::exec::retry::RetryPolicy;

/// Canonical task identifier type used throughout the engine.
pub type TaskId = String;

/// Status of a task within a run.
///
/// Legal transitions:
/// - `Pending -> Ready | Skipped`
/// - `Ready -> Running | Skipped`
/// - `Running -> Success | Failed | Skipped`
/// - `Failed -> Retrying` and `Retrying -> Running | Skipped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Success,
    Failed,
    Skipped,
    Retrying,
}

impl TaskStatus {
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Ready, Running)
                | (Ready, Skipped)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Skipped)
                | (Failed, Retrying)
                | (Retrying, Running)
                | (Retrying, Skipped)
        )
    }

    /// No further transition will happen in this run.
    ///
    /// `Failed` counts as terminal once the executor has given up; a failed
    /// attempt that will be retried moves on to `Retrying` immediately.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed | TaskStatus::Skipped)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A node of the dependency graph.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub action: Arc<Action>,
    pub status: TaskStatus,
    /// Attempts started so far in this run.
    pub attempt_count: u32,
    pub retry: RetryPolicy,
    /// Per-attempt timeout; `None` falls back to the run-wide default.
    pub timeout: Option<Duration>,
    /// Failure of a critical task aborts the whole run.
    pub critical: bool,
    pub dependencies: BTreeSet<TaskId>,
    /// Derived from `dependencies` when the graph is validated.
    pub dependents: BTreeSet<TaskId>,
    pub last_error: Option<TaskError>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, action: Action) -> Self {
        Self {
            id: id.into(),
            action: Arc::new(action),
            status: TaskStatus::Pending,
            attempt_count: 0,
            retry: RetryPolicy::none(),
            timeout: None,
            critical: false,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            last_error: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Apply a status transition if it is legal.
    ///
    /// Illegal transitions are logged and ignored; returns whether the
    /// transition was applied.
    pub fn transition(&mut self, to: TaskStatus) -> bool {
        if self.status.can_transition_to(to) {
            self.status = to;
            true
        } else {
            warn!(
                task = %self.id,
                from = %self.status,
                to = %to,
                "ignoring illegal task status transition"
            );
            false
        }
    }

    pub(crate) fn scheduled(&self) -> ScheduledTask {
        ScheduledTask {
            id: self.id.clone(),
            action: Arc::clone(&self.action),
            retry: self.retry,
            timeout: self.timeout,
            critical: self.critical,
        }
    }
}

/// Description of a task that the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub action: Arc<Action>,
    pub retry: RetryPolicy,
    pub timeout: Option<Duration>,
    pub critical: bool,
}
