// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::scheduler::RunState;
use crate::dag::task::{ScheduledTask, TaskId};

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the graph and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks moved to `Running` that the executor should start now.
    pub dispatched: Vec<ScheduledTask>,
    /// Tasks whose dependencies all succeeded in this step.
    pub newly_ready: Vec<TaskId>,
    /// Tasks skipped because of an upstream failure or an abort.
    pub newly_skipped: Vec<TaskId>,
    /// Tasks that failed terminally in this step.
    pub newly_failed: Vec<TaskId>,
    /// In-flight executors should be asked to stop.
    pub cancel_in_flight: bool,
    /// Set on the step in which the run finished.
    pub finished: Option<RunState>,
}

impl SchedulerStep {
    pub fn dispatched_ids(&self) -> Vec<&str> {
        self.dispatched.iter().map(|t| t.id.as_str()).collect()
    }
}
