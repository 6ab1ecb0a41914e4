// src/engine/report.rs

//! Summary of a finished run, for the log, stdout and `--report` JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::context::RunContext;
use crate::dag::{RunState, Scheduler, TaskStatus};
use crate::errors::ErrorKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub id: String,
    pub action: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub state: RunState,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    /// One entry per task, in topological order.
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn new(ctx: &RunContext, scheduler: &Scheduler) -> Self {
        let graph = scheduler.graph();
        let tasks = graph
            .topological_order()
            .iter()
            .filter_map(|id| graph.task(id))
            .map(|t| {
                // Errors are only reported for tasks that did not succeed.
                let error = if t.status == TaskStatus::Success {
                    None
                } else {
                    t.last_error.as_ref()
                };
                TaskReport {
                    id: t.id.clone(),
                    action: t.action.kind().to_string(),
                    status: t.status,
                    attempts: t.attempt_count,
                    critical: t.critical,
                    error_kind: error.map(|e| e.kind()),
                    last_error: error.map(|e| e.to_string()),
                }
            })
            .collect();

        Self {
            run_id: ctx.run_id().to_string(),
            state: scheduler.state(),
            window_start: ctx.window().start(),
            window_end: ctx.window().end(),
            abort_reason: scheduler.abort_reason().map(str::to_string),
            tasks,
        }
    }

    pub fn task(&self, id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks that did not end in `Success`.
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| t.status != TaskStatus::Success)
    }

    /// Process exit code for the run trigger surface.
    ///
    /// 0 = Succeeded, 1 = Failed, 2 = Aborted.
    pub fn exit_code(&self) -> u8 {
        match self.state {
            RunState::Succeeded => 0,
            RunState::Failed => 1,
            RunState::Aborted | RunState::NotStarted | RunState::Running => 2,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} [{} .. {}]: {}",
            self.run_id,
            self.window_start.to_rfc3339(),
            self.window_end.to_rfc3339(),
            self.state
        )?;
        if let Some(reason) = &self.abort_reason {
            writeln!(f, "  abort reason: {reason}")?;
        }
        for t in &self.tasks {
            write!(f, "  {:<32} {:<9} attempts={}", t.id, t.status.to_string(), t.attempts)?;
            if let (Some(kind), Some(err)) = (t.error_kind, &t.last_error) {
                write!(f, "  {kind}: {err}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
