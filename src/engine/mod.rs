// src/engine/mod.rs

//! Orchestration engine for stardag.
//!
//! This module ties together:
//! - the graph scheduler
//! - the main runtime event loop that reacts to:
//!   - attempt start / retry notifications from executors
//!   - task completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`report`] turns a finished run into the
//! summary handed back to the caller.

use std::time::Duration;

use crate::dag::TaskId;
use crate::errors::TaskError;

/// Final outcome of a task as reported by its executor.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success,
    /// Failed after exhausting retries (or with a non-retryable error).
    Failed(TaskError),
    /// Abandoned because the run was aborted.
    Cancelled,
}

/// Events flowing into the runtime from executors and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// An executor began an attempt.
    TaskStarted { task: TaskId, attempt: u32 },
    /// An attempt failed and another one follows after `delay`.
    TaskRetrying {
        task: TaskId,
        attempt: u32,
        error: TaskError,
        delay: Duration,
    },
    /// An executor is done with a task.
    TaskCompleted { task: TaskId, outcome: TaskOutcome },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod report;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use report::{RunReport, TaskReport};
pub use runtime::Runtime;
