// src/dag/mod.rs

//! Task graph representation and scheduling.
//!
//! - [`task`] defines tasks, their status and what gets dispatched.
//! - [`action`] holds the typed action variants a task can run.
//! - [`graph`] holds the validated directed acyclic graph of tasks.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready to run and how failures propagate.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] applies the downstream effects of one completion.

pub mod action;
pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task;

pub use action::{Action, LoadAction, SqlScript, StageAction};
pub use graph::DagGraph;
pub use scheduler::{RunState, Scheduler};
pub use scheduler_step::SchedulerStep;
pub use task::{ScheduledTask, Task, TaskId, TaskStatus};
