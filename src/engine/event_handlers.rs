// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::Duration;

use tracing::{info, warn};

use crate::dag::{RunState, ScheduledTask, Scheduler, SchedulerStep, TaskId};
use crate::engine::TaskOutcome;
use crate::errors::TaskError;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Ask every in-flight executor to stop cooperatively.
    CancelInFlight,
    /// The run is over; no further events are expected.
    Finished(RunState),
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute (dispatch, cancel, finish).
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn idle() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: true,
        }
    }
}

/// Translate a scheduler step into IO commands.
pub fn commands_for(step: SchedulerStep) -> CoreStep {
    let mut commands = Vec::new();

    if step.cancel_in_flight {
        commands.push(CoreCommand::CancelInFlight);
    }
    if !step.dispatched.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.dispatched));
    }

    let keep_running = match step.finished {
        Some(state) => {
            commands.push(CoreCommand::Finished(state));
            false
        }
        None => true,
    };

    CoreStep {
        commands,
        keep_running,
    }
}

/// Seed the run with its root tasks.
pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    commands_for(scheduler.start())
}

pub fn handle_task_started(scheduler: &mut Scheduler, task: TaskId, attempt: u32) -> CoreStep {
    commands_for(scheduler.handle_started(&task, attempt))
}

pub fn handle_task_retrying(
    scheduler: &mut Scheduler,
    task: TaskId,
    attempt: u32,
    error: TaskError,
    delay: Duration,
) -> CoreStep {
    info!(task = %task, attempt, ?delay, "retry scheduled");
    commands_for(scheduler.handle_retrying(&task, attempt, error))
}

pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: TaskId,
    outcome: TaskOutcome,
) -> CoreStep {
    commands_for(scheduler.handle_completion(&task, outcome))
}

/// Graceful shutdown: abort the run and wait for in-flight tasks to report.
pub fn handle_shutdown(scheduler: &mut Scheduler) -> CoreStep {
    if scheduler.is_finished() {
        return CoreStep {
            commands: Vec::new(),
            keep_running: false,
        };
    }
    warn!("shutdown requested; aborting run");
    commands_for(scheduler.abort("shutdown requested"))
}
