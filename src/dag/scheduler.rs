use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::task::{ScheduledTask, TaskId, TaskStatus};
use crate::engine::TaskOutcome;
use crate::errors::{Result, StardagError, TaskError};

/// State of a whole pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Scheduler holds the validated graph plus the mutable state of one run.
///
/// It is responsible for:
/// - seeding the ready set and dispatching up to `max_concurrency` tasks
/// - promoting dependents when a task succeeds
/// - skipping all descendants when a task fails terminally
/// - aborting the run when a critical task fails
/// - deciding when the run has finished and with which [`RunState`]
///
/// The scheduler does no IO; every method returns a [`SchedulerStep`]
/// describing what changed.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    unmet: HashMap<TaskId, usize>,
    ready: VecDeque<TaskId>,
    in_flight: BTreeSet<TaskId>,
    state: RunState,
    max_concurrency: usize,
    abort_reason: Option<String>,
    finished: bool,
}

impl Scheduler {
    /// Construct a scheduler, validating the graph if needed.
    pub fn new(mut graph: DagGraph, max_concurrency: usize) -> Result<Self> {
        if max_concurrency == 0 {
            return Err(StardagError::ConfigError(
                "max_concurrency must be >= 1 (got 0)".to_string(),
            ));
        }
        if !graph.is_validated() {
            graph.validate()?;
        }

        let unmet = StateManager::initial_unmet(&graph);
        Ok(Self {
            graph,
            unmet,
            ready: VecDeque::new(),
            in_flight: BTreeSet::new(),
            state: RunState::NotStarted,
            max_concurrency,
            abort_reason: None,
            finished: false,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.graph.task(task).map(|t| t.status)
    }

    /// Tasks that are `Ready` but not yet dispatched.
    pub fn ready_set(&self) -> Vec<TaskId> {
        self.ready
            .iter()
            .filter(|id| self.status_of(id) == Some(TaskStatus::Ready))
            .cloned()
            .collect()
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &str> {
        self.in_flight.iter().map(String::as_str)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Begin the run: roots become `Ready` and are dispatched to capacity.
    pub fn start(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.state != RunState::NotStarted {
            warn!(state = %self.state, "start called on a run that already started; ignoring");
            return step;
        }

        self.state = RunState::Running;
        info!(
            tasks = self.graph.len(),
            max_concurrency = self.max_concurrency,
            "scheduler: starting run"
        );

        for id in self.graph.ready_tasks() {
            if let Some(t) = self.graph.task_mut(&id) {
                if t.transition(TaskStatus::Ready) {
                    self.ready.push_back(id.clone());
                    step.newly_ready.push(id);
                }
            }
        }

        step.dispatched = self.dispatch();
        step.finished = self.maybe_finish();
        step
    }

    /// An executor began attempt number `attempt` of `task`.
    pub fn handle_started(&mut self, task: &str, attempt: u32) -> SchedulerStep {
        match self.graph.task_mut(task) {
            Some(t) => {
                if t.status == TaskStatus::Retrying {
                    t.transition(TaskStatus::Running);
                }
                t.attempt_count = attempt;
                debug!(task = %task, attempt, "attempt started");
            }
            None => warn!(task = %task, "start event for unknown task; ignoring"),
        }
        SchedulerStep::default()
    }

    /// Attempt `attempt` of `task` failed and the executor will retry.
    pub fn handle_retrying(&mut self, task: &str, attempt: u32, error: TaskError) -> SchedulerStep {
        match self.graph.task_mut(task) {
            Some(t) => {
                t.attempt_count = attempt;
                warn!(task = %task, attempt, error = %error, "attempt failed; will retry");
                t.last_error = Some(error);
                if t.transition(TaskStatus::Failed) {
                    t.transition(TaskStatus::Retrying);
                }
            }
            None => warn!(task = %task, "retry event for unknown task; ignoring"),
        }
        SchedulerStep::default()
    }

    /// An executor finished with `task` for good.
    pub fn handle_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if !self.in_flight.remove(task) {
            warn!(task = %task, "completion for task that is not in flight; ignoring");
            return step;
        }

        let Some(t) = self.graph.task_mut(task) else {
            warn!(task = %task, "completion for unknown task; ignoring");
            return step;
        };
        let critical = t.critical;

        match outcome {
            TaskOutcome::Success => {
                t.transition(TaskStatus::Success);
                info!(task = %task, attempts = t.attempt_count, "task succeeded");

                let mut manager = StateManager::new(&mut self.graph, &mut self.unmet);
                let released = manager.release_dependents(task);
                if self.state == RunState::Running {
                    self.ready.extend(released.iter().cloned());
                }
                step.newly_ready = released;
            }
            TaskOutcome::Failed(err) => {
                error!(
                    task = %task,
                    attempts = t.attempt_count,
                    kind = %err.kind(),
                    error = %err,
                    critical,
                    "task failed"
                );
                t.transition(TaskStatus::Failed);
                t.last_error = Some(err.clone());
                step.newly_failed.push(task.to_string());

                let mut manager = StateManager::new(&mut self.graph, &mut self.unmet);
                step.newly_skipped = manager.skip_descendants(task);

                if critical {
                    let reason = format!("critical task '{task}' failed: {err}");
                    let mut abort = self.abort_internal(reason);
                    step.newly_skipped.append(&mut abort.newly_skipped);
                    step.cancel_in_flight = abort.cancel_in_flight;
                }
            }
            TaskOutcome::Cancelled => {
                info!(task = %task, "task cancelled");
                t.transition(TaskStatus::Skipped);
                t.last_error = Some(TaskError::Cancelled);

                let mut manager = StateManager::new(&mut self.graph, &mut self.unmet);
                step.newly_skipped = manager.skip_descendants(task);
            }
        }

        step.dispatched = self.dispatch();
        step.finished = self.maybe_finish();
        step
    }

    /// Stop the run: nothing new is dispatched, waiting tasks are skipped and
    /// in-flight executors are asked to cancel.
    pub fn abort(&mut self, reason: impl Into<String>) -> SchedulerStep {
        if self.finished || self.state == RunState::Aborted {
            return SchedulerStep::default();
        }
        let mut step = self.abort_internal(reason.into());
        step.finished = self.maybe_finish();
        step
    }

    fn abort_internal(&mut self, reason: String) -> SchedulerStep {
        warn!(reason = %reason, in_flight = self.in_flight.len(), "aborting run");
        self.state = RunState::Aborted;
        self.abort_reason = Some(reason);
        self.ready.clear();

        let mut manager = StateManager::new(&mut self.graph, &mut self.unmet);
        SchedulerStep {
            newly_skipped: manager.skip_waiting(),
            cancel_in_flight: !self.in_flight.is_empty(),
            ..SchedulerStep::default()
        }
    }

    /// Move ready tasks to `Running` until the concurrency cap is reached.
    fn dispatch(&mut self) -> Vec<ScheduledTask> {
        let mut dispatched = Vec::new();
        if self.state != RunState::Running {
            return dispatched;
        }

        while self.in_flight.len() < self.max_concurrency {
            let Some(id) = self.ready.pop_front() else {
                break;
            };
            let Some(t) = self.graph.task_mut(&id) else {
                continue;
            };
            if t.status != TaskStatus::Ready || !t.transition(TaskStatus::Running) {
                continue;
            }

            debug!(task = %id, in_flight = self.in_flight.len() + 1, "dispatching task");
            dispatched.push(t.scheduled());
            self.in_flight.insert(id);
        }
        dispatched
    }

    /// Returns the final state the first time the run is found finished.
    fn maybe_finish(&mut self) -> Option<RunState> {
        if self.finished || !self.in_flight.is_empty() {
            return None;
        }

        match self.state {
            RunState::NotStarted => return None,
            RunState::Running => {
                if !self.ready.is_empty() {
                    return None;
                }
                let mut manager = StateManager::new(&mut self.graph, &mut self.unmet);
                if !manager.all_tasks_terminal() {
                    // Nothing runnable is left; whatever still waits can never start.
                    let stranded = manager.skip_waiting();
                    warn!(?stranded, "no runnable tasks left; skipping stranded tasks");
                }
                let any_failed = self
                    .graph
                    .tasks()
                    .any(|t| t.status == TaskStatus::Failed);
                self.state = if any_failed {
                    RunState::Failed
                } else {
                    RunState::Succeeded
                };
            }
            RunState::Succeeded | RunState::Failed | RunState::Aborted => {}
        }

        self.finished = true;
        info!(state = %self.state, "scheduler: run finished");
        Some(self.state)
    }
}
