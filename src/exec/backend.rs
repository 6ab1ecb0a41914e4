// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning work
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`RealExecutorBackend`].
//!
//! - `RealExecutorBackend` spawns one Tokio task per scheduled task, runs it
//!   through the shared [`Executor`] and reports `TaskCompleted`.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{error, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::{Result, TaskError};

use super::executor::Executor;

/// Trait abstracting how scheduled tasks are executed.
///
/// Production code uses [`RealExecutorBackend`]; tests can provide their own
/// implementation that doesn't touch a warehouse.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Must not wait for the tasks to finish; completion is reported
    /// through `RuntimeEvent::TaskCompleted`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    executor: Arc<Executor>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl RealExecutorBackend {
    pub fn new(executor: Arc<Executor>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            executor,
            runtime_tx,
        }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        for task in tasks {
            let executor = Arc::clone(&self.executor);
            let tx = self.runtime_tx.clone();

            tokio::spawn(async move {
                let id = task.id.clone();
                // The attempt loop runs in its own task so a panicking action
                // still produces a completion.
                let run = tokio::spawn(async move { executor.execute(&task).await });
                let outcome = match run.await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(task = %id, error = %err, "executor task did not finish");
                        TaskOutcome::Failed(TaskError::ActionFailure(join_failure(&err)))
                    }
                };
                let event = RuntimeEvent::TaskCompleted {
                    task: id.clone(),
                    outcome,
                };
                if tx.send(event).await.is_err() {
                    warn!(task = %id, "runtime gone; dropping completion");
                }
            });
        }

        Box::pin(async { Ok(()) })
    }
}

fn join_failure(err: &JoinError) -> String {
    if !err.is_panic() {
        return "executor task was cancelled".to_string();
    }
    format!("executor panicked: {err}")
}
