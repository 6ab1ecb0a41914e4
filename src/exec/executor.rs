// src/exec/executor.rs

//! Single-task executor: attempts, timeouts, retries and cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::TaskError;

use super::actions::ActionRunner;

/// Runs one scheduled task to a final [`TaskOutcome`].
///
/// For every attempt it emits `TaskStarted`, runs the action once under the
/// task's timeout and, on a retryable failure, emits `TaskRetrying` and waits
/// for the backoff delay. The cancellation token is honoured before each
/// attempt and during retry waits; an attempt already in progress is allowed
/// to finish.
pub struct Executor {
    context: Arc<RunContext>,
    runner: Arc<dyn ActionRunner>,
    events: mpsc::Sender<RuntimeEvent>,
    cancel: CancellationToken,
    default_timeout: Option<Duration>,
}

impl Executor {
    pub fn new(
        context: Arc<RunContext>,
        runner: Arc<dyn ActionRunner>,
        events: mpsc::Sender<RuntimeEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            context,
            runner,
            events,
            cancel,
            default_timeout: None,
        }
    }

    /// Timeout for tasks that do not set their own.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub async fn execute(&self, task: &ScheduledTask) -> TaskOutcome {
        let timeout = task.timeout.or(self.default_timeout);
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                info!(task = %task.id, attempt, "run cancelled before attempt");
                return TaskOutcome::Cancelled;
            }

            attempt += 1;
            self.emit(RuntimeEvent::TaskStarted {
                task: task.id.clone(),
                attempt,
            })
            .await;
            info!(
                task = %task.id,
                action = task.action.kind(),
                attempt,
                max_attempts = task.retry.max_retries + 1,
                "running attempt"
            );

            let err = match self.attempt(task, timeout).await {
                Ok(()) => return TaskOutcome::Success,
                Err(err) => err,
            };

            if !task.retry.should_retry(&err, attempt) {
                debug!(task = %task.id, attempt, error = %err, "not retrying");
                return TaskOutcome::Failed(err);
            }

            let delay = task.retry.delay_for(attempt);
            warn!(task = %task.id, attempt, ?delay, error = %err, "attempt failed; retrying");
            self.emit(RuntimeEvent::TaskRetrying {
                task: task.id.clone(),
                attempt,
                error: err,
                delay,
            })
            .await;

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(task = %task.id, attempt, "run cancelled during retry wait");
                    return TaskOutcome::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(
        &self,
        task: &ScheduledTask,
        timeout: Option<Duration>,
    ) -> Result<(), TaskError> {
        let run = self.runner.run(&task.action, &self.context);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .unwrap_or(Err(TaskError::Timeout(limit))),
            None => run.await,
        }
    }

    async fn emit(&self, event: RuntimeEvent) {
        if self.events.send(event).await.is_err() {
            debug!("runtime event channel closed; dropping executor event");
        }
    }
}
