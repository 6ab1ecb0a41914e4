use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use stardag::dag::ScheduledTask;
use stardag::engine::{RuntimeEvent, TaskOutcome};
use stardag::errors::Result;
use stardag::exec::ExecutorBackend;
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which tasks were dispatched, in dispatch order
/// - reports `TaskStarted` and then `TaskCompleted` for each scheduled task,
///   with `Success` unless an outcome was scripted for that task.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    outcomes: HashMap<String, TaskOutcome>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            outcomes: HashMap::new(),
        }
    }

    /// Report `outcome` instead of `Success` for `task`.
    pub fn with_outcome(mut self, task: &str, outcome: TaskOutcome) -> Self {
        self.outcomes.insert(task.to_string(), outcome);
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let outcomes = &self.outcomes;

        Box::pin(async move {
            for t in tasks {
                executed.lock().unwrap().push(t.id.clone());

                let outcome = outcomes.get(&t.id).cloned().unwrap_or(TaskOutcome::Success);
                tx.send(RuntimeEvent::TaskStarted {
                    task: t.id.clone(),
                    attempt: 1,
                })
                .await
                .map_err(anyhow::Error::from)?;
                tx.send(RuntimeEvent::TaskCompleted {
                    task: t.id.clone(),
                    outcome,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
