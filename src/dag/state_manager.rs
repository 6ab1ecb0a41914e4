// src/dag/state_manager.rs

//! Status propagation for a single completion event.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::dag::graph::DagGraph;
use crate::dag::task::{TaskId, TaskStatus};

/// Applies the downstream effects of one task reaching a terminal state.
///
/// Borrowed mutably for the duration of a single scheduler step, so status
/// transitions and unmet-dependency decrements of one completion are never
/// interleaved with another.
pub struct StateManager<'a> {
    graph: &'a mut DagGraph,
    unmet: &'a mut HashMap<TaskId, usize>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a mut DagGraph, unmet: &'a mut HashMap<TaskId, usize>) -> Self {
        Self { graph, unmet }
    }

    /// Unmet-dependency counts for a fresh run.
    pub fn initial_unmet(graph: &DagGraph) -> HashMap<TaskId, usize> {
        graph
            .tasks()
            .map(|t| (t.id.clone(), t.dependencies.len()))
            .collect()
    }

    /// Decrement the unmet count of each dependent of a succeeded task and
    /// promote those reaching zero to `Ready`.
    pub fn release_dependents(&mut self, task: &str) -> Vec<TaskId> {
        let dependents: Vec<TaskId> = self
            .graph
            .dependents_of(task)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();

        let mut newly_ready = Vec::new();
        for id in dependents {
            let Some(count) = self.unmet.get_mut(&id) else {
                warn!(task = %id, "dependent missing from unmet-dependency map");
                continue;
            };
            *count = count.saturating_sub(1);
            if *count > 0 {
                continue;
            }

            if let Some(t) = self.graph.task_mut(&id) {
                if t.status == TaskStatus::Pending && t.transition(TaskStatus::Ready) {
                    debug!(task = %id, upstream = %task, "all dependencies succeeded; Ready");
                    newly_ready.push(id);
                }
            }
        }
        newly_ready
    }

    /// Mark every task reachable from a failed task as `Skipped`.
    ///
    /// Returns the tasks that were newly skipped.
    pub fn skip_descendants(&mut self, failed: &str) -> Vec<TaskId> {
        let mut newly_skipped = Vec::new();
        for id in self.graph.descendants_of(failed) {
            if let Some(t) = self.graph.task_mut(&id) {
                if matches!(t.status, TaskStatus::Pending | TaskStatus::Ready)
                    && t.transition(TaskStatus::Skipped)
                {
                    debug!(task = %id, upstream = %failed, "skipping due to upstream failure");
                    newly_skipped.push(id);
                }
            }
        }
        newly_skipped
    }

    /// Skip every task that has not been dispatched yet.
    pub fn skip_waiting(&mut self) -> Vec<TaskId> {
        let waiting: Vec<TaskId> = self
            .graph
            .tasks()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Ready))
            .map(|t| t.id.clone())
            .collect();

        for id in waiting.iter() {
            if let Some(t) = self.graph.task_mut(id) {
                t.transition(TaskStatus::Skipped);
            }
        }
        waiting
    }

    /// No task is waiting or running.
    pub fn all_tasks_terminal(&self) -> bool {
        self.graph.tasks().all(|t| t.status.is_terminal())
    }
}
