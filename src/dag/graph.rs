// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::config::model::ConfigFile;
use crate::dag::task::{Task, TaskId, TaskStatus};
use crate::errors::{Result, StardagError};

/// In-memory dependency graph keyed by task id.
///
/// Built explicitly with [`add_task`](Self::add_task) and
/// [`add_dependency`](Self::add_dependency), then checked with
/// [`validate`](Self::validate), which rejects cycles and derives the
/// reverse (`dependents`) index used for propagation.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    tasks: BTreeMap<TaskId, Task>,
    /// Topological order, valid only while `validated` is set.
    order: Vec<TaskId>,
    validated: bool,
}

impl DagGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a graph from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut graph = Self::new();

        for (id, def) in cfg.tasks.iter() {
            let mut task = Task::new(id.clone(), def.action.clone())
                .with_retry(def.retry)
                .critical(def.critical);
            task.timeout = def.timeout;
            graph.add_task(task)?;
        }

        for (id, def) in cfg.tasks.iter() {
            for dep in def.after.iter() {
                graph.add_dependency(dep, id)?;
            }
        }

        graph.validate()?;
        Ok(graph)
    }

    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(StardagError::ConfigError(format!(
                "duplicate task id '{}'",
                task.id
            )));
        }
        self.validated = false;
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Declare that `to` depends on `from`.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return Err(StardagError::ConfigError(format!(
                "task '{to}' cannot depend on itself"
            )));
        }
        if !self.tasks.contains_key(from) {
            return Err(StardagError::TaskNotFound(from.to_string()));
        }
        let task = self
            .tasks
            .get_mut(to)
            .ok_or_else(|| StardagError::TaskNotFound(to.to_string()))?;

        task.dependencies.insert(from.to_string());
        self.validated = false;
        Ok(())
    }

    /// Check acyclicity and build the dependents index.
    pub fn validate(&mut self) -> Result<()> {
        // Edge direction: dependency -> dependent.
        let order: Vec<TaskId> = {
            let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
            for id in self.tasks.keys() {
                graph.add_node(id.as_str());
            }
            for (id, task) in self.tasks.iter() {
                for dep in task.dependencies.iter() {
                    graph.add_edge(dep.as_str(), id.as_str(), ());
                }
            }

            match toposort(&graph, None) {
                Ok(order) => order.into_iter().map(str::to_string).collect(),
                Err(cycle) => {
                    return Err(StardagError::CycleDetected(format!(
                        "cycle detected in task graph involving task '{}'",
                        cycle.node_id()
                    )));
                }
            }
        };

        let edges: Vec<(TaskId, TaskId)> = self
            .tasks
            .values()
            .flat_map(|t| t.dependencies.iter().map(|d| (d.clone(), t.id.clone())))
            .collect();
        for task in self.tasks.values_mut() {
            task.dependents.clear();
        }
        for (dep, dependent) in edges {
            if let Some(t) = self.tasks.get_mut(&dep) {
                t.dependents.insert(dependent);
            }
        }

        debug!(tasks = self.tasks.len(), ?order, "task graph validated");
        self.order = order;
        self.validated = true;
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Pending tasks whose dependencies have all succeeded.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.ids_in_order()
            .filter(|id| {
                self.tasks.get(*id).is_some_and(|t| {
                    t.status == TaskStatus::Pending
                        && t.dependencies.iter().all(|d| {
                            self.tasks
                                .get(d)
                                .is_some_and(|dep| dep.status == TaskStatus::Success)
                        })
                })
            })
            .cloned()
            .collect()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub(crate) fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn dependencies_of(&self, id: &str) -> Option<&BTreeSet<TaskId>> {
        self.tasks.get(id).map(|t| &t.dependencies)
    }

    /// Direct dependents. Empty until the graph has been validated.
    pub fn dependents_of(&self, id: &str) -> Option<&BTreeSet<TaskId>> {
        self.tasks.get(id).map(|t| &t.dependents)
    }

    /// Task ids in topological order, or id order before validation.
    pub fn topological_order(&self) -> Vec<TaskId> {
        self.ids_in_order().cloned().collect()
    }

    pub fn roots(&self) -> Vec<TaskId> {
        self.ids_in_order()
            .filter(|id| self.tasks.get(*id).is_some_and(|t| t.dependencies.is_empty()))
            .cloned()
            .collect()
    }

    /// Every task reachable from `id` through dependent edges, excluding `id`.
    pub fn descendants_of(&self, id: &str) -> BTreeSet<TaskId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&TaskId> = self
            .dependents_of(id)
            .map(|d| d.iter().collect())
            .unwrap_or_default();

        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                if let Some(more) = self.dependents_of(next) {
                    queue.extend(more.iter());
                }
            }
        }
        seen
    }

    fn ids_in_order(&self) -> Box<dyn Iterator<Item = &TaskId> + '_> {
        if self.validated {
            Box::new(self.order.iter())
        } else {
            Box::new(self.tasks.keys())
        }
    }
}
