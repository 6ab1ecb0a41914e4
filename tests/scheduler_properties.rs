// tests/scheduler_properties.rs

use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;
use stardag::dag::{Action, DagGraph, RunState, Scheduler, SchedulerStep, Task, TaskStatus};
use stardag::engine::TaskOutcome;
use stardag::errors::{StardagError, TaskError};
use stardag_test_utils::builders::GraphBuilder;

/// A generated graph plus which tasks fail and which are critical.
#[derive(Debug, Clone)]
struct Scenario {
    graph: DagGraph,
    failing: HashSet<String>,
    critical: HashSet<String>,
    max_concurrency: usize,
    /// Which in-flight task completes next, indexed modulo the in-flight count.
    picks: Vec<usize>,
}

fn name(i: usize) -> String {
    format!("task_{i:02}")
}

// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn scenario_strategy(max_tasks: usize) -> impl Strategy<Value = Scenario> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        (
            proptest::collection::vec(
                proptest::collection::vec(any::<usize>(), 0..num_tasks),
                num_tasks,
            ),
            proptest::collection::vec(0..num_tasks, 0..3),
            proptest::collection::vec(0..num_tasks, 0..2),
            1..4usize,
            proptest::collection::vec(any::<usize>(), 1..16),
        )
            .prop_map(move |(raw_deps, failing, critical, max_concurrency, picks)| {
                let critical: HashSet<String> = critical.into_iter().map(name).collect();

                let mut builder = GraphBuilder::new();
                for i in 0..num_tasks {
                    let id = name(i);
                    builder = if critical.contains(&id) {
                        builder.critical_task(&id)
                    } else {
                        builder.task(&id)
                    };
                }
                for (i, potential) in raw_deps.into_iter().enumerate() {
                    if i == 0 {
                        continue;
                    }
                    let deps: BTreeSet<usize> = potential.into_iter().map(|d| d % i).collect();
                    for d in deps {
                        builder = builder.edge(&name(d), &name(i));
                    }
                }

                Scenario {
                    graph: builder.build(),
                    failing: failing.into_iter().map(name).collect(),
                    critical,
                    max_concurrency,
                    picks,
                }
            })
    })
}

/// A chain `task_00 -> ... -> task_{n-1}` plus extra forward edges, and
/// optionally one back edge from the last task that closes a cycle.
fn chain_graph(
    num_tasks: usize,
    forward: &[(usize, usize)],
    back_to: Option<usize>,
) -> Result<DagGraph, StardagError> {
    let mut graph = DagGraph::new();
    for i in 0..num_tasks {
        graph.add_task(Task::new(name(i), Action::NoOp))?;
    }
    for i in 1..num_tasks {
        graph.add_dependency(&name(i - 1), &name(i))?;
    }
    for &(a, b) in forward {
        let (from, to) = (a.min(b), a.max(b));
        if from != to {
            graph.add_dependency(&name(from), &name(to))?;
        }
    }
    if let Some(target) = back_to {
        graph.add_dependency(&name(num_tasks - 1), &name(target))?;
    }
    graph.validate()?;
    Ok(graph)
}

fn chain_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, usize)> {
    (2..10usize).prop_flat_map(|n| {
        (
            Just(n),
            proptest::collection::vec((0..n, 0..n), 0..6),
            0..n - 1,
        )
    })
}

/// Every `Ready` task has all dependencies `Success`; while the run is
/// going, no `Pending` task does, and the ready set is exactly the `Ready`
/// tasks.
fn check_readiness(scheduler: &Scheduler) {
    let graph = scheduler.graph();
    let running = scheduler.state() == RunState::Running;
    let ready_set: HashSet<String> = scheduler.ready_set().into_iter().collect();

    for t in graph.tasks() {
        let deps_done = t
            .dependencies
            .iter()
            .all(|d| graph.task(d).map(|d| d.status) == Some(TaskStatus::Success));
        match t.status {
            TaskStatus::Ready => {
                assert!(deps_done, "{} is Ready before its dependencies succeeded", t.id);
                if running {
                    assert!(ready_set.contains(&t.id), "{} is Ready but not queued", t.id);
                }
            }
            TaskStatus::Pending if running => {
                assert!(!deps_done, "{} is still Pending with all dependencies done", t.id);
            }
            _ => assert!(!ready_set.contains(&t.id), "{} queued while {:?}", t.id, t.status),
        }
    }
}

/// Drive the scheduler to completion, completing in-flight tasks in the
/// order the scenario picks. Returns the scheduler and every dispatch in
/// order.
fn simulate(scenario: &Scenario) -> (Scheduler, Vec<String>) {
    let mut scheduler =
        Scheduler::new(scenario.graph.clone(), scenario.max_concurrency).unwrap();
    let mut executing: Vec<String> = Vec::new();
    let mut dispatched: Vec<String> = Vec::new();

    let mut absorb = |step: SchedulerStep, executing: &mut Vec<String>| {
        for t in step.dispatched {
            dispatched.push(t.id.clone());
            executing.push(t.id);
        }
    };

    let step = scheduler.start();
    absorb(step, &mut executing);
    check_readiness(&scheduler);

    let mut steps = 0;
    while !executing.is_empty() {
        assert!(steps < 1000, "scheduler did not converge");
        assert!(scheduler.in_flight_count() <= scenario.max_concurrency);

        let pick = scenario.picks[steps % scenario.picks.len()] % executing.len();
        steps += 1;
        let task = executing.remove(pick);
        let outcome = if scenario.failing.contains(&task) {
            TaskOutcome::Failed(TaskError::ActionFailure("injected".into()))
        } else {
            TaskOutcome::Success
        };
        let step = scheduler.handle_completion(&task, outcome);
        absorb(step, &mut executing);
        check_readiness(&scheduler);
    }

    (scheduler, dispatched)
}

proptest! {
    #[test]
    fn every_run_terminates_with_all_tasks_terminal(scenario in scenario_strategy(12)) {
        let (scheduler, dispatched) = simulate(&scenario);

        prop_assert!(scheduler.is_finished());
        prop_assert!(scheduler.graph().tasks().all(|t| t.status.is_terminal()));

        // No task is dispatched twice.
        let unique: HashSet<_> = dispatched.iter().collect();
        prop_assert_eq!(unique.len(), dispatched.len());
    }

    #[test]
    fn tasks_run_only_after_all_dependencies_succeeded(scenario in scenario_strategy(12)) {
        let (scheduler, dispatched) = simulate(&scenario);
        let graph = scheduler.graph();

        for (pos, id) in dispatched.iter().enumerate() {
            for dep in graph.dependencies_of(id).unwrap() {
                let dep_pos = dispatched.iter().position(|d| d == dep);
                prop_assert!(dep_pos.is_some_and(|p| p < pos), "{} ran before {}", id, dep);
                prop_assert_eq!(graph.task(dep).unwrap().status, TaskStatus::Success);
            }
        }
    }

    #[test]
    fn failures_skip_exactly_their_descendants(scenario in scenario_strategy(12)) {
        let (scheduler, _) = simulate(&scenario);
        let graph = scheduler.graph();

        let failed: Vec<String> = graph
            .tasks()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.id.clone())
            .collect();
        let mut downstream = BTreeSet::new();
        for id in &failed {
            for d in graph.descendants_of(id) {
                prop_assert_eq!(graph.task(&d).unwrap().status, TaskStatus::Skipped);
                downstream.insert(d);
            }
        }

        // Without an abort, everything outside the failed subgraphs succeeds.
        if !failed.iter().any(|id| scenario.critical.contains(id)) {
            for t in graph.tasks() {
                if !failed.contains(&t.id) && !downstream.contains(&t.id) {
                    prop_assert_eq!(t.status, TaskStatus::Success, "{} was affected", &t.id);
                }
            }
        }
    }

    #[test]
    fn run_state_matches_task_outcomes(scenario in scenario_strategy(12)) {
        let (scheduler, _) = simulate(&scenario);
        let graph = scheduler.graph();

        let failed: Vec<_> = graph
            .tasks()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.id.clone())
            .collect();
        let critical_failed = failed.iter().any(|id| scenario.critical.contains(id));

        let expected = if critical_failed {
            RunState::Aborted
        } else if failed.is_empty() {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        prop_assert_eq!(scheduler.state(), expected);
    }

    #[test]
    fn forward_edges_always_validate((n, forward, _) in chain_strategy()) {
        let graph = chain_graph(n, &forward, None);
        prop_assert!(graph.is_ok());
        let order = graph.unwrap().topological_order();
        prop_assert_eq!(order.first(), Some(&name(0)));
        prop_assert_eq!(order.last(), Some(&name(n - 1)));
    }

    #[test]
    fn any_back_edge_is_a_cycle((n, forward, target) in chain_strategy()) {
        let result = chain_graph(n, &forward, Some(target));
        prop_assert!(matches!(result, Err(StardagError::CycleDetected(_))));
    }
}
