// tests/retry_behaviour.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use stardag::context::RunContext;
use stardag::dag::{Action, DagGraph, RunState, ScheduledTask, Task, TaskStatus};
use stardag::engine::{RunReport, RuntimeEvent, TaskOutcome};
use stardag::errors::{ErrorKind, TaskError};
use stardag::exec::{ActionRunner, Executor, RetryPolicy, WarehouseActionRunner};
use stardag::external::TableName;
use stardag::quality::{MonitoredTable, QualityCheck};
use stardag::{run_pipeline, PipelineOptions};
use stardag_test_utils::builders::GraphBuilder;
use stardag_test_utils::fake_warehouse::{FakeStorage, FakeWarehouse};
use stardag_test_utils::{init_tracing, test_context, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

async fn run_graph(graph: DagGraph, warehouse: Arc<FakeWarehouse>) -> Result<RunReport, Box<dyn Error>> {
    let ctx = Arc::new(test_context(warehouse, Arc::new(FakeStorage::new())));
    let report = with_timeout(run_pipeline(
        graph,
        ctx,
        Arc::new(WarehouseActionRunner),
        PipelineOptions::default(),
    ))
    .await?;
    Ok(report)
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() -> TestResult {
    init_tracing();

    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse.fail_times("SELECT 'flaky'", 2);
    let graph = GraphBuilder::new()
        .retrying_task("flaky", 3)
        .task("after")
        .edge("flaky", "after")
        .build();

    let report = run_graph(graph, warehouse.clone()).await?;

    let flaky = report.task("flaky").unwrap();
    assert_eq!(flaky.status, TaskStatus::Success);
    assert_eq!(flaky.attempts, 3);
    assert_eq!(flaky.last_error, None);
    assert_eq!(report.state, RunState::Succeeded);
    assert_eq!(warehouse.statements_containing("flaky").len(), 3);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_fail_the_task() -> TestResult {
    init_tracing();

    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse.fail_on("SELECT 'broken'");
    let graph = GraphBuilder::new()
        .retrying_task("broken", 2)
        .task("downstream")
        .edge("broken", "downstream")
        .build();

    let report = run_graph(graph, warehouse.clone()).await?;

    let broken = report.task("broken").unwrap();
    assert_eq!(broken.status, TaskStatus::Failed);
    assert_eq!(broken.attempts, 3);
    assert_eq!(broken.error_kind, Some(ErrorKind::ActionFailure));
    assert_eq!(report.task("downstream").unwrap().status, TaskStatus::Skipped);
    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.exit_code(), 1);
    assert!(warehouse.statements_containing("downstream").is_empty());
    Ok(())
}

#[tokio::test]
async fn slow_attempt_times_out() -> TestResult {
    init_tracing();

    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse.delay_on("SELECT 'slow'", Duration::from_secs(2));
    let graph = GraphBuilder::new()
        .task_with("slow", |t| t.with_timeout(Duration::from_millis(20)))
        .build();

    let report = run_graph(graph, warehouse).await?;

    let slow = report.task("slow").unwrap();
    assert_eq!(slow.status, TaskStatus::Failed);
    assert_eq!(slow.error_kind, Some(ErrorKind::Timeout));
    Ok(())
}

#[tokio::test]
async fn quality_failures_are_not_retried_by_default() -> TestResult {
    init_tracing();

    // No canned results: the "has records" check sees no rows and fails.
    let warehouse = Arc::new(FakeWarehouse::new());
    let gate = Action::QualityCheck(QualityCheck {
        tables: vec![MonitoredTable {
            table: TableName::parse("users").unwrap(),
            primary_key: vec![],
        }],
        ..QualityCheck::default()
    });

    let mut graph = DagGraph::new();
    graph.add_task(
        Task::new("gate", gate.clone())
            .with_retry(RetryPolicy::fixed(3, Duration::from_millis(1))),
    )?;
    let mut opted_in = RetryPolicy::fixed(2, Duration::from_millis(1));
    opted_in.retry_quality_failures = true;
    graph.add_task(Task::new("gate_retrying", gate).with_retry(opted_in))?;
    graph.validate()?;

    let report = run_graph(graph, warehouse).await?;

    let gate = report.task("gate").unwrap();
    assert_eq!(gate.status, TaskStatus::Failed);
    assert_eq!(gate.attempts, 1);
    assert_eq!(gate.error_kind, Some(ErrorKind::QualityCheckFailed));
    assert_eq!(report.task("gate_retrying").unwrap().attempts, 3);
    Ok(())
}

fn scheduled(id: &str, retry: RetryPolicy) -> ScheduledTask {
    ScheduledTask {
        id: id.to_string(),
        action: Arc::new(Action::ExecuteSql(stardag::dag::SqlScript::parse(&format!(
            "SELECT '{id}'"
        )))),
        retry,
        timeout: None,
        critical: false,
    }
}

#[tokio::test]
async fn executor_reports_each_attempt() -> TestResult {
    init_tracing();

    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse.fail_times("SELECT 'flaky'", 1);
    let ctx = Arc::new(test_context(warehouse, Arc::new(FakeStorage::new())));
    let (tx, mut rx) = mpsc::channel(16);
    let executor = Executor::new(ctx, Arc::new(WarehouseActionRunner), tx, CancellationToken::new());

    let outcome = with_timeout(
        executor.execute(&scheduled("flaky", RetryPolicy::fixed(1, Duration::from_millis(5)))),
    )
    .await;
    assert_eq!(outcome, TaskOutcome::Success);
    drop(executor);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], RuntimeEvent::TaskStarted { attempt: 1, .. }));
    assert!(matches!(
        &events[1],
        RuntimeEvent::TaskRetrying { attempt: 1, error: TaskError::ActionFailure(_), delay, .. }
            if *delay == Duration::from_millis(5)
    ));
    assert!(matches!(&events[2], RuntimeEvent::TaskStarted { attempt: 2, .. }));
    Ok(())
}

#[tokio::test]
async fn cancellation_interrupts_retry_wait() -> TestResult {
    init_tracing();

    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse.fail_on("SELECT 'stuck'");
    let ctx = Arc::new(test_context(warehouse.clone(), Arc::new(FakeStorage::new())));
    let (tx, _rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let executor = Executor::new(ctx, Arc::new(WarehouseActionRunner), tx, cancel.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    // A one-hour retry delay would hang the test without cancellation.
    let outcome = with_timeout(
        executor.execute(&scheduled("stuck", RetryPolicy::fixed(5, Duration::from_secs(3600)))),
    )
    .await;
    canceller.await?;

    assert_eq!(outcome, TaskOutcome::Cancelled);
    assert_eq!(warehouse.statements().len(), 1);
    Ok(())
}

/// Panics on any script mentioning "boom", succeeds otherwise.
#[derive(Debug)]
struct PanickingRunner;

#[async_trait]
impl ActionRunner for PanickingRunner {
    async fn run(&self, action: &Action, _ctx: &RunContext) -> Result<(), TaskError> {
        if let Action::ExecuteSql(script) = action {
            if script.statements.iter().any(|s| s.contains("boom")) {
                panic!("action blew up");
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn panicking_action_fails_its_task_instead_of_hanging() -> TestResult {
    init_tracing();

    let graph = GraphBuilder::new()
        .retrying_task("boom", 2)
        .task("after")
        .task("sibling")
        .edge("boom", "after")
        .build();
    let ctx = Arc::new(test_context(
        Arc::new(FakeWarehouse::new()),
        Arc::new(FakeStorage::new()),
    ));

    let report = with_timeout(run_pipeline(
        graph,
        ctx,
        Arc::new(PanickingRunner),
        PipelineOptions::default(),
    ))
    .await?;

    let boom = report.task("boom").unwrap();
    assert_eq!(boom.status, TaskStatus::Failed);
    assert_eq!(boom.error_kind, Some(ErrorKind::ActionFailure));
    let message = boom.last_error.as_deref().unwrap_or_default();
    assert!(message.contains("executor panicked"), "{message}");
    assert_eq!(report.task("after").unwrap().status, TaskStatus::Skipped);
    assert_eq!(report.task("sibling").unwrap().status, TaskStatus::Success);
    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.exit_code(), 1);
    Ok(())
}
