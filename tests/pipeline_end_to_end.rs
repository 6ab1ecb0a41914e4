// tests/pipeline_end_to_end.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use stardag::config::ConfigFile;
use stardag::dag::{DagGraph, RunState, TaskStatus};
use stardag::engine::RunReport;
use stardag::exec::WarehouseActionRunner;
use stardag::{run_pipeline, PipelineOptions};
use stardag_test_utils::builders::sparkify_config;
use stardag_test_utils::fake_warehouse::{FakeStorage, FakeWarehouse};
use stardag_test_utils::{init_tracing, test_context_builder, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const DIMENSIONS: [&str; 4] = [
    "Load_artist_dim_table",
    "Load_song_dim_table",
    "Load_time_dim_table",
    "Load_user_dim_table",
];

fn sparkify_storage() -> Arc<FakeStorage> {
    Arc::new(FakeStorage::new().with_objects(
        "udacity-dend",
        &[
            "log-data/2018/11/2018-11-01-events.json",
            "song-data/A/A/A/TRAAAAK128F9318786.json",
            "song-data/A/B/C/TRABCEI128F424C983.json",
        ],
    ))
}

/// Warehouse whose tables are populated and whose keys are never null.
fn healthy_warehouse() -> Arc<FakeWarehouse> {
    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse
        .respond_count("IS NULL", 0)
        .respond_count("WHERE start_time >=", 0)
        .respond_count("SELECT COUNT(*) FROM", 100);
    warehouse
}

async fn run_sparkify(
    cfg: &ConfigFile,
    warehouse: Arc<FakeWarehouse>,
) -> Result<RunReport, Box<dyn Error>> {
    let ctx = test_context_builder(warehouse, sparkify_storage())
        .params(cfg.params.clone())
        .build();
    let report = with_timeout(run_pipeline(
        DagGraph::from_config(cfg)?,
        Arc::new(ctx),
        Arc::new(WarehouseActionRunner),
        PipelineOptions {
            max_concurrency: cfg.max_concurrency,
            task_timeout: cfg.task_timeout,
            listen_for_ctrl_c: false,
        },
    ))
    .await?;
    Ok(report)
}

fn position(statements: &[String], needle: &str) -> usize {
    statements
        .iter()
        .position(|s| s.contains(needle))
        .unwrap_or_else(|| panic!("no statement containing {needle:?}"))
}

#[tokio::test]
async fn sparkify_pipeline_runs_to_success() -> TestResult {
    init_tracing();

    let cfg = sparkify_config();
    let warehouse = healthy_warehouse();
    let report = run_sparkify(&cfg, warehouse.clone()).await?;

    assert_eq!(report.state, RunState::Succeeded, "{report}");
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.tasks.len(), 11);
    assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Success));
    assert_eq!(report.tasks.first().map(|t| t.id.as_str()), Some("Begin_execution"));
    assert_eq!(report.tasks.last().map(|t| t.id.as_str()), Some("Stop_execution"));

    let statements = warehouse.statements();
    // Dependencies are honoured at the warehouse.
    let created = position(&statements, "CREATE TABLE IF NOT EXISTS public.\"time\"");
    let staged_events = position(&statements, "COPY staging_events");
    let staged_songs = position(&statements, "COPY staging_songs");
    let fact = position(&statements, "INSERT INTO songplays");
    let users = position(&statements, "INSERT INTO users");
    let gate = position(&statements, "SELECT COUNT(*) FROM songplays WHERE playid IS NULL");
    assert!(created < staged_events && created < staged_songs);
    assert!(staged_events < fact && staged_songs < fact);
    assert!(fact < users && users < gate);

    // Parameters reach the COPY as bound values.
    assert!(statements[staged_events].contains("JSON 's3://udacity-dend/log_json_path.json'"));
    // Appending loads never truncate.
    assert!(statements_with(&statements, "TRUNCATE TABLE songplays").is_empty());
    assert_eq!(statements_with(&statements, "TRUNCATE TABLE staging_").len(), 2);
    Ok(())
}

fn statements_with<'a>(statements: &'a [String], needle: &str) -> Vec<&'a String> {
    statements.iter().filter(|s| s.contains(needle)).collect()
}

#[tokio::test]
async fn failed_quality_gate_fails_the_run() -> TestResult {
    init_tracing();

    let cfg = sparkify_config();
    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse
        .respond_count("users WHERE userid IS NULL", 4)
        .respond_count("IS NULL", 0)
        .respond_count("WHERE start_time >=", 0)
        .respond_count("SELECT COUNT(*) FROM artists", 0)
        .respond_count("SELECT COUNT(*) FROM", 100);
    let report = run_sparkify(&cfg, warehouse).await?;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.exit_code(), 1);

    let gate = report.task("Run_data_quality_checks").unwrap();
    assert_eq!(gate.status, TaskStatus::Failed);
    assert_eq!(gate.attempts, 1, "quality failures are not retried");
    let message = gate.last_error.as_deref().unwrap_or_default();
    assert!(message.contains("table artists has records"), "{message}");
    assert!(message.contains("no null userid in users"), "{message}");

    assert_eq!(report.task("Stop_execution").unwrap().status, TaskStatus::Skipped);
    for dim in DIMENSIONS {
        assert_eq!(report.task(dim).unwrap().status, TaskStatus::Success);
    }
    Ok(())
}

#[tokio::test]
async fn critical_setup_failure_aborts_everything() -> TestResult {
    init_tracing();

    let mut cfg = sparkify_config();
    // Keep the test fast: no retry waits.
    for def in cfg.tasks.values_mut() {
        def.retry.max_retries = 0;
    }

    let warehouse = healthy_warehouse();
    warehouse.fail_on("CREATE TABLE IF NOT EXISTS public.staging_events");
    let report = run_sparkify(&cfg, warehouse.clone()).await?;

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.exit_code(), 2);
    assert!(report.abort_reason.as_deref().is_some_and(|r| r.contains("create_tables")));
    assert_eq!(report.task("Begin_execution").unwrap().status, TaskStatus::Success);
    assert_eq!(report.task("create_tables").unwrap().status, TaskStatus::Failed);
    assert_eq!(report.failures().count(), 10);
    assert!(warehouse.statements_containing("COPY").is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_stage_skips_its_downstream_only() -> TestResult {
    init_tracing();

    let mut cfg = sparkify_config();
    for def in cfg.tasks.values_mut() {
        def.retry.max_retries = 0;
    }

    let warehouse = healthy_warehouse();
    warehouse.fail_on("COPY staging_songs");
    let report = run_sparkify(&cfg, warehouse.clone()).await?;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.task("Stage_songs").unwrap().status, TaskStatus::Failed);
    assert_eq!(report.task("Stage_events").unwrap().status, TaskStatus::Success);

    let skipped: Vec<&str> = report
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Skipped)
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(skipped.len(), 7, "{skipped:?}");
    for id in ["Load_songplays_fact_table", "Run_data_quality_checks", "Stop_execution"] {
        assert!(skipped.contains(&id), "{id} should be skipped");
    }
    for dim in DIMENSIONS {
        assert!(skipped.contains(&dim), "{dim} should be skipped");
    }
    assert!(warehouse.statements_containing("INSERT INTO").is_empty());
    Ok(())
}

#[tokio::test]
async fn two_slots_bound_the_dimension_loads() -> TestResult {
    init_tracing();

    let mut cfg = sparkify_config();
    cfg.max_concurrency = 2;

    let warehouse = healthy_warehouse();
    warehouse.delay_on("INSERT INTO", Duration::from_millis(30));
    let report = run_sparkify(&cfg, warehouse.clone()).await?;

    assert_eq!(report.state, RunState::Succeeded, "{report}");
    assert!(warehouse.max_in_flight() <= 2, "peak {}", warehouse.max_in_flight());
    for dim in DIMENSIONS {
        assert_eq!(report.task(dim).unwrap().status, TaskStatus::Success);
    }

    // The gate only starts once every dimension load is done.
    let statements = warehouse.statements();
    let gate = position(&statements, "SELECT COUNT(*) FROM songplays WHERE playid IS NULL");
    let last_insert = statements
        .iter()
        .rposition(|s| s.starts_with("INSERT INTO"))
        .unwrap();
    assert_eq!(statements_with(&statements, "INSERT INTO").len(), 5);
    assert!(last_insert < gate);
    Ok(())
}

#[tokio::test]
async fn report_serialises_to_json() -> TestResult {
    init_tracing();

    let cfg = sparkify_config();
    let report = run_sparkify(&cfg, healthy_warehouse()).await?;

    let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
    assert_eq!(json["run_id"], "test_run");
    assert_eq!(json["state"], "Succeeded");
    assert_eq!(json["window_start"], "2018-11-01T00:00:00Z");
    assert_eq!(json["tasks"].as_array().map(Vec::len), Some(11));
    assert!(json.get("abort_reason").is_none());
    Ok(())
}
