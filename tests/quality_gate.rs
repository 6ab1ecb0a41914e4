// tests/quality_gate.rs

use std::sync::Arc;

use stardag::errors::TaskError;
use stardag::external::{Identifier, SqlValue, TableName};
use stardag::quality::{Comparator, MonitoredTable, Predicate, QualityCheck};
use stardag_test_utils::fake_warehouse::{FakeStorage, FakeWarehouse};
use stardag_test_utils::{init_tracing, test_context};

fn monitored(table: &str, pk: &str) -> MonitoredTable {
    MonitoredTable {
        table: TableName::parse(table).unwrap(),
        primary_key: vec![Identifier::parse(pk).unwrap()],
    }
}

fn star_schema_gate() -> QualityCheck {
    QualityCheck {
        tables: vec![monitored("users", "userid"), monitored("songs", "songid")],
        predicates: vec![Predicate {
            description: "no plays before the window".into(),
            sql: "SELECT COUNT(*) FROM songplays WHERE start_time < {window_start}".into(),
            expected: 0,
            comparator: Comparator::Eq,
        }],
        fail_fast: false,
    }
}

fn violations(result: Result<(), TaskError>) -> Vec<String> {
    match result {
        Err(TaskError::QualityCheckFailed(v)) => v.iter().map(|v| v.description.clone()).collect(),
        other => panic!("expected QualityCheckFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn passing_gate_issues_every_check() {
    init_tracing();

    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse
        .respond_count("IS NULL", 0)
        .respond_count("WHERE start_time", 0)
        .respond_count("SELECT COUNT(*) FROM", 42);
    let ctx = test_context(warehouse.clone(), Arc::new(FakeStorage::new()));

    star_schema_gate().run(&ctx).await.unwrap();

    let issued = warehouse.statements();
    assert_eq!(issued.len(), 5);
    assert_eq!(issued[0], "SELECT COUNT(*) FROM users");
    assert_eq!(issued[2], "SELECT COUNT(*) FROM users WHERE userid IS NULL");
    // Template values are bound, then inlined as quoted literals by the fake.
    assert_eq!(
        issued[4],
        "SELECT COUNT(*) FROM songplays WHERE start_time < '2018-11-01T00:00:00+00:00'"
    );
}

#[tokio::test]
async fn all_violations_are_collected() {
    init_tracing();

    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse
        .respond_count("users WHERE userid IS NULL", 3)
        .respond_count("IS NULL", 0)
        .respond_count("WHERE start_time", 7)
        .respond_count("FROM songs", 0)
        .respond_count("SELECT COUNT(*) FROM", 42);
    let ctx = test_context(warehouse.clone(), Arc::new(FakeStorage::new()));

    let found = violations(star_schema_gate().run(&ctx).await);
    assert_eq!(
        found,
        vec![
            "table songs has records".to_string(),
            "no null userid in users".to_string(),
            "no plays before the window".to_string(),
        ]
    );
    // Every check ran even though the second one already failed.
    assert_eq!(warehouse.statements().len(), 5);
}

#[tokio::test]
async fn fail_fast_stops_at_first_violation() {
    init_tracing();

    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse.respond_count("SELECT COUNT(*) FROM", 0);
    let ctx = test_context(warehouse.clone(), Arc::new(FakeStorage::new()));

    let gate = QualityCheck {
        fail_fast: true,
        ..star_schema_gate()
    };
    let found = violations(gate.run(&ctx).await);

    assert_eq!(found, vec!["table users has records".to_string()]);
    assert_eq!(warehouse.statements().len(), 1);
}

#[tokio::test]
async fn empty_result_is_a_violation() {
    init_tracing();

    // Nothing registered: every query returns no rows.
    let warehouse = Arc::new(FakeWarehouse::new());
    let ctx = test_context(warehouse, Arc::new(FakeStorage::new()));

    let gate = QualityCheck {
        tables: vec![monitored("users", "userid")],
        ..QualityCheck::default()
    };
    match gate.run(&ctx).await {
        Err(TaskError::QualityCheckFailed(v)) => {
            assert_eq!(v.len(), 2);
            assert!(v.iter().all(|v| v.actual.is_none()));
            assert!(v[0].to_string().ends_with("got no result"));
        }
        other => panic!("expected QualityCheckFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn textual_counts_are_accepted() {
    init_tracing();

    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse.respond("FROM songplays", vec![vec![SqlValue::Text(" 12 ".into())]]);
    let ctx = test_context(warehouse, Arc::new(FakeStorage::new()));

    let gate = QualityCheck {
        predicates: vec![Predicate {
            description: "songplays loaded".into(),
            sql: "SELECT COUNT(*) FROM songplays".into(),
            expected: 10,
            comparator: Comparator::Ge,
        }],
        ..QualityCheck::default()
    };
    gate.run(&ctx).await.unwrap();
}

#[tokio::test]
async fn warehouse_errors_are_action_failures() {
    init_tracing();

    let warehouse = Arc::new(FakeWarehouse::new());
    warehouse.fail_on("FROM users");
    let ctx = test_context(warehouse, Arc::new(FakeStorage::new()));

    let err = star_schema_gate().run(&ctx).await.unwrap_err();
    assert!(matches!(err, TaskError::ActionFailure(_)));
    assert!(err.is_retryable());
}
