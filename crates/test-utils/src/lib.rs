pub mod builders;
pub mod fake_executor;
pub mod fake_warehouse;

use std::sync::{Arc, Once};

use chrono::{TimeZone, Utc};
use stardag::context::{Connections, ExecutionWindow, RunContext, RunContextBuilder};
use stardag::external::{Credentials, StaticCredentialResolver};
use tracing_subscriber::{fmt, EnvFilter};

use crate::fake_warehouse::{FakeStorage, FakeWarehouse};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// The window used by every test context: 2018-11-01 (one day).
pub fn test_window() -> ExecutionWindow {
    ExecutionWindow::new(
        Utc.with_ymd_and_hms(2018, 11, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2018, 11, 2, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

/// Credentials registered under `aws_credentials` in test contexts.
pub fn test_credentials() -> Credentials {
    Credentials {
        access_key: "AKIATEST".to_string(),
        secret_key: "secret".to_string(),
        session_token: String::new(),
    }
}

/// Build a run context around the given fakes.
pub fn test_context(warehouse: Arc<FakeWarehouse>, storage: Arc<FakeStorage>) -> RunContext {
    test_context_builder(warehouse, storage).build()
}

/// Like [`test_context`], for tests that need extra parameters.
pub fn test_context_builder(
    warehouse: Arc<FakeWarehouse>,
    storage: Arc<FakeStorage>,
) -> RunContextBuilder {
    let connections = Connections {
        warehouse,
        storage,
        credentials: Arc::new(
            StaticCredentialResolver::new().with("aws_credentials", test_credentials()),
        ),
    };
    RunContext::builder(test_window(), connections).run_id("test_run")
}
