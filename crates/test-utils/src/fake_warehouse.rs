use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use stardag::external::{
    ExternalError, Row, SqlValue, Statement, StorageSource, Warehouse,
};

#[derive(Debug)]
struct Failure {
    needle: String,
    remaining: Option<u32>,
    error: ExternalError,
}

/// In-memory warehouse.
///
/// - records every statement it sees (binds inlined)
/// - answers queries from canned results matched by SQL substring
/// - fails statements matching a substring, optionally a limited number of times
/// - can delay statements to exercise timeouts and concurrency
#[derive(Debug, Default)]
pub struct FakeWarehouse {
    statements: Mutex<Vec<String>>,
    results: Mutex<Vec<(String, Vec<Row>)>>,
    failures: Mutex<Vec<Failure>>,
    delays: Mutex<Vec<(String, Duration)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries whose SQL contains `needle` return `rows`.
    pub fn respond(&self, needle: &str, rows: Vec<Row>) -> &Self {
        self.results.lock().unwrap().push((needle.to_string(), rows));
        self
    }

    /// Queries whose SQL contains `needle` return a single count.
    pub fn respond_count(&self, needle: &str, count: i64) -> &Self {
        self.respond(needle, vec![vec![SqlValue::Int(count)]])
    }

    /// Statements containing `needle` always fail.
    pub fn fail_on(&self, needle: &str) -> &Self {
        self.push_failure(needle, None)
    }

    /// Statements containing `needle` fail the first `times` times.
    pub fn fail_times(&self, needle: &str, times: u32) -> &Self {
        self.push_failure(needle, Some(times))
    }

    /// Statements containing `needle` take `delay` to complete.
    pub fn delay_on(&self, needle: &str, delay: Duration) -> &Self {
        self.delays.lock().unwrap().push((needle.to_string(), delay));
        self
    }

    /// Every statement seen so far, in order, with binds inlined.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn statements_containing(&self, needle: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.contains(needle))
            .collect()
    }

    /// Highest number of statements observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn push_failure(&self, needle: &str, remaining: Option<u32>) -> &Self {
        self.failures.lock().unwrap().push(Failure {
            needle: needle.to_string(),
            remaining,
            error: ExternalError::Statement(format!("injected failure on '{needle}'")),
        });
        self
    }

    async fn observe(&self, stmt: &Statement) -> Result<(), ExternalError> {
        let sql = stmt.render_inline();
        self.statements.lock().unwrap().push(sql.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut failures = self.failures.lock().unwrap();
        for failure in failures.iter_mut() {
            if !sql.contains(failure.needle.as_str()) {
                continue;
            }
            match failure.remaining.as_mut() {
                None => return Err(failure.error.clone()),
                Some(0) => continue,
                Some(n) => {
                    *n -= 1;
                    return Err(failure.error.clone());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn execute(&self, stmt: &Statement) -> Result<u64, ExternalError> {
        self.observe(stmt).await?;
        Ok(1)
    }

    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>, ExternalError> {
        self.observe(stmt).await?;
        let sql = stmt.render_inline();
        Ok(self
            .results
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

/// In-memory object storage: bucket -> keys.
#[derive(Debug, Default)]
pub struct FakeStorage {
    buckets: Mutex<BTreeMap<String, Vec<String>>>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(self, bucket: &str, keys: &[&str]) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .extend(keys.iter().map(|k| k.to_string()));
        self
    }
}

#[async_trait]
impl StorageSource for FakeStorage {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ExternalError> {
        let buckets = self.buckets.lock().unwrap();
        let keys = buckets
            .get(bucket)
            .ok_or_else(|| ExternalError::Storage(format!("no such bucket '{bucket}'")))?;
        let mut found: Vec<String> = keys
            .iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        found.sort();
        Ok(found)
    }
}
