#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use stardag::config::model::{
    ActionConfig, CheckConfig, ConfigSection, CredentialsConfig, DefaultSection,
    ExecuteSqlConfig, LoadConfig, MonitoredTableConfig, QualityCheckConfig, StageConfig,
    StorageConfig, TaskConfig, WarehouseConfig,
};
use stardag::config::{load_and_validate, ConfigFile, RawConfigFile};
use stardag::dag::{Action, DagGraph, SqlScript, Task};
use stardag::exec::RetryPolicy;
use stardag::quality::Comparator;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                default: DefaultSection::default(),
                warehouse: None,
                storage: StorageConfig::default(),
                credentials: CredentialsConfig::default(),
                params: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.config.max_concurrency = n;
        self
    }

    pub fn default_retries(mut self, retries: u32, delay: &str) -> Self {
        self.config.default.retries = Some(retries);
        self.config.default.retry_delay = Some(delay.to_string());
        self
    }

    pub fn warehouse_command(mut self, command: &str) -> Self {
        self.config.warehouse = Some(WarehouseConfig {
            command: command.to_string(),
        });
        self
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.config.params.insert(key.to_string(), value.to_string());
        self
    }

    /// The unvalidated config, for tests that expect validation to fail.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(action: ActionConfig) -> Self {
        Self {
            task: TaskConfig {
                after: vec![],
                retries: None,
                retry_delay: None,
                backoff: None,
                timeout: None,
                critical: false,
                retry_quality_failures: false,
                action,
            },
        }
    }

    pub fn noop() -> Self {
        Self::new(ActionConfig::Noop)
    }

    pub fn execute_sql(sql: &str) -> Self {
        Self::new(ActionConfig::ExecuteSql(ExecuteSqlConfig {
            sql: Some(sql.to_string()),
            sql_file: None,
        }))
    }

    pub fn stage(table: &str, bucket: &str, key: &str) -> Self {
        Self::new(ActionConfig::Stage(StageConfig {
            table: table.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            json_path: "auto".to_string(),
            region: "us-west-2".to_string(),
            credentials: "aws_credentials".to_string(),
            truncate: true,
        }))
    }

    pub fn load_fact(table: &str, sql: &str) -> Self {
        Self::new(ActionConfig::LoadFact(load(table, sql)))
    }

    pub fn load_dimension(table: &str, sql: &str) -> Self {
        Self::new(ActionConfig::LoadDimension(load(table, sql)))
    }

    /// Quality check over `tables` given as `(table, primary key columns)`.
    pub fn quality_check(tables: &[(&str, &[&str])]) -> Self {
        Self::new(ActionConfig::QualityCheck(QualityCheckConfig {
            tables: tables
                .iter()
                .map(|(table, pk)| MonitoredTableConfig {
                    table: table.to_string(),
                    primary_key: pk.iter().map(|c| c.to_string()).collect(),
                })
                .collect(),
            checks: vec![],
            fail_fast: false,
        }))
    }

    /// Add a custom predicate to a quality check task.
    pub fn check(mut self, sql: &str, compare: Comparator, expected: i64) -> Self {
        if let ActionConfig::QualityCheck(q) = &mut self.task.action {
            q.checks.push(CheckConfig {
                sql: sql.to_string(),
                expected,
                compare,
                description: None,
            });
        }
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.task.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: &str) -> Self {
        self.task.retry_delay = Some(delay.to_string());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    pub fn critical(mut self, val: bool) -> Self {
        self.task.critical = val;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

fn load(table: &str, sql: &str) -> LoadConfig {
    LoadConfig {
        table: table.to_string(),
        sql: sql.to_string(),
        truncate: true,
    }
}

/// Builder for a validated `DagGraph` without going through config.
///
/// Tasks default to `ExecuteSql` with a single statement naming the task
/// (`SELECT '<id>'`), so fakes can recognise which task ran.
pub struct GraphBuilder {
    tasks: Vec<Task>,
    edges: Vec<(String, String)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            tasks: vec![],
            edges: vec![],
        }
    }

    pub fn task(self, id: &str) -> Self {
        self.task_with(id, |t| t)
    }

    pub fn critical_task(self, id: &str) -> Self {
        self.task_with(id, |t| t.critical(true))
    }

    pub fn retrying_task(self, id: &str, retries: u32) -> Self {
        self.task_with(id, |t| t.with_retry(RetryPolicy::fixed(retries, Duration::from_millis(1))))
    }

    pub fn task_with(mut self, id: &str, f: impl FnOnce(Task) -> Task) -> Self {
        let action = Action::ExecuteSql(SqlScript::parse(&format!("SELECT '{id}'")));
        self.tasks.push(f(Task::new(id, action)));
        self
    }

    /// `to` runs after `from`.
    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.edges.push((from.to_string(), to.to_string()));
        self
    }

    pub fn build(self) -> DagGraph {
        let mut graph = DagGraph::new();
        for task in self.tasks {
            graph.add_task(task).expect("duplicate task in GraphBuilder");
        }
        for (from, to) in self.edges {
            graph.add_dependency(&from, &to).expect("bad edge in GraphBuilder");
        }
        graph.validate().expect("GraphBuilder produced an invalid graph");
        graph
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Path to the bundled example pipeline.
pub fn sparkify_pipeline_path() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../pipelines/sparkify.toml").to_string()
}

/// The bundled example pipeline, loaded and validated.
pub fn sparkify_config() -> ConfigFile {
    load_and_validate(sparkify_pipeline_path()).expect("bundled sparkify pipeline is valid")
}
