// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::{Action, TaskId};
use crate::exec::RetryPolicy;
use crate::quality::Comparator;
use crate::types::{Backoff, Schedule};

/// Top-level pipeline definition as read from a TOML file.
///
/// ```toml
/// [config]
/// max_concurrency = 4
/// schedule = "daily"
///
/// [default]
/// retries = 3
/// retry_delay = "5m"
///
/// [warehouse]
/// command = "psql \"$REDSHIFT_DSN\" -At -F '\t'"
///
/// [task.Begin_execution]
/// action = "noop"
///
/// [task.Stage_events]
/// action = "stage"
/// after = ["Begin_execution"]
/// table = "staging_events"
/// bucket = "udacity-dend"
/// key = "log-data"
/// ```
///
/// All sections except `[task.*]` are optional and have reasonable defaults.
/// This is the unchecked form; it becomes a [`ConfigFile`] through
/// `TryFrom`, which validates it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Run-wide behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Retry defaults applied to every task from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Template parameters available to every task.
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// All tasks from `[task.<id>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of tasks executing at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-attempt timeout for tasks that do not set their own (e.g. `"30m"`).
    #[serde(default)]
    pub task_timeout: Option<String>,

    /// Cadence used to derive the execution window when none is given.
    #[serde(default)]
    pub schedule: Schedule,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout: None,
            schedule: Schedule::default(),
        }
    }
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(default)]
    pub backoff: Option<Backoff>,

    /// Upper bound on any single retry wait.
    #[serde(default)]
    pub max_retry_delay: Option<String>,
}

/// `[warehouse]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// Client command that reads SQL on stdin and prints tab-separated rows.
    pub command: String,
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Buckets are directories under `root`.
    Local {
        #[serde(default = "default_storage_root")]
        root: PathBuf,
    },
    /// Listing command with `{bucket}` and `{prefix}` placeholders.
    Command { command: String },
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: default_storage_root(),
        }
    }
}

/// `[credentials]` section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CredentialsConfig {
    /// `<ID>_ACCESS_KEY_ID` style environment variables.
    #[default]
    Env,
    /// Keys listed in the file itself.
    Static {
        #[serde(default)]
        entries: BTreeMap<String, StaticCredentialConfig>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticCredentialConfig {
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub session_token: String,
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Dependency list: this task waits for all tasks listed here.
    ///
    /// This is the TOML `after = ["A", "B"]` field.
    #[serde(default)]
    pub after: Vec<String>,

    /// Overrides `[default].retries`.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Overrides `[default].retry_delay`.
    #[serde(default)]
    pub retry_delay: Option<String>,

    /// Overrides `[default].backoff`.
    #[serde(default)]
    pub backoff: Option<Backoff>,

    /// Per-attempt timeout; overrides `[config].task_timeout`.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Failure of a critical task aborts the whole run.
    #[serde(default)]
    pub critical: bool,

    /// Retry quality check failures like any other failure.
    #[serde(default)]
    pub retry_quality_failures: bool,

    /// The `action = "..."` key and its parameters.
    #[serde(flatten)]
    pub action: ActionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionConfig {
    Noop,
    ExecuteSql(ExecuteSqlConfig),
    Stage(StageConfig),
    LoadFact(LoadConfig),
    LoadDimension(LoadConfig),
    QualityCheck(QualityCheckConfig),
}

/// Inline `sql` or a `sql_file` relative to the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteSqlConfig {
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub sql_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub table: String,
    pub bucket: String,
    /// Key prefix template, e.g. `"log-data/{year}/{month}"`.
    pub key: String,
    #[serde(default = "default_json_path")]
    pub json_path: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Credential id handed to the credential resolver.
    #[serde(default = "default_credential_id")]
    pub credentials: String,
    #[serde(default = "default_true")]
    pub truncate: bool,
}

fn default_json_path() -> String {
    "auto".to_string()
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_credential_id() -> String {
    "aws_credentials".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    pub table: String,
    /// `SELECT` statement feeding the insert.
    pub sql: String,
    #[serde(default = "default_true")]
    pub truncate: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityCheckConfig {
    /// Tables that must have records and no null primary keys.
    #[serde(default)]
    pub tables: Vec<MonitoredTableConfig>,
    /// Additional count predicates.
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
    #[serde(default)]
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoredTableConfig {
    pub table: String,
    #[serde(default)]
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    pub sql: String,
    pub expected: i64,
    #[serde(default = "default_comparator")]
    pub compare: Comparator,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_comparator() -> Comparator {
    Comparator::Eq
}

/// Validated pipeline definition.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `config::validate`),
/// so every task has a typed action, a resolved retry policy and known
/// dependencies, and the task graph is acyclic.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub max_concurrency: usize,
    pub task_timeout: Option<Duration>,
    pub schedule: Schedule,
    pub warehouse: Option<WarehouseConfig>,
    pub storage: StorageConfig,
    pub credentials: CredentialsConfig,
    pub params: BTreeMap<String, String>,
    pub tasks: BTreeMap<TaskId, TaskDefinition>,
}

/// A fully typed task, ready to become a graph node.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub after: Vec<TaskId>,
    pub action: Action,
    pub retry: RetryPolicy,
    pub timeout: Option<Duration>,
    pub critical: bool,
}
