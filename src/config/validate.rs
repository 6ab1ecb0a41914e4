// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::model::{
    ActionConfig, CheckConfig, ConfigFile, DefaultSection, LoadConfig, QualityCheckConfig,
    RawConfigFile, StageConfig, TaskConfig, TaskDefinition,
};
use crate::dag::{Action, DagGraph, LoadAction, SqlScript, StageAction};
use crate::errors::{Result, StardagError};
use crate::exec::RetryPolicy;
use crate::external::{Identifier, TableName};
use crate::quality::{MonitoredTable, Predicate, QualityCheck};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = StardagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        validate_global_config(&raw)?;
        validate_task_dependencies(&raw)?;

        let mut tasks = BTreeMap::new();
        for (name, tc) in raw.task.iter() {
            tasks.insert(name.clone(), build_task(name, tc, &raw.default)?);
        }

        let cfg = ConfigFile {
            max_concurrency: raw.config.max_concurrency,
            task_timeout: parse_optional_duration("[config].task_timeout", &raw.config.task_timeout)?,
            schedule: raw.config.schedule,
            warehouse: raw.warehouse,
            storage: raw.storage,
            credentials: raw.credentials,
            params: raw.params,
            tasks,
        };

        // Building the graph rejects cycles.
        DagGraph::from_config(&cfg)?;
        Ok(cfg)
    }
}

/// Validate a raw config without keeping the result.
pub fn validate_config(raw: RawConfigFile) -> Result<()> {
    ConfigFile::try_from(raw).map(|_| ())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(StardagError::ConfigError(
            "config must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_concurrency == 0 {
        return Err(StardagError::ConfigError(
            "[config].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    parse_optional_duration("[default].retry_delay", &cfg.default.retry_delay)?;
    parse_optional_duration("[default].max_retry_delay", &cfg.default.max_retry_delay)?;

    if let Some(wh) = &cfg.warehouse {
        if wh.command.trim().is_empty() {
            return Err(StardagError::ConfigError(
                "[warehouse].command must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(StardagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(StardagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn parse_optional_duration(field: &str, value: &Option<String>) -> Result<Option<Duration>> {
    value
        .as_deref()
        .map(|s| parse_duration(s).map_err(|e| StardagError::ConfigError(format!("{field}: {e}"))))
        .transpose()
}

fn task_error(task: &str, msg: impl std::fmt::Display) -> StardagError {
    StardagError::ConfigError(format!("task '{task}': {msg}"))
}

fn build_task(name: &str, tc: &TaskConfig, defaults: &DefaultSection) -> Result<TaskDefinition> {
    let retry_delay = match tc.retry_delay.as_ref().or(defaults.retry_delay.as_ref()) {
        Some(s) => parse_duration(s).map_err(|e| task_error(name, format!("retry_delay: {e}")))?,
        None => Duration::ZERO,
    };
    let max_delay = parse_optional_duration("[default].max_retry_delay", &defaults.max_retry_delay)?;
    let timeout = tc
        .timeout
        .as_deref()
        .map(|s| parse_duration(s).map_err(|e| task_error(name, format!("timeout: {e}"))))
        .transpose()?;

    let retry = RetryPolicy {
        max_retries: tc.retries.or(defaults.retries).unwrap_or(0),
        retry_delay,
        backoff: tc.backoff.or(defaults.backoff).unwrap_or_default(),
        max_delay,
        retry_quality_failures: tc.retry_quality_failures,
    };

    Ok(TaskDefinition {
        after: tc.after.clone(),
        action: build_action(name, &tc.action)?,
        retry,
        timeout,
        critical: tc.critical,
    })
}

fn build_action(name: &str, cfg: &ActionConfig) -> Result<Action> {
    let action = match cfg {
        ActionConfig::Noop => Action::NoOp,
        ActionConfig::ExecuteSql(exec) => {
            let sql = match (&exec.sql, &exec.sql_file) {
                (Some(sql), _) => sql,
                (None, Some(file)) => {
                    return Err(task_error(
                        name,
                        format!("sql_file {file:?} was not loaded; use config::load_and_validate"),
                    ));
                }
                (None, None) => return Err(task_error(name, "execute_sql needs `sql` or `sql_file`")),
            };
            let script = SqlScript::parse(sql);
            if script.statements.is_empty() {
                return Err(task_error(name, "SQL script contains no statements"));
            }
            Action::ExecuteSql(script)
        }
        ActionConfig::Stage(stage) => Action::Stage(build_stage(name, stage)?),
        ActionConfig::LoadFact(load) => Action::LoadFact(build_load(name, load)?),
        ActionConfig::LoadDimension(load) => Action::LoadDimension(build_load(name, load)?),
        ActionConfig::QualityCheck(q) => Action::QualityCheck(build_quality(name, q)?),
    };
    Ok(action)
}

fn table(name: &str, table: &str) -> Result<TableName> {
    TableName::parse(table).map_err(|e| task_error(name, e))
}

fn build_stage(name: &str, cfg: &StageConfig) -> Result<StageAction> {
    if cfg.bucket.trim().is_empty() {
        return Err(task_error(name, "stage bucket must not be empty"));
    }
    if cfg.credentials.trim().is_empty() {
        return Err(task_error(name, "stage credentials id must not be empty"));
    }
    Ok(StageAction {
        table: table(name, &cfg.table)?,
        bucket: cfg.bucket.trim().to_string(),
        key_template: cfg.key.trim_matches('/').to_string(),
        json_path: cfg.json_path.clone(),
        region: cfg.region.clone(),
        credential_id: cfg.credentials.clone(),
        truncate: cfg.truncate,
    })
}

fn build_load(name: &str, cfg: &LoadConfig) -> Result<LoadAction> {
    if cfg.sql.trim().is_empty() {
        return Err(task_error(name, "load `sql` must not be empty"));
    }
    Ok(LoadAction {
        table: table(name, &cfg.table)?,
        select_sql: cfg.sql.trim().trim_end_matches(';').to_string(),
        truncate: cfg.truncate,
    })
}

fn build_quality(name: &str, cfg: &QualityCheckConfig) -> Result<QualityCheck> {
    if cfg.tables.is_empty() && cfg.checks.is_empty() {
        return Err(task_error(name, "quality_check needs at least one table or check"));
    }

    let tables = cfg
        .tables
        .iter()
        .map(|t| {
            let primary_key = t
                .primary_key
                .iter()
                .map(|c| Identifier::parse(c).map_err(|e| task_error(name, e)))
                .collect::<Result<Vec<_>>>()?;
            Ok(MonitoredTable {
                table: table(name, &t.table)?,
                primary_key,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let predicates = cfg
        .checks
        .iter()
        .map(|c: &CheckConfig| {
            if c.sql.trim().is_empty() {
                return Err(task_error(name, "quality check `sql` must not be empty"));
            }
            Ok(Predicate {
                description: c
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("{} {} {}", c.sql.trim(), c.compare, c.expected)),
                sql: c.sql.trim().to_string(),
                expected: c.expected,
                comparator: c.compare,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(QualityCheck {
        tables,
        predicates,
        fail_fast: cfg.fail_fast,
    })
}
