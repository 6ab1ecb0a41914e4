// src/context.rs

//! Per-run parameters and resource handles.
//!
//! A [`RunContext`] is built once per pipeline execution and then shared
//! read-only (as `Arc<RunContext>`) by every task of that run. It carries:
//! - the execution window being processed,
//! - key/value parameters used to fill `{placeholder}` templates,
//! - the warehouse, storage and credential handles.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Captures;

use crate::errors::{Result, StardagError, TaskError};
use crate::external::sql::PLACEHOLDER_RE;
use crate::external::{CredentialResolver, Statement, StorageSource, Warehouse};
use crate::types::Schedule;

/// Half-open interval `[start, end)` of data a run processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ExecutionWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(StardagError::ConfigError(format!(
                "execution window ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// The latest complete interval of `schedule` at `now`.
    pub fn for_schedule(schedule: Schedule, now: DateTime<Utc>) -> Self {
        let (start, end) = schedule.latest_window(now);
        Self { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

impl fmt::Display for ExecutionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Handles to the external systems a run talks to.
#[derive(Debug, Clone)]
pub struct Connections {
    pub warehouse: Arc<dyn Warehouse>,
    pub storage: Arc<dyn StorageSource>,
    pub credentials: Arc<dyn CredentialResolver>,
}

/// Immutable per-run context shared by all tasks.
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    window: ExecutionWindow,
    params: BTreeMap<String, String>,
    connections: Connections,
}

impl RunContext {
    pub fn builder(window: ExecutionWindow, connections: Connections) -> RunContextBuilder {
        RunContextBuilder::new(window, connections)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn window(&self) -> &ExecutionWindow {
        &self.window
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn warehouse(&self) -> &dyn Warehouse {
        self.connections.warehouse.as_ref()
    }

    pub fn storage(&self) -> &dyn StorageSource {
        self.connections.storage.as_ref()
    }

    pub fn credentials(&self) -> &dyn CredentialResolver {
        self.connections.credentials.as_ref()
    }

    /// Resolve a template key.
    ///
    /// Built-in keys derived from the window take precedence over
    /// user parameters of the same name.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let start = self.window.start;
        let value = match key {
            "ds" => start.format("%Y-%m-%d").to_string(),
            "ds_nodash" => start.format("%Y%m%d").to_string(),
            "ts" | "execution_date" | "window_start" => start.to_rfc3339(),
            "window_end" => self.window.end.to_rfc3339(),
            "year" => start.format("%Y").to_string(),
            "month" => start.format("%m").to_string(),
            "day" => start.format("%d").to_string(),
            "run_id" => self.run_id.clone(),
            other => return self.params.get(other).cloned(),
        };
        Some(value)
    }

    /// Substitute every `{key}` in `template`.
    pub fn render(&self, template: &str) -> std::result::Result<String, TaskError> {
        let mut missing: Option<String> = None;
        let rendered = PLACEHOLDER_RE.replace_all(template, |caps: &Captures<'_>| {
            match self.lookup(&caps[1]) {
                Some(v) => v,
                None => {
                    if missing.is_none() {
                        missing = Some(caps[1].to_string());
                    }
                    String::new()
                }
            }
        });

        match missing {
            Some(name) => Err(unknown_placeholder(&name)),
            None => Ok(rendered.into_owned()),
        }
    }

    /// Turn a SQL template into a statement whose placeholders are bind
    /// parameters rather than spliced text.
    pub fn bind_sql(&self, template: &str) -> std::result::Result<Statement, TaskError> {
        Statement::from_template(template, |key| self.lookup(key))
            .map_err(|name| unknown_placeholder(&name))
    }
}

fn unknown_placeholder(name: &str) -> TaskError {
    TaskError::ActionFailure(format!("unknown template parameter '{{{name}}}'"))
}

/// Builder for [`RunContext`].
#[derive(Debug)]
pub struct RunContextBuilder {
    run_id: Option<String>,
    window: ExecutionWindow,
    params: BTreeMap<String, String>,
    connections: Connections,
}

impl RunContextBuilder {
    pub fn new(window: ExecutionWindow, connections: Connections) -> Self {
        Self {
            run_id: None,
            window,
            params: BTreeMap::new(),
            connections,
        }
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add several parameters; later values override earlier ones.
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn build(self) -> RunContext {
        let run_id = self
            .run_id
            .unwrap_or_else(|| format!("run_{}", self.window.start.format("%Y%m%dT%H%M%S")));
        RunContext {
            run_id,
            window: self.window,
            params: self.params,
            connections: self.connections,
        }
    }
}
