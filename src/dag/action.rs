// src/dag/action.rs

//! Typed task actions.
//!
//! Each variant carries exactly the parameters it needs, already validated
//! when the pipeline definition was converted (table names are
//! [`TableName`]s, not strings).

use crate::external::TableName;
use crate::quality::QualityCheck;

/// The unit of work a task performs.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Does nothing; used for begin/end markers.
    NoOp,
    /// Run a fixed SQL script (e.g. table creation).
    ExecuteSql(SqlScript),
    /// Bulk copy JSON objects from storage into a staging table.
    Stage(StageAction),
    /// Insert into the fact table from a select.
    LoadFact(LoadAction),
    /// Insert into a dimension table from a select.
    LoadDimension(LoadAction),
    /// Run data quality predicates.
    QualityCheck(QualityCheck),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::NoOp => "noop",
            Action::ExecuteSql(_) => "execute_sql",
            Action::Stage(_) => "stage",
            Action::LoadFact(_) => "load_fact",
            Action::LoadDimension(_) => "load_dimension",
            Action::QualityCheck(_) => "quality_check",
        }
    }

    /// Short human readable description for dry-run output.
    pub fn summary(&self) -> String {
        match self {
            Action::NoOp => "no-op".to_string(),
            Action::ExecuteSql(script) => format!("{} statement(s)", script.statements.len()),
            Action::Stage(s) => format!("s3://{}/{} -> {}", s.bucket, s.key_template, s.table),
            Action::LoadFact(l) | Action::LoadDimension(l) => format!(
                "insert into {}{}",
                l.table,
                if l.truncate { " (truncate first)" } else { "" }
            ),
            Action::QualityCheck(q) => format!("{} check(s)", q.check_count()),
        }
    }
}

/// A SQL script split into individual statements.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlScript {
    pub statements: Vec<String>,
}

impl SqlScript {
    /// Split `script` on `;`, dropping empty statements and `--` comment lines.
    pub fn parse(script: &str) -> Self {
        let statements = script
            .split(';')
            .map(|stmt| {
                stmt.lines()
                    .filter(|line| !line.trim_start().starts_with("--"))
                    .collect::<Vec<_>>()
                    .join("\n")
                    .trim()
                    .to_string()
            })
            .filter(|stmt| !stmt.is_empty())
            .collect();
        Self { statements }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageAction {
    pub table: TableName,
    pub bucket: String,
    /// Object key prefix, may contain `{placeholders}`.
    pub key_template: String,
    /// `auto` or the location of a JSONPaths file.
    pub json_path: String,
    pub region: String,
    pub credential_id: String,
    pub truncate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadAction {
    pub table: TableName,
    /// `SELECT` feeding the insert, may contain `{placeholders}`.
    pub select_sql: String,
    pub truncate: bool,
}
