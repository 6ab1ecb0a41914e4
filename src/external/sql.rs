// src/external/sql.rs

//! Parameterized statement construction.
//!
//! Identifiers (table and column names) cannot be bound as parameters, so
//! they are validated once when the pipeline is built ([`TableName`],
//! [`Identifier`]) and only validated identifiers are ever spliced into SQL
//! text. Everything else (paths, credentials, template values) travels as a
//! positional `$n` bind parameter.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

pub(crate) static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex")
});

static BIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([0-9]+)").expect("valid bind regex"));

/// A single SQL value, either bound into a statement or returned in a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// One result row.
pub type Row = Vec<SqlValue>;

impl SqlValue {
    /// Interpret the value as an integer count, if possible.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Render as a SQL literal, escaping single quotes.
    pub fn to_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(true) => "TRUE".to_string(),
            SqlValue::Bool(false) => "FALSE".to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

/// A validated, unqualified SQL identifier (e.g. a column name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if IDENT_RE.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(format!("'{s}' is not a valid SQL identifier"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated table name, optionally schema-qualified (`schema.table`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableName(String);

impl TableName {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 2 || parts.iter().any(|p| !IDENT_RE.is_match(p)) {
            return Err(format!("'{s}' is not a valid table name"));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SQL text with positional (`$1`, `$2`, ...) bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a bind parameter. The SQL text must reference it as `$n`.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn truncate(table: &TableName) -> Self {
        Self::new(format!("TRUNCATE TABLE {table}"))
    }

    /// `INSERT INTO <table> <select>`, carrying over the select's binds.
    pub fn insert_select(table: &TableName, select: Statement) -> Self {
        Self {
            sql: format!("INSERT INTO {table} {}", select.sql.trim()),
            params: select.params,
        }
    }

    /// Bulk load JSON objects from object storage into `table`.
    pub fn copy_json(
        table: &TableName,
        source: &str,
        credentials: &super::Credentials,
        region: &str,
        json_path: &str,
    ) -> Self {
        Self::new(format!(
            "COPY {table} FROM $1 ACCESS_KEY_ID $2 SECRET_ACCESS_KEY $3 SESSION_TOKEN $4 REGION $5 JSON $6"
        ))
        .bind(source)
        .bind(credentials.access_key.as_str())
        .bind(credentials.secret_key.as_str())
        .bind(credentials.session_token.as_str())
        .bind(region)
        .bind(json_path)
    }

    pub fn count_rows(table: &TableName) -> Self {
        Self::new(format!("SELECT COUNT(*) FROM {table}"))
    }

    pub fn count_nulls(table: &TableName, column: &Identifier) -> Self {
        Self::new(format!("SELECT COUNT(*) FROM {table} WHERE {column} IS NULL"))
    }

    /// Turn `{name}` placeholders in `template` into bind parameters.
    ///
    /// Each placeholder occurrence becomes the next `$n`, valued by `lookup`.
    /// Returns the name of the first placeholder `lookup` cannot resolve.
    pub fn from_template<F>(template: &str, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut params = Vec::new();
        let mut sql = String::with_capacity(template.len());
        let mut last = 0;

        for caps in PLACEHOLDER_RE.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let name = &caps[1];
            let value = lookup(name).ok_or_else(|| name.to_string())?;
            params.push(SqlValue::Text(value));
            sql.push_str(&template[last..whole.start()]);
            sql.push_str(&format!("${}", params.len()));
            last = whole.end();
        }
        sql.push_str(&template[last..]);

        Ok(Self { sql, params })
    }

    /// Inline every bind parameter as an escaped literal.
    ///
    /// Used by clients that only accept plain SQL text.
    pub fn render_inline(&self) -> String {
        BIND_RE
            .replace_all(&self.sql, |caps: &regex::Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| self.params.get(idx))
                    .map(SqlValue::to_literal)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

impl fmt::Display for Statement {
    /// Shows SQL text only; bind values may carry secrets.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}
