// src/quality/mod.rs

//! Data quality gate.
//!
//! A [`QualityCheck`] runs an ordered list of count predicates against the
//! warehouse. Every monitored table contributes two kinds of derived
//! predicates that always run first:
//! - "has records": `COUNT(*) > 0`
//! - "no null primary key": `COUNT(*) WHERE <pk> IS NULL = 0`, per key column
//!
//! Declared predicates follow in declaration order. By default every
//! predicate runs and all violations are reported together.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::errors::TaskError;
use crate::external::{Identifier, SqlValue, Statement, TableName};

/// How an observed value is compared against the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparator {
    pub fn evaluate(&self, actual: i64, expected: i64) -> bool {
        match self {
            Comparator::Eq => actual == expected,
            Comparator::Ne => actual != expected,
            Comparator::Gt => actual > expected,
            Comparator::Lt => actual < expected,
            Comparator::Ge => actual >= expected,
            Comparator::Le => actual <= expected,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Gt => ">",
            Comparator::Lt => "<",
            Comparator::Ge => ">=",
            Comparator::Le => "<=",
        }
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Comparator::Eq),
            "!=" | "<>" => Ok(Comparator::Ne),
            ">" => Ok(Comparator::Gt),
            "<" => Ok(Comparator::Lt),
            ">=" => Ok(Comparator::Ge),
            "<=" => Ok(Comparator::Le),
            other => Err(format!(
                "invalid comparator '{other}' (expected one of =, !=, >, <, >=, <=)"
            )),
        }
    }
}

impl TryFrom<String> for Comparator {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Comparator> for String {
    fn from(c: Comparator) -> Self {
        c.symbol().to_string()
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A declared check: `sql` must return a single count that satisfies
/// `<count> <comparator> <expected>`.
///
/// `sql` may contain `{placeholders}`; they are bound as parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub description: String,
    pub sql: String,
    pub expected: i64,
    pub comparator: Comparator,
}

/// A table that must be non-empty and have no null primary key values.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredTable {
    pub table: TableName,
    pub primary_key: Vec<Identifier>,
}

/// One failed predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityViolation {
    /// Position of the predicate in the evaluation order.
    pub index: usize,
    pub description: String,
    /// `None` when the query returned no usable value.
    pub actual: Option<i64>,
    pub expected: i64,
    pub comparator: Comparator,
}

impl fmt::Display for QualityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}: expected {} {}, got ",
            self.index, self.description, self.comparator, self.expected
        )?;
        match self.actual {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("no result"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CheckSql {
    Fixed(Statement),
    Template(String),
}

#[derive(Debug, Clone, PartialEq)]
struct PlannedCheck {
    description: String,
    sql: CheckSql,
    expected: i64,
    comparator: Comparator,
}

/// Quality gate action.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QualityCheck {
    pub tables: Vec<MonitoredTable>,
    pub predicates: Vec<Predicate>,
    /// Stop at the first violation instead of collecting all of them.
    pub fail_fast: bool,
}

impl QualityCheck {
    /// Number of predicates that will be evaluated.
    pub fn check_count(&self) -> usize {
        self.tables
            .iter()
            .map(|t| 1 + t.primary_key.len())
            .sum::<usize>()
            + self.predicates.len()
    }

    fn plan(&self) -> Vec<PlannedCheck> {
        let mut checks = Vec::with_capacity(self.check_count());

        for t in &self.tables {
            checks.push(PlannedCheck {
                description: format!("table {} has records", t.table),
                sql: CheckSql::Fixed(Statement::count_rows(&t.table)),
                expected: 0,
                comparator: Comparator::Gt,
            });
        }
        for t in &self.tables {
            for column in &t.primary_key {
                checks.push(PlannedCheck {
                    description: format!("no null {column} in {}", t.table),
                    sql: CheckSql::Fixed(Statement::count_nulls(&t.table, column)),
                    expected: 0,
                    comparator: Comparator::Eq,
                });
            }
        }
        for p in &self.predicates {
            checks.push(PlannedCheck {
                description: p.description.clone(),
                sql: CheckSql::Template(p.sql.clone()),
                expected: p.expected,
                comparator: p.comparator,
            });
        }

        checks
    }

    /// Evaluate every predicate through the run's warehouse handle.
    ///
    /// Transport or SQL errors abort the gate with an `ActionFailure`
    /// (retryable); violated predicates yield `QualityCheckFailed`.
    pub async fn run(&self, ctx: &RunContext) -> Result<(), TaskError> {
        let mut violations = Vec::new();

        for (index, check) in self.plan().into_iter().enumerate() {
            let stmt = match check.sql {
                CheckSql::Fixed(stmt) => stmt,
                CheckSql::Template(sql) => ctx.bind_sql(&sql)?,
            };

            let rows = ctx.warehouse().query(&stmt).await?;
            let actual = rows
                .first()
                .and_then(|row| row.first())
                .and_then(SqlValue::as_i64);

            if actual.is_some_and(|v| check.comparator.evaluate(v, check.expected)) {
                debug!(index, check = %check.description, ?actual, "quality check passed");
                continue;
            }

            let violation = QualityViolation {
                index,
                description: check.description,
                actual,
                expected: check.expected,
                comparator: check.comparator,
            };
            warn!(%violation, "quality check failed");
            violations.push(violation);

            if self.fail_fast {
                break;
            }
        }

        if violations.is_empty() {
            info!(checks = self.check_count(), "all quality checks passed");
            Ok(())
        } else {
            Err(TaskError::QualityCheckFailed(violations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, pk: &[&str]) -> MonitoredTable {
        MonitoredTable {
            table: TableName::parse(name).unwrap(),
            primary_key: pk.iter().map(|c| Identifier::parse(c).unwrap()).collect(),
        }
    }

    #[test]
    fn comparators_parse_and_evaluate() {
        assert_eq!("<>".parse::<Comparator>(), Ok(Comparator::Ne));
        assert_eq!("==".parse::<Comparator>(), Ok(Comparator::Eq));
        assert!("=~".parse::<Comparator>().is_err());

        assert!(Comparator::Gt.evaluate(1, 0));
        assert!(!Comparator::Gt.evaluate(0, 0));
        assert!(Comparator::Le.evaluate(0, 0));
        assert!(Comparator::Ne.evaluate(3, 0));
    }

    #[test]
    fn derived_checks_run_before_declared_ones() {
        let check = QualityCheck {
            tables: vec![table("users", &["userid"]), table("songs", &["songid"])],
            predicates: vec![Predicate {
                description: "songplays loaded".into(),
                sql: "SELECT COUNT(*) FROM songplays".into(),
                expected: 0,
                comparator: Comparator::Gt,
            }],
            fail_fast: false,
        };

        let plan = check.plan();
        let descriptions: Vec<_> = plan.iter().map(|c| c.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec![
                "table users has records",
                "table songs has records",
                "no null userid in users",
                "no null songid in songs",
                "songplays loaded",
            ]
        );
        assert_eq!(check.check_count(), 5);
        assert_eq!(
            plan[2].sql,
            CheckSql::Fixed(Statement::new(
                "SELECT COUNT(*) FROM users WHERE userid IS NULL"
            ))
        );
        assert_eq!(plan[2].comparator, Comparator::Eq);
    }

    #[test]
    fn violation_display_mentions_expectation() {
        let v = QualityViolation {
            index: 0,
            description: "table users has records".into(),
            actual: Some(0),
            expected: 0,
            comparator: Comparator::Gt,
        };
        assert_eq!(v.to_string(), "#0 table users has records: expected > 0, got 0");
    }
}
