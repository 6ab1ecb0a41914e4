// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! [`StardagError`] covers everything that can stop a run from starting
//! (bad config, cycles, IO). [`TaskError`] is the failure of a single task
//! attempt and is what the executor retries and the scheduler propagates.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::quality::QualityViolation;

#[derive(Error, Debug)]
pub enum StardagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in DAG: {0}")]
    CycleDetected(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StardagError>;

/// Failure of a single task attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// Connection error, SQL error, missing source data. Retryable.
    #[error("action failed: {0}")]
    ActionFailure(String),

    /// One or more data quality predicates were violated.
    #[error("quality check failed: {}", ViolationList(.0))]
    QualityCheckFailed(Vec<QualityViolation>),

    /// The attempt did not finish within the task timeout. Retryable.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The run was aborted before this task could finish.
    #[error("cancelled before completion")]
    Cancelled,
}

/// Coarse classification of a [`TaskError`], surfaced in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ActionFailure,
    QualityCheckFailed,
    Timeout,
    Cancelled,
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::ActionFailure(_) => ErrorKind::ActionFailure,
            TaskError::QualityCheckFailed(_) => ErrorKind::QualityCheckFailed,
            TaskError::Timeout(_) => ErrorKind::Timeout,
            TaskError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether re-running the same action can plausibly succeed.
    ///
    /// Quality failures are deterministic against unchanged data, so they
    /// are only retried when a task opts in explicitly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::ActionFailure(_) | TaskError::Timeout(_))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ActionFailure => "ActionFailure",
            ErrorKind::QualityCheckFailed => "QualityCheckFailed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

struct ViolationList<'a>(&'a [QualityViolation]);

impl fmt::Display for ViolationList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}
