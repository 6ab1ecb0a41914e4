// src/external/command.rs

//! Collaborators backed by existing command-line clients.
//!
//! The warehouse client (e.g. `psql "$REDSHIFT_DSN" -At -F $'\t'`) receives
//! SQL on stdin and prints tab-separated rows on stdout. The storage lister
//! (e.g. `aws s3 ls --recursive s3://{bucket}/{prefix}`) prints one object per
//! line with the key after the date, time and size columns.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use super::sql::{Row, SqlValue, Statement};
use super::{ExternalError, StorageSource, Warehouse};

/// Environment variables carrying the listing location to the storage command.
const BUCKET_VAR: &str = "STARDAG_BUCKET";
const PREFIX_VAR: &str = "STARDAG_PREFIX";

/// Leading columns of an `aws s3 ls --recursive` line: date, time, size.
const LISTING_COLUMNS: usize = 3;

/// Run `command` through the platform shell, optionally feeding `stdin`,
/// and return its stdout.
async fn run_shell(
    command: &str,
    envs: &[(&str, &str)],
    stdin: Option<&str>,
) -> Result<String, ExternalError> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.envs(envs.iter().copied());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| ExternalError::Connection(format!("spawning '{command}': {e}")))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        match pipe.write_all(input.as_bytes()).await {
            Ok(()) => {}
            // The client exited without reading everything; its exit status decides.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Err(e) => {
                return Err(ExternalError::Connection(format!(
                    "writing to client stdin: {e}"
                )));
            }
        }
        // Close stdin so the client sees EOF.
        drop(pipe);
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ExternalError::Connection(format!("waiting for '{command}': {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".into());
        Err(ExternalError::Statement(format!(
            "client exited with status {code}: {}",
            stderr.trim()
        )))
    }
}

/// Warehouse that pipes SQL to a client command.
#[derive(Debug, Clone)]
pub struct CommandWarehouse {
    command: String,
}

impl CommandWarehouse {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    async fn run(&self, stmt: &Statement) -> Result<String, ExternalError> {
        debug!(sql = %stmt, binds = stmt.params().len(), "sending statement to warehouse client");
        let mut sql = stmt.render_inline();
        if !sql.trim_end().ends_with(';') {
            sql.push(';');
        }
        sql.push('\n');
        run_shell(&self.command, &[], Some(&sql)).await
    }
}

#[async_trait]
impl Warehouse for CommandWarehouse {
    async fn execute(&self, stmt: &Statement) -> Result<u64, ExternalError> {
        let out = self.run(stmt).await?;
        Ok(parse_rows_affected(&out))
    }

    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>, ExternalError> {
        let out = self.run(stmt).await?;
        Ok(parse_rows(&out))
    }
}

/// Storage lister that runs a command template.
///
/// `{bucket}` and `{prefix}` in the template become references to the
/// `STARDAG_BUCKET` and `STARDAG_PREFIX` environment variables, so their
/// values never pass through shell parsing. Placeholders must not be quoted
/// in the template.
///
/// Output lines follow `aws s3 ls --recursive`: date, time and size columns,
/// then the key, which may contain spaces.
#[derive(Debug, Clone)]
pub struct CommandStorage {
    command: String,
}

impl CommandStorage {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn shell_command(&self) -> String {
        self.command
            .replace("{bucket}", &env_ref(BUCKET_VAR))
            .replace("{prefix}", &env_ref(PREFIX_VAR))
    }
}

fn env_ref(var: &str) -> String {
    if cfg!(windows) {
        format!("\"%{var}%\"")
    } else {
        format!("\"${{{var}}}\"")
    }
}

/// The key column of a listing line, if the line has one.
fn object_key(line: &str) -> Option<&str> {
    let mut rest = line.trim_start();
    for _ in 0..LISTING_COLUMNS {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    let key = rest.trim_end_matches(['\r', '\n']);
    (!key.is_empty()).then_some(key)
}

#[async_trait]
impl StorageSource for CommandStorage {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ExternalError> {
        let command = self.shell_command();
        let out = run_shell(&command, &[(BUCKET_VAR, bucket), (PREFIX_VAR, prefix)], None)
            .await
            .map_err(|e| ExternalError::Storage(e.to_string()))?;

        let keys: Vec<String> = out
            .lines()
            .filter_map(object_key)
            .filter(|key| key.starts_with(prefix))
            .map(str::to_string)
            .collect();
        trace!(bucket, prefix, count = keys.len(), "listed objects");
        Ok(keys)
    }
}

/// Extract the affected row count from a client command tag such as
/// `INSERT 0 42` or `COPY 17`. Anything else counts as zero.
fn parse_rows_affected(out: &str) -> u64 {
    out.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .and_then(|l| l.split_whitespace().last())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn parse_rows(out: &str) -> Vec<Row> {
    out.lines()
        .filter(|l| !l.is_empty())
        .map(|line| line.split('\t').map(parse_field).collect())
        .collect()
}

fn parse_field(field: &str) -> SqlValue {
    if field.is_empty() {
        return SqlValue::Null;
    }
    if let Ok(v) = field.parse::<i64>() {
        return SqlValue::Int(v);
    }
    if let Ok(v) = field.parse::<f64>() {
        return SqlValue::Float(v);
    }
    SqlValue::Text(field.to_string())
}
