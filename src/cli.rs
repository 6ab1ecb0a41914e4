// src/cli.rs

//! CLI argument parsing using `clap`.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, ValueEnum};

/// Command-line arguments for `stardag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stardag",
    version,
    about = "Run a batch ETL task graph against a data warehouse.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline definition (TOML).
    ///
    /// Default: `Pipeline.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Pipeline.toml")]
    pub config: String,

    /// Start of the execution window (RFC 3339 or YYYY-MM-DD).
    ///
    /// If omitted, the most recent complete window of `[config].schedule` is used.
    #[arg(long, value_name = "TIME", value_parser = parse_timestamp, requires = "end")]
    pub start: Option<DateTime<Utc>>,

    /// End of the execution window (RFC 3339 or YYYY-MM-DD).
    #[arg(long, value_name = "TIME", value_parser = parse_timestamp, requires = "start")]
    pub end: Option<DateTime<Utc>>,

    /// Override `[config].max_concurrency`.
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Extra template parameter; may be repeated. Overrides `[params]`.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Write the JSON run report to this path.
    #[arg(long, value_name = "PATH")]
    pub report: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STARDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{s}' (expected RFC 3339 or YYYY-MM-DD)"))
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("invalid parameter '{s}' (expected KEY=VALUE)")),
    }
}
