use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// How the wait between retry attempts grows.
///
/// - `Fixed`: every retry waits `retry_delay`.
/// - `Linear`: retry `n` waits `n * retry_delay`.
/// - `Exponential`: retry `n` waits `retry_delay * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    Linear,
    Exponential,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed
    }
}

impl FromStr for Backoff {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(Backoff::Fixed),
            "linear" => Ok(Backoff::Linear),
            "exponential" => Ok(Backoff::Exponential),
            other => Err(format!(
                "invalid backoff: {other} (expected \"fixed\", \"linear\" or \"exponential\")"
            )),
        }
    }
}

/// Cadence a pipeline is triggered on.
///
/// Used to derive the default execution window when a run is started without
/// an explicit `--start`/`--end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    Hourly,
    Daily,
    Weekly,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Daily
    }
}

impl Schedule {
    /// Length of one scheduled interval.
    pub fn interval(&self) -> TimeDelta {
        match self {
            Schedule::Hourly => TimeDelta::hours(1),
            Schedule::Daily => TimeDelta::days(1),
            Schedule::Weekly => TimeDelta::weeks(1),
        }
    }

    /// The most recent *complete* interval at `now`, as `(start, end)`.
    ///
    /// A daily schedule triggered at 2022-01-21T03:10Z processes
    /// `[2022-01-20T00:00Z, 2022-01-21T00:00Z)`.
    pub fn latest_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let end = match self {
            Schedule::Hourly => midnight + TimeDelta::hours(i64::from(now.hour())),
            Schedule::Daily => midnight,
            Schedule::Weekly => {
                midnight - TimeDelta::days(i64::from(now.weekday().num_days_from_monday()))
            }
        };
        (end - self.interval(), end)
    }
}

/// Parse a simple duration string such as `"500ms"`, `"30s"`, `"5m"` or `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
