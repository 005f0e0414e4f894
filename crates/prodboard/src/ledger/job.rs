//! The report job record and its lifecycle states.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::reports::ReportType;

pub type JobId = i64;

/// Lifecycle state of a report job.
///
/// `Pending → Running → {Completed, Failed}`; a transient store outage may
/// send a `Running` job back to `Pending`. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// One requested report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportJob {
    pub id: JobId,
    pub report_type: ReportType,
    pub criteria: serde_json::Value,
    pub status: JobStatus,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub artifact_path: Option<String>,
    pub error_message: Option<String>,
    /// Number of times the job was sent back to `Pending` after a connection failure.
    pub attempts: u32,
    /// Earliest time the job may be claimed.
    pub available_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub last_error: Option<String>,
    pub is_deleted: bool,
}

impl ReportJob {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            report_type: parse_column(row, "report_type")?,
            criteria: {
                let raw: String = row.get("criteria")?;
                serde_json::from_str(&raw).map_err(|e| conversion_error(row, "criteria", e))?
            },
            status: parse_column(row, "status")?,
            requested_at: parse_timestamp(row, "requested_at")?,
            started_at: parse_optional_timestamp(row, "started_at")?,
            completed_at: parse_optional_timestamp(row, "completed_at")?,
            artifact_path: row.get("artifact_path")?,
            error_message: row.get("error_message")?,
            attempts: row.get("attempts")?,
            available_at: parse_timestamp(row, "available_at")?,
            claimed_by: row.get("claimed_by")?,
            last_error: row.get("last_error")?,
            is_deleted: row.get("is_deleted")?,
        })
    }

    /// Checks the companion-field rules tied to `status`.
    pub fn check_invariants(&self) -> Result<(), String> {
        let terminal = self.status.is_terminal();
        if self.completed_at.is_some() != terminal {
            return Err(format!(
                "job {}: completed_at must be set iff status is terminal (status={})",
                self.id, self.status
            ));
        }
        if self.artifact_path.is_some() != (self.status == JobStatus::Completed) {
            return Err(format!(
                "job {}: artifact_path must be set iff status is completed (status={})",
                self.id, self.status
            ));
        }
        if self.error_message.is_some() != (self.status == JobStatus::Failed) {
            return Err(format!(
                "job {}: error_message must be set iff status is failed (status={})",
                self.id, self.status
            ));
        }
        Ok(())
    }
}

/// Formats a timestamp for storage. Fixed-width, so text order is time order.
pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(row: &Row<'_>, column: &str, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let index = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

#[derive(Debug)]
struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

fn parse_column<T>(row: &Row<'_>, column: &str) -> Result<T, rusqlite::Error>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: String = row.get(column)?;
    raw.parse::<T>()
        .map_err(|e| conversion_error(row, column, ParseError(e.to_string())))
}

fn parse_timestamp(row: &Row<'_>, column: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(row, column, e))
}

fn parse_optional_timestamp(
    row: &Row<'_>,
    column: &str,
) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(row, column, e))
    })
    .transpose()
}
