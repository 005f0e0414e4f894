//! Read-only status projection over the ledger for clients to poll.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ledger::{JobId, JobStatus, LedgerError, ReportJob, ReportLedger};
use crate::reports::ReportType;

/// Paging and display settings for status listings.
#[derive(Debug, Clone)]
pub struct StatusOptions {
    pub default_limit: usize,
    pub max_limit: usize,
    /// `strftime`-style format for displayed timestamps (UTC).
    pub timestamp_format: String,
}

impl Default for StatusOptions {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

/// One row of the status listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: JobId,
    pub report_type: ReportType,
    pub criteria: serde_json::Value,
    pub status: JobStatus,
    pub requested_at: String,
    pub completed_at: Option<String>,
    pub artifact_path: Option<String>,
    pub error_message: Option<String>,
}

pub struct StatusService {
    ledger: Arc<ReportLedger>,
    options: StatusOptions,
}

impl StatusService {
    pub fn new(ledger: Arc<ReportLedger>, options: StatusOptions) -> Self {
        Self { ledger, options }
    }

    /// Visible jobs, newest first. `limit` defaults and is clamped per
    /// [`StatusOptions`].
    pub fn list(&self, limit: Option<usize>) -> Result<Vec<JobStatusView>, LedgerError> {
        let limit = limit
            .unwrap_or(self.options.default_limit)
            .min(self.options.max_limit);
        let jobs = self.ledger.list_recent(limit, false)?;
        Ok(jobs.iter().map(|job| self.view(job)).collect())
    }

    /// A single visible job, or `None` if it does not exist or was deleted.
    pub fn get(&self, id: JobId) -> Result<Option<JobStatusView>, LedgerError> {
        let job = self.ledger.find_by_id(id)?;
        Ok(job.filter(|j| !j.is_deleted).map(|j| self.view(&j)))
    }

    pub fn view(&self, job: &ReportJob) -> JobStatusView {
        JobStatusView {
            id: job.id,
            report_type: job.report_type,
            criteria: job.criteria.clone(),
            status: job.status,
            requested_at: self.format_timestamp(job.requested_at),
            completed_at: job.completed_at.map(|dt| self.format_timestamp(dt)),
            artifact_path: job.artifact_path.clone(),
            error_message: job.error_message.clone(),
        }
    }

    fn format_timestamp(&self, dt: DateTime<Utc>) -> String {
        let mut out = String::new();
        if write!(out, "{}", dt.format(&self.options.timestamp_format)).is_err() {
            // Unrenderable format; fall back to RFC 3339.
            return dt.to_rfc3339();
        }
        out
    }
}
