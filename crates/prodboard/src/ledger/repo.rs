//! Ledger operations over the `report_jobs` table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{named_params, Connection, OptionalExtension, TransactionBehavior};

use crate::db::{DbError, QueryExecutor};
use crate::reports::ReportRegistry;

use super::job::{format_timestamp, JobId, JobStatus, ReportJob};
use super::LedgerError;

const CLAIM_SQL: &str = "UPDATE report_jobs
     SET status = 'running', started_at = :now, updated_at = :now, claimed_by = :worker
     WHERE id = (
         SELECT id FROM report_jobs
         WHERE status = 'pending' AND is_deleted = 0 AND available_at <= :now
         ORDER BY requested_at, id
         LIMIT 1
     )
     AND status = 'pending'
     RETURNING *";

enum Transition {
    Applied,
    Rejected(Option<JobStatus>),
}

/// Durable record of report jobs and their lifecycle.
///
/// Every state change is a single conditional `UPDATE` keyed on the current
/// status, so concurrent callers never both win the same transition.
pub struct ReportLedger {
    executor: Arc<QueryExecutor>,
    registry: Arc<ReportRegistry>,
}

impl ReportLedger {
    pub fn new(executor: Arc<QueryExecutor>, registry: Arc<ReportRegistry>) -> Self {
        Self { executor, registry }
    }

    pub fn registry(&self) -> &ReportRegistry {
        &self.registry
    }

    /// Validates `criteria` for `report_type` and records a new `Pending` job.
    ///
    /// Nothing is written when validation fails.
    pub fn create(
        &self,
        report_type: &str,
        criteria: &serde_json::Value,
    ) -> Result<JobId, LedgerError> {
        let validated = self.registry.validate(report_type, criteria)?;
        let canonical = validated.to_json().to_string();
        let report_type = validated.report_type();
        let now = format_timestamp(Utc::now());

        let id = self.executor.with_conn(|conn| {
            conn.execute(
                "INSERT INTO report_jobs (report_type, criteria, status, requested_at,
                 updated_at, available_at)
                 VALUES (:report_type, :criteria, 'pending', :now, :now, :now)",
                named_params! {
                    ":report_type": report_type.as_str(),
                    ":criteria": canonical,
                    ":now": now,
                },
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        log::info!("Created {} job {}", report_type, id);
        Ok(id)
    }

    /// Atomically moves the oldest claimable `Pending` job to `Running`.
    ///
    /// Soft-deleted jobs and jobs backing off until a later `available_at`
    /// are skipped. Returns `None` when nothing is claimable.
    pub fn claim_next_pending(&self, worker_id: &str) -> Result<Option<ReportJob>, LedgerError> {
        let now = format_timestamp(Utc::now());
        let job = self.executor.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let job = tx
                .query_row(
                    CLAIM_SQL,
                    named_params! { ":now": now, ":worker": worker_id },
                    ReportJob::from_row,
                )
                .optional()?;
            tx.commit()?;
            Ok(job)
        })?;

        if let Some(ref job) = job {
            log::debug!(
                "Worker {} claimed job {} ({}, attempt {})",
                worker_id,
                job.id,
                job.report_type,
                job.attempts + 1
            );
        }
        Ok(job)
    }

    /// `Running → Completed`, recording where the artifact was stored.
    pub fn mark_completed(&self, id: JobId, artifact_path: &str) -> Result<(), LedgerError> {
        let now = format_timestamp(Utc::now());
        self.transition(id, JobStatus::Completed, |conn| {
            conn.execute(
                "UPDATE report_jobs
                 SET status = 'completed', completed_at = :now, updated_at = :now,
                     artifact_path = :artifact_path
                 WHERE id = :id AND status = 'running'",
                named_params! { ":now": now, ":artifact_path": artifact_path, ":id": id },
            )
        })
    }

    /// `Running → Failed`, recording the error shown to users.
    pub fn mark_failed(&self, id: JobId, error_message: &str) -> Result<(), LedgerError> {
        let now = format_timestamp(Utc::now());
        self.transition(id, JobStatus::Failed, |conn| {
            conn.execute(
                "UPDATE report_jobs
                 SET status = 'failed', completed_at = :now, updated_at = :now,
                     error_message = :error_message
                 WHERE id = :id AND status = 'running'",
                named_params! { ":now": now, ":error_message": error_message, ":id": id },
            )
        })
    }

    /// `Running → Pending` after a transient failure.
    ///
    /// Increments `attempts` and holds the job back for `delay`. The failure
    /// is kept in `last_error`; `error_message` stays empty.
    pub fn requeue(&self, id: JobId, last_error: &str, delay: Duration) -> Result<(), LedgerError> {
        let now = Utc::now();
        let available_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .map(format_timestamp)
            .ok_or(LedgerError::DelayOutOfRange(delay))?;
        let now = format_timestamp(now);
        self.transition(id, JobStatus::Pending, |conn| {
            conn.execute(
                "UPDATE report_jobs
                 SET status = 'pending', attempts = attempts + 1, available_at = :available_at,
                     last_error = :last_error, claimed_by = NULL, started_at = NULL,
                     updated_at = :now
                 WHERE id = :id AND status = 'running'",
                named_params! {
                    ":available_at": available_at,
                    ":last_error": last_error,
                    ":now": now,
                    ":id": id,
                },
            )
        })
    }

    /// Puts `Running` jobs claimed at least `older_than` ago back in the
    /// queue. Their worker is presumed gone. `attempts` is left unchanged.
    ///
    /// Returns how many jobs were reclaimed.
    pub fn requeue_stale(&self, older_than: Duration) -> Result<usize, LedgerError> {
        let now = Utc::now();
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .map(format_timestamp)
            .ok_or(LedgerError::DelayOutOfRange(older_than))?;
        let now = format_timestamp(now);
        let reclaimed = self.executor.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE report_jobs
                 SET status = 'pending', available_at = :now, updated_at = :now,
                     last_error = 'Reclaimed from ' || COALESCE(claimed_by, 'unknown worker')
                         || ' after it stopped reporting',
                     claimed_by = NULL, started_at = NULL
                 WHERE status = 'running' AND started_at <= :cutoff",
                named_params! { ":now": now, ":cutoff": cutoff },
            )?)
        })?;
        if reclaimed > 0 {
            log::warn!("Requeued {} stale running job(s)", reclaimed);
        }
        Ok(reclaimed)
    }

    /// Jobs newest first (`requested_at`, then id), at most `limit` of them.
    pub fn list_recent(
        &self,
        limit: usize,
        include_deleted: bool,
    ) -> Result<Vec<ReportJob>, LedgerError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let jobs = self.executor.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM report_jobs
                 WHERE (:include_deleted OR is_deleted = 0)
                 ORDER BY requested_at DESC, id DESC
                 LIMIT :limit",
            )?;
            let rows = stmt.query_map(
                named_params! { ":include_deleted": include_deleted, ":limit": limit },
                ReportJob::from_row,
            )?;
            let mut jobs = Vec::new();
            for row in rows {
                jobs.push(row?);
            }
            Ok(jobs)
        })?;
        Ok(jobs)
    }

    /// Hides a job from listings. The record itself is kept.
    pub fn soft_delete(&self, id: JobId) -> Result<(), LedgerError> {
        let now = format_timestamp(Utc::now());
        let changed = self.executor.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE report_jobs SET is_deleted = 1, updated_at = :now WHERE id = :id",
                named_params! { ":now": now, ":id": id },
            )?)
        })?;
        if changed == 0 {
            return Err(LedgerError::NotFound(id));
        }
        log::info!("Soft-deleted job {}", id);
        Ok(())
    }

    pub fn find_by_id(&self, id: JobId) -> Result<Option<ReportJob>, LedgerError> {
        let job = self.executor.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM report_jobs WHERE id = :id",
                    named_params! { ":id": id },
                    ReportJob::from_row,
                )
                .optional()?)
        })?;
        Ok(job)
    }

    /// Number of visible jobs per status.
    pub fn count_by_status(&self) -> Result<HashMap<JobStatus, u64>, LedgerError> {
        let counts = self.executor.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM report_jobs WHERE is_deleted = 0 GROUP BY status",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })?;
            let mut counts = HashMap::new();
            for row in rows {
                let (status, count) = row?;
                counts.insert(parse_status(&status)?, count);
            }
            Ok(counts)
        })?;
        Ok(counts)
    }

    fn transition<F>(&self, id: JobId, to: JobStatus, update: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<usize>,
    {
        let outcome = self.executor.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let outcome = if update(&tx)? == 1 {
                Transition::Applied
            } else {
                Transition::Rejected(current_status(&tx, id)?)
            };
            tx.commit()?;
            Ok(outcome)
        })?;

        match outcome {
            Transition::Applied => {
                log::debug!("Job {} is now {}", id, to);
                Ok(())
            }
            Transition::Rejected(None) => Err(LedgerError::NotFound(id)),
            Transition::Rejected(Some(from)) => {
                log::error!(
                    "Invalid transition for job {}: {} -> {} (job is not running)",
                    id,
                    from,
                    to
                );
                Err(LedgerError::InvalidTransition { id, from, to })
            }
        }
    }
}

fn current_status(conn: &Connection, id: JobId) -> Result<Option<JobStatus>, DbError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM report_jobs WHERE id = :id",
            named_params! { ":id": id },
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| parse_status(&s)).transpose()
}

fn parse_status(raw: &str) -> Result<JobStatus, DbError> {
    raw.parse::<JobStatus>().map_err(|message| DbError::Operation { code: -1, message })
}
