//! Drives one claimed job from `Running` to its next state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn};

use crate::artifact::ArtifactStore;
use crate::db::{DbError, QueryExecutor};
use crate::ledger::{JobId, LedgerError, ReportJob, ReportLedger};
use crate::reports::procedures::procedure_for;

use super::retry::RetryPolicy;

/// Default bound on the length of a stored error message.
pub const DEFAULT_MAX_ERROR_LENGTH: usize = 1000;

/// What happened to a claimed job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed {
        job_id: JobId,
        artifact_path: String,
    },
    Failed {
        job_id: JobId,
        error: String,
    },
    Requeued {
        job_id: JobId,
        attempts: u32,
        delay: Duration,
    },
}

enum Failure {
    /// The store was unreachable. Worth another attempt.
    Transient(String),
    /// Deterministic failure. Retrying would fail the same way.
    Permanent(String),
}

impl From<DbError> for Failure {
    fn from(e: DbError) -> Self {
        if e.is_transient() {
            Failure::Transient(e.to_string())
        } else {
            Failure::Permanent(e.to_string())
        }
    }
}

/// A ledger update that ends a claimed job's run.
#[derive(Debug, Clone)]
enum Record {
    Complete { artifact_path: String },
    Fail { error: String },
    Requeue { last_error: String, delay: Duration },
}

pub struct ReportWorker {
    id: String,
    ledger: Arc<ReportLedger>,
    executor: Arc<QueryExecutor>,
    artifacts: Arc<ArtifactStore>,
    retry: RetryPolicy,
    max_error_length: usize,
    /// Outcomes the ledger could not take yet. The jobs stay `Running`
    /// until these are written.
    unrecorded: Mutex<Vec<(JobId, Record)>>,
}

impl ReportWorker {
    /// `executor` runs the report computations. It may point at a different
    /// store than the ledger.
    pub fn new(
        ledger: Arc<ReportLedger>,
        executor: Arc<QueryExecutor>,
        artifacts: Arc<ArtifactStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id: format!("worker-{}", uuid::Uuid::new_v4().simple()),
            ledger,
            executor,
            artifacts,
            retry,
            max_error_length: DEFAULT_MAX_ERROR_LENGTH,
            unrecorded: Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_error_length(mut self, max_error_length: usize) -> Self {
        self.max_error_length = max_error_length;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claims and processes at most one job.
    ///
    /// Returns `Ok(None)` when no job was claimable. An `Err` means the
    /// ledger itself could not be read or updated. Outcomes that could not
    /// be recorded are retried first on the next call.
    pub fn run_once(&self) -> Result<Option<JobOutcome>, LedgerError> {
        self.flush_unrecorded()?;

        let job = match self.ledger.claim_next_pending(&self.id)? {
            Some(job) => job,
            None => return Ok(None),
        };

        let _span = info_span!("report_job",
            job_id = job.id,
            report_type = %job.report_type,
            worker = %self.id,
        )
        .entered();

        self.process(&job).map(Some)
    }

    fn process(&self, job: &ReportJob) -> Result<JobOutcome, LedgerError> {
        match self.generate(job) {
            Ok(artifact_path) => {
                self.record(
                    job.id,
                    Record::Complete {
                        artifact_path: artifact_path.clone(),
                    },
                )?;
                info!("Job {} completed: {}", job.id, artifact_path);
                Ok(JobOutcome::Completed {
                    job_id: job.id,
                    artifact_path,
                })
            }
            Err(Failure::Permanent(message)) => self.fail(job, &message),
            Err(Failure::Transient(message)) => {
                if self.retry.should_requeue(job.attempts) {
                    let attempts = job.attempts + 1;
                    let delay = self.retry.delay_for(attempts);
                    let last_error = truncate_message(&message, self.max_error_length);
                    match self.record(job.id, Record::Requeue { last_error, delay }) {
                        Ok(()) => {}
                        Err(e @ LedgerError::DelayOutOfRange(_)) => {
                            return self.fail(job, &format!("{} after: {}", e, message));
                        }
                        Err(e) => return Err(e),
                    }
                    warn!(
                        "Job {} requeued after connection failure (retry {}/{}, in {:?}): {}",
                        job.id, attempts, self.retry.ceiling, delay, message
                    );
                    Ok(JobOutcome::Requeued {
                        job_id: job.id,
                        attempts,
                        delay,
                    })
                } else {
                    let message = format!(
                        "Gave up after {} connection failures: {}",
                        job.attempts + 1,
                        message
                    );
                    self.fail(job, &message)
                }
            }
        }
    }

    fn fail(&self, job: &ReportJob, message: &str) -> Result<JobOutcome, LedgerError> {
        let error = truncate_message(message, self.max_error_length);
        self.record(
            job.id,
            Record::Fail {
                error: error.clone(),
            },
        )?;
        warn!("Job {} failed: {}", job.id, error);
        Ok(JobOutcome::Failed {
            job_id: job.id,
            error,
        })
    }

    fn apply(&self, job_id: JobId, record: &Record) -> Result<(), LedgerError> {
        match record {
            Record::Complete { artifact_path } => self.ledger.mark_completed(job_id, artifact_path),
            Record::Fail { error } => self.ledger.mark_failed(job_id, error),
            Record::Requeue { last_error, delay } => {
                self.ledger.requeue(job_id, last_error, *delay)
            }
        }
    }

    /// Writes `record`, retrying transient ledger failures with the retry
    /// policy's backoff. If the ledger stays unreachable the record is kept
    /// for the next `run_once` and the error is returned.
    fn record(&self, job_id: JobId, record: Record) -> Result<(), LedgerError> {
        let mut retries = 0;
        loop {
            match self.apply(job_id, &record) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && retries < self.retry.ceiling => {
                    retries += 1;
                    let delay = self.retry.delay_for(retries);
                    warn!(
                        "Ledger update for job {} failed (retry {}/{}, in {:?}): {}",
                        job_id, retries, self.retry.ceiling, delay, e
                    );
                    std::thread::sleep(delay);
                }
                Err(e) if e.is_transient() => {
                    error!(
                        "Ledger unreachable, keeping outcome of job {} for the next cycle: {}",
                        job_id, e
                    );
                    self.lock_unrecorded().push((job_id, record));
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes outcomes left over from earlier runs, oldest first.
    fn flush_unrecorded(&self) -> Result<(), LedgerError> {
        let mut backlog = std::mem::take(&mut *self.lock_unrecorded()).into_iter();
        while let Some((job_id, record)) = backlog.next() {
            match self.apply(job_id, &record) {
                Ok(()) => info!("Recorded delayed outcome of job {}", job_id),
                Err(e) if e.is_transient() => {
                    let mut kept = self.lock_unrecorded();
                    kept.push((job_id, record));
                    kept.extend(backlog);
                    return Err(e);
                }
                Err(e) => warn!("Dropping delayed outcome of job {}: {}", job_id, e),
            }
        }
        Ok(())
    }

    /// Number of outcomes waiting for the ledger.
    pub fn unrecorded_len(&self) -> usize {
        self.lock_unrecorded().len()
    }

    fn lock_unrecorded(&self) -> MutexGuard<'_, Vec<(JobId, Record)>> {
        self.unrecorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generate(&self, job: &ReportJob) -> Result<String, Failure> {
        let criteria = self
            .ledger
            .registry()
            .validate_typed(job.report_type, &job.criteria)
            .map_err(|e| Failure::Permanent(e.to_string()))?;
        let procedure = procedure_for(job.report_type);

        let datasets = {
            let _step = info_span!("run_computation", computation = procedure.name).entered();
            self.executor.call(procedure.name, &criteria.to_params())?
        };
        debug!(
            "Job {} computation returned {} row(s) across {} set(s)",
            job.id,
            datasets.iter().map(|s| s.len()).sum::<usize>(),
            datasets.len()
        );

        let _step = info_span!("write_artifact").entered();
        self.artifacts
            .write(job, &datasets)
            .map_err(|e| Failure::Permanent(e.to_string()))
    }
}

/// Shortens `message` to at most `max` characters, marking the cut.
pub fn truncate_message(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(max.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
