//! Report job ledger: the durable record of every report request.

use std::time::Duration;

use thiserror::Error;

use crate::db::DbError;
use crate::reports::CriteriaError;

pub mod job;
pub mod repo;

pub use job::{JobId, JobStatus, ReportJob};
pub use repo::ReportLedger;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(#[from] CriteriaError),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Backoff of {0:?} is out of range")]
    DelayOutOfRange(Duration),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl LedgerError {
    /// True for store failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Database(e) if e.is_transient())
    }
}
