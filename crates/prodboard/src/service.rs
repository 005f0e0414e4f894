//! Client-facing operations: submission, status, artifact download and
//! administrative deletion.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::artifact::ArtifactStore;
use crate::error::ArtifactError;
use crate::ledger::{JobId, JobStatus, LedgerError, ReportLedger};
use crate::reports::CriteriaError;
use crate::status::{JobStatusView, StatusService};
use crate::worker::WakeHandle;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(CriteriaError),

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Job {id} has no artifact (status {status})")]
    ArtifactUnavailable { id: JobId, status: JobStatus },

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

impl From<LedgerError> for ServiceError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidCriteria(e) => ServiceError::InvalidCriteria(e),
            LedgerError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Ledger(other),
        }
    }
}

/// Response to a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub job_id: JobId,
}

/// A completed job's artifact, ready for download.
#[derive(Debug, Clone)]
pub struct ArtifactDownload {
    pub job_id: JobId,
    pub artifact_path: String,
    pub content: Vec<u8>,
}

impl ArtifactDownload {
    /// Suggested file name for the download.
    pub fn file_name(&self) -> &str {
        self.artifact_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.artifact_path)
    }
}

pub struct ReportService {
    ledger: Arc<ReportLedger>,
    status: StatusService,
    artifacts: Arc<ArtifactStore>,
    wake: WakeHandle,
}

impl ReportService {
    pub fn new(
        ledger: Arc<ReportLedger>,
        status: StatusService,
        artifacts: Arc<ArtifactStore>,
        wake: WakeHandle,
    ) -> Self {
        Self {
            ledger,
            status,
            artifacts,
            wake,
        }
    }

    /// Records a new job and wakes an idle worker. Never waits for generation.
    pub fn submit(
        &self,
        report_type: &str,
        criteria: &serde_json::Value,
    ) -> Result<SubmitReceipt, ServiceError> {
        let job_id = self.ledger.create(report_type, criteria)?;
        self.wake.wake();
        Ok(SubmitReceipt { job_id })
    }

    pub fn list_status(&self, limit: Option<usize>) -> Result<Vec<JobStatusView>, ServiceError> {
        Ok(self.status.list(limit)?)
    }

    pub fn job_status(&self, id: JobId) -> Result<JobStatusView, ServiceError> {
        self.status.get(id)?.ok_or(ServiceError::NotFound(id))
    }

    /// Stored artifact of a `Completed` job.
    pub fn fetch_artifact(&self, id: JobId) -> Result<ArtifactDownload, ServiceError> {
        let job = self
            .ledger
            .find_by_id(id)?
            .filter(|j| !j.is_deleted)
            .ok_or(ServiceError::NotFound(id))?;

        let artifact_path = match (job.status, job.artifact_path) {
            (JobStatus::Completed, Some(path)) => path,
            (status, _) => return Err(ServiceError::ArtifactUnavailable { id, status }),
        };
        let content = self.artifacts.read(&artifact_path)?;
        Ok(ArtifactDownload {
            job_id: id,
            artifact_path,
            content,
        })
    }

    /// Hides a job from listings. Works in any status.
    pub fn delete(&self, id: JobId) -> Result<(), ServiceError> {
        Ok(self.ledger.soft_delete(id)?)
    }

    pub fn counts(&self) -> Result<HashMap<JobStatus, u64>, ServiceError> {
        Ok(self.ledger.count_by_status()?)
    }
}
