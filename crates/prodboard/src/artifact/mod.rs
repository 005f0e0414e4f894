//! Durable storage for generated report artifacts.
//!
//! An artifact is a JSON document holding every row-set a job produced. The
//! ledger stores its path relative to the artifact directory.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::Serialize;

use crate::db::RowSet;
use crate::error::ArtifactError;
use crate::ledger::{JobId, ReportJob};
use crate::reports::ReportType;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactDocument<'a> {
    job_id: JobId,
    report_type: ReportType,
    generated_at: String,
    criteria: &'a serde_json::Value,
    datasets: &'a [RowSet],
}

/// Rename first; copy and remove when the rename crosses devices.
fn move_file(src: &Path, dst: &Path) -> Result<(), ArtifactError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let move_error = |e| ArtifactError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    };
    std::fs::copy(src, dst).map_err(move_error)?;
    std::fs::remove_file(src).map_err(move_error)?;
    Ok(())
}

pub struct ArtifactStore {
    directory: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Relative handle for a job's artifact:
    /// `<reportType>/<yyyy>/<mm>/job-<id>-<reportType>.json`.
    pub fn handle_for(job_id: JobId, report_type: ReportType, generated_at: DateTime<Utc>) -> String {
        format!(
            "{rt}/{:04}/{:02}/job-{}-{rt}.json",
            generated_at.year(),
            generated_at.month(),
            job_id,
            rt = report_type.as_str()
        )
    }

    /// Serializes `datasets` for `job` and stores them, returning the handle.
    ///
    /// The document is written to a temporary file and renamed into place,
    /// so readers never observe a partial artifact. Writing again for the
    /// same job replaces the earlier document.
    pub fn write(&self, job: &ReportJob, datasets: &[RowSet]) -> Result<String, ArtifactError> {
        let generated_at = Utc::now();
        let document = ArtifactDocument {
            job_id: job.id,
            report_type: job.report_type,
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            criteria: &job.criteria,
            datasets,
        };
        let content = serde_json::to_vec_pretty(&document).map_err(|e| ArtifactError::Encode {
            job_id: job.id,
            source: e,
        })?;

        let handle = Self::handle_for(job.id, job.report_type, generated_at);
        let target = self.directory.join(&handle);
        if let Some(parent) = target.parent() {
            self.ensure_directory(parent)?;
        }

        let temp = target.with_extension(format!("json.tmp-{}", uuid::Uuid::new_v4().simple()));
        if let Err(e) = write_new(&temp, &content) {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }
        if let Err(e) = move_file(&temp, &target) {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }

        log::debug!(
            "Wrote artifact for job {} ({} bytes) to {}",
            job.id,
            content.len(),
            target.display()
        );
        Ok(handle)
    }

    /// Maps a stored handle back to a path inside the artifact directory.
    ///
    /// Absolute handles and handles with `..` or other non-plain components
    /// are rejected.
    pub fn resolve(&self, handle: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(handle);
        let plain = !handle.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(ArtifactError::InvalidHandle(handle.to_string()));
        }
        Ok(self.directory.join(relative))
    }

    /// Reads the stored artifact bytes for download.
    pub fn read(&self, handle: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = self.resolve(handle)?;
        std::fs::read(&path).map_err(|e| ArtifactError::ReadFile { path, source: e })
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), ArtifactError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| ArtifactError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

fn write_new(path: &Path, content: &[u8]) -> Result<(), ArtifactError> {
    let write_error = |e| ArtifactError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(write_error)?;
    file.write_all(content).map_err(write_error)?;
    file.sync_all().map_err(write_error)?;
    Ok(())
}
