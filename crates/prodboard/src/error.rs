use std::path::PathBuf;
use thiserror::Error;

use crate::ledger::{JobId, LedgerError};
use crate::reports::CriteriaError;
use crate::service::ServiceError;

#[derive(Error, Debug)]
pub enum ProdboardError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DbError),

    #[error("Invalid criteria: {0}")]
    Criteria(#[from] CriteriaError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("{0}")]
    Service(#[from] ServiceError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read artifact '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode artifact for job {job_id}: {source}")]
    Encode {
        job_id: JobId,
        #[source]
        source: serde_json::Error,
    },

    #[error("Artifact handle '{0}' escapes the artifact directory")]
    InvalidHandle(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker pool is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, ProdboardError>;
