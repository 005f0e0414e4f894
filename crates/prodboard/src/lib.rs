//! Asynchronous report generation for the production dashboard.
//!
//! Clients submit a report request, which is recorded as a `Pending` job in
//! the [`ledger`]. Workers claim jobs atomically, run the report's named
//! computation through the pooled [`db::QueryExecutor`], store the rows as
//! an [`artifact`] and record the outcome. Clients poll the [`status`]
//! listing and download completed artifacts through the [`service`].

pub mod artifact;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod reports;
pub mod service;
pub mod status;
pub mod worker;

pub use artifact::ArtifactStore;
pub use config::{load_config, load_config_from_str, Config};
pub use db::{DbError, QueryExecutor};
pub use engine::ReportEngine;
pub use error::{ArtifactError, ConfigError, ProdboardError, Result, WorkerError};
pub use ledger::{JobId, JobStatus, LedgerError, ReportJob, ReportLedger};
pub use reports::{CriteriaError, ReportCriteria, ReportRegistry, ReportType};
pub use service::{ArtifactDownload, ReportService, ServiceError, SubmitReceipt};
pub use status::{JobStatusView, StatusOptions, StatusService};
pub use worker::{JobOutcome, ReportWorker, RetryPolicy, WakeHandle, WorkerPool};
