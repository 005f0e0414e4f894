use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::db::PoolOptions;
use crate::status::StatusOptions;
use crate::worker::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            artifacts: ArtifactsConfig::default(),
            worker: WorkerConfig::default(),
            retry: RetryConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

fn prodboard_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".prodboard"))
        .unwrap_or_else(|| PathBuf::from(".prodboard"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Ledger database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// Separate database for report computations. Defaults to `path`.
    #[serde(default)]
    pub reporting_path: Option<PathBuf>,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path()
        .unwrap_or_else(|| prodboard_home().join("data").join("prodboard.db"))
}

fn default_pool_size() -> usize {
    4
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            reporting_path: None,
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_size: self.pool_size,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifact_directory")]
    pub directory: PathBuf,
}

fn default_artifact_directory() -> PathBuf {
    prodboard_home().join("artifacts")
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            directory: default_artifact_directory(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker threads. Zero runs no workers in this process.
    #[serde(default = "default_worker_count")]
    pub count: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_error_length")]
    pub max_error_length: usize,
    /// `Running` jobs claimed longer ago than this are put back in the
    /// queue when workers start.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, 4)
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_error_length() -> usize {
    crate::worker::DEFAULT_MAX_ERROR_LENGTH
}

fn default_stale_after_ms() -> u64 {
    3_600_000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            poll_interval_ms: default_poll_interval_ms(),
            max_error_length: default_max_error_length(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_ceiling")]
    pub ceiling: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_ceiling() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            ceiling: default_ceiling(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            ceiling: self.ceiling,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_limit() -> usize {
    50
}

fn default_max_limit() -> usize {
    500
}

fn default_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl StatusConfig {
    pub fn options(&self) -> StatusOptions {
        StatusOptions {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
            timestamp_format: self.timestamp_format.clone(),
        }
    }
}
