pub mod pool;
pub mod retry;
pub mod runner;

pub use pool::{WakeHandle, WorkerPool};
pub use retry::RetryPolicy;
pub use runner::{truncate_message, JobOutcome, ReportWorker, DEFAULT_MAX_ERROR_LENGTH};
