//! Wires the pools, ledger, workers and services together and owns their
//! lifecycle: open, run workers, drain, close.

use std::sync::Arc;
use std::time::Duration;

use crate::artifact::ArtifactStore;
use crate::config::{validate_config, Config};
use crate::db::{self, QueryExecutor, SqlitePool};
use crate::error::{Result, WorkerError};
use crate::ledger::ReportLedger;
use crate::reports::{procedures, ReportRegistry};
use crate::service::ReportService;
use crate::status::StatusService;
use crate::worker::{ReportWorker, WakeHandle, WorkerPool};

pub struct ReportEngine {
    config: Config,
    ledger_pool: Arc<SqlitePool>,
    reporting_pool: Arc<SqlitePool>,
    ledger: Arc<ReportLedger>,
    reporting: Arc<QueryExecutor>,
    artifacts: Arc<ArtifactStore>,
    service: Arc<ReportService>,
    wake: WakeHandle,
    workers: Option<WorkerPool>,
}

impl ReportEngine {
    /// Opens the configured databases, applies migrations and builds the
    /// services. No workers run until [`start_workers`](Self::start_workers).
    pub fn open(config: Config) -> Result<Self> {
        validate_config(&config)?;
        let options = config.database.pool_options();

        let ledger_pool = Arc::new(db::open_pool(&config.database.path, &options)?);
        let reporting_pool = match &config.database.reporting_path {
            Some(path) if path != &config.database.path => {
                Arc::new(db::open_pool(path, &options)?)
            }
            _ => Arc::clone(&ledger_pool),
        };

        Self::with_pools(config, ledger_pool, reporting_pool)
    }

    /// Builds an engine over existing pools. The ledger pool is migrated;
    /// the reporting pool is used as given.
    pub fn with_pools(
        config: Config,
        ledger_pool: Arc<SqlitePool>,
        reporting_pool: Arc<SqlitePool>,
    ) -> Result<Self> {
        db::migrate(&ledger_pool)?;

        let registry = Arc::new(ReportRegistry::new()?);
        let catalog = Arc::new(procedures::catalog());
        let ledger_executor = Arc::new(QueryExecutor::new(
            Arc::clone(&ledger_pool),
            Arc::clone(&catalog),
        ));
        let reporting = Arc::new(QueryExecutor::new(Arc::clone(&reporting_pool), catalog));
        let ledger = Arc::new(ReportLedger::new(ledger_executor, registry));
        let artifacts = Arc::new(ArtifactStore::new(&config.artifacts.directory));
        let wake = WakeHandle::new();

        let status = StatusService::new(Arc::clone(&ledger), config.status.options());
        let service = Arc::new(ReportService::new(
            Arc::clone(&ledger),
            status,
            Arc::clone(&artifacts),
            wake.clone(),
        ));

        log::info!(
            "Report engine ready (ledger: {}, artifacts: {})",
            config.database.path.display(),
            config.artifacts.directory.display()
        );

        Ok(Self {
            config,
            ledger_pool,
            reporting_pool,
            ledger,
            reporting,
            artifacts,
            service,
            wake,
            workers: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &Arc<ReportService> {
        &self.service
    }

    pub fn ledger(&self) -> &Arc<ReportLedger> {
        &self.ledger
    }

    pub fn reporting_executor(&self) -> &Arc<QueryExecutor> {
        &self.reporting
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    pub fn ledger_pool(&self) -> &Arc<SqlitePool> {
        &self.ledger_pool
    }

    /// A worker configured like the ones [`start_workers`](Self::start_workers)
    /// spawns, for driving jobs on the calling thread.
    pub fn new_worker(&self) -> ReportWorker {
        ReportWorker::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.reporting),
            Arc::clone(&self.artifacts),
            self.config.retry.policy(),
        )
        .with_max_error_length(self.config.worker.max_error_length)
    }

    /// Spawns `worker.count` worker threads. Returns how many were started.
    ///
    /// Jobs left `Running` for longer than `worker.stale_after_ms` are put
    /// back in the queue first.
    pub fn start_workers(&mut self) -> Result<usize> {
        if self.workers.is_some() {
            return Err(WorkerError::AlreadyRunning.into());
        }
        if self.config.worker.count > 0 {
            self.ledger.requeue_stale(self.config.worker.stale_after())?;
        }
        let workers: Vec<ReportWorker> = (0..self.config.worker.count)
            .map(|_| self.new_worker())
            .collect();
        let pool = WorkerPool::start(
            workers,
            self.config.worker.poll_interval(),
            self.wake.clone(),
        )?;
        let started = pool.len();
        self.workers = Some(pool);
        Ok(started)
    }

    /// Stops worker threads after their current job and waits for them.
    pub fn stop_workers(&mut self) {
        if let Some(pool) = self.workers.take() {
            pool.shutdown();
            pool.wait();
        }
    }

    pub fn workers_running(&self) -> bool {
        self.workers.is_some()
    }

    /// Stops workers, then drains and closes the pools.
    pub fn shutdown(mut self, timeout: Duration) -> Result<()> {
        self.stop_workers();

        self.ledger_pool.drain(timeout)?;
        self.ledger_pool.close()?;
        if !Arc::ptr_eq(&self.ledger_pool, &self.reporting_pool) {
            self.reporting_pool.drain(timeout)?;
            self.reporting_pool.close()?;
        }
        log::info!("Report engine shut down");
        Ok(())
    }
}

impl Drop for ReportEngine {
    fn drop(&mut self) {
        self.stop_workers();
    }
}
