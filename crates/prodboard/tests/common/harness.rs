//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct provides a complete isolated environment for
//! testing the report pipeline:
//! - A temporary directory holding the database and the artifact store
//! - A `ReportEngine` whose reporting pool can be taken offline on demand
//! - Helpers to seed production data and drive workers on the test thread

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tempfile::TempDir;

use prodboard::db::{ConnectionManager, DbError, Pool, SqliteManager};
use prodboard::{
    Config, JobId, JobOutcome, JobStatus, ReportEngine, ReportJob, ReportService, ReportWorker,
};

use super::builders::{ConfigBuilder, HaulCycleBuilder, MovementBuilder};

/// Wraps a `SqliteManager` and refuses connections while an outage is on.
///
/// Idle connections also fail validation during an outage, so the pool
/// discards them the way it would after a dropped link.
pub struct FlakyManager {
    inner: SqliteManager,
    outage: Arc<AtomicBool>,
    on_checkout: CheckoutHook,
}

/// Runs once on the next reporting checkout, then clears itself.
pub type CheckoutHook = Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>;

impl FlakyManager {
    pub fn new(inner: SqliteManager, outage: Arc<AtomicBool>) -> Self {
        Self::with_hook(inner, outage, CheckoutHook::default())
    }

    pub fn with_hook(inner: SqliteManager, outage: Arc<AtomicBool>, on_checkout: CheckoutHook) -> Self {
        Self {
            inner,
            outage,
            on_checkout,
        }
    }

    fn check(&self) -> Result<(), DbError> {
        let hook = self.on_checkout.lock().expect("hook lock poisoned").take();
        if let Some(hook) = hook {
            hook();
        }
        if self.outage.load(Ordering::SeqCst) {
            return Err(DbError::Connection(
                "simulated outage: store unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

impl ConnectionManager for FlakyManager {
    type Connection = Connection;

    fn connect(&self) -> Result<Connection, DbError> {
        self.check()?;
        self.inner.connect()
    }

    fn is_valid(&self, _conn: &mut Connection) -> Result<(), DbError> {
        self.check()
    }
}

/// An isolated engine over a temp directory.
pub struct TestHarness {
    engine: Option<ReportEngine>,
    outage: Arc<AtomicBool>,
    on_checkout: CheckoutHook,
    temp_dir: TempDir,
}

impl TestHarness {
    /// Creates a harness with default test settings and no background workers.
    pub fn new() -> Self {
        Self::with_config(|builder| builder)
    }

    /// Creates a harness whose config is adjusted by `configure`.
    ///
    /// The reporting pool opens the same database file as the ledger but
    /// goes through a `FlakyManager`, so an outage only affects report
    /// computations.
    pub fn with_config<F>(configure: F) -> Self
    where
        F: FnOnce(ConfigBuilder) -> ConfigBuilder,
    {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = configure(ConfigBuilder::new(temp_dir.path())).build();
        let outage = Arc::new(AtomicBool::new(false));
        let on_checkout = CheckoutHook::default();

        let options = config.database.pool_options();
        let ledger_pool = Arc::new(
            prodboard::db::open_pool(&config.database.path, &options)
                .expect("Failed to open ledger pool"),
        );
        let reporting_pool = Arc::new(Pool::new(
            FlakyManager::with_hook(
                SqliteManager::new(&config.database.path, options.busy_timeout),
                Arc::clone(&outage),
                Arc::clone(&on_checkout),
            ),
            options.max_size,
            Duration::from_millis(200),
        ));

        let engine = ReportEngine::with_pools(config, ledger_pool, reporting_pool)
            .expect("Failed to build engine");

        Self {
            engine: Some(engine),
            outage,
            on_checkout,
            temp_dir,
        }
    }

    pub fn engine(&self) -> &ReportEngine {
        self.engine.as_ref().expect("engine already shut down")
    }

    pub fn engine_mut(&mut self) -> &mut ReportEngine {
        self.engine.as_mut().expect("engine already shut down")
    }

    pub fn config(&self) -> &Config {
        self.engine().config()
    }

    pub fn service(&self) -> &ReportService {
        self.engine().service()
    }

    pub fn worker(&self) -> ReportWorker {
        self.engine().new_worker()
    }

    pub fn temp_path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Takes the reporting store offline (`true`) or brings it back.
    pub fn set_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    /// Runs `hook` when the next report computation checks out a connection.
    pub fn before_next_computation(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_checkout.lock().expect("hook lock poisoned") = Some(Box::new(hook));
    }

    /// Runs `f` on a ledger-pool connection.
    pub fn with_db<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> T {
        let conn = self
            .engine()
            .ledger_pool()
            .acquire()
            .expect("Failed to acquire connection");
        f(&conn).expect("Database statement failed")
    }

    pub fn seed_movements(&self, rows: &[MovementBuilder]) {
        self.with_db(|conn| rows.iter().try_for_each(|row| row.insert(conn)));
    }

    pub fn seed_haul_cycles(&self, rows: &[HaulCycleBuilder]) {
        self.with_db(|conn| rows.iter().try_for_each(|row| row.insert(conn)));
    }

    pub fn seed_operator(&self, id: i64, name: &str) {
        self.with_db(|conn| {
            conn.execute(
                "INSERT INTO operators (id, name) VALUES (?1, ?2)",
                rusqlite::params![id, name],
            )
        });
    }

    pub fn submit(&self, report_type: &str, criteria: serde_json::Value) -> JobId {
        self.service()
            .submit(report_type, &criteria)
            .expect("Failed to submit job")
            .job_id
    }

    pub fn job(&self, id: JobId) -> ReportJob {
        self.engine()
            .ledger()
            .find_by_id(id)
            .expect("Failed to read job")
            .expect("Job not found")
    }

    /// Runs one worker on the test thread until nothing is claimable.
    pub fn drain_jobs(&self) -> Vec<JobOutcome> {
        let worker = self.worker();
        let mut outcomes = Vec::new();
        while let Some(outcome) = worker.run_once().expect("Ledger unavailable") {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Polls until job `id` reaches a terminal state or `timeout` elapses.
    pub fn wait_for_terminal(&self, id: JobId, timeout: Duration) -> ReportJob {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.job(id);
            if job.status.is_terminal() || Instant::now() >= deadline {
                return job;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Parses the stored artifact of a completed job.
    pub fn read_artifact(&self, id: JobId) -> serde_json::Value {
        let download = self
            .service()
            .fetch_artifact(id)
            .expect("Failed to fetch artifact");
        serde_json::from_slice(&download.content).expect("Artifact is not valid JSON")
    }

    pub fn status_of(&self, id: JobId) -> JobStatus {
        self.job(id).status
    }

    /// Shuts the engine down, draining its pools.
    pub fn shutdown(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine
                .shutdown(Duration::from_secs(5))
                .expect("Engine shutdown failed");
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
