//! Database access: pooled SQLite connections and the query executor.
//!
//! The ledger and the report computations both reach the store through a
//! [`QueryExecutor`], which borrows connections from a bounded [`Pool`]
//! for the duration of a single operation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

pub mod error;
pub mod executor;
pub mod manager;
pub mod migrations;
pub mod pool;
pub mod procedure;
pub mod value;

pub use error::DbError;
pub use executor::QueryExecutor;
pub use manager::{ConnectionManager, SqliteManager};
pub use pool::{Pool, PoolStatus, PooledConnection};
pub use procedure::{Operation, ParamSpec, Procedure, ProcedureCatalog, ResultSpec};
pub use value::{Param, ParamKind, Params, Row, RowSet, Value};

/// A pool of SQLite connections.
pub type SqlitePool = Pool<Connection>;

/// Settings for opening a SQLite-backed pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_size: usize,
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 4,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Opens (or creates) the database at `path` and runs all pending migrations.
pub fn open_pool(path: &Path, options: &PoolOptions) -> Result<SqlitePool, DbError> {
    let manager = SqliteManager::new(path, options.busy_timeout);
    manager.ensure_parent_dir()?;
    let pool = Pool::new(manager, options.max_size, options.acquire_timeout);
    migrate(&pool)?;
    log::info!("Database opened at {}", path.display());
    Ok(pool)
}

/// Applies pending migrations using one pooled connection.
pub fn migrate(pool: &SqlitePool) -> Result<(), DbError> {
    let mut conn = pool.acquire()?;
    migrations::run_all(&mut conn)
}

/// Returns the canonical database path: `~/.prodboard/data/prodboard.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".prodboard").join("data").join("prodboard.db"))
}
