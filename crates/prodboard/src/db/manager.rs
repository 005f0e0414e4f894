//! Connection factories for the resource pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use super::DbError;

/// Creates and checks connections on behalf of a [`Pool`](super::Pool).
pub trait ConnectionManager: Send + Sync {
    type Connection: Send;

    /// Opens a new connection to the backing store.
    fn connect(&self) -> Result<Self::Connection, DbError>;

    /// Checks an idle connection before it is handed out again.
    ///
    /// An error causes the pool to discard the connection and open a replacement.
    fn is_valid(&self, _conn: &mut Self::Connection) -> Result<(), DbError> {
        Ok(())
    }
}

/// Opens file-backed SQLite connections in WAL mode.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteManager {
    pub fn new<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the parent directory of the database file if needed.
    pub fn ensure_parent_dir(&self) -> Result<(), DbError> {
        if let Some(parent) = self.path.parent() {
            if parent.as_os_str().is_empty() {
                return Ok(());
            }
            std::fs::create_dir_all(parent).map_err(|e| DbError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl ConnectionManager for SqliteManager {
    type Connection = Connection;

    fn connect(&self) -> Result<Connection, DbError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        log::debug!("Opened connection to {}", self.path.display());
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");
        let manager = SqliteManager::new(&path, Duration::from_millis(100));
        manager.ensure_parent_dir().unwrap();

        let conn = manager.connect().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fk, 1);
        assert!(path.exists());
    }

    #[test]
    fn test_connect_missing_directory_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SqliteManager::new(
            dir.path().join("missing").join("store.db"),
            Duration::from_millis(100),
        );
        let err = manager.connect().unwrap_err();
        assert!(err.is_transient(), "unexpected error: {:?}", err);
    }
}
