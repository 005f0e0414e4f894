//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order, each inside its own transaction.

use rusqlite::Connection;

use super::error::DbError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_report_jobs_table",
        sql: include_str!("sql/001_create_report_jobs.sql"),
    },
    Migration {
        version: 2,
        description: "create_production_tables",
        sql: include_str!("sql/002_create_production_tables.sql"),
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &mut Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DbError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
        tx.commit()?;
    }

    Ok(())
}

/// Returns the highest applied migration version.
pub fn current_version(conn: &Connection) -> Result<u32, DbError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}
