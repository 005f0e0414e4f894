//! Query executor: runs one parameterized operation on a pooled connection.

use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::Connection;

use super::procedure::{check_statement_params, Operation, Procedure, ProcedureCatalog};
use super::value::{Params, Row, RowSet, Value};
use super::{DbError, SqlitePool};

/// Runs raw queries and named computations against a [`SqlitePool`].
///
/// A connection is acquired per call and released before the call returns,
/// on every path. Connections that fail with a connection-level error are
/// discarded by the pool.
pub struct QueryExecutor {
    pool: Arc<SqlitePool>,
    catalog: Arc<ProcedureCatalog>,
}

impl QueryExecutor {
    pub fn new(pool: Arc<SqlitePool>, catalog: Arc<ProcedureCatalog>) -> Self {
        Self { pool, catalog }
    }

    pub fn pool(&self) -> &Arc<SqlitePool> {
        &self.pool
    }

    pub fn catalog(&self) -> &ProcedureCatalog {
        &self.catalog
    }

    /// Runs ad-hoc SQL and returns its single row-set.
    pub fn query(&self, sql: &str, params: &Params) -> Result<RowSet, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            check_statement_params(&stmt, params)?;
            collect_rows(&mut stmt, "result", params)
        })
    }

    /// Runs a named computation and returns one row-set per result statement.
    pub fn call(&self, name: &str, params: &Params) -> Result<Vec<RowSet>, DbError> {
        let procedure = self
            .catalog
            .get(name)
            .ok_or_else(|| DbError::validation(name, "unknown named computation"))?;
        let bound = procedure.bind(params)?;
        self.with_conn(|conn| run_procedure(conn, procedure, &bound))
    }

    /// Runs either kind of operation and returns its row-sets.
    pub fn execute(&self, operation: Operation<'_>, params: &Params) -> Result<Vec<RowSet>, DbError> {
        match operation {
            Operation::Query(sql) => self.query(sql, params).map(|set| vec![set]),
            Operation::Named(name) => self.call(name, params),
        }
    }

    /// Provides a pooled connection to `f`.
    ///
    /// The connection is discarded instead of reused when `f` fails with a
    /// transient error.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DbError>,
    {
        let mut conn = self.pool.acquire()?;
        let result = f(&mut conn);
        if let Err(ref e) = result {
            if e.is_transient() {
                log::warn!("Discarding connection after error: {}", e);
                conn.mark_broken();
            }
        }
        result
    }
}

fn run_procedure(
    conn: &mut Connection,
    procedure: &Procedure,
    params: &Params,
) -> Result<Vec<RowSet>, DbError> {
    // One transaction so multi-result computations read a single snapshot.
    let tx = conn.transaction()?;
    let mut sets = Vec::with_capacity(procedure.results.len());
    for result in procedure.results {
        let mut stmt = tx.prepare(result.sql)?;
        sets.push(collect_rows(&mut stmt, result.name, params)?);
    }
    tx.commit()?;
    log::debug!(
        "Named computation '{}' returned {} row-set(s)",
        procedure.name,
        sets.len()
    );
    Ok(sets)
}

fn collect_rows(
    stmt: &mut rusqlite::Statement<'_>,
    name: &str,
    params: &Params,
) -> Result<RowSet, DbError> {
    for (param, value) in params.iter() {
        if let Some(index) = stmt.parameter_index(param)? {
            stmt.raw_bind_parameter(index, value)?;
        }
    }

    let columns = unique_column_names(stmt.column_names());
    let shared: Arc<[String]> = columns.clone().into();
    let mut rows = Vec::new();
    let mut cursor = stmt.raw_query();
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(Value::from(row.get_ref(index)?));
        }
        rows.push(Row::new(Arc::clone(&shared), values));
    }

    Ok(RowSet {
        name: name.to_string(),
        columns,
        rows,
    })
}

/// Suffixes repeated result column names (`id`, `id_2`, ...) so every row
/// serializes to a map without duplicate keys.
fn unique_column_names(names: Vec<&str>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.to_string();
        let mut n = 2;
        while seen.contains(&candidate) {
            candidate = format!("{}_{}", name, n);
            n += 1;
        }
        seen.insert(candidate.clone());
        columns.push(candidate);
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::procedure::{ParamSpec, ResultSpec};
    use crate::db::{ParamKind, Pool, SqliteManager};
    use std::time::Duration;

    static TWO_SETS: Procedure = Procedure {
        name: "two_sets",
        params: &[ParamSpec::required(":min", ParamKind::Integer)],
        results: &[
            ResultSpec {
                name: "big",
                sql: "SELECT n FROM numbers WHERE n >= :min ORDER BY n",
            },
            ResultSpec {
                name: "count",
                sql: "SELECT COUNT(*) AS total FROM numbers",
            },
        ],
    };

    fn executor(dir: &tempfile::TempDir, pool_size: usize) -> QueryExecutor {
        let manager = SqliteManager::new(dir.path().join("exec.db"), Duration::from_secs(1));
        let pool = Arc::new(Pool::new(manager, pool_size, Duration::from_millis(100)));
        let mut catalog = ProcedureCatalog::new();
        catalog.register(&TWO_SETS);
        let executor = QueryExecutor::new(pool, Arc::new(catalog));
        executor
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TABLE numbers (n INTEGER NOT NULL CHECK (n >= 0));
                     INSERT INTO numbers (n) VALUES (1), (2), (3), (4);",
                )?;
                Ok(())
            })
            .unwrap();
        executor
    }

    #[test]
    fn test_query_binds_named_params() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir, 2);
        let set = exec
            .query(
                "SELECT n, n * 2 AS doubled FROM numbers WHERE n > :n ORDER BY n",
                &Params::new().with("n", 2i64),
            )
            .unwrap();

        assert_eq!(set.columns, vec!["n", "doubled"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows[0].get("doubled"), Some(&Value::Integer(6)));
    }

    #[test]
    fn test_text_is_never_interpolated() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir, 1);
        let set = exec
            .query(
                "SELECT :v AS v",
                &Params::new().with("v", "1); DROP TABLE numbers; --"),
            )
            .unwrap();
        assert_eq!(set.rows[0].get("v").unwrap().as_str(), Some("1); DROP TABLE numbers; --"));

        let count = exec
            .query("SELECT COUNT(*) AS c FROM numbers", &Params::new())
            .unwrap();
        assert_eq!(count.rows[0].get("c"), Some(&Value::Integer(4)));
    }

    #[test]
    fn test_query_param_mismatch_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir, 1);
        let missing = exec
            .query("SELECT * FROM numbers WHERE n = :n", &Params::new())
            .unwrap_err();
        assert!(matches!(missing, DbError::Validation { .. }));

        let extra = exec
            .query("SELECT 1", &Params::new().with("n", 1i64))
            .unwrap_err();
        assert!(matches!(extra, DbError::Validation { .. }));

        let positional = exec
            .query("SELECT * FROM numbers WHERE n = ?", &Params::new())
            .unwrap_err();
        assert!(matches!(positional, DbError::Validation { .. }));
    }

    #[test]
    fn test_store_rejection_is_operation_error() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir, 1);
        let err = exec
            .query(
                "INSERT INTO numbers (n) VALUES (:n)",
                &Params::new().with("n", -1i64),
            )
            .unwrap_err();
        match err {
            DbError::Operation { message, .. } => assert!(message.contains("CHECK")),
            other => panic!("unexpected: {:?}", other),
        }

        let syntax = exec.query("SELEC nonsense", &Params::new()).unwrap_err();
        assert!(matches!(syntax, DbError::Operation { .. }));
    }

    #[test]
    fn test_call_returns_ordered_row_sets() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir, 1);
        let sets = exec
            .call("two_sets", &Params::new().with("min", 3i64))
            .unwrap();

        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].name, "big");
        assert_eq!(sets[0].len(), 2);
        assert_eq!(sets[1].rows[0].get("total"), Some(&Value::Integer(4)));
    }

    #[test]
    fn test_call_validates_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir, 1);
        let _held = exec.pool().acquire().unwrap();

        // The only connection is held, so reaching the pool would time out.
        let err = exec.call("two_sets", &Params::new()).unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        let err = exec.call("nope", &Params::new()).unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }

    #[test]
    fn test_connection_released_on_every_path() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir, 1);
        let _ = exec.query("SELEC nonsense", &Params::new());
        let _ = exec.query("SELECT 1 AS one", &Params::new());
        let _ = exec.execute(Operation::Named("two_sets"), &Params::new().with("min", 0i64));

        let status = exec.pool().status().unwrap();
        assert_eq!(status.checked_out, 0);
        assert_eq!(status.live, 1);
    }

    #[test]
    fn test_exhausted_pool_surfaces_transient_error() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir, 1);
        let _held = exec.pool().acquire().unwrap();
        let err = exec.query("SELECT 1", &Params::new()).unwrap_err();
        assert!(matches!(err, DbError::PoolExhausted { .. }));
    }

    #[test]
    fn test_duplicate_column_names_are_suffixed() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir, 1);
        let set = exec
            .query(
                "SELECT a.n AS n, b.n AS n, a.n + b.n AS n_2
                 FROM numbers a JOIN numbers b ON b.n = a.n + 1
                 WHERE a.n = 1",
                &Params::new(),
            )
            .unwrap();

        assert_eq!(set.columns, vec!["n", "n_2", "n_2_2"]);
        assert_eq!(set.rows[0].get("n"), Some(&Value::Integer(1)));
        assert_eq!(set.rows[0].get("n_2"), Some(&Value::Integer(2)));
        assert_eq!(set.rows[0].get("n_2_2"), Some(&Value::Integer(3)));

        let json = serde_json::to_value(&set.rows[0]).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 3);
    }
}
