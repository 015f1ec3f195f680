use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::debug;

use super::params::Params;
use super::query::build_result_set;
use crate::binding::{BoundBatch, BoundStatement};
use crate::error::SqlTemplateError;
use crate::executor::StatementExecutor;
use crate::results::ResultSet;
use crate::types::Dialect;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Slot = Arc<Mutex<Option<Connection>>>;

/// Runs `SQLite` templates, one lazily opened connection per connection string.
#[derive(Debug, Default)]
pub struct SqliteExecutor {
    connections: Mutex<HashMap<String, Slot>>,
}

impl SqliteExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, connection: &str) -> Slot {
        let mut connections = match self.connections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        connections
            .entry(connection.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Runs `work` on the blocking pool against the connection for `connection`.
    async fn interact<T, F>(&self, connection: &str, work: F) -> Result<T, SqlTemplateError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, SqlTemplateError> + Send + 'static,
    {
        let slot = self.slot(connection);
        let path = database_path(connection)?;
        tokio::task::spawn_blocking(move || {
            let mut guard = lock_slot(&slot);
            if guard.is_none() {
                *guard = Some(open(&path)?);
            }
            match guard.as_mut() {
                Some(conn) => work(conn),
                None => Err(SqlTemplateError::ConnectionError(format!(
                    "SQLite connection to {path} is not open"
                ))),
            }
        })
        .await?
    }
}

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<Connection>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn open(path: &str) -> Result<Connection, SqlTemplateError> {
    let conn = Connection::open(path).map_err(|e| {
        SqlTemplateError::ConnectionError(format!("Failed to open SQLite database {path}: {e}"))
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(path, journal_mode = %mode, "opened sqlite connection");
    Ok(conn)
}

/// The database path named by a connection string.
///
/// Accepts a bare path or `key=value;` pairs with a `Data Source` (or `Filename`) key.
///
/// # Errors
/// Returns `SqlTemplateError::ConfigError` if no path can be found.
pub fn database_path(connection: &str) -> Result<String, SqlTemplateError> {
    let trimmed = connection.trim();
    if trimmed.is_empty() {
        return Err(SqlTemplateError::ConfigError(
            "SQLite connection string is empty".to_string(),
        ));
    }
    if !trimmed.contains('=') || trimmed.starts_with("file:") {
        return Ok(trimmed.to_string());
    }
    trimmed
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| {
            let key = key.trim();
            key.eq_ignore_ascii_case("data source")
                || key.eq_ignore_ascii_case("datasource")
                || key.eq_ignore_ascii_case("filename")
        })
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            SqlTemplateError::ConfigError(format!(
                "SQLite connection string has no Data Source: {trimmed}"
            ))
        })
}

fn run_scoped<T>(
    conn: &mut Connection,
    use_transaction: bool,
    work: impl FnOnce(&Connection) -> Result<T, SqlTemplateError>,
) -> Result<T, SqlTemplateError> {
    if use_transaction {
        let tx = conn.transaction()?;
        let out = work(&tx)?;
        tx.commit()?;
        Ok(out)
    } else {
        work(conn)
    }
}

fn execute_one(conn: &Connection, sql: &str, params: &Params) -> Result<usize, SqlTemplateError> {
    let mut stmt = conn.prepare_cached(sql)?;
    Ok(stmt.execute(rusqlite::params_from_iter(params.as_values().iter()))?)
}

fn query_one(conn: &Connection, sql: &str, params: &Params) -> Result<ResultSet, SqlTemplateError> {
    let mut stmt = conn.prepare_cached(sql)?;
    build_result_set(&mut stmt, params.as_values())
}

#[async_trait]
impl StatementExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(
        &self,
        connection: &str,
        statement: &BoundStatement,
        use_transaction: bool,
    ) -> Result<usize, SqlTemplateError> {
        let sql = statement.sql.clone();
        let params = Params::convert(&statement.params);
        self.interact(connection, move |conn| {
            run_scoped(conn, use_transaction, |c| execute_one(c, &sql, &params))
        })
        .await
    }

    async fn execute_batch(
        &self,
        connection: &str,
        batch: &BoundBatch,
        use_transaction: bool,
    ) -> Result<usize, SqlTemplateError> {
        if batch.param_sets.is_empty() {
            return Ok(0);
        }
        let sql = batch.sql.clone();
        let sets: Vec<Params> = batch.param_sets.iter().map(|p| Params::convert(p)).collect();
        self.interact(connection, move |conn| {
            run_scoped(conn, use_transaction, |c| {
                let mut total = 0;
                for params in &sets {
                    total += execute_one(c, &sql, params)?;
                }
                Ok(total)
            })
        })
        .await
    }

    async fn query(
        &self,
        connection: &str,
        statement: &BoundStatement,
        use_transaction: bool,
    ) -> Result<ResultSet, SqlTemplateError> {
        let sql = statement.sql.clone();
        let params = Params::convert(&statement.params);
        self.interact(connection, move |conn| {
            run_scoped(conn, use_transaction, |c| query_one(c, &sql, &params))
        })
        .await
    }

    async fn query_multiple(
        &self,
        connection: &str,
        statements: &[BoundStatement],
        use_transaction: bool,
    ) -> Result<Vec<ResultSet>, SqlTemplateError> {
        let owned: Vec<(String, Params)> = statements
            .iter()
            .map(|s| (s.sql.clone(), Params::convert(&s.params)))
            .collect();
        self.interact(connection, move |conn| {
            run_scoped(conn, use_transaction, |c| {
                owned
                    .iter()
                    .map(|(sql, params)| query_one(c, sql, params))
                    .collect()
            })
        })
        .await
    }

    async fn test_connection(&self, connection: &str) -> Result<(), SqlTemplateError> {
        self.interact(connection, |conn| {
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            if one == 1 {
                Ok(())
            } else {
                Err(SqlTemplateError::ConnectionError(
                    "SQLite round trip returned an unexpected value".to_string(),
                ))
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tokio::runtime::Runtime;

    use super::*;
    use crate::binding::PlaceholderStyle;
    use crate::params::ParamMap;
    use crate::types::RowValues;

    #[test]
    fn parses_connection_strings() {
        assert_eq!(database_path("/tmp/app.db").unwrap(), "/tmp/app.db");
        assert_eq!(
            database_path("Data Source=/tmp/app.db;Version=3;").unwrap(),
            "/tmp/app.db"
        );
        assert_eq!(
            database_path("file:shared?mode=memory&cache=shared").unwrap(),
            "file:shared?mode=memory&cache=shared"
        );
        assert!(matches!(
            database_path("Version=3"),
            Err(SqlTemplateError::ConfigError(_))
        ));
        assert!(database_path("  ").is_err());
    }

    #[test]
    fn executes_and_queries_on_one_connection() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let db = dir.path().join("orders.db").display().to_string();
            let exec = SqliteExecutor::new();

            let create = BoundStatement {
                sql: "CREATE TABLE orders (id INTEGER PRIMARY KEY, status TEXT)".into(),
                params: vec![],
            };
            exec.execute(&db, &create, false).await.unwrap();

            let insert = BoundBatch {
                sql: "INSERT INTO orders (status) VALUES (?1)".into(),
                param_sets: vec![
                    vec![RowValues::Text("open".into())],
                    vec![RowValues::Text("closed".into())],
                    vec![RowValues::Text("open".into())],
                ],
            };
            assert_eq!(exec.execute_batch(&db, &insert, true).await.unwrap(), 3);

            let select = BoundStatement::new(
                "SELECT id FROM orders WHERE status = @status ORDER BY id",
                PlaceholderStyle::Sqlite,
                &ParamMap::new().with("status", "open"),
            );
            let rows = exec.query(&db, &select, false).await.unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows.results[1].get("id"), Some(&RowValues::Int(3)));

            exec.test_connection(&db).await.unwrap();
        });
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let db = dir.path().join("t.db").display().to_string();
            let exec = SqliteExecutor::new();
            let plain = |sql: &str| BoundStatement {
                sql: sql.to_string(),
                params: vec![],
            };
            exec.execute(&db, &plain("CREATE TABLE t (id INTEGER PRIMARY KEY)"), false)
                .await
                .unwrap();

            let batch = BoundBatch {
                sql: "INSERT INTO t (id) VALUES (?1)".into(),
                param_sets: vec![vec![RowValues::Int(1)], vec![RowValues::Int(1)]],
            };
            assert!(exec.execute_batch(&db, &batch, true).await.is_err());

            let count = exec
                .query(&db, &plain("SELECT COUNT(*) FROM t"), false)
                .await
                .unwrap();
            assert_eq!(count.scalar(), Some(&RowValues::Int(0)));
        });
    }
}
