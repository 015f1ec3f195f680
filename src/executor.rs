//! Driver boundary: something that can run bound statements against a connection string.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::binding::{BoundBatch, BoundStatement};
use crate::error::SqlTemplateError;
use crate::results::ResultSet;
use crate::types::Dialect;

pub mod retry;

pub use retry::RetryPolicy;

#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Dialect whose templates this executor runs.
    fn dialect(&self) -> Dialect;

    /// Executes one DML statement and returns the number of rows affected.
    async fn execute(
        &self,
        connection: &str,
        statement: &BoundStatement,
        use_transaction: bool,
    ) -> Result<usize, SqlTemplateError>;

    /// Executes one statement once per parameter set and returns the summed row count.
    async fn execute_batch(
        &self,
        connection: &str,
        batch: &BoundBatch,
        use_transaction: bool,
    ) -> Result<usize, SqlTemplateError>;

    /// Executes one SELECT statement and returns its rows.
    async fn query(
        &self,
        connection: &str,
        statement: &BoundStatement,
        use_transaction: bool,
    ) -> Result<ResultSet, SqlTemplateError>;

    /// Executes several statements on one connection, one result set per statement.
    async fn query_multiple(
        &self,
        connection: &str,
        statements: &[BoundStatement],
        use_transaction: bool,
    ) -> Result<Vec<ResultSet>, SqlTemplateError>;

    /// Opens a connection and runs a trivial round trip.
    async fn test_connection(&self, connection: &str) -> Result<(), SqlTemplateError>;
}

/// Executors keyed by the dialect they serve.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<Dialect, Arc<dyn StatementExecutor>>,
}

impl ExecutorRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every executor compiled into this build.
    #[must_use]
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "sqlite")]
        registry.register(Arc::new(crate::sqlite::SqliteExecutor::new()));
        #[cfg(feature = "postgres")]
        registry.register(Arc::new(crate::postgres::PostgresExecutor::new()));
        registry
    }

    /// Registers `executor` for its dialect, replacing any previous one.
    pub fn register(&mut self, executor: Arc<dyn StatementExecutor>) {
        self.executors.insert(executor.dialect(), executor);
    }

    /// # Errors
    /// Returns `SqlTemplateError::Unimplemented` if nothing is registered for `dialect`.
    pub fn get(&self, dialect: Dialect) -> Result<Arc<dyn StatementExecutor>, SqlTemplateError> {
        self.executors.get(&dialect).cloned().ok_or_else(|| {
            SqlTemplateError::Unimplemented(format!(
                "No executor registered for database type `{dialect}`"
            ))
        })
    }

    #[must_use]
    pub fn dialects(&self) -> Vec<Dialect> {
        let mut dialects: Vec<Dialect> = self.executors.keys().copied().collect();
        dialects.sort_by_key(|d| d.tag());
        dialects
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("dialects", &self.dialects())
            .finish()
    }
}
