//! High-level entry point: look a template up by key, resolve it for one call, route it to
//! the right connection and executor, and shape the rows.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::binding::{BoundBatch, BoundStatement};
use crate::cache::TemplateCache;
use crate::config::EngineConfig;
use crate::connections::ConnectionStrings;
use crate::error::SqlTemplateError;
use crate::executor::{ExecutorRegistry, RetryPolicy, StatementExecutor};
use crate::mapping::RowMapperRegistry;
use crate::params::ParamMap;
use crate::results::{CustomDbRow, PagedResult, ResultSet};
use crate::session::{ResolvedStatement, resolve_batch, resolve_statement};
use crate::types::RowValues;

/// A resolved statement with its connection string and executor.
struct Routed {
    statement: ResolvedStatement,
    connection: String,
    executor: Arc<dyn StatementExecutor>,
}

/// Runs named SQL templates.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sql_template_middleware::prelude::*;
///
/// # async fn demo() -> Result<(), SqlTemplateError> {
/// let cache = Arc::new(TemplateCache::open(&CacheOptions::new("/srv/app/SqlConfig"))?);
/// let conns = Arc::new(ConnectionStrings::new().with("DbContext", "/srv/app/main.db"));
/// let helper = SqlHelper::new(cache, conns);
///
/// let rows = helper
///     .query_for_list("GetOrders", &ParamMap::new().with("status", "open"), false)
///     .await?;
/// # let _ = rows;
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct SqlHelper {
    cache: Arc<TemplateCache>,
    connections: Arc<ConnectionStrings>,
    executors: ExecutorRegistry,
    mappers: RowMapperRegistry,
    retry: RetryPolicy,
}

impl SqlHelper {
    /// A helper with every executor compiled into this build and the default retry policy.
    #[must_use]
    pub fn new(cache: Arc<TemplateCache>, connections: Arc<ConnectionStrings>) -> Self {
        Self {
            cache,
            connections,
            executors: ExecutorRegistry::with_defaults(),
            mappers: RowMapperRegistry::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Builds the cache, connection registry and retry policy described by `config`.
    ///
    /// # Errors
    /// Returns `SqlTemplateError::ConfigError` if no template directory can be found.
    pub fn from_config(config: &EngineConfig) -> Result<Self, SqlTemplateError> {
        let cache = TemplateCache::open(&config.cache_options())?;
        Ok(Self::new(Arc::new(cache), Arc::new(config.connection_strings()))
            .with_retry(config.retry.clone()))
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    /// Registers (or replaces) the executor for its dialect.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn StatementExecutor>) -> Self {
        self.executors.register(executor);
        self
    }

    #[must_use]
    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    #[must_use]
    pub fn connections(&self) -> &ConnectionStrings {
        &self.connections
    }

    #[must_use]
    pub fn mappers(&self) -> &RowMapperRegistry {
        &self.mappers
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Resolves the template under `key` without running it.
    ///
    /// # Errors
    /// Returns `TemplateNotFound` for an unknown key or `Template` for a malformed template.
    pub fn resolve(&self, key: &str, params: &ParamMap) -> Result<ResolvedStatement, SqlTemplateError> {
        let template = self.cache.lookup(key)?;
        resolve_statement(&template, params)
    }

    fn route(&self, statement: ResolvedStatement) -> Result<Routed, SqlTemplateError> {
        let executor = self.executors.get(statement.dialect)?;
        let connection = self.connections.get(&statement.connection_name)?;
        Ok(Routed {
            statement,
            connection,
            executor,
        })
    }

    fn prepare(&self, key: &str, params: &ParamMap) -> Result<Routed, SqlTemplateError> {
        self.route(self.resolve(key, params)?)
    }

    async fn fetch(
        &self,
        operation: &str,
        key: &str,
        params: &ParamMap,
        use_transaction: bool,
    ) -> Result<(ResolvedStatement, ResultSet), SqlTemplateError> {
        let routed = self.prepare(key, params)?;
        let bound = BoundStatement::from_resolved(&routed.statement);
        let executor = routed.executor.as_ref();
        let connection = routed.connection.as_str();
        let bound = &bound;
        let rows = self
            .retry
            .run(operation, move || executor.query(connection, bound, use_transaction))
            .await?;
        debug!(operation, key, rows = rows.len(), "query finished");
        Ok((routed.statement, rows))
    }

    /// Runs a DML template and returns the number of rows affected.
    ///
    /// # Errors
    /// Returns template, configuration or driver errors.
    pub async fn execute_non_query(
        &self,
        key: &str,
        params: &ParamMap,
        use_transaction: bool,
    ) -> Result<usize, SqlTemplateError> {
        let routed = self.prepare(key, params)?;
        let bound = BoundStatement::from_resolved(&routed.statement);
        let executor = routed.executor.as_ref();
        let connection = routed.connection.as_str();
        let bound = &bound;
        self.retry
            .run("execute_non_query", move || {
                executor.execute(connection, bound, use_transaction)
            })
            .await
    }

    /// Runs one DML template once per parameter map and returns the summed row count.
    ///
    /// The SQL is resolved once, against the first map. Routing also follows the first map's
    /// `ConnectionPrefix`. An empty batch executes nothing.
    ///
    /// # Errors
    /// Returns `SqlTemplateError::Template` if the template uses literal substitution, or
    /// configuration and driver errors.
    pub async fn execute_non_query_batch(
        &self,
        key: &str,
        batch: &[ParamMap],
        use_transaction: bool,
    ) -> Result<usize, SqlTemplateError> {
        let template = self.cache.lookup(key)?;
        let resolved = resolve_batch(&template, batch)?;
        if resolved.param_sets.is_empty() {
            debug!(key, "empty batch; nothing to execute");
            return Ok(0);
        }
        let bound_batch = BoundBatch::from_resolved(&resolved);
        let routed = self.route(resolved.statement)?;
        let executor = routed.executor.as_ref();
        let connection = routed.connection.as_str();
        let bound_batch = &bound_batch;
        self.retry
            .run("execute_non_query_batch", move || {
                executor.execute_batch(connection, bound_batch, use_transaction)
            })
            .await
    }

    /// First column of the first row, or `None` when no row comes back.
    ///
    /// # Errors
    /// Returns template, configuration or driver errors.
    pub async fn execute_scalar(
        &self,
        key: &str,
        params: &ParamMap,
        use_transaction: bool,
    ) -> Result<Option<RowValues>, SqlTemplateError> {
        let (_, rows) = self
            .fetch("execute_scalar", key, params, use_transaction)
            .await?;
        Ok(rows.scalar().cloned())
    }

    /// Every row as a JSON object keyed by column name.
    ///
    /// # Errors
    /// Returns template, configuration or driver errors.
    pub async fn query_for_list(
        &self,
        key: &str,
        params: &ParamMap,
        use_transaction: bool,
    ) -> Result<Vec<JsonValue>, SqlTemplateError> {
        let (_, rows) = self
            .fetch("query_for_list", key, params, use_transaction)
            .await?;
        Ok(rows.to_json_rows())
    }

    /// Every row deserialized into `T` by column name.
    ///
    /// # Errors
    /// Returns `SqlTemplateError::ParameterError` if a row does not fit `T`, or template,
    /// configuration and driver errors.
    pub async fn query_as<T: DeserializeOwned>(
        &self,
        key: &str,
        params: &ParamMap,
        use_transaction: bool,
    ) -> Result<Vec<T>, SqlTemplateError> {
        let (_, rows) = self.fetch("query_as", key, params, use_transaction).await?;
        rows.results.iter().map(deserialize_row).collect()
    }

    /// The first row as a JSON object, or `None` when no row comes back.
    ///
    /// # Errors
    /// Returns template, configuration or driver errors.
    pub async fn query_for_object(
        &self,
        key: &str,
        params: &ParamMap,
        use_transaction: bool,
    ) -> Result<Option<JsonValue>, SqlTemplateError> {
        let (_, rows) = self
            .fetch("query_for_object", key, params, use_transaction)
            .await?;
        Ok(rows.results.first().map(CustomDbRow::to_json))
    }

    /// Every row passed through `mapper`.
    ///
    /// # Errors
    /// Returns the mapper's error, or template, configuration and driver errors.
    pub async fn query_mapped<T, F>(
        &self,
        key: &str,
        params: &ParamMap,
        use_transaction: bool,
        mapper: F,
    ) -> Result<Vec<T>, SqlTemplateError>
    where
        F: Fn(&CustomDbRow) -> Result<T, SqlTemplateError>,
    {
        let (_, rows) = self
            .fetch("query_mapped", key, params, use_transaction)
            .await?;
        rows.results.iter().map(mapper).collect()
    }

    /// Every row passed through the mapper registered for the template's result binding.
    ///
    /// # Errors
    /// Returns `SqlTemplateError::ConfigError` if the template has no binding or no mapper is
    /// registered for it, or template and driver errors.
    pub async fn query_bound(
        &self,
        key: &str,
        params: &ParamMap,
        use_transaction: bool,
    ) -> Result<Vec<JsonValue>, SqlTemplateError> {
        let (statement, rows) = self
            .fetch("query_bound", key, params, use_transaction)
            .await?;
        self.mappers
            .map_rows(&statement.key, statement.result_binding.as_ref(), &rows)
    }

    /// Runs each top-level statement of the resolved SQL and returns one result set per
    /// statement, in order.
    ///
    /// # Errors
    /// Returns template, configuration or driver errors.
    pub async fn query_multiple(
        &self,
        key: &str,
        params: &ParamMap,
        use_transaction: bool,
    ) -> Result<Vec<ResultSet>, SqlTemplateError> {
        let routed = self.prepare(key, params)?;
        let statements = BoundStatement::split_resolved(&routed.statement);
        let executor = routed.executor.as_ref();
        let connection = routed.connection.as_str();
        let statements = statements.as_slice();
        self.retry
            .run("query_multiple", move || {
                executor.query_multiple(connection, statements, use_transaction)
            })
            .await
    }

    /// One page of rows from the first statement plus the total from the second.
    ///
    /// The second statement must return a single integer (for example `SELECT COUNT(*) ...`).
    ///
    /// # Errors
    /// Returns `SqlTemplateError::ExecutionError` if the template does not produce two
    /// result sets or the total is not an integer, or template, configuration and driver
    /// errors.
    pub async fn query_page<T: DeserializeOwned>(
        &self,
        key: &str,
        params: &ParamMap,
        use_transaction: bool,
    ) -> Result<PagedResult<T>, SqlTemplateError> {
        let sets = self.query_multiple(key, params, use_transaction).await?;
        let [page, count, ..] = sets.as_slice() else {
            return Err(SqlTemplateError::ExecutionError(format!(
                "Paged template `{key}` must return rows and a total ({} result set(s) returned)",
                sets.len()
            )));
        };
        let total = match count.scalar() {
            Some(RowValues::Int(total)) => *total,
            None => 0,
            Some(other) => {
                return Err(SqlTemplateError::ExecutionError(format!(
                    "Paged template `{key}` returned a non-integer total: {other:?}"
                )));
            }
        };
        let items = page
            .results
            .iter()
            .map(deserialize_row)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(PagedResult { items, total })
    }

    /// Whether the connection the template routes to can be opened.
    ///
    /// Driver failures yield `Ok(false)`.
    ///
    /// # Errors
    /// Returns template and configuration errors.
    pub async fn test_connection(&self, key: &str, params: &ParamMap) -> Result<bool, SqlTemplateError> {
        let routed = self.prepare(key, params)?;
        match routed.executor.test_connection(&routed.connection).await {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(
                    key,
                    connection = %routed.statement.connection_name,
                    error = %err,
                    "connection test failed"
                );
                Ok(false)
            }
        }
    }
}

fn deserialize_row<T: DeserializeOwned>(row: &CustomDbRow) -> Result<T, SqlTemplateError> {
    serde_json::from_value(row.to_json())
        .map_err(|e| SqlTemplateError::ParameterError(format!("Row does not match target type: {e}")))
}
