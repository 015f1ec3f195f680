use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use deadpool_postgres::{Config as PgConfig, Object, Pool, Runtime};
use tokio_postgres::{GenericClient, NoTls};
use tracing::debug;

use super::params::Params;
use super::query::build_result_set_from_rows;
use crate::binding::{BoundBatch, BoundStatement};
use crate::error::SqlTemplateError;
use crate::executor::StatementExecutor;
use crate::results::ResultSet;
use crate::types::{Dialect, RowValues};

/// Runs `PostgreSQL` templates through one pool per connection string.
#[derive(Default)]
pub struct PostgresExecutor {
    pools: Mutex<HashMap<String, Pool>>,
}

impl std::fmt::Debug for PostgresExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresExecutor").finish_non_exhaustive()
    }
}

impl PostgresExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self, connection: &str) -> Result<Pool, SqlTemplateError> {
        let mut pools = match self.pools.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(pool) = pools.get(connection) {
            return Ok(pool.clone());
        }

        let mut cfg = PgConfig::new();
        cfg.url = Some(connection.to_string());
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                SqlTemplateError::ConnectionError(format!("Failed to create Postgres pool: {e}"))
            })?;
        debug!("created postgres pool");
        pools.insert(connection.to_string(), pool.clone());
        Ok(pool)
    }

    async fn client(&self, connection: &str) -> Result<Object, SqlTemplateError> {
        self.pool(connection)?.get().await.map_err(|e| {
            SqlTemplateError::ConnectionError(format!("Failed to get Postgres connection: {e}"))
        })
    }
}

async fn execute_on<C: GenericClient + Sync>(
    client: &C,
    sql: &str,
    params: &[RowValues],
) -> Result<usize, SqlTemplateError> {
    let stmt = client.prepare(sql).await?;
    let rows = client.execute(&stmt, Params::convert(params).as_refs()).await?;
    usize::try_from(rows).map_err(|e| {
        SqlTemplateError::ExecutionError(format!("postgres affected rows conversion error: {e}"))
    })
}

async fn query_on<C: GenericClient + Sync>(
    client: &C,
    sql: &str,
    params: &[RowValues],
) -> Result<ResultSet, SqlTemplateError> {
    let stmt = client.prepare(sql).await?;
    let rows = client.query(&stmt, Params::convert(params).as_refs()).await?;
    build_result_set_from_rows(&rows)
}

#[async_trait]
impl StatementExecutor for PostgresExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(
        &self,
        connection: &str,
        statement: &BoundStatement,
        use_transaction: bool,
    ) -> Result<usize, SqlTemplateError> {
        let mut obj = self.client(connection).await?;
        let client: &mut tokio_postgres::Client = &mut obj;
        if use_transaction {
            let tx = client.transaction().await?;
            let rows = execute_on(&tx, &statement.sql, &statement.params).await?;
            tx.commit().await?;
            Ok(rows)
        } else {
            execute_on(&*client, &statement.sql, &statement.params).await
        }
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
        let mut obj = self.client(connection).await?;
        let client: &mut tokio_postgres::Client = &mut obj;
        let mut total = 0;
        if use_transaction {
            let tx = client.transaction().await?;
            for params in &batch.param_sets {
                total += execute_on(&tx, &batch.sql, params).await?;
            }
            tx.commit().await?;
        } else {
            for params in &batch.param_sets {
                total += execute_on(&*client, &batch.sql, params).await?;
            }
        }
        Ok(total)
    }

    async fn query(
        &self,
        connection: &str,
        statement: &BoundStatement,
        use_transaction: bool,
    ) -> Result<ResultSet, SqlTemplateError> {
        let mut obj = self.client(connection).await?;
        let client: &mut tokio_postgres::Client = &mut obj;
        if use_transaction {
            let tx = client.transaction().await?;
            let rows = query_on(&tx, &statement.sql, &statement.params).await?;
            tx.commit().await?;
            Ok(rows)
        } else {
            query_on(&*client, &statement.sql, &statement.params).await
        }
    }

    async fn query_multiple(
        &self,
        connection: &str,
        statements: &[BoundStatement],
        use_transaction: bool,
    ) -> Result<Vec<ResultSet>, SqlTemplateError> {
        let mut obj = self.client(connection).await?;
        let client: &mut tokio_postgres::Client = &mut obj;
        let mut sets = Vec::with_capacity(statements.len());
        if use_transaction {
            let tx = client.transaction().await?;
            for statement in statements {
                sets.push(query_on(&tx, &statement.sql, &statement.params).await?);
            }
            tx.commit().await?;
        } else {
            for statement in statements {
                sets.push(query_on(&*client, &statement.sql, &statement.params).await?);
            }
        }
        Ok(sets)
    }

    async fn test_connection(&self, connection: &str) -> Result<(), SqlTemplateError> {
        let obj = self.client(connection).await?;
        obj.simple_query("SELECT 1").await?;
        Ok(())
    }
}
