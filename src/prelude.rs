//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::binding::{BoundBatch, BoundStatement, PlaceholderStyle};
pub use crate::cache::{CacheOptions, TemplateCache};
pub use crate::config::EngineConfig;
pub use crate::connections::ConnectionStrings;
pub use crate::error::SqlTemplateError;
pub use crate::executor::{ExecutorRegistry, RetryPolicy, StatementExecutor};
pub use crate::helper::SqlHelper;
pub use crate::mapping::RowMapperRegistry;
pub use crate::params::{CONNECTION_PREFIX, ParamMap};
pub use crate::results::{CustomDbRow, PagedResult, ResultSet};
pub use crate::session::{ResolvedStatement, resolve_batch, resolve_statement};
pub use crate::template::{ResultBinding, Template};
pub use crate::types::{Dialect, RowValues};

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresExecutor;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteExecutor;
