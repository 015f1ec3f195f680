//! Named SQL templates kept in XML files, resolved per call and run through a pluggable
//! executor.
//!
//! A template body may carry three kinds of directive:
//!
//! - `<%= AND Status = @status %>` keeps the fragment only when every referenced parameter
//!   has a non-blank value;
//! - `<R%= ORDER BY @sortCol %R>` splices parameter values into the SQL text;
//! - `@@ AND Id = @id @@` is always kept, with the markers removed.
//!
//! [`TemplateCache`] loads the files and picks up edits on the next miss, [`resolve_statement`]
//! turns a template plus a [`ParamMap`] into a [`ResolvedStatement`], and [`SqlHelper`] routes
//! that statement to a connection and a [`StatementExecutor`].

pub mod binding;
pub mod cache;
pub mod config;
pub mod connections;
pub mod directive;
pub mod error;
pub mod executor;
pub mod helper;
pub mod mapping;
pub mod params;
pub mod prelude;
pub mod results;
pub mod session;
pub mod template;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use binding::{BoundBatch, BoundStatement, PlaceholderStyle};
pub use cache::{CacheOptions, CacheOptionsBuilder, CacheStats, ScanReport, TemplateCache};
pub use config::EngineConfig;
pub use connections::ConnectionStrings;
pub use error::SqlTemplateError;
pub use executor::{ExecutorRegistry, RetryPolicy, StatementExecutor};
pub use helper::SqlHelper;
pub use mapping::{RowMapper, RowMapperRegistry};
pub use params::{CONNECTION_PREFIX, ParamMap};
pub use results::{CustomDbRow, PagedResult, ResultSet};
pub use session::{ResolvedBatch, ResolvedStatement, resolve_batch, resolve_statement};
pub use template::{DEFAULT_CONNECTION_NAME, ResultBinding, Template};
pub use types::{Dialect, RowValues};

#[cfg(feature = "postgres")]
pub use postgres::PostgresExecutor;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutor;
