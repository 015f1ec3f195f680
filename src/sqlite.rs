//! `SQLite` executor built on `rusqlite`.
//!
//! Connection strings are database paths (or `file:` URIs), optionally written as
//! `Data Source=<path>;...`. One connection per distinct string is opened lazily and
//! shared; all driver calls run on tokio's blocking pool.

pub mod executor;
pub mod params;
pub mod query;

pub use executor::SqliteExecutor;
pub use params::{Params, row_value_to_sqlite_value};
pub use query::{build_result_set, sqlite_extract_value_sync};
