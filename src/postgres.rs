//! `PostgreSQL` executor built on `tokio-postgres` with one `deadpool-postgres` pool per
//! connection string. Connection strings use the libpq key/value or URL form.

pub mod executor;
pub mod params;
pub mod query;

pub use executor::PostgresExecutor;
pub use params::Params;
pub use query::{build_result_set_from_rows, postgres_extract_value};
