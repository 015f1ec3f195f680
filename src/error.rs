use std::path::PathBuf;

use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "postgres")]
use tokio_postgres;

#[derive(Debug, Error)]
pub enum SqlTemplateError {
    #[error("No SQL template configured for key: {key}")]
    TemplateNotFound { key: String },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Failed to load SQL templates from {}: {cause}", path.display())]
    CacheLoad { path: PathBuf, cause: String },

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}

impl SqlTemplateError {
    pub(crate) fn template(reason: impl Into<String>) -> Self {
        SqlTemplateError::Template(reason.into())
    }

    pub(crate) fn cache_load(path: impl Into<PathBuf>, cause: impl ToString) -> Self {
        SqlTemplateError::CacheLoad {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    /// True for failures caused by template authoring or lookup rather than the database.
    #[must_use]
    pub fn is_template_failure(&self) -> bool {
        matches!(
            self,
            SqlTemplateError::TemplateNotFound { .. }
                | SqlTemplateError::Template(_)
                | SqlTemplateError::CacheLoad { .. }
        )
    }
}

impl From<tokio::task::JoinError> for SqlTemplateError {
    fn from(err: tokio::task::JoinError) -> Self {
        SqlTemplateError::ExecutionError(format!("Blocking task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_load_message_names_the_file() {
        let err = SqlTemplateError::cache_load("/tmp/orders.xml", "unexpected end of file");
        assert_eq!(
            err.to_string(),
            "Failed to load SQL templates from /tmp/orders.xml: unexpected end of file"
        );
        assert!(err.is_template_failure());
    }

    #[test]
    fn connection_errors_are_not_template_failures() {
        let err = SqlTemplateError::ConnectionError("refused".into());
        assert!(!err.is_template_failure());
    }
}
