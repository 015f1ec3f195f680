use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::config::{CONN_STRING_NAME_ENV, SQL_CONFIG_PATH_ENV};
use crate::cache::CacheOptions;
use crate::connections::ConnectionStrings;
use crate::error::SqlTemplateError;
use crate::executor::RetryPolicy;

/// Everything needed to stand up a [`crate::SqlHelper`], usually read from a JSON file.
///
/// ```rust
/// use sql_template_middleware::EngineConfig;
///
/// let cfg = EngineConfig::from_json_str(r#"{
///     "SqlConfigPath": "/etc/app/sql",
///     "DbContext": "Main",
///     "ConnectionStrings": { "Main": "/var/lib/app/main.db" },
///     "retry": { "max_retries": 2 }
/// }"#).unwrap();
/// assert_eq!(cfg.retry.max_retries, 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit template directory; skips the install-relative search when set.
    pub template_root: Option<PathBuf>,
    /// Base directory for the install-relative search.
    pub install_dir: Option<PathBuf>,
    /// Externally configured template directory, tried after the install-relative ones.
    #[serde(alias = "SqlConfigPath")]
    pub sql_config_path: Option<PathBuf>,
    /// Connection name used by templates that do not name one.
    #[serde(alias = "DbContext")]
    pub default_connection_name: Option<String>,
    #[serde(alias = "ConnectionStrings")]
    pub connection_strings: HashMap<String, String>,
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// # Errors
    /// Returns `SqlTemplateError::ConfigError` if the JSON is invalid.
    pub fn from_json_str(json: &str) -> Result<Self, SqlTemplateError> {
        serde_json::from_str(json)
            .map_err(|e| SqlTemplateError::ConfigError(format!("Invalid engine config: {e}")))
    }

    /// # Errors
    /// Returns `SqlTemplateError::ConfigError` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, SqlTemplateError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SqlTemplateError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Defaults overridden by `SQL_CONFIG_PATH` and `SQL_CONN_STRING_NAME`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `SQL_CONFIG_PATH` and `SQL_CONN_STRING_NAME` when they are set and non-blank.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(path) = std::env::var_os(SQL_CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            self.sql_config_path = Some(PathBuf::from(path));
        }
        if let Ok(name) = std::env::var(CONN_STRING_NAME_ENV) {
            if !name.trim().is_empty() {
                self.default_connection_name = Some(name);
            }
        }
        self
    }

    #[must_use]
    pub fn cache_options(&self) -> CacheOptions {
        let mut builder = CacheOptions::builder();
        if let Some(root) = &self.template_root {
            builder = builder.root(root);
        }
        if let Some(dir) = &self.install_dir {
            builder = builder.install_dir(dir);
        }
        if let Some(path) = &self.sql_config_path {
            builder = builder.configured_path(path);
        }
        if let Some(name) = self.default_connection_name.as_deref().filter(|n| !n.trim().is_empty()) {
            builder = builder.default_connection_name(name);
        }
        builder.finish()
    }

    #[must_use]
    pub fn connection_strings(&self) -> ConnectionStrings {
        self.connection_strings.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::DEFAULT_CONNECTION_NAME;

    #[test]
    fn legacy_key_names_are_accepted() {
        let cfg = EngineConfig::from_json_str(
            r#"{"SqlConfigPath": "/srv/sql", "DbContext": "Orders", "ConnectionStrings": {"Orders": "orders.db"}}"#,
        )
        .unwrap();
        let opts = cfg.cache_options();
        assert_eq!(opts.configured_path, Some(PathBuf::from("/srv/sql")));
        assert_eq!(opts.default_connection_name, "Orders");
        assert_eq!(cfg.connection_strings().get("orders").unwrap(), "orders.db");
        assert_eq!(cfg.retry, RetryPolicy::default());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = EngineConfig::from_json_str("{}").unwrap();
        let opts = cfg.cache_options();
        assert!(opts.root.is_none());
        assert_eq!(opts.default_connection_name, DEFAULT_CONNECTION_NAME);
        assert!(cfg.connection_strings().is_empty());
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"template_root": "/srv/templates"}"#).unwrap();
        let cfg = EngineConfig::from_file(&path).unwrap();
        assert_eq!(cfg.cache_options().candidate_roots(), vec![PathBuf::from("/srv/templates")]);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            EngineConfig::from_file(&path),
            Err(SqlTemplateError::ConfigError(_))
        ));
    }
}
