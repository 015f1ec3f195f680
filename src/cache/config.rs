use std::path::{Path, PathBuf};

use crate::error::SqlTemplateError;
use crate::template::DEFAULT_CONNECTION_NAME;

/// Environment variable naming an externally configured template directory.
pub const SQL_CONFIG_PATH_ENV: &str = "SQL_CONFIG_PATH";
/// Environment variable overriding the default connection name.
pub const CONN_STRING_NAME_ENV: &str = "SQL_CONN_STRING_NAME";

/// Where the template cache looks for XML files.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Explicit root; when set no other candidate is tried.
    pub root: Option<PathBuf>,
    /// Directory the application is installed in.
    pub install_dir: PathBuf,
    /// Externally configured template directory.
    pub configured_path: Option<PathBuf>,
    pub default_connection_name: String,
}

impl CacheOptions {
    /// Options rooted at an explicit directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::discover()
        }
    }

    /// Options that search the usual install-relative locations.
    #[must_use]
    pub fn discover() -> Self {
        Self {
            root: None,
            install_dir: default_install_dir(),
            configured_path: None,
            default_connection_name: DEFAULT_CONNECTION_NAME.to_string(),
        }
    }

    /// [`CacheOptions::discover`] plus `SQL_CONFIG_PATH` / `SQL_CONN_STRING_NAME`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut opts = Self::discover();
        if let Some(path) = std::env::var_os(SQL_CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            opts.configured_path = Some(PathBuf::from(path));
        }
        if let Ok(name) = std::env::var(CONN_STRING_NAME_ENV) {
            if !name.trim().is_empty() {
                opts.default_connection_name = name;
            }
        }
        opts
    }

    #[must_use]
    pub fn builder() -> CacheOptionsBuilder {
        CacheOptionsBuilder::new()
    }

    /// Candidate roots in search order.
    #[must_use]
    pub fn candidate_roots(&self) -> Vec<PathBuf> {
        if let Some(root) = &self.root {
            return vec![root.clone()];
        }
        let mut candidates = vec![
            self.install_dir.join("bin").join("SqlConfig"),
            self.install_dir.join("SqlConfig"),
        ];
        if let Some(configured) = &self.configured_path {
            candidates.push(configured.clone());
        }
        candidates.push(self.install_dir.clone());
        candidates
    }

    /// The first candidate root that exists as a directory.
    ///
    /// # Errors
    /// Returns `SqlTemplateError::ConfigError` if no candidate exists.
    pub fn resolve_root(&self) -> Result<PathBuf, SqlTemplateError> {
        let candidates = self.candidate_roots();
        candidates
            .iter()
            .find(|p| p.is_dir())
            .cloned()
            .ok_or_else(|| {
                let tried: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
                SqlTemplateError::ConfigError(format!(
                    "No SQL template directory found (tried {})",
                    tried.join(", ")
                ))
            })
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::discover()
    }
}

/// Fluent builder for [`CacheOptions`].
#[derive(Debug, Clone)]
pub struct CacheOptionsBuilder {
    opts: CacheOptions,
}

impl CacheOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            opts: CacheOptions::discover(),
        }
    }

    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.opts.root = Some(root.into());
        self
    }

    #[must_use]
    pub fn install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts.install_dir = dir.into();
        self
    }

    #[must_use]
    pub fn configured_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts.configured_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn default_connection_name(mut self, name: impl Into<String>) -> Self {
        self.opts.default_connection_name = name.into();
        self
    }

    #[must_use]
    pub fn finish(self) -> CacheOptions {
        self.opts
    }
}

impl Default for CacheOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_install_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_follow_install_layout() {
        let opts = CacheOptions::builder()
            .install_dir("/opt/app")
            .configured_path("/etc/app/sql")
            .finish();
        assert_eq!(
            opts.candidate_roots(),
            vec![
                PathBuf::from("/opt/app/bin/SqlConfig"),
                PathBuf::from("/opt/app/SqlConfig"),
                PathBuf::from("/etc/app/sql"),
                PathBuf::from("/opt/app"),
            ]
        );
    }

    #[test]
    fn first_existing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("SqlConfig")).unwrap();
        let opts = CacheOptions::builder().install_dir(dir.path()).finish();
        assert_eq!(opts.resolve_root().unwrap(), dir.path().join("SqlConfig"));

        std::fs::create_dir_all(dir.path().join("bin").join("SqlConfig")).unwrap();
        assert_eq!(
            opts.resolve_root().unwrap(),
            dir.path().join("bin").join("SqlConfig")
        );
    }

    #[test]
    fn install_dir_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let opts = CacheOptions::builder()
            .install_dir(dir.path())
            .configured_path(dir.path().join("missing"))
            .finish();
        assert_eq!(opts.resolve_root().unwrap(), dir.path());
    }

    #[test]
    fn explicit_root_must_exist() {
        let opts = CacheOptions::new("/definitely/not/here/sql");
        assert!(matches!(
            opts.resolve_root(),
            Err(SqlTemplateError::ConfigError(_))
        ));
    }
}
