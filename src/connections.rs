use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::SqlTemplateError;

/// Connection strings by connection name.
///
/// Names match case-insensitively, so `DbContext` and `dbcontext` are one entry.
#[derive(Debug, Default)]
pub struct ConnectionStrings {
    entries: RwLock<HashMap<String, String>>,
}

impl ConnectionStrings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, name: &str, connection_string: impl Into<String>) -> Self {
        self.insert(name, connection_string);
        self
    }

    /// Adds or replaces an entry, returning the previous connection string.
    pub fn insert(&self, name: &str, connection_string: impl Into<String>) -> Option<String> {
        self.write().insert(normalize(name), connection_string.into())
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.write().remove(&normalize(name))
    }

    /// The connection string registered under `name`.
    ///
    /// # Errors
    /// Returns `SqlTemplateError::ConfigError` if the name is unknown or its value is blank.
    pub fn get(&self, name: &str) -> Result<String, SqlTemplateError> {
        match self.read().get(&normalize(name)) {
            Some(value) if !value.trim().is_empty() => Ok(value.clone()),
            Some(_) => Err(SqlTemplateError::ConfigError(format!(
                "Connection string `{name}` is empty"
            ))),
            None => Err(SqlTemplateError::ConfigError(format!(
                "No connection string configured for `{name}`"
            ))),
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(&normalize(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ConnectionStrings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let registry = Self::new();
        for (name, value) in iter {
            registry.insert(name.as_ref(), value);
        }
        registry
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_insensitive() {
        let conns = ConnectionStrings::new().with("DbContext", "/tmp/main.db");
        assert_eq!(conns.get("dbcontext").unwrap(), "/tmp/main.db");
        assert!(conns.contains(" DBCONTEXT "));
    }

    #[test]
    fn missing_and_blank_entries_are_config_errors() {
        let conns: ConnectionStrings = [("Blank", "  ")].into_iter().collect();
        assert!(matches!(conns.get("Blank"), Err(SqlTemplateError::ConfigError(_))));
        assert!(matches!(conns.get("Tenant1_DbContext"), Err(SqlTemplateError::ConfigError(_))));
    }
}
