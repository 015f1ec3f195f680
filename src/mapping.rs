//! Row mappers selected by a template's result binding.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;

use crate::error::SqlTemplateError;
use crate::results::{CustomDbRow, ResultSet};
use crate::template::ResultBinding;

/// Turns one row into a mapped value.
pub type RowMapper = Arc<dyn Fn(&CustomDbRow) -> Result<JsonValue, SqlTemplateError> + Send + Sync>;

/// Mappers keyed by `(assembly, class name)`.
#[derive(Default)]
pub struct RowMapperRegistry {
    mappers: RwLock<HashMap<ResultBinding, RowMapper>>,
}

impl std::fmt::Debug for RowMapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = match self.mappers.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        };
        f.debug_struct("RowMapperRegistry")
            .field("mappers", &count)
            .finish()
    }
}

impl RowMapperRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `mapper` for `binding`, replacing any previous mapper.
    pub fn register<F>(&self, binding: ResultBinding, mapper: F)
    where
        F: Fn(&CustomDbRow) -> Result<JsonValue, SqlTemplateError> + Send + Sync + 'static,
    {
        let mut mappers = match self.mappers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        mappers.insert(binding, Arc::new(mapper));
    }

    #[must_use]
    pub fn get(&self, binding: &ResultBinding) -> Option<RowMapper> {
        let mappers = match self.mappers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        mappers.get(binding).cloned()
    }

    /// Maps every row of `rows` with the mapper registered for `binding`.
    ///
    /// # Errors
    /// Returns `SqlTemplateError::ConfigError` if `binding` is absent or has no mapper, or the
    /// mapper's own error.
    pub fn map_rows(
        &self,
        key: &str,
        binding: Option<&ResultBinding>,
        rows: &ResultSet,
    ) -> Result<Vec<JsonValue>, SqlTemplateError> {
        let binding = binding.ok_or_else(|| {
            SqlTemplateError::ConfigError(format!("Template `{key}` declares no result model"))
        })?;
        let mapper = self.get(binding).ok_or_else(|| {
            SqlTemplateError::ConfigError(format!(
                "No row mapper registered for {}.{} (template `{key}`)",
                binding.assembly, binding.class_name
            ))
        })?;
        rows.results.iter().map(|row| mapper(row)).collect()
    }
}
