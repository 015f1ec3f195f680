use std::collections::HashMap;

use crate::types::RowValues;

/// Reserved parameter that routes a call to `<prefix><connection name>`.
///
/// It is consumed during resolution and never bound.
pub const CONNECTION_PREFIX: &str = "ConnectionPrefix";

/// Parameters supplied for one template call, keyed case-sensitively by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    values: HashMap<String, RowValues>,
}

impl ParamMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RowValues>) -> Option<RowValues> {
        self.values.insert(name.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RowValues> {
        self.values.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Present with a value that is neither NULL nor blank text.
    #[must_use]
    pub fn is_present(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| !v.is_blank())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The connection prefix as text, when one was supplied.
    #[must_use]
    pub fn connection_prefix(&self) -> Option<String> {
        self.values
            .get(CONNECTION_PREFIX)
            .filter(|v| !v.is_null())
            .and_then(RowValues::to_literal_sql)
    }

    /// Copy of the named entries that exist in this map.
    #[must_use]
    pub fn subset<'a, I>(&self, names: I) -> ParamMap
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = ParamMap::new();
        for name in names {
            if name == CONNECTION_PREFIX {
                continue;
            }
            if let Some(value) = self.values.get(name) {
                out.values.insert(name.to_string(), value.clone());
            }
        }
        out
    }
}

impl<K: Into<String>, V: Into<RowValues>> FromIterator<(K, V)> for ParamMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = ParamMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl From<HashMap<String, RowValues>> for ParamMap {
    fn from(values: HashMap<String, RowValues>) -> Self {
        Self { values }
    }
}
