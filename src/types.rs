use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde_json::Value as JsonValue;

use crate::binding::PlaceholderStyle;
use crate::error::SqlTemplateError;

/// Values that can be used as template parameters or read back from a result row.
///
/// Reuse the same enum across backends so helper functions do not need to branch on driver
/// types:
/// ```rust
/// use sql_template_middleware::prelude::*;
///
/// let params = ParamMap::new()
///     .with("id", RowValues::Int(1))
///     .with("name", RowValues::Text("alice".into()))
///     .with("active", RowValues::Bool(true));
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
    /// Caller-validated SQL text, intended for literal substitution
    SqlLiteral(String),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// NULL, or text that is empty after trimming.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            RowValues::Null => true,
            RowValues::Text(s) | RowValues::SqlLiteral(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RowValues::Text(value) | RowValues::SqlLiteral(value) => Some(value),
            _ => None,
        }
    }

    /// Text spliced into SQL by a literal-substitution directive.
    ///
    /// Returns `None` for values that have no sensible literal form (NULL, blobs).
    #[must_use]
    pub fn to_literal_sql(&self) -> Option<String> {
        match self {
            RowValues::Int(i) => Some(i.to_string()),
            RowValues::Float(f) => Some(f.to_string()),
            RowValues::Text(s) | RowValues::SqlLiteral(s) => Some(s.clone()),
            RowValues::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            RowValues::Timestamp(dt) => Some(dt.format("%F %T%.f").to_string()),
            RowValues::JSON(value) => Some(value.to_string()),
            RowValues::Null | RowValues::Blob(_) => None,
        }
    }

    /// Lossless-enough JSON form, used when rows are mapped into `serde_json` values.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) | RowValues::SqlLiteral(s) => JsonValue::from(s.clone()),
            RowValues::Bool(b) => JsonValue::from(*b),
            RowValues::Timestamp(dt) => JsonValue::from(dt.format("%F %T%.f").to_string()),
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(value) => value.clone(),
            RowValues::Blob(bytes) => JsonValue::from(bytes.clone()),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// The database flavor a template is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Dialect {
    /// SQL Server
    #[value(name = "sqlserver", alias = "mssql")]
    SqlServer,
    /// `MySQL`
    #[value(name = "mysql")]
    MySql,
    /// `SQLite`
    #[value(name = "sqlite")]
    Sqlite,
    /// `PostgreSQL`
    #[value(name = "postgres", alias = "postgresql")]
    Postgres,
}

impl Dialect {
    /// The tag used in template files.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Dialect::SqlServer => "sqlserver",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    /// Placeholder style expected by the driver behind this dialect.
    #[must_use]
    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Dialect::SqlServer => PlaceholderStyle::Mssql,
            Dialect::MySql => PlaceholderStyle::MySql,
            Dialect::Sqlite => PlaceholderStyle::Sqlite,
            Dialect::Postgres => PlaceholderStyle::Postgres,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Dialect {
    type Err = SqlTemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Dialect as ValueEnum>::from_str(s.trim(), true)
            .map_err(|_| SqlTemplateError::ConfigError(format!("Unsupported database type: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_tags_parse_case_insensitively() {
        assert_eq!("MySql".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("SQLSERVER".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert_eq!("mssql".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!(" sqlite ".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn literal_forms() {
        assert_eq!(RowValues::Int(7).to_literal_sql().as_deref(), Some("7"));
        assert_eq!(RowValues::Bool(true).to_literal_sql().as_deref(), Some("1"));
        assert_eq!(
            RowValues::SqlLiteral("'P','D'".into()).to_literal_sql().as_deref(),
            Some("'P','D'")
        );
        assert_eq!(RowValues::Null.to_literal_sql(), None);

        let dt = NaiveDateTime::parse_from_str("2024-03-01 08:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(
            RowValues::Timestamp(dt).to_literal_sql().as_deref(),
            Some("2024-03-01 08:30:00")
        );
    }

    #[test]
    fn blank_detection() {
        assert!(RowValues::Null.is_blank());
        assert!(RowValues::Text("   ".into()).is_blank());
        assert!(!RowValues::Text("x".into()).is_blank());
        assert!(!RowValues::Int(0).is_blank());
    }
}
