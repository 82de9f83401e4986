use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single cell or statement parameter, independent of the driver.
///
/// ```rust
/// use sql_scope::RowValues;
///
/// let params = [RowValues::Int(1), RowValues::Text("alice".into())];
/// assert_eq!(params[0].as_int(), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Null,
    JSON(JsonValue),
    Blob(Vec<u8>),
}

impl RowValues {
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RowValues::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RowValues::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Booleans come back from `SQLite` as `0`/`1` integers.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    /// Render the value as JSON. Blobs become arrays of bytes, timestamps
    /// become `YYYY-MM-DD HH:MM:SS[.f]` strings.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::from(s.as_str()),
            RowValues::Bool(b) => JsonValue::from(*b),
            RowValues::Timestamp(dt) => JsonValue::from(dt.format("%F %T%.f").to_string()),
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(v) => v.clone(),
            RowValues::Blob(bytes) => JsonValue::from(bytes.clone()),
        }
    }
}

/// Drivers an [`EngineConfig`](crate::EngineConfig) can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `SQLite` through rusqlite
    #[cfg(feature = "sqlite")]
    Sqlite,
    /// Connector supplied by the caller; `create_engine` cannot build it from config alone.
    Custom,
}
