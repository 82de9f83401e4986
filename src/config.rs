use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DbError;
use crate::types::DatabaseType;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3306;

/// Driver options applied when the caller does not override them.
pub const DEFAULT_OPTIONS: &[(&str, DefaultOption)] = &[
    ("use_unicode", DefaultOption::Bool(true)),
    ("charset", DefaultOption::Str("utf8")),
    ("collation", DefaultOption::Str("utf8_general_ci")),
    ("autocommit", DefaultOption::Bool(false)),
];

#[derive(Debug, Clone, Copy)]
pub enum DefaultOption {
    Bool(bool),
    Str(&'static str),
}

impl DefaultOption {
    fn to_json(self) -> JsonValue {
        match self {
            DefaultOption::Bool(b) => JsonValue::Bool(b),
            DefaultOption::Str(s) => JsonValue::String(s.to_owned()),
        }
    }
}

/// Everything an engine needs to build its connector.
///
/// `options` holds only caller overrides; [`EngineConfig::resolved_options`]
/// merges them over [`DEFAULT_OPTIONS`]. Keys without a default are passed
/// through to the driver untouched.
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_driver")]
    pub driver: DatabaseType,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub options: BTreeMap<String, JsonValue>,
}

fn default_driver() -> DatabaseType {
    #[cfg(feature = "sqlite")]
    {
        DatabaseType::Sqlite
    }
    #[cfg(not(feature = "sqlite"))]
    {
        DatabaseType::Custom
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl EngineConfig {
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            driver: default_driver(),
            user: String::new(),
            password: String::new(),
            database: database.into(),
            host: default_host(),
            port: default_port(),
            options: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn builder(database: impl Into<String>) -> EngineConfigBuilder {
        EngineConfigBuilder::new(database)
    }

    /// Parse a config from JSON text.
    ///
    /// # Errors
    /// Returns `DbError::JsonError` on malformed JSON and `DbError::ConfigError`
    /// if the parsed config fails validation.
    pub fn from_json(text: &str) -> Result<Self, DbError> {
        let cfg: EngineConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON config file.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if the file cannot be read, otherwise as
    /// [`EngineConfig::from_json`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DbError::ConfigError(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// # Errors
    /// Returns `DbError::ConfigError` when a required field is missing.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.database.trim().is_empty() {
            return Err(DbError::ConfigError("database must not be empty".into()));
        }
        if self.port == 0 {
            return Err(DbError::ConfigError("port must be non-zero".into()));
        }
        Ok(())
    }

    /// Defaults merged with caller overrides; overrides win.
    #[must_use]
    pub fn resolved_options(&self) -> BTreeMap<String, JsonValue> {
        let mut resolved: BTreeMap<String, JsonValue> = DEFAULT_OPTIONS
            .iter()
            .map(|(key, value)| ((*key).to_owned(), value.to_json()))
            .collect();
        for (key, value) in &self.options {
            resolved.insert(key.clone(), value.clone());
        }
        resolved
    }

    /// Read a resolved option as a boolean. Accepts JSON booleans, `0`/`1`
    /// and the strings `"true"`, `"false"`, `"1"`, `"0"`.
    #[must_use]
    pub fn option_bool(&self, key: &str) -> Option<bool> {
        match self.resolved_options().get(key)? {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::Number(n) => n.as_i64().map(|n| n != 0),
            JsonValue::String(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Read a resolved option as an unsigned integer. Numeric strings such as
    /// those coming from `--option key=value` are accepted too.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if the option is set to anything else.
    pub fn option_u64(&self, key: &str) -> Result<Option<u64>, DbError> {
        let Some(value) = self.resolved_options().get(key).cloned() else {
            return Ok(None);
        };
        let parsed = match &value {
            JsonValue::Number(n) => n.as_u64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| {
            DbError::ConfigError(format!(
                "option {key} must be a non-negative integer, got {value}"
            ))
        })
    }

    #[must_use]
    pub fn autocommit(&self) -> bool {
        self.option_bool("autocommit").unwrap_or(false)
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("driver", &self.driver)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("options", &self.options)
            .finish()
    }
}

/// Fluent builder for [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    cfg: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            cfg: EngineConfig::new(database),
        }
    }

    #[must_use]
    pub fn driver(mut self, driver: DatabaseType) -> Self {
        self.cfg.driver = driver;
        self
    }

    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.cfg.user = user.into();
        self.cfg.password = password.into();
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.cfg.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.cfg.port = port;
        self
    }

    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.cfg.options.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn autocommit(self, autocommit: bool) -> Self {
        self.option("autocommit", autocommit)
    }

    /// # Errors
    /// Returns `DbError::ConfigError` if the assembled config is invalid.
    pub fn finish(self) -> Result<EngineConfig, DbError> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
