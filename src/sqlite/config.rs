use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::config::EngineConfig;
use crate::driver::{Connector, RawConnection, connector as wrap_connector};
use crate::error::DbError;

use super::connection::SqliteRawConnection;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Options the `SQLite` driver reads from an [`EngineConfig`]. Network and
/// charset options are accepted and ignored.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub busy_timeout: Option<Duration>,
    pub journal_mode: Option<String>,
}

impl SqliteOptions {
    /// # Errors
    /// Returns `DbError::ConfigError` for `autocommit=true`, which would let
    /// statements of a failed transaction survive, and for a malformed
    /// `busy_timeout_ms`.
    pub fn from_config(cfg: &EngineConfig) -> Result<Self, DbError> {
        if cfg.autocommit() {
            return Err(DbError::ConfigError(
                "sqlite driver manages transactions itself; autocommit=true is not supported"
                    .into(),
            ));
        }
        let busy_timeout = cfg.option_u64("busy_timeout_ms")?.map(Duration::from_millis);
        let journal_mode = cfg
            .resolved_options()
            .get("journal_mode")
            .and_then(JsonValue::as_str)
            .map(str::to_owned);
        Ok(Self {
            db_path: cfg.database.clone(),
            busy_timeout,
            journal_mode,
        })
    }

    /// Open a new connection with these options applied.
    ///
    /// # Errors
    /// Returns `DbError::ConnectionError` if the database cannot be opened or
    /// configured.
    pub fn open(&self) -> Result<SqliteRawConnection, DbError> {
        let conn = rusqlite::Connection::open(&self.db_path).map_err(|e| {
            DbError::ConnectionError(format!("cannot open sqlite db {}: {e}", self.db_path))
        })?;
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)
                .map_err(|e| DbError::ConnectionError(format!("busy_timeout: {e}")))?;
        }
        if let Some(mode) = &self.journal_mode {
            conn.pragma_update(None, "journal_mode", mode)
                .map_err(|e| DbError::ConnectionError(format!("journal_mode: {e}")))?;
        }
        let id = format!(
            "sqlite:{}#{}",
            self.db_path,
            NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
        );
        Ok(SqliteRawConnection::new(conn, id))
    }
}

/// Build a connector that opens `SQLite` connections for `cfg`.
///
/// # Errors
/// Returns `DbError::ConfigError` if the options cannot be used.
pub fn connector(cfg: &EngineConfig) -> Result<Connector, DbError> {
    let opts = SqliteOptions::from_config(cfg)?;
    Ok(wrap_connector(move || {
        let conn = opts.open()?;
        Ok(Box::new(conn) as Box<dyn RawConnection>)
    }))
}
