use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Connection or scope protocol misuse, e.g. a cursor requested before the
    /// context was initialized. Never transient.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// A single-column fetch returned more than one column.
    #[error("Multiple columns error: {0}")]
    MultiColumnsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// The outermost commit was refused because a nested transaction failed.
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

impl DbError {
    /// True for the programming-error family: protocol misuse and data-shape
    /// errors (`MultiColumnsError`).
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolError(_) | Self::MultiColumnsError(_))
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolError(msg.into())
    }
}
