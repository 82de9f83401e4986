//! Seams between the scoping layer and a concrete database driver.
//!
//! A driver provides a [`Connector`] that opens [`RawConnection`]s. Everything
//! above this module only talks to these traits.

use std::sync::Arc;

use crate::error::DbError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// A physical connection owned by exactly one lazy connection.
pub trait RawConnection: Send {
    /// Borrow a cursor for running statements on this connection.
    ///
    /// # Errors
    /// Returns `DbError` if the driver cannot produce a cursor.
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>, DbError>;

    /// # Errors
    /// Returns `DbError` if the backing store rejects the commit.
    fn commit(&mut self) -> Result<(), DbError>;

    /// # Errors
    /// Returns `DbError` if the backing store rejects the rollback.
    fn rollback(&mut self) -> Result<(), DbError>;

    /// Close the connection. Consumes the handle; it is never reused.
    ///
    /// # Errors
    /// Returns `DbError` if the driver reports a failure while closing.
    fn close(self: Box<Self>) -> Result<(), DbError>;

    /// Identifier used in open/close log lines.
    fn handle_id(&self) -> String;
}

/// Statement execution surface borrowed from a [`RawConnection`].
pub trait Cursor {
    /// Run a statement that does not return rows.
    ///
    /// # Errors
    /// Returns `DbError` if the statement fails.
    fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, DbError>;

    /// Run a statement and collect its rows.
    ///
    /// # Errors
    /// Returns `DbError` if the statement fails or a value cannot be converted.
    fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DbError>;
}

/// Opens a fresh raw connection. Configuration is captured when the closure
/// is built.
pub type Connector = Arc<dyn Fn() -> Result<Box<dyn RawConnection>, DbError> + Send + Sync>;

/// Wrap a plain closure as a [`Connector`].
pub fn connector<F>(f: F) -> Connector
where
    F: Fn() -> Result<Box<dyn RawConnection>, DbError> + Send + Sync + 'static,
{
    Arc::new(f)
}
