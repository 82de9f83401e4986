use std::fmt;

use crate::driver::{Cursor, RawConnection};
use crate::engine::Engine;
use crate::error::DbError;
use crate::profiling::ProfiledCursor;

/// Holds at most one raw connection, opened on the first cursor request.
///
/// Commit and rollback never connect on their own: calling them before any
/// cursor was taken is a scope protocol violation.
pub struct LazyConnection<'e> {
    engine: &'e Engine,
    handle: Option<Box<dyn RawConnection>>,
}

impl<'e> LazyConnection<'e> {
    #[must_use]
    pub fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            handle: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Borrow a cursor, connecting first if no handle is held yet. Every
    /// statement run through it is profiled.
    ///
    /// # Errors
    /// Returns `DbError::ConnectionError` if connecting fails, or the driver's
    /// error if it cannot produce a cursor.
    pub fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>, DbError> {
        if self.handle.is_none() {
            let handle = self.engine.connect()?;
            tracing::info!("open connection <{}>...", handle.handle_id());
            self.handle = Some(handle);
        }
        let cursor = self.held("cursor")?.cursor()?;
        Ok(Box::new(ProfiledCursor::new(cursor)))
    }

    /// # Errors
    /// Returns `DbError::ProtocolError` if no connection is open, otherwise
    /// the driver's commit error.
    pub fn commit(&mut self) -> Result<(), DbError> {
        self.held("commit")?.commit()
    }

    /// # Errors
    /// Returns `DbError::ProtocolError` if no connection is open, otherwise
    /// the driver's rollback error.
    pub fn rollback(&mut self) -> Result<(), DbError> {
        self.held("rollback")?.rollback()
    }

    /// Close the held connection, if any. Safe to call repeatedly.
    ///
    /// # Errors
    /// Returns the driver's close error. The handle is released either way.
    pub fn cleanup(&mut self) -> Result<(), DbError> {
        match self.handle.take() {
            Some(handle) => {
                tracing::info!("close connection <{}>...", handle.handle_id());
                handle.close()
            }
            None => Ok(()),
        }
    }

    fn held(&mut self, op: &str) -> Result<&mut Box<dyn RawConnection>, DbError> {
        self.handle
            .as_mut()
            .ok_or_else(|| DbError::protocol(format!("{op} called with no open connection")))
    }
}

impl fmt::Debug for LazyConnection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyConnection")
            .field("engine", &self.engine.id())
            .field(
                "handle",
                &self.handle.as_ref().map(|handle| handle.handle_id()),
            )
            .finish()
    }
}
