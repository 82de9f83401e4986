//! Reentrant connection and transaction guards.
//!
//! Both guards borrow the [`ExecutionContext`] mutably and dereference to it,
//! so a nested scope is entered *through* the enclosing guard:
//!
//! ```rust,no_run
//! use sql_scope::{ConnectionScope, DbError, ExecutionContext, TransactionScope};
//!
//! fn work(ctx: &mut ExecutionContext<'_>) -> Result<(), DbError> {
//!     let mut outer = TransactionScope::begin(ctx)?;
//!     outer.execute("UPDATE a SET n = n + 1", &[])?;
//!     {
//!         let mut inner = TransactionScope::begin(&mut outer)?;
//!         inner.execute("UPDATE b SET n = n + 1", &[])?;
//!         inner.commit()?; // deferred to `outer`
//!     }
//!     outer.commit()
//! }
//! ```
//!
//! The borrow checker rejects any attempt to touch an outer guard while an
//! inner one is alive, so scopes always unwind in LIFO order. Tearing the
//! context down from inside a guard is refused with a protocol error.

use std::ops::{Deref, DerefMut};

use crate::context::ExecutionContext;
use crate::error::DbError;

/// Opens the context's lazy connection on the outermost entry and releases it
/// when that outermost guard drops. Nested guards are no-ops.
#[derive(Debug)]
pub struct ConnectionScope<'c, 'e> {
    ctx: &'c mut ExecutionContext<'e>,
    owns_lifecycle: bool,
}

impl<'c, 'e> ConnectionScope<'c, 'e> {
    /// # Errors
    /// Returns `DbError::ProtocolError` if the context cannot be initialized.
    pub fn enter(ctx: &'c mut ExecutionContext<'e>) -> Result<Self, DbError> {
        let owns_lifecycle = !ctx.is_initialized();
        if owns_lifecycle {
            ctx.initialize()?;
        }
        ctx.enter_scope();
        Ok(Self {
            ctx,
            owns_lifecycle,
        })
    }

    /// True for the guard that initialized the context and will clean it up.
    #[must_use]
    pub fn owns_lifecycle(&self) -> bool {
        self.owns_lifecycle
    }
}

impl<'e> Deref for ConnectionScope<'_, 'e> {
    type Target = ExecutionContext<'e>;

    fn deref(&self) -> &Self::Target {
        &*self.ctx
    }
}

impl<'e> DerefMut for ConnectionScope<'_, 'e> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.ctx
    }
}

impl Drop for ConnectionScope<'_, '_> {
    fn drop(&mut self) {
        self.ctx.leave_scope();
        if self.owns_lifecycle
            && let Err(err) = self.ctx.cleanup()
        {
            tracing::warn!(error = %err, "connection cleanup failed");
        }
    }
}

/// Nested transaction guard.
///
/// Only the outermost guard talks to the database: it commits on
/// [`commit`](Self::commit) and rolls back on [`rollback`](Self::rollback) or
/// when dropped without either. Inner guards defer a commit to the outer
/// level and turn a failure into a rollback-only mark, which makes the
/// outermost commit roll back instead.
#[derive(Debug)]
pub struct TransactionScope<'c, 'e> {
    scope: ConnectionScope<'c, 'e>,
    is_outermost: bool,
    completed: bool,
}

impl<'c, 'e> TransactionScope<'c, 'e> {
    /// Enter a connection scope and join or start a transaction on it.
    ///
    /// # Errors
    /// Returns `DbError::ProtocolError` if the context cannot be initialized.
    pub fn begin(ctx: &'c mut ExecutionContext<'e>) -> Result<Self, DbError> {
        let mut scope = ConnectionScope::enter(ctx)?;
        let is_outermost = scope.enter_transaction();
        if is_outermost {
            tracing::info!("begin transaction...");
        } else {
            tracing::debug!(
                depth = scope.transaction_depth(),
                "join current transaction..."
            );
        }
        Ok(Self {
            scope,
            is_outermost,
            completed: false,
        })
    }

    #[must_use]
    pub fn is_outermost(&self) -> bool {
        self.is_outermost
    }

    /// Finish this level successfully.
    ///
    /// # Errors
    /// Outermost only: `DbError::TransactionAborted` if a nested level failed
    /// (the work is rolled back), or the driver's commit error after a
    /// rollback attempt.
    pub fn commit(mut self) -> Result<(), DbError> {
        self.completed = true;
        if !self.is_outermost {
            return Ok(());
        }
        let ctx = &mut *self.scope;
        if ctx.take_rollback_only() {
            if ctx.is_connected() {
                tracing::warn!("nested transaction failed, rollback...");
                rollback_logged(ctx);
            }
            return Err(DbError::TransactionAborted(
                "a nested transaction failed; all work was rolled back".into(),
            ));
        }
        if !ctx.is_connected() {
            return Ok(());
        }
        tracing::info!("commit transaction...");
        if let Err(err) = ctx.connection_mut()?.commit() {
            tracing::warn!(error = %err, "commit failed, try rollback...");
            rollback_logged(ctx);
            return Err(err);
        }
        tracing::info!("commit ok.");
        Ok(())
    }

    /// Abandon this level.
    ///
    /// # Errors
    /// Outermost only: the driver's rollback error.
    pub fn rollback(mut self) -> Result<(), DbError> {
        self.completed = true;
        self.abort()
    }

    fn abort(&mut self) -> Result<(), DbError> {
        let ctx = &mut *self.scope;
        if !self.is_outermost {
            ctx.mark_rollback_only();
            return Ok(());
        }
        ctx.take_rollback_only();
        if !ctx.is_connected() {
            return Ok(());
        }
        tracing::info!("rollback transaction...");
        ctx.connection_mut()?.rollback()?;
        tracing::info!("rollback ok.");
        Ok(())
    }
}

fn rollback_logged(ctx: &mut ExecutionContext<'_>) {
    if let Err(err) = ctx.connection_mut().and_then(|conn| conn.rollback()) {
        tracing::warn!(error = %err, "rollback failed");
    }
}

impl<'e> Deref for TransactionScope<'_, 'e> {
    type Target = ExecutionContext<'e>;

    fn deref(&self) -> &Self::Target {
        &self.scope
    }
}

impl<'e> DerefMut for TransactionScope<'_, 'e> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.scope
    }
}

impl Drop for TransactionScope<'_, '_> {
    fn drop(&mut self) {
        if !self.completed
            && let Err(err) = self.abort()
        {
            tracing::warn!(error = %err, "rollback on scope exit failed");
        }
        self.scope.leave_transaction();
    }
}

/// Run `f` inside a [`ConnectionScope`].
///
/// # Errors
/// Returns whatever `f` returns, or a scope protocol error.
pub fn with_connection<'e, T, E, F>(ctx: &mut ExecutionContext<'e>, f: F) -> Result<T, E>
where
    F: FnOnce(&mut ExecutionContext<'e>) -> Result<T, E>,
    E: From<DbError>,
{
    let mut scope = ConnectionScope::enter(ctx)?;
    f(&mut *scope)
}

/// Run `f` inside a [`TransactionScope`]: `Ok` commits, `Err` rolls back and
/// returns the closure's error unchanged.
///
/// # Errors
/// Returns the closure's error, or the commit error from the outermost level.
pub fn with_transaction<'e, T, E, F>(ctx: &mut ExecutionContext<'e>, f: F) -> Result<T, E>
where
    F: FnOnce(&mut ExecutionContext<'e>) -> Result<T, E>,
    E: From<DbError>,
{
    let mut tx = TransactionScope::begin(ctx)?;
    match f(&mut *tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
