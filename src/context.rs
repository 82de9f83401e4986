use crate::connection::LazyConnection;
use crate::driver::Cursor;
use crate::engine::{Engine, engine};
use crate::error::DbError;
use crate::results::{ResultSet, Row};
use crate::scope::ConnectionScope;
use crate::types::RowValues;

/// Per-caller connection state.
///
/// Each thread of control owns its own context and passes it explicitly to
/// the scopes and statement helpers. A context is never shared: it holds at
/// most one physical connection and the nesting depth of the transactions
/// currently running on it.
///
/// ```rust,no_run
/// use sql_scope::{EngineConfig, ExecutionContext, RowValues, create_engine, with_transaction};
///
/// # fn main() -> Result<(), sql_scope::DbError> {
/// create_engine(&EngineConfig::new("app.db"))?;
/// let mut ctx = ExecutionContext::from_registry()?;
/// with_transaction(&mut ctx, |ctx| {
///     ctx.execute("INSERT INTO users (name) VALUES (?1)", &[RowValues::Text("alice".into())])?;
///     Ok::<_, sql_scope::DbError>(())
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ExecutionContext<'e> {
    engine: &'e Engine,
    connection: Option<LazyConnection<'e>>,
    transaction_depth: usize,
    open_scopes: usize,
    rollback_only: bool,
}

impl ExecutionContext<'static> {
    /// Context bound to the process engine.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if no engine has been created.
    pub fn from_registry() -> Result<Self, DbError> {
        Ok(Self::new(engine()?))
    }
}

impl<'e> ExecutionContext<'e> {
    #[must_use]
    pub fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            connection: None,
            transaction_depth: 0,
            open_scopes: 0,
            rollback_only: false,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.connection.is_some()
    }

    /// True once a physical connection has actually been opened.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(LazyConnection::is_open)
    }

    #[must_use]
    pub fn transaction_depth(&self) -> usize {
        self.transaction_depth
    }

    /// Attach a fresh lazy connection. Nothing is opened yet.
    ///
    /// # Errors
    /// Returns `DbError::ProtocolError` if the context is already initialized.
    pub fn initialize(&mut self) -> Result<(), DbError> {
        if self.is_initialized() {
            return Err(DbError::protocol("execution context already initialized"));
        }
        tracing::info!("open lazy connection...");
        self.connection = Some(LazyConnection::new(self.engine));
        self.transaction_depth = 0;
        self.rollback_only = false;
        Ok(())
    }

    /// Release the connection and reset the context.
    ///
    /// # Errors
    /// Returns `DbError::ProtocolError` if the context is not initialized or
    /// a scope is still open on it; the context is left untouched then.
    /// Otherwise returns the driver's close error, after the reset.
    pub fn cleanup(&mut self) -> Result<(), DbError> {
        if self.open_scopes > 0 {
            return Err(DbError::protocol(format!(
                "cleanup while {} scope(s) are still open",
                self.open_scopes
            )));
        }
        let mut connection = self
            .connection
            .take()
            .ok_or_else(|| DbError::protocol("cleanup on an uninitialized execution context"))?;
        self.transaction_depth = 0;
        self.rollback_only = false;
        connection.cleanup()
    }

    /// # Errors
    /// Returns `DbError::ProtocolError` if the context is not initialized,
    /// otherwise whatever connecting or the driver reports.
    pub fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>, DbError> {
        self.connection_mut()?.cursor()
    }

    /// Run a statement that returns no rows. Outside a transaction the
    /// statement is committed immediately.
    ///
    /// # Errors
    /// Returns the driver's error if the statement or the auto commit fails.
    pub fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, DbError> {
        let mut scope = ConnectionScope::enter(self)?;
        let affected = scope.cursor()?.execute(sql, params)?;
        if scope.transaction_depth() == 0 {
            tracing::info!("auto commit");
            scope.connection_mut()?.commit()?;
        }
        Ok(affected)
    }

    /// # Errors
    /// Returns the driver's error if the query fails.
    pub fn select(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DbError> {
        let mut scope = ConnectionScope::enter(self)?;
        scope.cursor()?.query(sql, params)
    }

    /// First row of the result, if any.
    ///
    /// # Errors
    /// Returns the driver's error if the query fails.
    pub fn select_one(&mut self, sql: &str, params: &[RowValues]) -> Result<Option<Row>, DbError> {
        Ok(self.select(sql, params)?.into_first())
    }

    /// The integer in the single column of the first row.
    ///
    /// # Errors
    /// Returns `DbError::MultiColumnsError` unless exactly one column comes
    /// back, and `DbError::ExecutionError` if there is no row or the value is
    /// not an integer.
    pub fn select_int(&mut self, sql: &str, params: &[RowValues]) -> Result<i64, DbError> {
        let rs = self.select(sql, params)?;
        let columns = rs.column_names().len();
        if columns != 1 {
            return Err(DbError::MultiColumnsError(format!(
                "expected exactly one column, got {columns}"
            )));
        }
        let row = rs
            .into_first()
            .ok_or_else(|| DbError::ExecutionError("select_int returned no rows".into()))?;
        match row.get_by_index(0).and_then(RowValues::as_int) {
            Some(value) => Ok(value),
            None => Err(DbError::ExecutionError(format!(
                "select_int expected an integer, got {:?}",
                row.get_by_index(0)
            ))),
        }
    }

    pub(crate) fn connection_mut(&mut self) -> Result<&mut LazyConnection<'e>, DbError> {
        self.connection
            .as_mut()
            .ok_or_else(|| DbError::protocol("execution context is not initialized"))
    }

    pub(crate) fn enter_scope(&mut self) {
        self.open_scopes += 1;
    }

    pub(crate) fn leave_scope(&mut self) {
        self.open_scopes = self.open_scopes.saturating_sub(1);
    }

    /// Returns true if this call opened the outermost transaction.
    pub(crate) fn enter_transaction(&mut self) -> bool {
        self.transaction_depth += 1;
        self.transaction_depth == 1
    }

    pub(crate) fn leave_transaction(&mut self) {
        self.transaction_depth = self.transaction_depth.saturating_sub(1);
    }

    pub(crate) fn mark_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub(crate) fn take_rollback_only(&mut self) -> bool {
        std::mem::take(&mut self.rollback_only)
    }
}
