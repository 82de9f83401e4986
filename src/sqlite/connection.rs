use std::fmt;
use std::thread;
use std::time::Duration;

use rusqlite::ErrorCode;

use crate::driver::{Cursor, RawConnection};
use crate::error::DbError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::params::Params;
use super::query::build_result_set;

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

/// A rusqlite connection driven by the scoping layer.
///
/// The connection opens a transaction before the first statement of each
/// unit of work, so nothing becomes durable until [`RawConnection::commit`].
pub struct SqliteRawConnection {
    conn: rusqlite::Connection,
    id: String,
}

impl SqliteRawConnection {
    pub(crate) fn new(conn: rusqlite::Connection, id: String) -> Self {
        Self { conn, id }
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn begin_if_needed(&mut self) -> Result<(), DbError> {
        if !self.in_transaction() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn rollback_with_busy_retries(&mut self) -> Result<(), DbError> {
        for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
            match self.conn.execute_batch("ROLLBACK") {
                Ok(()) => return Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::DatabaseBusy
                        && idx + 1 < ROLLBACK_BUSY_RETRIES.len() =>
                {
                    tracing::debug!(attempt = idx + 1, "rollback busy, retrying");
                    thread::sleep(delay);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(DbError::ExecutionError("rollback retries exhausted".into()))
    }
}

impl RawConnection for SqliteRawConnection {
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>, DbError> {
        Ok(Box::new(SqliteCursor { raw: self }))
    }

    fn commit(&mut self) -> Result<(), DbError> {
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        if self.in_transaction() {
            self.rollback_with_busy_retries()?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), DbError> {
        self.conn.close().map_err(|(_, err)| DbError::SqliteError(err))
    }

    fn handle_id(&self) -> String {
        self.id.clone()
    }
}

impl fmt::Debug for SqliteRawConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteRawConnection")
            .field("id", &self.id)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

/// Cursor borrowing a [`SqliteRawConnection`] for one or more statements.
pub struct SqliteCursor<'a> {
    raw: &'a mut SqliteRawConnection,
}

impl Cursor for SqliteCursor<'_> {
    fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, DbError> {
        self.raw.begin_if_needed()?;
        let converted = Params::convert(params);
        let mut stmt = self.raw.conn.prepare(sql)?;
        let affected = stmt.execute(rusqlite::params_from_iter(converted.as_values().iter()))?;
        Ok(affected)
    }

    fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DbError> {
        self.raw.begin_if_needed()?;
        let converted = Params::convert(params);
        let mut stmt = self.raw.conn.prepare(sql)?;
        build_result_set(&mut stmt, converted.as_values())
    }
}
