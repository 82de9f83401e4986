use std::time::{Duration, Instant};

use tracing::Level;

use crate::driver::Cursor;
use crate::error::DbError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Statements slower than this are reported at warn level.
pub const SLOW_STATEMENT_THRESHOLD: Duration = Duration::from_millis(100);

#[must_use]
pub fn severity(elapsed: Duration) -> Level {
    if elapsed > SLOW_STATEMENT_THRESHOLD {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// Report how long `sql` took since `start`.
pub fn profile(start: Instant, sql: &str) {
    let elapsed = start.elapsed();
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    if severity(elapsed) == Level::WARN {
        tracing::warn!(elapsed_ms, "[PROFILING] [DB] {elapsed:?}: {sql}");
    } else {
        tracing::info!(elapsed_ms, "[PROFILING] [DB] {elapsed:?}: {sql}");
    }
}

/// Times every statement run through the wrapped cursor.
pub(crate) struct ProfiledCursor<'a> {
    inner: Box<dyn Cursor + 'a>,
}

impl<'a> ProfiledCursor<'a> {
    pub(crate) fn new(inner: Box<dyn Cursor + 'a>) -> Self {
        Self { inner }
    }
}

impl Cursor for ProfiledCursor<'_> {
    fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, DbError> {
        let start = Instant::now();
        let result = self.inner.execute(sql, params);
        profile(start, sql);
        result
    }

    fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DbError> {
        let start = Instant::now();
        let result = self.inner.query(sql, params);
        profile(start, sql);
        result
    }
}
