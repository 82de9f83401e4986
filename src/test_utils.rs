//! In-memory driver that records every call, for exercising scope behavior
//! without a database.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::driver::{Connector, Cursor, RawConnection, connector};
use crate::engine::Engine;
use crate::error::DbError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Counters and statement history shared by every connection a
/// [`RecordingDriver`] hands out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverLog {
    pub connects: usize,
    pub closes: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub statements: Vec<String>,
}

#[derive(Debug, Default)]
struct Failures {
    connect: bool,
    commit: bool,
    rollback: bool,
    close: bool,
    statement_pattern: Option<String>,
}

#[derive(Debug, Default)]
struct Shared {
    log: DriverLog,
    failures: Failures,
    responses: VecDeque<ResultSet>,
    discard_statements: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    shared: Arc<Mutex<Shared>>,
    next_id: Arc<AtomicU64>,
}

impl RecordingDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connector(&self) -> Connector {
        let driver = self.clone();
        connector(move || {
            let mut shared = driver.lock();
            if shared.failures.connect {
                return Err(DbError::ExecutionError("connection refused".into()));
            }
            shared.log.connects += 1;
            let id = driver.next_id.fetch_add(1, Ordering::Relaxed);
            Ok(Box::new(RecordingConnection {
                id,
                driver: driver.clone(),
            }) as Box<dyn RawConnection>)
        })
    }

    #[must_use]
    pub fn engine(&self) -> Engine {
        Engine::new(self.connector())
    }

    #[must_use]
    pub fn snapshot(&self) -> DriverLog {
        self.lock().log.clone()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.lock().failures.connect = fail;
    }

    pub fn fail_commit(&self, fail: bool) {
        self.lock().failures.commit = fail;
    }

    pub fn fail_rollback(&self, fail: bool) {
        self.lock().failures.rollback = fail;
    }

    pub fn fail_close(&self, fail: bool) {
        self.lock().failures.close = fail;
    }

    /// Make any statement containing `pattern` fail with `ExecutionError`.
    pub fn fail_statements_containing(&self, pattern: &str) {
        self.lock().failures.statement_pattern = Some(pattern.to_owned());
    }

    /// Queue a result for the next `query` call. Without a queued result a
    /// query returns an empty, column-less set.
    pub fn respond_with(&self, rs: ResultSet) {
        self.lock().responses.push_back(rs);
    }

    /// Stop keeping statement text; counters are still updated.
    pub fn discard_statements(&self) {
        self.lock().discard_statements = true;
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct RecordingConnection {
    id: u64,
    driver: RecordingDriver,
}

impl RawConnection for RecordingConnection {
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>, DbError> {
        Ok(Box::new(RecordingCursor {
            driver: &self.driver,
        }))
    }

    fn commit(&mut self) -> Result<(), DbError> {
        let mut shared = self.driver.lock();
        if shared.failures.commit {
            return Err(DbError::ExecutionError("commit failed".into()));
        }
        shared.log.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        let mut shared = self.driver.lock();
        shared.log.rollbacks += 1;
        if shared.failures.rollback {
            return Err(DbError::ExecutionError("rollback failed".into()));
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), DbError> {
        let mut shared = self.driver.lock();
        shared.log.closes += 1;
        if shared.failures.close {
            return Err(DbError::ExecutionError("close failed".into()));
        }
        Ok(())
    }

    fn handle_id(&self) -> String {
        format!("recording#{}", self.id)
    }
}

struct RecordingCursor<'a> {
    driver: &'a RecordingDriver,
}

impl RecordingCursor<'_> {
    fn record(&self, sql: &str) -> Result<(), DbError> {
        let mut shared = self.driver.lock();
        if !shared.discard_statements {
            shared.log.statements.push(sql.to_owned());
        }
        match &shared.failures.statement_pattern {
            Some(pattern) if sql.contains(pattern.as_str()) => {
                Err(DbError::ExecutionError(format!("statement failed: {sql}")))
            }
            _ => Ok(()),
        }
    }
}

impl Cursor for RecordingCursor<'_> {
    fn execute(&mut self, sql: &str, _params: &[RowValues]) -> Result<usize, DbError> {
        self.record(sql)?;
        Ok(1)
    }

    fn query(&mut self, sql: &str, _params: &[RowValues]) -> Result<ResultSet, DbError> {
        self.record(sql)?;
        Ok(self.driver.lock().responses.pop_front().unwrap_or_default())
    }
}
