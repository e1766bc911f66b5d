//! Recording driver for tests.
//!
//! `MockDriver` never touches a database. Every statement is appended to a
//! shared log and answered from queued results, so callers can assert on the
//! exact SQL a repository or mutator produced.

use super::{DbError, Driver, JsonFlavor, Param, RunResult};
use crate::query::sql::Dialect;
use crate::Record;
use parking_lot::Mutex;
use sea_query::Values;
use std::collections::VecDeque;
use std::sync::Arc;

/// One statement seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

#[derive(Debug, Default)]
struct MockState {
    log: Vec<Statement>,
    rows: VecDeque<Vec<Record>>,
    runs: VecDeque<RunResult>,
    closed: bool,
}

/// Handle shared between a boxed [`MockDriver`] and the test inspecting it
#[derive(Debug, Clone, Default)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    /// Queue the rows returned by the next `query_all`
    pub fn push_rows(&self, rows: Vec<Record>) {
        self.0.lock().rows.push_back(rows);
    }

    /// Queue the result of the next `run`
    pub fn push_run(&self, result: RunResult) {
        self.0.lock().runs.push_back(result);
    }

    /// Every statement executed so far, in order
    pub fn statements(&self) -> Vec<Statement> {
        self.0.lock().log.clone()
    }

    pub fn last_sql(&self) -> Option<String> {
        self.0.lock().log.last().map(|s| s.sql.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.0.lock().closed
    }
}

pub struct MockDriver {
    dialect: Dialect,
    json: bool,
    state: MockHandle,
}

impl MockDriver {
    pub fn new(dialect: Dialect) -> (Self, MockHandle) {
        let state = MockHandle::default();
        (
            Self {
                dialect,
                json: true,
                state: state.clone(),
            },
            state,
        )
    }

    /// A driver whose engine has no JSON aggregation
    pub fn without_json(dialect: Dialect) -> (Self, MockHandle) {
        let (mut driver, handle) = Self::new(dialect);
        driver.json = false;
        (driver, handle)
    }

    fn record(&self, sql: &str, params: &Values) -> Result<(), DbError> {
        let mut state = self.state.0.lock();
        if state.closed {
            return Err(DbError::Closed);
        }
        state.log.push(Statement {
            sql: sql.to_string(),
            params: Param::from_values(params)?,
        });
        Ok(())
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn json_flavor(&self) -> Option<JsonFlavor> {
        if !self.json {
            return None;
        }
        match self.dialect {
            Dialect::Sqlite => Some(JsonFlavor::Sqlite),
            Dialect::Postgres => Some(JsonFlavor::Postgres),
        }
    }

    fn query_all(&mut self, sql: &str, params: &Values) -> Result<Vec<Record>, DbError> {
        self.record(sql, params)?;
        Ok(self.state.0.lock().rows.pop_front().unwrap_or_default())
    }

    fn run(&mut self, sql: &str, params: &Values) -> Result<RunResult, DbError> {
        self.record(sql, params)?;
        Ok(self.state.0.lock().runs.pop_front().unwrap_or_default())
    }

    fn execute_raw(&mut self, sql: &str) -> Result<(), DbError> {
        self.record(sql, &Values(Vec::new()))
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.state.0.lock().closed = true;
        Ok(())
    }
}
