//! Connection Module
//!
//! A [`Connection`] owns one [`Driver`] and provides:
//! - Statement execution with result normalization
//! - Transaction control (one active transaction at a time)
//! - JSON aggregation for eager loading, when the driver has it
//! - Logging, tracing spans and metrics around every statement
//!
//! Connections are `Send + Sync`; statements are serialized through a lock
//! around the driver, so a connection can be shared behind an `Arc`.

use crate::config::{DataConfig, DriverKind};
use crate::driver::{DbError, Driver, JsonFlavor, RunResult};
use crate::error::{DataError, DataResult};
use crate::query::sql::{Dialect, Fragment, SubSelect};
use crate::Record;
use parking_lot::Mutex;
use sea_query::Values;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

struct State {
    driver: Box<dyn Driver>,
    in_transaction: bool,
}

/// One physical database handle
pub struct Connection {
    state: Mutex<State>,
    name: &'static str,
    dialect: Dialect,
    json: Option<JsonFlavor>,
}

impl Connection {
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::from_boxed(Box::new(driver))
    }

    pub fn from_boxed(driver: Box<dyn Driver>) -> Self {
        let name = driver.name();
        let dialect = driver.dialect();
        let json = driver.json_flavor();
        Self {
            state: Mutex::new(State {
                driver,
                in_transaction: false,
            }),
            name,
            dialect,
            json,
        }
    }

    /// Private in-memory SQLite database
    #[cfg(feature = "sqlite")]
    pub fn sqlite_memory() -> DataResult<Self> {
        Ok(Self::new(crate::driver::sqlite::SqliteDriver::open_in_memory()?))
    }

    /// SQLite database file; `:memory:` opens a private in-memory database
    #[cfg(feature = "sqlite")]
    pub fn sqlite(path: &str) -> DataResult<Self> {
        let driver = if path == ":memory:" {
            crate::driver::sqlite::SqliteDriver::open_in_memory()?
        } else {
            crate::driver::sqlite::SqliteDriver::open(path)?
        };
        Ok(Self::new(driver))
    }

    #[cfg(feature = "postgres")]
    pub fn postgres(connection_string: &str) -> DataResult<Self> {
        Ok(Self::new(crate::driver::postgres::PostgresDriver::connect(
            connection_string,
        )?))
    }

    /// Open the driver named by the configuration
    pub fn from_config(config: &DataConfig) -> DataResult<Self> {
        match config.driver {
            #[cfg(feature = "sqlite")]
            DriverKind::Sqlite => Self::sqlite(&config.path),
            #[cfg(feature = "postgres")]
            DriverKind::Postgres => {
                let url = config.url.as_deref().ok_or_else(|| {
                    DataError::Config("postgres driver requires `database.url`".to_string())
                })?;
                Self::postgres(url)
            }
            #[allow(unreachable_patterns)]
            other => Err(DataError::Config(format!(
                "driver {other:?} is not enabled in this build"
            ))),
        }
    }

    pub fn driver_name(&self) -> &'static str {
        self.name
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn supports_json(&self) -> bool {
        self.json.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().in_transaction
    }

    fn timed<T>(
        &self,
        sql: &str,
        f: impl FnOnce(&mut dyn Driver) -> Result<T, DbError>,
    ) -> DataResult<T> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(self.name, sql).entered();

        log::debug!("[{}] {}", self.name, sql);
        let start = Instant::now();
        let result = {
            let mut state = self.state.lock();
            f(state.driver.as_mut())
        };
        let elapsed = start.elapsed();

        #[cfg(feature = "metrics")]
        METRICS.record_query(self.name, elapsed);

        result.map_err(|e| {
            #[cfg(feature = "metrics")]
            METRICS.record_query_error(self.name);
            log::warn!("[{}] statement failed after {:?}: {}", self.name, elapsed, e);
            DataError::from(e)
        })
    }

    /// Run a query and return its rows as the driver decoded them
    pub fn all(&self, sql: &str, params: &Values) -> DataResult<Vec<Record>> {
        self.timed(sql, |driver| driver.query_all(sql, params))
    }

    /// Like [`all`](Self::all), parsing the JSON text held in `json_columns`
    pub fn all_with_json(
        &self,
        sql: &str,
        params: &Values,
        json_columns: &[&str],
    ) -> DataResult<Vec<Record>> {
        let mut rows = self.all(sql, params)?;
        for row in &mut rows {
            normalize_record(row, json_columns);
        }
        Ok(rows)
    }

    /// Run a write statement
    pub fn run(&self, sql: &str, params: &Values) -> DataResult<RunResult> {
        self.timed(sql, |driver| driver.run(sql, params))
    }

    /// Run a single parameterless statement (DDL)
    pub fn execute_raw(&self, sql: &str) -> DataResult<()> {
        self.timed(sql, |driver| driver.execute_raw(sql))
    }

    /// Start a transaction
    ///
    /// Fails with [`DataError::TransactionState`] if one is already active.
    pub fn begin(&self) -> DataResult<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        let mut state = self.state.lock();
        if state.in_transaction {
            return Err(DataError::TransactionState(
                "a transaction is already active".to_string(),
            ));
        }
        log::debug!("[{}] BEGIN", self.name);
        state.driver.execute_raw("BEGIN")?;
        state.in_transaction = true;
        Ok(())
    }

    pub fn commit(&self) -> DataResult<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();
        self.finish("COMMIT")?;
        #[cfg(feature = "metrics")]
        METRICS.record_transaction("commit");
        Ok(())
    }

    pub fn rollback(&self) -> DataResult<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();
        self.finish("ROLLBACK")?;
        #[cfg(feature = "metrics")]
        METRICS.record_transaction("rollback");
        Ok(())
    }

    fn finish(&self, statement: &str) -> DataResult<()> {
        let mut state = self.state.lock();
        if !state.in_transaction {
            return Err(DataError::TransactionState(format!(
                "{statement} without an active transaction"
            )));
        }
        log::debug!("[{}] {}", self.name, statement);
        // The transaction is over whether or not the statement succeeds
        state.in_transaction = false;
        state.driver.execute_raw(statement)?;
        Ok(())
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> DataResult<T>) -> DataResult<T> {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    log::warn!("[{}] rollback failed: {}", self.name, rollback_err);
                }
                Err(err)
            }
        }
    }

    fn flavor(&self, capability: &str) -> DataResult<JsonFlavor> {
        self.json.ok_or_else(|| DataError::DriverCapability {
            driver: self.name.to_string(),
            capability: capability.to_string(),
        })
    }

    /// Single JSON object from a correlated sub-select
    pub fn json_object_from(&self, sub: &SubSelect) -> DataResult<Fragment> {
        Ok(self.flavor("json object aggregation")?.object_from(sub))
    }

    /// JSON array from a correlated sub-select
    pub fn json_array_from(&self, sub: &SubSelect) -> DataResult<Fragment> {
        Ok(self.flavor("json array aggregation")?.array_from(sub))
    }

    /// Release the driver. An open transaction is rolled back first.
    pub fn close(&self) -> DataResult<()> {
        let mut state = self.state.lock();
        if state.in_transaction {
            log::warn!("[{}] closing with an open transaction, rolling back", self.name);
            state.in_transaction = false;
            if let Err(e) = state.driver.execute_raw("ROLLBACK") {
                log::warn!("[{}] rollback on close failed: {}", self.name, e);
            }
        }
        state.driver.close()?;
        Ok(())
    }
}

/// Parse the named columns when they hold a JSON object or array as text
///
/// Nested eager loads come back as JSON text on engines without a native JSON
/// type. Columns not named, and strings that are not an object or array, are
/// left alone.
pub fn normalize_record(record: &mut Record, json_columns: &[&str]) {
    for column in json_columns {
        if let Some(value) = record.get_mut(*column) {
            if let Some(parsed) = parse_json_text(value) {
                *value = parsed;
            }
        }
    }
}

fn parse_json_text(value: &serde_json::Value) -> Option<serde_json::Value> {
    let text = value.as_str()?;
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use serde_json::json;

    fn mock() -> (Connection, crate::driver::mock::MockHandle) {
        let (driver, handle) = MockDriver::new(Dialect::Sqlite);
        (Connection::new(driver), handle)
    }

    #[test]
    fn test_normalize_parses_objects_and_arrays_only() {
        let mut record = Record::new();
        record.insert("nested".into(), json!("{\"id\":1}"));
        record.insert("list".into(), json!("[1,2]"));
        record.insert("number_text".into(), json!("42"));
        record.insert("broken".into(), json!("{not json"));
        record.insert("title".into(), json!("[1, 2]"));
        normalize_record(&mut record, &["nested", "list", "number_text", "broken", "missing"]);

        assert_eq!(record["nested"], json!({"id": 1}));
        assert_eq!(record["list"], json!([1, 2]));
        assert_eq!(record["number_text"], json!("42"));
        assert_eq!(record["broken"], json!("{not json"));
        // columns not named keep their text
        assert_eq!(record["title"], json!("[1, 2]"));
        assert!(!record.contains_key("missing"));
    }

    #[test]
    fn test_transaction_state_errors() {
        let (conn, _) = mock();
        assert_eq!(conn.commit().unwrap_err().code(), "transaction_state");
        assert_eq!(conn.rollback().unwrap_err().code(), "transaction_state");

        conn.begin().unwrap();
        assert!(conn.in_transaction());
        assert_eq!(conn.begin().unwrap_err().code(), "transaction_state");
        conn.commit().unwrap();
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_transaction_closure_rolls_back_on_error() {
        let (conn, handle) = mock();
        let result: DataResult<()> = conn.transaction(|c| {
            c.run("DELETE FROM items", &Values(Vec::new()))?;
            Err(DataError::search("abort"))
        });
        assert!(result.is_err());
        let sql: Vec<String> = handle.statements().into_iter().map(|s| s.sql).collect();
        assert_eq!(sql, vec!["BEGIN", "DELETE FROM items", "ROLLBACK"]);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_missing_json_capability_fails_fast() {
        let (driver, _) = MockDriver::without_json(Dialect::Sqlite);
        let conn = Connection::new(driver);
        let sub = SubSelect::new("posts", "posts");
        let err = conn.json_array_from(&sub).unwrap_err();
        assert_eq!(err.code(), "driver_capability");
        assert!(!conn.supports_json());
    }

    #[test]
    fn test_close_rolls_back_and_closes_driver() {
        let (conn, handle) = mock();
        conn.begin().unwrap();
        conn.close().unwrap();
        assert!(handle.is_closed());
        assert_eq!(handle.last_sql().as_deref(), Some("ROLLBACK"));
        assert!(conn.all("SELECT 1", &Values(Vec::new())).is_err());
    }
}
