//! Embedded SQLite driver backed by `rusqlite`.

use super::{normalize_integer, DbError, Driver, Param, RunResult};
use crate::query::sql::Dialect;
use crate::Record;
use rusqlite::types::Value as SqliteValue;
use rusqlite::{params_from_iter, Connection as SqliteConnection};
use sea_query::Values;
use std::path::Path;

/// A single SQLite database handle
pub struct SqliteDriver {
    conn: Option<SqliteConnection>,
}

impl SqliteDriver {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        log::debug!("opening sqlite database at {}", path.display());
        let conn = SqliteConnection::open(path)?;
        Ok(Self { conn: Some(conn) })
    }

    /// Private in-memory database, gone when the driver is closed
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = SqliteConnection::open_in_memory()?;
        Ok(Self { conn: Some(conn) })
    }

    /// Wrap an existing `rusqlite` connection
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self { conn: Some(conn) }
    }

    fn conn(&self) -> Result<&SqliteConnection, DbError> {
        self.conn.as_ref().ok_or(DbError::Closed)
    }
}

fn to_sqlite(param: Param) -> Result<SqliteValue, DbError> {
    Ok(match param {
        Param::Null => SqliteValue::Null,
        Param::Bool(b) => SqliteValue::Integer(i64::from(b)),
        Param::Int(i) => SqliteValue::Integer(i),
        Param::Float(f) => SqliteValue::Real(f),
        Param::Text(s) => SqliteValue::Text(s),
        Param::Bytes(b) => SqliteValue::Blob(b),
        Param::Json(j) => SqliteValue::Text(
            serde_json::to_string(&j)
                .map_err(|e| DbError::Other(format!("Failed to serialize JSON: {e}")))?,
        ),
    })
}

fn bind(params: &Values) -> Result<Vec<SqliteValue>, DbError> {
    Param::from_values(params)?
        .into_iter()
        .map(to_sqlite)
        .collect()
}

fn from_sqlite(value: SqliteValue) -> serde_json::Value {
    match value {
        SqliteValue::Null => serde_json::Value::Null,
        SqliteValue::Integer(i) => normalize_integer(i128::from(i)),
        SqliteValue::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqliteValue::Text(s) => serde_json::Value::String(s),
        SqliteValue::Blob(b) => serde_json::Value::Array(
            b.into_iter().map(serde_json::Value::from).collect(),
        ),
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("INSERT"))
}

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query_all(&mut self, sql: &str, params: &Values) -> Result<Vec<Record>, DbError> {
        let conn = self.conn()?;
        let values = bind(params)?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query(params_from_iter(values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, column) in columns.iter().enumerate() {
                let value: SqliteValue = row.get(i)?;
                record.insert(column.clone(), from_sqlite(value));
            }
            records.push(record);
        }
        Ok(records)
    }

    fn run(&mut self, sql: &str, params: &Values) -> Result<RunResult, DbError> {
        let conn = self.conn()?;
        let values = bind(params)?;
        let mut stmt = conn.prepare(sql)?;
        let num_affected_rows = stmt.execute(params_from_iter(values))? as u64;
        let insert_id = if is_insert(sql) && num_affected_rows > 0 {
            Some(conn.last_insert_rowid())
        } else {
            None
        };
        Ok(RunResult {
            insert_id,
            num_affected_rows,
        })
    }

    fn execute_raw(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DbError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| DbError::Sqlite(e))?;
        }
        Ok(())
    }
}
