//! Driver Module
//!
//! Provides the [`Driver`] trait that abstracts one physical database engine.
//!
//! A driver only knows how to run SQL and hand back rows as JSON records; the
//! [`Connection`](crate::connection::Connection) wraps it with transaction
//! state, result normalization, logging and metrics. Drivers available:
//!
//! - [`SqliteDriver`](sqlite::SqliteDriver) (feature `sqlite`): embedded SQLite via `rusqlite`
//! - [`PostgresDriver`](postgres::PostgresDriver) (feature `postgres`): `may_postgres`
//! - [`MockDriver`](mock::MockDriver) (feature `mock`, unit tests): records statements

use crate::query::sql::{quote, Dialect, Fragment, SelectColumn, SubSelect};
use crate::Record;
use sea_query::{Value, Values};
use serde::Serialize;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Driver error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// SQLite error from `rusqlite`
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// PostgreSQL error from `may_postgres`
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] may_postgres::Error),
    /// Invalid connection parameters
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
    /// Query execution error
    #[error("Query error: {0}")]
    Query(String),
    /// Row parsing/conversion error
    #[error("Parse error: {0}")]
    Parse(String),
    /// The driver was closed
    #[error("Connection is closed")]
    Closed,
    /// Other execution errors
    #[error("Execution error: {0}")]
    Other(String),
}

/// Driver-neutral parameter, produced from a SeaQuery [`Value`]
///
/// Small integer widths collapse to `i64` and floats to `f64`; each driver
/// maps these onto its own bind types.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Param {
    pub fn from_value(value: &Value) -> Result<Param, DbError> {
        let param = match value {
            Value::Bool(Some(b)) => Param::Bool(*b),
            Value::TinyInt(Some(i)) => Param::Int(i64::from(*i)),
            Value::SmallInt(Some(i)) => Param::Int(i64::from(*i)),
            Value::Int(Some(i)) => Param::Int(i64::from(*i)),
            Value::BigInt(Some(i)) => Param::Int(*i),
            Value::TinyUnsigned(Some(u)) => Param::Int(i64::from(*u)),
            Value::SmallUnsigned(Some(u)) => Param::Int(i64::from(*u)),
            Value::Unsigned(Some(u)) => Param::Int(i64::from(*u)),
            Value::BigUnsigned(Some(u)) => Param::Int(i64::try_from(*u).map_err(|_| {
                DbError::Other(format!(
                    "BigUnsigned value {u} exceeds i64::MAX, cannot be bound"
                ))
            })?),
            Value::Float(Some(f)) => Param::Float(f64::from(*f)),
            Value::Double(Some(d)) => Param::Float(*d),
            Value::String(Some(s)) => Param::Text(s.to_string()),
            Value::Char(Some(c)) => Param::Text(c.to_string()),
            Value::Bytes(Some(b)) => Param::Bytes(b.to_vec()),
            Value::Json(Some(j)) => Param::Json(serde_json::Value::clone(j)),
            Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None) => Param::Null,
            _ => {
                return Err(DbError::Other(format!(
                    "Unsupported value type in query: {value:?}"
                )))
            }
        };
        Ok(param)
    }

    /// Convert every value of a built statement, in placeholder order
    pub fn from_values(values: &Values) -> Result<Vec<Param>, DbError> {
        values.iter().map(Param::from_value).collect()
    }
}

/// Outcome of a write statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunResult {
    /// Generated primary key of the last inserted row, when the engine reports one
    pub insert_id: Option<i64>,
    pub num_affected_rows: u64,
}

impl RunResult {
    /// JSON form, applying the safe-integer policy of [`normalize_integer`]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "insertId": self.insert_id.map(|id| normalize_integer(i128::from(id))),
            "numAffectedRows": normalize_integer(i128::from(self.num_affected_rows)),
        })
    }
}

impl Serialize for RunResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Largest integer every JSON consumer can represent exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: i128 = 9_007_199_254_740_991;

/// Integers inside `±MAX_SAFE_INTEGER` become JSON numbers; anything outside
/// is emitted as a decimal string so no precision is lost.
pub fn normalize_integer(value: i128) -> serde_json::Value {
    if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
        // Inside the safe range the value fits i64
        serde_json::Value::from(value as i64)
    } else {
        serde_json::Value::String(value.to_string())
    }
}

/// Engine-native JSON aggregation used by eager loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonFlavor {
    /// `json_object` / `json_group_array`
    Sqlite,
    /// `to_json` / `json_agg`
    Postgres,
}

impl JsonFlavor {
    /// Wrap `sub` so it yields a single JSON object (or NULL)
    pub fn object_from(&self, sub: &SubSelect) -> Fragment {
        let inner = sub.render(self.dialect());
        match self {
            JsonFlavor::Sqlite => {
                let mut out = Fragment::new(format!(
                    "(SELECT json_object({}) FROM (",
                    sqlite_object_args(sub, "obj")
                ));
                out.push(inner);
                out.push_str(") AS \"obj\")");
                out
            }
            JsonFlavor::Postgres => {
                let mut out = Fragment::new("(SELECT to_json(\"obj\") FROM (");
                out.push(inner);
                out.push_str(") AS \"obj\")");
                out
            }
        }
    }

    /// Wrap `sub` so it yields a JSON array (empty array when no rows match)
    pub fn array_from(&self, sub: &SubSelect) -> Fragment {
        let inner = sub.render(self.dialect());
        match self {
            JsonFlavor::Sqlite => {
                let mut out = Fragment::new(format!(
                    "(SELECT coalesce(json_group_array(json_object({})), '[]') FROM (",
                    sqlite_object_args(sub, "agg")
                ));
                out.push(inner);
                out.push_str(") AS \"agg\")");
                out
            }
            JsonFlavor::Postgres => {
                let mut out = Fragment::new("(SELECT coalesce(json_agg(\"agg\"), '[]'::json) FROM (");
                out.push(inner);
                out.push_str(") AS \"agg\")");
                out
            }
        }
    }

    fn dialect(&self) -> Dialect {
        match self {
            JsonFlavor::Sqlite => Dialect::Sqlite,
            JsonFlavor::Postgres => Dialect::Postgres,
        }
    }
}

/// `'id', "agg"."id", 'comments', json("agg"."comments")`
///
/// Nested aggregates come out of the derived table as JSON text; `json()`
/// re-marks them as JSON so they embed as values instead of strings.
fn sqlite_object_args(sub: &SubSelect, alias: &str) -> String {
    sub.columns
        .iter()
        .map(|column| {
            let name = column.name();
            let key = format!("'{}'", name.replace('\'', "''"));
            let col = format!("{}.{}", quote(alias), quote(name));
            match column {
                SelectColumn::Nested { .. } => format!("{key}, json({col})"),
                SelectColumn::Field(_) => format!("{key}, {col}"),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Trait for one physical database handle
///
/// Implementations run a statement and return rows as JSON [`Record`]s with
/// column names as keys. Parameters arrive as SeaQuery [`Values`] in
/// placeholder order. The [`Connection`](crate::connection::Connection)
/// serializes access, so methods take `&mut self`.
pub trait Driver: Send {
    /// Short driver name used in logs and capability errors
    fn name(&self) -> &'static str;

    /// SQL dialect used to build statements for this driver
    fn dialect(&self) -> Dialect;

    /// JSON aggregation capability, `None` when the engine has none
    fn json_flavor(&self) -> Option<JsonFlavor> {
        match self.dialect() {
            Dialect::Sqlite => Some(JsonFlavor::Sqlite),
            Dialect::Postgres => Some(JsonFlavor::Postgres),
        }
    }

    /// Execute a query and return all rows
    fn query_all(&mut self, sql: &str, params: &Values) -> Result<Vec<Record>, DbError>;

    /// Execute a write statement
    fn run(&mut self, sql: &str, params: &Values) -> Result<RunResult, DbError>;

    /// Execute a single statement without parameters (DDL, BEGIN/COMMIT)
    fn execute_raw(&mut self, sql: &str) -> Result<(), DbError>;

    /// Release the underlying handle; later calls fail with [`DbError::Closed`]
    fn close(&mut self) -> Result<(), DbError>;
}
