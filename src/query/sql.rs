//! SQL fragments and correlated sub-selects.
//!
//! Outer statements are built with SeaQuery. Correlated sub-selects used by
//! eager loading and relation filters are rendered here into a [`Fragment`]
//! (SQL text with `?` placeholders plus values) and attached to the outer
//! statement with [`Fragment::into_expr`]. SeaQuery's PostgreSQL builder
//! expects `$n` in custom expressions, so placeholders are renumbered for
//! that dialect and the builder then shifts them into the statement's own
//! numbering.
//!
//! Fragments must never contain a literal `?` outside quotes; values always
//! travel as placeholders.

use sea_query::{
    DeleteStatement, Expr, Iden, InsertStatement, PostgresQueryBuilder, SelectStatement,
    SqliteQueryBuilder, TableCreateStatement, UpdateStatement, Value, Values,
};
use serde::{Deserialize, Serialize};

/// SQL dialect spoken by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    /// Build a SELECT with this dialect's query builder
    pub fn build_select(&self, stmt: &SelectStatement) -> (String, Values) {
        match self {
            Dialect::Sqlite => stmt.build(SqliteQueryBuilder),
            Dialect::Postgres => stmt.build(PostgresQueryBuilder),
        }
    }

    pub fn build_insert(&self, stmt: &InsertStatement) -> (String, Values) {
        match self {
            Dialect::Sqlite => stmt.build(SqliteQueryBuilder),
            Dialect::Postgres => stmt.build(PostgresQueryBuilder),
        }
    }

    pub fn build_update(&self, stmt: &UpdateStatement) -> (String, Values) {
        match self {
            Dialect::Sqlite => stmt.build(SqliteQueryBuilder),
            Dialect::Postgres => stmt.build(PostgresQueryBuilder),
        }
    }

    pub fn build_delete(&self, stmt: &DeleteStatement) -> (String, Values) {
        match self {
            Dialect::Sqlite => stmt.build(SqliteQueryBuilder),
            Dialect::Postgres => stmt.build(PostgresQueryBuilder),
        }
    }

    /// DDL statements carry no parameters
    pub fn build_table(&self, stmt: &TableCreateStatement) -> String {
        match self {
            Dialect::Sqlite => stmt.build(SqliteQueryBuilder),
            Dialect::Postgres => stmt.build(PostgresQueryBuilder),
        }
    }
}

/// Runtime identifier for SeaQuery statements
///
/// Entity and field names are only known at runtime, so tables and columns
/// are wrapped in this owned identifier instead of a derived `Iden` enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(pub String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Ident(name.into())
    }
}

impl Iden for Ident {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

/// Quote an identifier with double quotes (shared by SQLite and PostgreSQL)
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"alias"."column"`
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quote(alias), quote(column))
}

/// SQL text with `?` placeholders and the values bound to them, in order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pub sql: String,
    pub values: Vec<Value>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    /// Append another fragment, keeping placeholder order intact
    pub fn push(&mut self, other: Fragment) {
        self.sql.push_str(&other.sql);
        self.values.extend(other.values);
    }

    pub fn push_str(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Join fragments with a separator (`" AND "`, `", "`)
    pub fn join(parts: Vec<Fragment>, separator: &str) -> Fragment {
        let mut out = Fragment::default();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out.push_str(separator);
            }
            out.push(part);
        }
        out
    }

    /// Wrap in parentheses
    pub fn parenthesized(self) -> Fragment {
        Fragment {
            sql: format!("({})", self.sql),
            values: self.values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Custom SeaQuery expression carrying the fragment's values
    pub fn into_expr(self, dialect: Dialect) -> Expr {
        let sql = match dialect {
            Dialect::Sqlite => self.sql,
            Dialect::Postgres => number_placeholders(&self.sql),
        };
        Expr::cust_with_values(sql, self.values)
    }
}

/// `?` outside quotes becomes `$1`, `$2`, ...; a bare `$` is escaped as `$$`
fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut n = 0;
    for c in sql.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (Some(_), c) => out.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                out.push(c);
            }
            (None, '?') => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            (None, '$') => out.push_str("$$"),
            (None, c) => out.push(c),
        }
    }
    out
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }

    pub fn to_order(self) -> sea_query::Order {
        match self {
            SortDir::Asc => sea_query::Order::Asc,
            SortDir::Desc => sea_query::Order::Desc,
        }
    }
}

/// A column of a sub-select
#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    /// A field of the sub-select's own table
    Field(String),
    /// A nested JSON aggregate, selected under `alias`
    Nested { alias: String, fragment: Fragment },
}

impl SelectColumn {
    pub fn name(&self) -> &str {
        match self {
            SelectColumn::Field(name) => name,
            SelectColumn::Nested { alias, .. } => alias,
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, SelectColumn::Nested { .. })
    }
}

/// `INNER JOIN table AS alias ON left = right`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub table: String,
    pub alias: String,
    /// Qualified column on the joined table
    pub left: String,
    /// Qualified column it must equal
    pub right: String,
}

impl JoinClause {
    pub fn on_sql(&self) -> String {
        format!("{} = {}", self.left, self.right)
    }
}

/// A correlated sub-select over one table
///
/// Produced by `Relation::build_with`; the with compiler adds columns,
/// filters and nested aggregates before handing it to the connection's JSON
/// aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct SubSelect {
    pub table: String,
    pub alias: String,
    pub columns: Vec<SelectColumn>,
    pub joins: Vec<JoinClause>,
    pub conditions: Vec<Fragment>,
    pub order_by: Vec<(String, SortDir)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SubSelect {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Column names as they appear in the rendered select list
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(SelectColumn::name).collect()
    }

    /// Render `SELECT ... FROM ... [JOIN ...] WHERE ... ORDER BY ... LIMIT ...`
    pub fn render(&self, dialect: Dialect) -> Fragment {
        let mut out = Fragment::new("SELECT ");
        if self.columns.is_empty() {
            out.push_str(&format!("{}.*", quote(&self.alias)));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            match column {
                SelectColumn::Field(name) => out.push_str(&format!(
                    "{} AS {}",
                    qualified(&self.alias, name),
                    quote(name)
                )),
                SelectColumn::Nested { alias, fragment } => {
                    out.push(fragment.clone());
                    out.push_str(&format!(" AS {}", quote(alias)));
                }
            }
        }
        out.push_str(&format!(
            " FROM {} AS {}",
            quote(&self.table),
            quote(&self.alias)
        ));
        for join in &self.joins {
            out.push_str(&format!(
                " INNER JOIN {} AS {} ON {}",
                quote(&join.table),
                quote(&join.alias),
                join.on_sql()
            ));
        }
        if !self.conditions.is_empty() {
            out.push_str(" WHERE ");
            out.push(Fragment::join(self.conditions.clone(), " AND "));
        }
        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(col, dir)| format!("{} {}", qualified(&self.alias, col), dir.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(" ORDER BY {order}"));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                out.push_str(&format!(" LIMIT {limit} OFFSET {offset}"))
            }
            (Some(limit), None) => out.push_str(&format!(" LIMIT {limit}")),
            // SQLite needs a LIMIT before OFFSET, -1 means unbounded
            (None, Some(offset)) => match dialect {
                Dialect::Sqlite => out.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                Dialect::Postgres => out.push_str(&format!(" OFFSET {offset}")),
            },
            (None, None) => {}
        }
        out
    }
}
