//! Mutator - write façade bound to one entity
//!
//! Writes validate every value through its field before any SQL runs.
//! Relation keys are addressed by reference name:
//!
//! ```json
//! {"title": "hello", "users": {"$set": 1}, "categories": {"$attach": [2, 3]}}
//! ```
//!
//! `$set` writes a foreign key the entity owns (or replaces every link of a
//! many-to-many relation); `$attach` and `$detach` add and remove
//! many-to-many connection rows. A write that touches more than one table
//! runs in a transaction unless one is already open.

use crate::driver::DbError;
use crate::error::{DataError, DataResult};
use crate::manager::EntityManager;
use crate::query::sql::{qualified, quote, Fragment, Ident};
use crate::query::{Filter, ReadOptions};
use crate::relation::{Relation, RelationKind, Side};
use crate::repository::Repository;
use crate::query::sql::Dialect;
use crate::schema::{Action, ColumnType, Entity, PrimaryFormat, PRIMARY_FIELD};
use crate::Record;
use sea_query::{Expr, ExprTrait, Query};
use serde_json::Value;
use std::sync::Arc;

/// Per-call write options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Allow creating records of system entities
    pub trusted: bool,
}

impl WriteOptions {
    pub fn trusted() -> Self {
        WriteOptions { trusted: true }
    }
}

enum LinkOp {
    Attach(Vec<Value>),
    Detach(Vec<Value>),
    Replace(Vec<Value>),
}

struct LinkChange<'m> {
    relation: &'m Relation,
    side: Side,
    op: LinkOp,
}

/// Validated columns plus many-to-many link changes
struct Prepared<'m> {
    columns: Vec<(String, Value)>,
    links: Vec<LinkChange<'m>>,
}

pub struct Mutator<'a> {
    em: &'a EntityManager,
    entity: Arc<Entity>,
}

impl<'a> Mutator<'a> {
    pub(crate) fn new(em: &'a EntityManager, entity: Arc<Entity>) -> Self {
        Self { em, entity }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    fn repo(&self) -> Repository<'a> {
        Repository::new(self.em, Arc::clone(&self.entity))
    }

    pub fn insert_one(&self, data: &Record) -> DataResult<Record> {
        self.insert_one_with(data, WriteOptions::default())
    }

    /// Insert one record and return it as stored
    pub fn insert_one_with(&self, data: &Record, opts: WriteOptions) -> DataResult<Record> {
        let id = self.insert_with_links(data, opts)?;
        self.read_back(id)
    }

    /// Insert every record in one transaction
    pub fn insert_many(&self, rows: &[Record]) -> DataResult<Vec<Record>> {
        self.insert_many_with(rows, WriteOptions::default())
    }

    pub fn insert_many_with(&self, rows: &[Record], opts: WriteOptions) -> DataResult<Vec<Record>> {
        let ids = self.atomic(true, || {
            rows.iter()
                .map(|row| self.insert_with_links(row, opts))
                .collect::<DataResult<Vec<_>>>()
        })?;
        ids.into_iter().map(|id| self.read_back(id)).collect()
    }

    fn insert_with_links(&self, data: &Record, opts: WriteOptions) -> DataResult<Value> {
        if self.entity.is_system() && !opts.trusted {
            return Err(DataError::SystemEntity(self.entity.name.clone()));
        }
        let prepared = self.prepare(data, Action::Create)?;
        self.atomic(!prepared.links.is_empty(), || {
            let id = self.insert_row(&prepared.columns)?;
            self.apply_links(&id, &prepared.links)?;
            Ok(id)
        })
    }

    /// Update the record with primary key `id` and return it
    pub fn update_one(&self, id: impl Into<Value>, data: &Record) -> DataResult<Record> {
        let id = id.into();
        let prepared = self.prepare(data, Action::Update)?;
        let connection = self.em.connection();

        self.atomic(!prepared.links.is_empty(), || {
            if prepared.columns.is_empty() {
                if self.repo().find_id(id.clone())?.is_none() {
                    return Err(self.not_found());
                }
            } else {
                let mut stmt = Query::update();
                stmt.table(Ident::new(&self.entity.name))
                    .values(self.bind_columns(&prepared.columns)?)
                    .and_where(Expr::col(Ident::new(PRIMARY_FIELD)).eq(self.primary_value(&id)?));
                let (sql, values) = connection.dialect().build_update(&stmt);
                if connection.run(&sql, &values)?.num_affected_rows == 0 {
                    return Err(self.not_found());
                }
            }
            self.apply_links(&id, &prepared.links)
        })?;
        self.read_back(id)
    }

    /// Update every record matching `filter`; returns the affected row count
    ///
    /// Relation keys are not accepted here.
    pub fn update_where(&self, filter: &Value, data: &Record) -> DataResult<u64> {
        let prepared = self.prepare(data, Action::Update)?;
        if !prepared.links.is_empty() {
            return Err(DataError::validation(
                &self.entity.name,
                "relation",
                "relation changes need a single record, use update_one",
            ));
        }
        let condition = self.required_filter(filter)?;
        if prepared.columns.is_empty() {
            return Ok(0);
        }
        let connection = self.em.connection();
        let mut stmt = Query::update();
        stmt.table(Ident::new(&self.entity.name))
            .values(self.bind_columns(&prepared.columns)?)
            .and_where(condition.into_expr(connection.dialect()));
        let (sql, values) = connection.dialect().build_update(&stmt);
        Ok(connection.run(&sql, &values)?.num_affected_rows)
    }

    /// Delete the record with primary key `id` and return it as it was
    pub fn delete_one(&self, id: impl Into<Value>) -> DataResult<Record> {
        let id = id.into();
        let record = self.repo().read_one(id.clone())?;
        let connection = self.em.connection();
        let primary = self.primary_value(&id)?;
        let links = self.link_tables();

        self.atomic(!links.is_empty(), || {
            for (table, column) in &links {
                let mut stmt = Query::delete();
                stmt.from_table(Ident::new(table))
                    .and_where(Expr::col(Ident::new(column)).eq(primary.clone()));
                let (sql, values) = connection.dialect().build_delete(&stmt);
                connection.run(&sql, &values)?;
            }
            let mut stmt = Query::delete();
            stmt.from_table(Ident::new(&self.entity.name))
                .and_where(Expr::col(Ident::new(PRIMARY_FIELD)).eq(primary.clone()));
            let (sql, values) = connection.dialect().build_delete(&stmt);
            connection.run(&sql, &values)?;
            Ok(())
        })?;
        Ok(record)
    }

    /// Delete every record matching `filter`; returns the deleted row count
    pub fn delete_where(&self, filter: &Value) -> DataResult<u64> {
        let condition = self.required_filter(filter)?;
        let connection = self.em.connection();
        let dialect = connection.dialect();
        let links = self.link_tables();

        self.atomic(!links.is_empty(), || {
            for (table, column) in &links {
                // connection rows of every matching record
                let mut matching = Fragment::new(format!(
                    "{} IN (SELECT {} FROM {} WHERE ",
                    qualified(table, column),
                    qualified(&self.entity.name, PRIMARY_FIELD),
                    quote(&self.entity.name)
                ));
                matching.push(condition.clone());
                matching.push_str(")");

                let mut stmt = Query::delete();
                stmt.from_table(Ident::new(table))
                    .and_where(matching.into_expr(dialect));
                let (sql, values) = dialect.build_delete(&stmt);
                connection.run(&sql, &values)?;
            }
            let mut stmt = Query::delete();
            stmt.from_table(Ident::new(&self.entity.name))
                .and_where(condition.clone().into_expr(dialect));
            let (sql, values) = dialect.build_delete(&stmt);
            Ok(connection.run(&sql, &values)?.num_affected_rows)
        })
    }

    fn not_found(&self) -> DataError {
        DataError::NotFound {
            entity: self.entity.name.clone(),
        }
    }

    fn read_back(&self, id: Value) -> DataResult<Record> {
        self.repo().find_id(id)?.ok_or_else(|| self.not_found())
    }

    fn atomic<T>(&self, needed: bool, f: impl FnOnce() -> DataResult<T>) -> DataResult<T> {
        let connection = self.em.connection();
        if !needed || connection.in_transaction() {
            return f();
        }
        connection.transaction(|_| f())
    }

    fn required_filter(&self, filter: &Value) -> DataResult<Fragment> {
        Filter::new(
            self.em,
            &self.entity,
            self.entity.name.clone(),
            ReadOptions::default(),
        )
        .compile(filter)?
        .ok_or_else(|| DataError::search("bulk writes need a non-empty where"))
    }

    fn primary_value(&self, id: &Value) -> DataResult<sea_query::Value> {
        self.entity.get_primary_field().to_db_value(id)
    }

    fn bind_columns(&self, columns: &[(String, Value)]) -> DataResult<Vec<(Ident, Expr)>> {
        columns
            .iter()
            .map(|(name, value)| {
                let field = self.entity.get_field(name)?;
                Ok((Ident::new(name), Expr::val(field.to_db_value(value)?)))
            })
            .collect()
    }

    /// Split `data` into field values and relation changes, then validate
    fn prepare(&self, data: &Record, action: Action) -> DataResult<Prepared<'a>> {
        let mut values = Record::new();
        let mut links = Vec::new();

        for (key, value) in data {
            if let Some(field) = self.entity.find_field(key) {
                if !field.is_fillable(Some(action)) {
                    return Err(DataError::validation(
                        key,
                        "fillable",
                        format!("is not fillable on {}", action.as_str()),
                    ));
                }
                values.insert(key.clone(), value.clone());
                continue;
            }
            let (relation, side) = match self.em.relation_of(&self.entity.name, key) {
                Ok(found) => found,
                Err(DataError::RelationNotFound { .. }) => {
                    return Err(DataError::FieldNotFound {
                        entity: self.entity.name.clone(),
                        field: key.clone(),
                    })
                }
                Err(other) => return Err(other),
            };
            match self.link_op(relation, side, key, value)? {
                Some(op) => links.push(LinkChange { relation, side, op }),
                None => {
                    // `$set` on an owned foreign key becomes a plain column write
                    let (_, fk) = relation.foreign_key().ok_or_else(|| {
                        DataError::validation(key, "relation", "relation has no foreign key")
                    })?;
                    values.insert(fk, set_operand(value));
                }
            }
        }

        let mut columns = Vec::new();
        match action {
            Action::Create => {
                for field in self.entity.fields() {
                    if field.is_primary() {
                        if let Some(id) = field.get_new_value() {
                            columns.push((field.name.clone(), id));
                        }
                        continue;
                    }
                    if let Some(value) = field.transform_persist(values.get(&field.name), action)? {
                        columns.push((field.name.clone(), value));
                    }
                }
            }
            _ => {
                for (key, value) in &values {
                    let field = self.entity.get_field(key)?;
                    if let Some(value) = field.transform_persist(Some(value), action)? {
                        columns.push((key.clone(), value));
                    }
                }
            }
        }
        Ok(Prepared { columns, links })
    }

    /// `None` for a `$set` that writes this entity's own foreign key
    fn link_op(
        &self,
        relation: &Relation,
        side: Side,
        key: &str,
        value: &Value,
    ) -> DataResult<Option<LinkOp>> {
        let invalid = |message: String| DataError::validation(key, "relation", message);
        let (op, operand) = match value.as_object() {
            Some(ops) if ops.len() == 1 => ops
                .iter()
                .next()
                .ok_or_else(|| invalid("expects one operation".to_string()))?,
            _ => {
                return Err(invalid(
                    "expects exactly one of $set, $attach or $detach".to_string(),
                ))
            }
        };

        match (op.as_str(), relation.kind()) {
            ("$set", RelationKind::ManyToMany) => Ok(Some(LinkOp::Replace(ids(operand)))),
            ("$set", _) => match relation.foreign_key() {
                Some((holder, _)) if holder == side => Ok(None),
                _ => Err(invalid(format!(
                    "the foreign key of {relation} is stored on {}",
                    relation.other(side).entity
                ))),
            },
            ("$attach", RelationKind::ManyToMany) => Ok(Some(LinkOp::Attach(ids(operand)))),
            ("$detach", RelationKind::ManyToMany) => Ok(Some(LinkOp::Detach(ids(operand)))),
            ("$attach" | "$detach", kind) => Err(invalid(format!(
                "{op} needs a manyToMany relation, {key} is {kind}"
            ))),
            (other, _) => Err(invalid(format!("unknown relation operation \"{other}\""))),
        }
    }

    fn insert_row(&self, columns: &[(String, Value)]) -> DataResult<Value> {
        let connection = self.em.connection();
        let dialect = connection.dialect();
        let primary = self.entity.get_primary_field();

        let mut stmt = Query::insert();
        stmt.into_table(Ident::new(&self.entity.name));
        if columns.is_empty() {
            stmt.or_default_values();
        } else {
            let (names, exprs): (Vec<Ident>, Vec<Expr>) = self.bind_columns(columns)?.into_iter().unzip();
            stmt.columns(names);
            stmt.values(exprs)
                .map_err(|e| DataError::Driver(DbError::Query(e.to_string())))?;
        }
        let generated = primary.column_type() == ColumnType::Primary(PrimaryFormat::Integer);
        if generated && dialect == Dialect::Postgres {
            stmt.returning_col(Ident::new(PRIMARY_FIELD));
        }

        let (sql, values) = dialect.build_insert(&stmt);
        let result = connection.run(&sql, &values)?;

        if let Some((_, id)) = columns.iter().find(|(name, _)| name == &primary.name) {
            return Ok(id.clone());
        }
        result
            .insert_id
            .map(Value::from)
            .ok_or_else(|| DataError::Driver(DbError::Query(format!(
                "insert into {} reported no id",
                self.entity.name
            ))))
    }

    fn apply_links(&self, id: &Value, links: &[LinkChange<'_>]) -> DataResult<()> {
        let connection = self.em.connection();
        let dialect = connection.dialect();

        for link in links {
            let table = link.relation.connection_entity()?.ok_or_else(|| {
                DataError::EntityNotFound(link.relation.connection_table_name().unwrap_or_default())
            })?;
            let (source_col, target_col) = link.relation.connection_columns().ok_or_else(|| {
                DataError::validation(&table.name, "relation", "missing connection columns")
            })?;
            let (own_col, other_col) = match link.side {
                Side::Source => (source_col, target_col),
                Side::Target => (target_col, source_col),
            };
            let own_field = table.get_field(&own_col)?;
            let other_field = table.get_field(&other_col)?;
            let own = own_field.to_db_value(id)?;

            let (remove, add): (Option<&[Value]>, &[Value]) = match &link.op {
                LinkOp::Attach(others) => (None, others),
                LinkOp::Detach(others) if others.is_empty() => continue,
                LinkOp::Detach(others) => (Some(others), &[]),
                // an empty removal list clears every link
                LinkOp::Replace(others) => (Some(&[]), others),
            };

            if let Some(others) = remove {
                let mut stmt = Query::delete();
                stmt.from_table(Ident::new(&table.name))
                    .and_where(Expr::col(Ident::new(&own_col)).eq(own.clone()));
                if !others.is_empty() {
                    let values = others
                        .iter()
                        .map(|v| other_field.to_db_value(v))
                        .collect::<DataResult<Vec<_>>>()?;
                    stmt.and_where(Expr::col(Ident::new(&other_col)).is_in(values));
                }
                let (sql, values) = dialect.build_delete(&stmt);
                connection.run(&sql, &values)?;
            }

            if !add.is_empty() {
                let mut stmt = Query::insert();
                stmt.into_table(Ident::new(&table.name))
                    .columns([Ident::new(&own_col), Ident::new(&other_col)]);
                for other in add {
                    let other = other_field.to_db_value(other)?;
                    stmt.values([Expr::val(own.clone()), Expr::val(other)])
                        .map_err(|e| DataError::Driver(DbError::Query(e.to_string())))?;
                }
                let (sql, values) = dialect.build_insert(&stmt);
                connection.run(&sql, &values)?;
            }
        }
        Ok(())
    }

    /// Connection tables and the column pointing at this entity
    fn link_tables(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for relation in self.em.relations_of(&self.entity.name) {
            if relation.kind() != RelationKind::ManyToMany {
                continue;
            }
            let (Some(table), Some((source_col, target_col))) =
                (relation.connection_table_name(), relation.connection_columns())
            else {
                continue;
            };
            if relation.source().entity == self.entity.name {
                out.push((table.clone(), source_col));
            }
            if relation.target().entity == self.entity.name {
                out.push((table, target_col));
            }
        }
        out
    }
}

/// The write value of `{"$set": v}`
fn set_operand(value: &Value) -> Value {
    value
        .as_object()
        .and_then(|ops| ops.get("$set"))
        .cloned()
        .unwrap_or(Value::Null)
}

/// A single id or an array of ids
fn ids(operand: &Value) -> Vec<Value> {
    match operand {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}
