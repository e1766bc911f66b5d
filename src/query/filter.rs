//! `where` compilation.
//!
//! A filter is a JSON object. Keys are field names, `relationRef.field`
//! paths, or the `$and` / `$or` groups. A field maps to a scalar (equality),
//! an array (`$in`) or an object of operators:
//!
//! | operator | SQL |
//! |---|---|
//! | `$eq`, `$ne` | `=`, `<>` (`IS [NOT] NULL` for null) |
//! | `$gt`, `$gte`, `$lt`, `$lte` | `>`, `>=`, `<`, `<=` |
//! | `$like` | `LIKE`, with `*` as the wildcard; `%` and `_` match literally |
//! | `$in`, `$notin` | `IN (...)`, `NOT IN (...)` |
//! | `$between` | `BETWEEN ? AND ?` |
//! | `$isnull` | `IS NULL` / `IS NOT NULL` |
//!
//! Relation paths compile to `EXISTS` over the relation's join sub-select,
//! so they narrow the base rows without multiplying them.

use super::sql::{qualified, Dialect, Fragment, SelectColumn};
use super::{readable_field, with, ReadOptions};
use crate::error::{DataError, DataResult};
use crate::manager::EntityManager;
use crate::schema::{Entity, Field, PRIMARY_FIELD};
use serde_json::{Map, Value};

const LIKE_ESCAPE: char = '!';

/// `*` becomes `%`; the characters `LIKE` treats specially are escaped
fn like_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => out.push('%'),
            '%' | '_' | LIKE_ESCAPE => {
                out.push(LIKE_ESCAPE);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Compiles filters for one entity selected under one alias
pub struct Filter<'a> {
    em: &'a EntityManager,
    entity: &'a Entity,
    alias: String,
    opts: ReadOptions,
    dialect: Dialect,
}

impl<'a> Filter<'a> {
    pub fn new(
        em: &'a EntityManager,
        entity: &'a Entity,
        alias: impl Into<String>,
        opts: ReadOptions,
    ) -> Self {
        Self {
            em,
            entity,
            alias: alias.into(),
            opts,
            dialect: em.connection().dialect(),
        }
    }

    /// Compile `filter` into one condition, `None` for an empty object
    pub fn compile(&self, filter: &Value) -> DataResult<Option<Fragment>> {
        let map = filter
            .as_object()
            .ok_or_else(|| DataError::search(format!("where must be an object, got {filter}")))?;
        let parts = self.compile_map(map)?;
        if parts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Fragment::join(parts, " AND ")))
        }
    }

    fn compile_map(&self, map: &Map<String, Value>) -> DataResult<Vec<Fragment>> {
        let mut parts = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                "$and" => parts.push(self.group(key, value, " AND ")?),
                "$or" => parts.push(self.group(key, value, " OR ")?),
                op if op.starts_with('$') => {
                    return Err(DataError::search(format!(
                        "unknown group operator \"{op}\""
                    )))
                }
                path => match path.split_once('.') {
                    Some((reference, rest)) => parts.push(self.related(reference, rest, value)?),
                    None => parts.extend(self.field_conditions(path, value)?),
                },
            }
        }
        Ok(parts)
    }

    fn group(&self, op: &str, value: &Value, separator: &str) -> DataResult<Fragment> {
        let items = value
            .as_array()
            .ok_or_else(|| DataError::search(format!("{op} expects an array of objects")))?;
        let mut branches = Vec::with_capacity(items.len());
        for item in items {
            let map = item
                .as_object()
                .ok_or_else(|| DataError::search(format!("{op} expects an array of objects")))?;
            let conditions = self.compile_map(map)?;
            if !conditions.is_empty() {
                branches.push(Fragment::join(conditions, " AND ").parenthesized());
            }
        }
        if branches.is_empty() {
            // empty AND holds, empty OR never does
            return Ok(Fragment::new(if op == "$and" { "1 = 1" } else { "1 = 0" }));
        }
        Ok(Fragment::join(branches, separator).parenthesized())
    }

    fn related(&self, reference: &str, rest: &str, value: &Value) -> DataResult<Fragment> {
        let (relation, side) = with::resolve_relation(self.em, &self.entity.name, reference)?;
        let other: &Entity = relation.entity(side.opposite())?;
        let alias = format!("{}_{}", self.alias, reference);

        let mut sub = relation.build_join(&self.entity.name, reference, &self.alias, &alias)?;
        sub.columns.push(SelectColumn::Field(PRIMARY_FIELD.to_string()));

        let nested = Filter {
            em: self.em,
            entity: other,
            alias,
            opts: self.opts,
            dialect: self.dialect,
        };
        let mut map = Map::new();
        map.insert(rest.to_string(), value.clone());
        sub.conditions.extend(nested.compile_map(&map)?);

        let mut out = Fragment::new("EXISTS (");
        out.push(sub.render(self.dialect));
        out.push_str(")");
        Ok(out)
    }

    fn field_conditions(&self, name: &str, value: &Value) -> DataResult<Vec<Fragment>> {
        let field = readable_field(self.entity, name, self.opts)?;
        let column = qualified(&self.alias, name);
        match value {
            Value::Object(ops) if ops.is_empty() => Err(DataError::search(format!(
                "empty operator object for \"{name}\""
            ))),
            Value::Object(ops) => ops
                .iter()
                .map(|(op, operand)| self.operator(field, &column, op, operand))
                .collect(),
            Value::Array(_) => Ok(vec![self.operator(field, &column, "$in", value)?]),
            _ => Ok(vec![self.operator(field, &column, "$eq", value)?]),
        }
    }

    fn operator(
        &self,
        field: &Field,
        column: &str,
        op: &str,
        operand: &Value,
    ) -> DataResult<Fragment> {
        let fragment = match op {
            "$eq" if operand.is_null() => Fragment::new(format!("{column} IS NULL")),
            "$ne" if operand.is_null() => Fragment::new(format!("{column} IS NOT NULL")),
            "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
                let symbol = match op {
                    "$eq" => "=",
                    "$ne" => "<>",
                    "$gt" => ">",
                    "$gte" => ">=",
                    "$lt" => "<",
                    _ => "<=",
                };
                Fragment::with_values(
                    format!("{column} {symbol} ?"),
                    vec![self.bind(field, operand)?],
                )
            }
            "$like" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    DataError::search(format!("$like on \"{}\" expects a string", field.name))
                })?;
                Fragment::with_values(
                    format!("{column} LIKE ? ESCAPE '{LIKE_ESCAPE}'"),
                    vec![sea_query::Value::from(like_pattern(pattern))],
                )
            }
            "$in" | "$notin" => {
                let items = operand.as_array().ok_or_else(|| {
                    DataError::search(format!("{op} on \"{}\" expects an array", field.name))
                })?;
                if items.is_empty() {
                    return Ok(Fragment::new(if op == "$in" { "1 = 0" } else { "1 = 1" }));
                }
                let values = items
                    .iter()
                    .map(|item| self.bind(field, item))
                    .collect::<DataResult<Vec<_>>>()?;
                let placeholders = vec!["?"; values.len()].join(", ");
                let keyword = if op == "$in" { "IN" } else { "NOT IN" };
                Fragment::with_values(format!("{column} {keyword} ({placeholders})"), values)
            }
            "$between" => match operand.as_array().map(Vec::as_slice) {
                Some([low, high]) => Fragment::with_values(
                    format!("{column} BETWEEN ? AND ?"),
                    vec![self.bind(field, low)?, self.bind(field, high)?],
                ),
                _ => {
                    return Err(DataError::search(format!(
                        "$between on \"{}\" expects [low, high]",
                        field.name
                    )))
                }
            },
            "$isnull" => match operand.as_bool() {
                Some(true) => Fragment::new(format!("{column} IS NULL")),
                Some(false) => Fragment::new(format!("{column} IS NOT NULL")),
                None => {
                    return Err(DataError::search(format!(
                        "$isnull on \"{}\" expects a boolean",
                        field.name
                    )))
                }
            },
            other => {
                return Err(DataError::search(format!(
                    "unknown operator \"{other}\" on \"{}\"",
                    field.name
                )))
            }
        };
        Ok(fragment)
    }

    fn bind(&self, field: &Field, value: &Value) -> DataResult<sea_query::Value> {
        field
            .to_db_value(value)
            .map_err(|e| DataError::search(format!("bad filter value for \"{}\": {e}", field.name)))
    }
}
