//! Repository - read façade bound to one entity
//!
//! Every read is compiled into a single SeaQuery `SELECT`. Eager loads are
//! attached as JSON-valued expression columns and filters as custom
//! conditions, so placeholders are numbered by the backend's own builder.

use crate::error::{DataError, DataResult};
use crate::manager::EntityManager;
use crate::query::sql::{Ident, SelectColumn};
use crate::query::with::{shape_record, validate_withs, WithCompiler};
use crate::query::{resolve_select, resolve_sort, Filter, ReadOptions, RepoQuery};
use crate::schema::{Entity, PRIMARY_FIELD};
use crate::Record;
use sea_query::{Expr, Query, SelectStatement, Values};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct Repository<'a> {
    em: &'a EntityManager,
    entity: Arc<Entity>,
}

impl<'a> Repository<'a> {
    pub(crate) fn new(em: &'a EntityManager, entity: Arc<Entity>) -> Self {
        Self { em, entity }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    fn alias(&self) -> &str {
        &self.entity.name
    }

    /// Build the statement for `query` without running it
    pub fn compile(&self, query: &RepoQuery) -> DataResult<(String, Values)> {
        self.compile_with(query, ReadOptions::default())
    }

    pub fn compile_with(&self, query: &RepoQuery, opts: ReadOptions) -> DataResult<(String, Values)> {
        let stmt = self.select_statement(query, opts)?;
        Ok(self.em.connection().dialect().build_select(&stmt))
    }

    fn select_statement(&self, query: &RepoQuery, opts: ReadOptions) -> DataResult<SelectStatement> {
        let limits = self.em.limits();
        validate_withs(self.em, &self.entity.name, &query.with, limits.max_with_depth)?;

        let alias = self.alias();
        let dialect = self.em.connection().dialect();
        let mut stmt = Query::select();
        stmt.from_as(Ident::new(&self.entity.name), Ident::new(alias));

        for column in resolve_select(&self.entity, query.select.as_deref(), opts)? {
            stmt.column((Ident::new(alias), Ident::new(column)));
        }
        let nested = WithCompiler::new(self.em, opts).add_clause(&self.entity, alias, &query.with)?;
        for column in nested {
            if let SelectColumn::Nested { alias: name, fragment } = column {
                stmt.expr_as(fragment.into_expr(dialect), Ident::new(name));
            }
        }

        self.apply_filter(&mut stmt, query.filter.as_ref(), opts)?;

        let (sort_field, sort_dir) = resolve_sort(&self.entity, query.sort.as_ref(), opts)?;
        stmt.order_by((Ident::new(alias), Ident::new(sort_field)), sort_dir.to_order());
        stmt.limit(query.limit.unwrap_or(limits.default_limit));
        if let Some(offset) = query.offset {
            stmt.offset(offset);
        }
        Ok(stmt)
    }

    fn apply_filter(
        &self,
        stmt: &mut SelectStatement,
        filter: Option<&Value>,
        opts: ReadOptions,
    ) -> DataResult<()> {
        if let Some(filter) = filter {
            let compiled = Filter::new(self.em, &self.entity, self.alias(), opts).compile(filter)?;
            if let Some(condition) = compiled {
                stmt.and_where(condition.into_expr(self.em.connection().dialect()));
            }
        }
        Ok(())
    }

    pub fn find_many(&self, query: &RepoQuery) -> DataResult<Vec<Record>> {
        self.find_many_with(query, ReadOptions::default())
    }

    /// Rows matching `query`, eager loads included
    pub fn find_many_with(&self, query: &RepoQuery, opts: ReadOptions) -> DataResult<Vec<Record>> {
        let (sql, values) = self.compile_with(query, opts)?;
        let aliases: Vec<&str> = query.with.keys().map(String::as_str).collect();
        let mut rows = self.em.connection().all_with_json(&sql, &values, &aliases)?;
        for row in &mut rows {
            shape_record(self.em, &self.entity, &query.with, row)?;
        }
        Ok(rows)
    }

    pub fn find_one(&self, query: &RepoQuery) -> DataResult<Option<Record>> {
        self.find_one_with(query, ReadOptions::default())
    }

    pub fn find_one_with(&self, query: &RepoQuery, opts: ReadOptions) -> DataResult<Option<Record>> {
        let mut query = query.clone();
        query.limit = Some(1);
        Ok(self.find_many_with(&query, opts)?.into_iter().next())
    }

    /// The record with primary key `id`
    pub fn find_id(&self, id: impl Into<Value>) -> DataResult<Option<Record>> {
        self.find_id_with(id, &RepoQuery::default(), ReadOptions::default())
    }

    /// The record with primary key `id`, shaped by `query`'s select and with
    pub fn find_id_with(
        &self,
        id: impl Into<Value>,
        query: &RepoQuery,
        opts: ReadOptions,
    ) -> DataResult<Option<Record>> {
        let mut by_id = Record::new();
        by_id.insert(PRIMARY_FIELD.to_string(), id.into());
        let by_id = Value::Object(by_id);
        let mut query = query.clone();
        query.filter = Some(match query.filter.take() {
            Some(filter) => json!({"$and": [filter, by_id]}),
            None => by_id,
        });
        self.find_one_with(&query, opts)
    }

    /// Like [`find_id`](Self::find_id), failing with [`DataError::NotFound`]
    pub fn read_one(&self, id: impl Into<Value>) -> DataResult<Record> {
        self.find_id(id)?.ok_or_else(|| DataError::NotFound {
            entity: self.entity.name.clone(),
        })
    }

    /// Number of rows matching `filter`
    pub fn count(&self, filter: Option<&Value>) -> DataResult<u64> {
        let alias = self.alias();
        let mut stmt = Query::select();
        stmt.from_as(Ident::new(&self.entity.name), Ident::new(alias))
            .expr_as(Expr::cust("COUNT(*)"), Ident::new("count"));
        self.apply_filter(&mut stmt, filter, ReadOptions::default())?;

        let (sql, values) = self.em.connection().dialect().build_select(&stmt);
        let rows = self.em.connection().all(&sql, &values)?;
        let count = rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(count_value)
            .ok_or_else(|| DataError::Driver(crate::driver::DbError::Parse(
                "COUNT(*) returned no number".to_string(),
            )))?;
        Ok(count)
    }

    pub fn exists(&self, filter: Option<&Value>) -> DataResult<bool> {
        Ok(self.count(filter)? > 0)
    }
}

fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        // counts beyond the safe integer range arrive as decimal strings
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::driver::mock::{MockDriver, MockHandle};
    use crate::manager::Limits;
    use crate::query::sql::{Dialect, SortDir};
    use crate::relation::Relation;
    use crate::schema::{Field, Toggle};
    use pretty_assertions::assert_eq;

    fn manager(dialect: Dialect) -> (Arc<EntityManager>, MockHandle) {
        let (driver, handle) = MockDriver::new(dialect);
        let em = EntityManager::builder(Arc::new(Connection::new(driver)))
            .entity(
                Entity::new("users")
                    .field(Field::text("name"))
                    .and_then(|e| e.field(Field::text("password").hidden(Toggle::All(true))))
                    .unwrap(),
            )
            .entity(
                Entity::new("posts")
                    .field(Field::text("title"))
                    .and_then(|e| e.field(Field::boolean("draft")))
                    .unwrap(),
            )
            .relation(Relation::many_to_one("posts", "users"))
            .limits(Limits {
                max_with_depth: 2,
                default_limit: 25,
            })
            .build()
            .unwrap();
        (em, handle)
    }

    #[test]
    fn test_compile_default_query() {
        let (em, _) = manager(Dialect::Sqlite);
        let (sql, values) = em.repo("users").unwrap().compile(&RepoQuery::new()).unwrap();
        assert_eq!(
            sql,
            "SELECT \"users\".\"id\", \"users\".\"name\" FROM \"users\" AS \"users\" \
             ORDER BY \"users\".\"id\" ASC LIMIT ?"
        );
        assert_eq!(values.0, vec![sea_query::Value::from(25u64)]);
    }

    #[test]
    fn test_compile_postgres_numbers_placeholders() {
        let (em, _) = manager(Dialect::Postgres);
        let query = RepoQuery::new()
            .filter(json!({"title": "a", "users.name": "ada"}))
            .sort("title", SortDir::Desc)
            .limit(5)
            .offset(10);
        let (sql, values) = em.repo("posts").unwrap().compile(&query).unwrap();
        assert!(sql.contains("\"posts\".\"title\" = $1 AND EXISTS ("));
        assert!(sql.contains("\"posts_users\".\"name\" = $2"));
        assert!(sql.ends_with("ORDER BY \"posts\".\"title\" DESC LIMIT $3 OFFSET $4"));
        assert_eq!(values.0.len(), 4);
    }

    #[test]
    fn test_find_many_shapes_rows() {
        let (em, handle) = manager(Dialect::Sqlite);
        handle.push_rows(vec![json!({"id": 1, "title": "t", "draft": 1, "users_id": 2, "users": "{\"id\":2,\"name\":\"ada\"}"})
            .as_object()
            .cloned()
            .unwrap()]);
        let rows = em
            .repo("posts")
            .unwrap()
            .find_many(&RepoQuery::new().with("users", RepoQuery::new()))
            .unwrap();
        assert_eq!(rows[0]["draft"], json!(true));
        assert_eq!(rows[0]["users"], json!({"id": 2, "name": "ada"}));
        let sql = handle.last_sql().unwrap();
        assert!(sql.contains("AS \"users\" FROM \"posts\" AS \"posts\""));
    }

    #[test]
    fn test_hidden_fields_need_reveal() {
        let (em, _) = manager(Dialect::Sqlite);
        let repo = em.repo("users").unwrap();
        let query = RepoQuery::new().filter(json!({"password": "x"}));
        assert_eq!(repo.compile(&query).unwrap_err().code(), "invalid_search_params");
        let (sql, _) = repo.compile_with(&query, ReadOptions::revealed()).unwrap();
        assert!(sql.contains("\"users\".\"password\" FROM"));
    }

    #[test]
    fn test_with_depth_ceiling() {
        let (em, _) = manager(Dialect::Sqlite);
        let query = RepoQuery::from_json(json!({
            "with": {"users": {"with": {"posts": {"with": {"users": {}}}}}}
        }))
        .unwrap();
        let err = em.repo("posts").unwrap().compile(&query).unwrap_err();
        assert_eq!(err.code(), "invalid_search_params");
    }

    #[test]
    fn test_read_one_and_count() {
        let (em, handle) = manager(Dialect::Sqlite);
        let repo = em.repo("users").unwrap();
        assert_eq!(repo.read_one(7).unwrap_err().code(), "not_found");
        let sql = handle.last_sql().unwrap();
        assert!(sql.contains("WHERE \"users\".\"id\" = ?"));

        handle.push_rows(vec![json!({"count": 3}).as_object().cloned().unwrap()]);
        assert_eq!(repo.count(Some(&json!({"name": {"$like": "a*"}}))).unwrap(), 3);
        handle.push_rows(vec![json!({"count": 0}).as_object().cloned().unwrap()]);
        assert!(!repo.exists(None).unwrap());
    }
}
