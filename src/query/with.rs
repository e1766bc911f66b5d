//! Eager loading: `with` validation and compilation.
//!
//! Every `with` entry becomes one JSON-valued column named after the
//! relation reference. A one-cardinality side is aggregated into an object
//! (or null), a many side into an array. Nested entries compile recursively
//! inside the sub-select of their parent, so one statement returns the whole
//! tree.

use super::filter::Filter;
use super::sql::SelectColumn;
use super::{resolve_select, resolve_sort, ReadOptions, RepoQuery};
use crate::error::{DataError, DataResult};
use crate::manager::EntityManager;
use crate::relation::{Relation, Side};
use crate::schema::Entity;
use crate::Record;
use serde_json::Value;
use std::collections::BTreeMap;

/// [`EntityManager::relation_of`] with an unknown reference reported as a bad request
pub(crate) fn resolve_relation<'m>(
    em: &'m EntityManager,
    entity: &str,
    reference: &str,
) -> DataResult<(&'m Relation, Side)> {
    em.relation_of(entity, reference).map_err(|err| match err {
        DataError::RelationNotFound { entity, reference } => DataError::search(format!(
            "\"{reference}\" is not a relation of {entity}"
        )),
        other => other,
    })
}

/// Check every reference in `withs` and return the nesting depth
///
/// A map of plain entries has depth 1, each nested `with` adds one. Depths
/// above `max_depth` fail before any SQL is built.
pub fn validate_withs(
    em: &EntityManager,
    entity: &str,
    withs: &BTreeMap<String, RepoQuery>,
    max_depth: usize,
) -> DataResult<usize> {
    let depth = depth_at(em, entity, withs, 0)?;
    if depth > max_depth {
        return Err(DataError::search(format!(
            "with nesting depth {depth} exceeds the maximum of {max_depth}"
        )));
    }
    Ok(depth)
}

fn depth_at(
    em: &EntityManager,
    entity: &str,
    withs: &BTreeMap<String, RepoQuery>,
    level: usize,
) -> DataResult<usize> {
    let mut depth = level;
    for (reference, sub) in withs {
        let (relation, side) = resolve_relation(em, entity, reference)?;
        let other = &relation.other(side).entity;
        let child = depth_at(em, other, &sub.with, level + 1)?;
        depth = depth.max(level + 1).max(child);
    }
    Ok(depth)
}

/// Compiles the `with` map of one base entity
pub struct WithCompiler<'a> {
    em: &'a EntityManager,
    opts: ReadOptions,
}

impl<'a> WithCompiler<'a> {
    pub fn new(em: &'a EntityManager, opts: ReadOptions) -> Self {
        Self { em, opts }
    }

    /// Nested JSON columns for every entry of `withs`, correlated to `alias`
    pub fn add_clause(
        &self,
        entity: &Entity,
        alias: &str,
        withs: &BTreeMap<String, RepoQuery>,
    ) -> DataResult<Vec<SelectColumn>> {
        let mut scope = vec![alias.to_string()];
        self.columns(entity, alias, withs, &mut scope)
    }

    fn columns(
        &self,
        entity: &Entity,
        alias: &str,
        withs: &BTreeMap<String, RepoQuery>,
        scope: &mut Vec<String>,
    ) -> DataResult<Vec<SelectColumn>> {
        let connection = self.em.connection();
        let mut columns = Vec::with_capacity(withs.len());

        for (reference, sub) in withs {
            let (relation, side) = resolve_relation(self.em, &entity.name, reference)?;
            let many = relation.other(side).cardinality.is_many();
            if !connection.supports_json() {
                return Err(DataError::DriverCapability {
                    driver: connection.driver_name().to_string(),
                    capability: if many {
                        "json array aggregation".to_string()
                    } else {
                        "json object aggregation".to_string()
                    },
                });
            }

            // aliases stay unique along the path so correlations never shadow
            let sub_alias = if scope.iter().any(|a| a == reference) {
                format!("__with_{}", scope.len())
            } else {
                reference.clone()
            };

            let other: &Entity = relation.entity(side.opposite())?;
            let mut select = relation.build_with(&entity.name, reference, alias, &sub_alias)?;

            select.columns = resolve_select(other, sub.select.as_deref(), self.opts)?
                .into_iter()
                .map(SelectColumn::Field)
                .collect();
            if let Some(where_) = &sub.filter {
                let filter = Filter::new(self.em, other, sub_alias.clone(), self.opts);
                if let Some(condition) = filter.compile(where_)? {
                    select.conditions.push(condition);
                }
            }
            let (sort_field, sort_dir) = resolve_sort(other, sub.sort.as_ref(), self.opts)?;
            select.order_by.push((sort_field, sort_dir));
            if let Some(limit) = sub.limit {
                if many {
                    select.limit = Some(select.limit.map_or(limit, |cap| cap.min(limit)));
                }
            }
            if sub.offset.is_some() {
                select.offset = sub.offset;
            }

            scope.push(sub_alias.clone());
            let nested = self.columns(other, &sub_alias, &sub.with, scope);
            scope.pop();
            select.columns.extend(nested?);

            let fragment = if many {
                connection.json_array_from(&select)?
            } else {
                connection.json_object_from(&select)?
            };
            columns.push(SelectColumn::Nested {
                alias: reference.clone(),
                fragment,
            });
        }
        Ok(columns)
    }
}

/// Apply `transform_retrieve` to the eager-loaded values of `record`
pub fn shape_nested(
    em: &EntityManager,
    entity: &Entity,
    withs: &BTreeMap<String, RepoQuery>,
    record: &mut Record,
) -> DataResult<()> {
    for (reference, sub) in withs {
        let (relation, side) = resolve_relation(em, &entity.name, reference)?;
        let other: &Entity = relation.entity(side.opposite())?;
        match record.get_mut(reference) {
            Some(Value::Object(child)) => shape_record(em, other, &sub.with, child)?,
            Some(Value::Array(children)) => {
                for child in children.iter_mut() {
                    if let Value::Object(child) = child {
                        shape_record(em, other, &sub.with, child)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Shape the stored columns of one record, then its eager loads
pub fn shape_record(
    em: &EntityManager,
    entity: &Entity,
    withs: &BTreeMap<String, RepoQuery>,
    record: &mut Record,
) -> DataResult<()> {
    for (key, value) in record.iter_mut() {
        if withs.contains_key(key) {
            continue;
        }
        if let Some(field) = entity.find_field(key) {
            *value = field.transform_retrieve(value.take());
        }
    }
    shape_nested(em, entity, withs, record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::driver::mock::MockDriver;
    use crate::query::sql::Dialect;
    use crate::schema::Field;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn manager_on(connection: Connection) -> Arc<EntityManager> {
        let entity = |name: &str, field: Field| Entity::new(name).field(field).unwrap();
        EntityManager::builder(Arc::new(connection))
            .entity(entity("users", Field::text("name")))
            .entity(entity("posts", Field::text("title")))
            .entity(entity("comments", Field::boolean("approved")))
            .entity(entity("categories", Field::text("label")))
            .relation(Relation::many_to_one("posts", "users"))
            .relation(Relation::many_to_one("comments", "posts"))
            .relation(Relation::many_to_many("posts", "categories").with_limit(10))
            .build()
            .unwrap()
    }

    fn manager() -> Arc<EntityManager> {
        let (driver, _) = MockDriver::new(Dialect::Sqlite);
        manager_on(Connection::new(driver))
    }

    fn withs(value: Value) -> BTreeMap<String, RepoQuery> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_withs_depth() {
        let em = manager();
        let nested = withs(json!({"comments": {"with": {"posts": {}}}}));
        assert_eq!(validate_withs(&em, "posts", &nested, 3).unwrap(), 2);
        assert_eq!(validate_withs(&em, "posts", &withs(json!({"users": {}})), 3).unwrap(), 1);
        assert_eq!(validate_withs(&em, "posts", &BTreeMap::new(), 3).unwrap(), 0);

        let err = validate_withs(&em, "posts", &nested, 1).unwrap_err();
        assert_eq!(err.code(), "invalid_search_params");
    }

    #[test]
    fn test_unknown_reference_fails_at_any_depth() {
        let em = manager();
        for bad in [
            json!({"ghosts": {}}),
            json!({"comments": {"with": {"ghosts": {}}}}),
        ] {
            let err = validate_withs(&em, "posts", &withs(bad), 5).unwrap_err();
            assert_eq!(err.code(), "invalid_search_params");
        }
    }

    #[test]
    fn test_one_side_compiles_to_object() {
        let em = manager();
        let posts = em.entity("posts").unwrap();
        let columns = WithCompiler::new(&em, ReadOptions::default())
            .add_clause(posts, "posts", &withs(json!({"users": {}})))
            .unwrap();
        assert_eq!(columns.len(), 1);
        let SelectColumn::Nested { alias, fragment } = &columns[0] else {
            panic!("expected a nested column");
        };
        assert_eq!(alias, "users");
        assert_eq!(
            fragment.sql,
            "(SELECT json_object('id', \"obj\".\"id\", 'name', \"obj\".\"name\") FROM (\
             SELECT \"users\".\"id\" AS \"id\", \"users\".\"name\" AS \"name\" \
             FROM \"users\" AS \"users\" WHERE \"users\".\"id\" = \"posts\".\"users_id\" \
             ORDER BY \"users\".\"id\" ASC LIMIT 1) AS \"obj\")"
        );
    }

    #[test]
    fn test_many_side_compiles_to_array_with_limits() {
        let em = manager();
        let posts = em.entity("posts").unwrap();
        let compiler = WithCompiler::new(&em, ReadOptions::default());

        let columns = compiler
            .add_clause(posts, "posts", &withs(json!({"categories": {}})))
            .unwrap();
        let SelectColumn::Nested { fragment, .. } = &columns[0] else {
            panic!("expected a nested column");
        };
        assert!(fragment.sql.starts_with("(SELECT coalesce(json_group_array(json_object("));
        assert!(fragment.sql.contains(
            "INNER JOIN \"posts_categories\" AS \"categories_posts_categories\""
        ));
        assert!(fragment.sql.contains(" LIMIT 10)"));

        let columns = compiler
            .add_clause(posts, "posts", &withs(json!({"categories": {"limit": 3}})))
            .unwrap();
        let SelectColumn::Nested { fragment, .. } = &columns[0] else {
            panic!("expected a nested column");
        };
        assert!(fragment.sql.contains(" LIMIT 3)"));
    }

    #[test]
    fn test_nested_with_gets_unique_aliases_and_filters() {
        let em = manager();
        let posts = em.entity("posts").unwrap();
        let columns = WithCompiler::new(&em, ReadOptions::default())
            .add_clause(
                posts,
                "posts",
                &withs(json!({
                    "comments": {"where": {"approved": true}, "with": {"posts": {"select": ["title"]}}}
                })),
            )
            .unwrap();
        let SelectColumn::Nested { fragment, .. } = &columns[0] else {
            panic!("expected a nested column");
        };
        assert!(fragment.sql.contains("'posts', json(\"agg\".\"posts\")"));
        assert!(fragment.sql.contains("FROM \"posts\" AS \"__with_2\""));
        assert!(fragment.sql.contains("\"__with_2\".\"id\" = \"comments\".\"posts_id\""));
        assert!(fragment.sql.contains("\"comments\".\"approved\" = ?"));
        assert_eq!(fragment.values, vec![sea_query::Value::from(true)]);
    }

    #[test]
    fn test_missing_json_capability_fails_fast() {
        let (driver, _) = MockDriver::without_json(Dialect::Sqlite);
        let em = manager_on(Connection::new(driver));
        let posts = em.entity("posts").unwrap();
        let err = WithCompiler::new(&em, ReadOptions::default())
            .add_clause(posts, "posts", &withs(json!({"users": {}})))
            .unwrap_err();
        assert_eq!(err.code(), "driver_capability");
    }

    #[test]
    fn test_shape_record_restores_nested_types() {
        let em = manager();
        let posts = em.entity("posts").unwrap();
        let mut record = json!({
            "id": 1,
            "title": "hello",
            "comments": [{"id": 4, "approved": 1}, {"id": 5, "approved": 0}],
        })
        .as_object()
        .cloned()
        .unwrap();
        shape_record(&em, posts, &withs(json!({"comments": {}})), &mut record).unwrap();
        assert_eq!(record["comments"][0]["approved"], json!(true));
        assert_eq!(record["comments"][1]["approved"], json!(false));
    }
}
