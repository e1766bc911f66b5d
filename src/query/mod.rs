//! Query requests and their compilation.
//!
//! A [`RepoQuery`] is the request shape accepted by repositories:
//!
//! ```json
//! {
//!   "select": ["id", "title"],
//!   "where": {"title": {"$like": "Hello*"}, "users.name": "ada"},
//!   "with": {"comments": {"limit": 5, "with": {"users": {}}}},
//!   "sort": {"field": "id", "dir": "desc"},
//!   "limit": 20,
//!   "offset": 40
//! }
//! ```
//!
//! - [`filter`] compiles `where` maps into SQL conditions
//! - [`with`] validates and compiles eager loads into JSON sub-selects
//! - [`sql`] holds the fragments both of them produce

pub mod filter;
pub mod sql;
pub mod with;

use crate::error::{DataError, DataResult};
use crate::schema::{Action, Entity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sql::SortDir;
use std::collections::BTreeMap;

pub use filter::Filter;
pub use with::validate_withs;

/// Sort order of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub dir: SortDir,
}

/// A read request: projection, filter, eager loads and pagination
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    /// Must be a JSON object; anything else fails compilation
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub with: BTreeMap<String, RepoQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl RepoQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a request from JSON, rejecting malformed input
    pub fn from_json(value: Value) -> DataResult<Self> {
        serde_json::from_value(value).map_err(|e| DataError::search(format!("malformed query: {e}")))
    }

    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with(mut self, reference: impl Into<String>, query: RepoQuery) -> Self {
        self.with.insert(reference.into(), query);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, dir: SortDir) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            dir,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Per-call read options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Allow hidden fields in `select`, `where` and `sort`, and return them
    pub reveal_hidden: bool,
}

impl ReadOptions {
    pub fn revealed() -> Self {
        ReadOptions {
            reveal_hidden: true,
        }
    }
}

/// Check that `name` is a readable stored field of `entity`
pub(crate) fn readable_field<'e>(
    entity: &'e Entity,
    name: &str,
    opts: ReadOptions,
) -> DataResult<&'e crate::schema::Field> {
    let field = entity
        .find_field(name)
        .ok_or_else(|| DataError::search(format!("unknown field \"{name}\" on {}", entity.name)))?;
    if field.is_virtual() {
        return Err(DataError::search(format!(
            "virtual field \"{name}\" on {} has no column",
            entity.name
        )));
    }
    if !opts.reveal_hidden && field.is_hidden(Some(Action::Read)) {
        return Err(DataError::search(format!(
            "field \"{name}\" on {} is hidden",
            entity.name
        )));
    }
    Ok(field)
}

/// Columns to select: the requested ones, or every readable column
pub(crate) fn resolve_select(
    entity: &Entity,
    select: Option<&[String]>,
    opts: ReadOptions,
) -> DataResult<Vec<String>> {
    match select {
        Some(names) => {
            let mut columns: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                readable_field(entity, name, opts)?;
                if !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
            Ok(columns)
        }
        None => {
            let names = if opts.reveal_hidden {
                entity.get_columns()
            } else {
                entity.get_select(Some(Action::Read))
            };
            Ok(names.into_iter().map(str::to_string).collect())
        }
    }
}

/// The requested sort, or the entity's configured default
pub(crate) fn resolve_sort(
    entity: &Entity,
    sort: Option<&Sort>,
    opts: ReadOptions,
) -> DataResult<(String, SortDir)> {
    match sort {
        Some(sort) => {
            readable_field(entity, &sort.field, opts)?;
            Ok((sort.field.clone(), sort.dir))
        }
        None => Ok((entity.config.sort_field.clone(), entity.config.sort_dir)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Toggle};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn users() -> Entity {
        Entity::new("users")
            .field(Field::text("name"))
            .and_then(|e| e.field(Field::text("password").hidden(Toggle::All(true))))
            .and_then(|e| e.field(Field::text("initials").virtual_field()))
            .unwrap()
    }

    #[test]
    fn test_query_from_json() {
        let query = RepoQuery::from_json(json!({
            "select": ["id", "name"],
            "where": {"name": {"$like": "a*"}},
            "with": {"posts": {"limit": 2}},
            "sort": {"field": "name", "dir": "desc"},
            "limit": 5,
        }))
        .unwrap();
        assert_eq!(query.select, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(query.with["posts"].limit, Some(2));
        assert_eq!(query.sort.unwrap().dir, SortDir::Desc);
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_malformed_query_is_rejected() {
        let err = RepoQuery::from_json(json!({"with": {"posts": 3}})).unwrap_err();
        assert_eq!(err.code(), "invalid_search_params");
        let err = RepoQuery::from_json(json!({"whre": {}})).unwrap_err();
        assert_eq!(err.code(), "invalid_search_params");
    }

    #[test]
    fn test_resolve_select() {
        let users = users();
        assert_eq!(
            resolve_select(&users, None, ReadOptions::default()).unwrap(),
            vec!["id", "name"]
        );
        assert_eq!(
            resolve_select(&users, None, ReadOptions::revealed()).unwrap(),
            vec!["id", "name", "password"]
        );
        let hidden = ["password".to_string()];
        assert!(resolve_select(&users, Some(&hidden), ReadOptions::default()).is_err());
        let computed = ["initials".to_string()];
        assert!(resolve_select(&users, Some(&computed), ReadOptions::revealed()).is_err());
    }

    #[test]
    fn test_resolve_sort_defaults_to_entity_config() {
        let users = users();
        assert_eq!(
            resolve_sort(&users, None, ReadOptions::default()).unwrap(),
            ("id".to_string(), SortDir::Asc)
        );
        let sort = Sort {
            field: "nope".into(),
            dir: SortDir::Desc,
        };
        assert!(resolve_sort(&users, Some(&sort), ReadOptions::default()).is_err());
    }
}
