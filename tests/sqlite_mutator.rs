//! Mutator writes against an in-memory SQLite database

mod common;

use anchorage::schema::PrimaryFormat;
use anchorage::{Connection, Entity, EntityKind, EntityManager, Field, RepoQuery, WriteOptions};
use common::{insert, record, seed, sqlite_blog};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn category_labels(em: &EntityManager, post: i64) -> Vec<Value> {
    let query = RepoQuery::new().with("categories", RepoQuery::new().select(["label"]));
    let row = em
        .repo("posts")
        .unwrap()
        .find_id_with(post, &query, Default::default())
        .unwrap()
        .unwrap();
    row["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["label"].clone())
        .collect()
}

#[test]
fn test_insert_returns_stored_record() {
    let em = sqlite_blog();
    let user = insert(&em, "users", json!({"name": "ada"}));
    assert_eq!(
        user,
        record(json!({"id": 1, "name": "ada", "email": null, "active": true}))
    );

    let post = insert(&em, "posts", json!({"title": "hello", "users": {"$set": 1}}));
    assert_eq!(post["views"], json!(0));
    assert_eq!(post["draft"], json!(false));
    assert_eq!(post["users_id"], json!(1));
}

#[test]
fn test_insert_validation() {
    let em = sqlite_blog();
    let users = em.mutator("users").unwrap();

    let err = users.insert_one(&record(json!({"email": "x"}))).unwrap_err();
    assert_eq!(err.code(), "validation");
    assert_eq!(err.violations()[0].field, "name");
    assert_eq!(err.violations()[0].constraint, "required");

    let err = users.insert_one(&record(json!({"name": 3}))).unwrap_err();
    assert_eq!(err.violations()[0].constraint, "type");

    let err = users.insert_one(&record(json!({"name": "a", "age": 3}))).unwrap_err();
    assert_eq!(err.code(), "field_not_found");

    assert_eq!(em.repo("users").unwrap().count(None).unwrap(), 0);
}

#[test]
fn test_insert_many_is_atomic() {
    let em = sqlite_blog();
    let users = em.mutator("users").unwrap();

    let rows = users
        .insert_many(&[record(json!({"name": "a"})), record(json!({"name": "b"}))])
        .unwrap();
    assert_eq!(rows.len(), 2);

    let err = users
        .insert_many(&[record(json!({"name": "c"})), record(json!({"name": null}))])
        .unwrap_err();
    assert_eq!(err.code(), "validation");
    assert_eq!(em.repo("users").unwrap().count(None).unwrap(), 2);
    assert!(!em.connection().in_transaction());
}

#[test]
fn test_update_one() {
    let em = sqlite_blog();
    seed(&em);
    let posts = em.mutator("posts").unwrap();

    let updated = posts
        .update_one(2, &record(json!({"title": "renamed", "users": {"$set": 2}})))
        .unwrap();
    assert_eq!(updated["title"], json!("renamed"));
    assert_eq!(updated["users_id"], json!(2));
    assert_eq!(updated["views"], json!(3));

    let err = posts.update_one(42, &record(json!({"title": "x"}))).unwrap_err();
    assert_eq!(err.code(), "not_found");

    let err = posts.update_one(2, &record(json!({"title": null}))).unwrap_err();
    assert_eq!(err.violations()[0].constraint, "required");
}

#[test]
fn test_many_to_many_link_operations() {
    let em = sqlite_blog();
    seed(&em);
    let posts = em.mutator("posts").unwrap();
    assert_eq!(category_labels(&em, 1), vec![json!("rust"), json!("sql")]);

    posts
        .update_one(1, &record(json!({"categories": {"$detach": [2]}})))
        .unwrap();
    assert_eq!(category_labels(&em, 1), vec![json!("rust")]);

    posts
        .update_one(3, &record(json!({"categories": {"$attach": [1]}})))
        .unwrap();
    assert_eq!(category_labels(&em, 3), vec![json!("rust")]);

    posts
        .update_one(1, &record(json!({"categories": {"$set": [2]}})))
        .unwrap();
    assert_eq!(category_labels(&em, 1), vec![json!("sql")]);

    posts
        .update_one(1, &record(json!({"categories": {"$set": []}})))
        .unwrap();
    assert!(category_labels(&em, 1).is_empty());
}

#[test]
fn test_empty_detach_keeps_links() {
    let em = sqlite_blog();
    seed(&em);
    let posts = em.mutator("posts").unwrap();

    for detach in [json!([]), json!(null)] {
        posts
            .update_one(1, &record(json!({"categories": {"$detach": detach}})))
            .unwrap();
        assert_eq!(category_labels(&em, 1), vec![json!("rust"), json!("sql")]);
    }
    assert_eq!(em.repo("posts_categories").unwrap().count(None).unwrap(), 3);
}

#[test]
fn test_bulk_update_and_delete() {
    let em = sqlite_blog();
    seed(&em);
    let posts = em.mutator("posts").unwrap();

    let changed = posts
        .update_where(&json!({"users.name": "ada"}), &record(json!({"draft": true})))
        .unwrap();
    assert_eq!(changed, 2);
    let drafts = em.repo("posts").unwrap().count(Some(&json!({"draft": true}))).unwrap();
    assert_eq!(drafts, 3);

    let removed = posts.delete_where(&json!({"views": {"$lt": 5}})).unwrap();
    assert_eq!(removed, 2);
    assert_eq!(em.repo("posts").unwrap().count(None).unwrap(), 1);
    // connection rows of removed posts are gone too
    assert_eq!(em.repo("posts_categories").unwrap().count(None).unwrap(), 2);

    assert_eq!(posts.delete_where(&json!({})).unwrap_err().code(), "invalid_search_params");
}

#[test]
fn test_delete_one_returns_the_old_record() {
    let em = sqlite_blog();
    seed(&em);
    let posts = em.mutator("posts").unwrap();

    let deleted = posts.delete_one(2).unwrap();
    assert_eq!(deleted["title"], json!("second"));
    assert!(em.repo("posts").unwrap().find_id(2).unwrap().is_none());
    assert_eq!(em.repo("posts_categories").unwrap().count(None).unwrap(), 2);

    assert_eq!(posts.delete_one(2).unwrap_err().code(), "not_found");
}

#[test]
fn test_system_entity_with_uuid_keys() {
    let connection = Connection::sqlite_memory().unwrap();
    let em = EntityManager::builder(Arc::new(connection))
        .entity(
            Entity::with_primary("tokens", PrimaryFormat::Uuid)
                .kind(EntityKind::System)
                .field(Field::text("value").required())
                .unwrap(),
        )
        .build()
        .unwrap();
    em.schema().sync().unwrap();
    let tokens = em.mutator("tokens").unwrap();
    let data = record(json!({"value": "abc"}));

    assert_eq!(tokens.insert_one(&data).unwrap_err().code(), "system_entity");

    let token = tokens.insert_one_with(&data, WriteOptions::trusted()).unwrap();
    let id = token["id"].as_str().unwrap();
    assert_eq!(uuid::Uuid::parse_str(id).unwrap().get_version_num(), 4);

    // updates of system records are not gated
    let token = tokens
        .update_one(id, &record(json!({"value": "def"})))
        .unwrap();
    assert_eq!(token["value"], json!("def"));
}
