//! Shared blog schema for integration tests
#![allow(dead_code)]

use anchorage::schema::Toggle;
use anchorage::{Connection, Entity, EntityManager, Field, Record, Relation};
use serde_json::{json, Value};
use std::sync::Arc;

/// users ─< posts ─< comments, users ─< comments, posts >─< categories
pub fn blog_manager(connection: Connection) -> Arc<EntityManager> {
    let users = Entity::new("users")
        .field(Field::text("name").required())
        .and_then(|e| e.field(Field::text("email")))
        .and_then(|e| e.field(Field::text("password").hidden(Toggle::All(true))))
        .and_then(|e| e.field(Field::boolean("active").default_value(true)))
        .expect("users entity");
    let posts = Entity::new("posts")
        .field(Field::text("title").required())
        .and_then(|e| e.field(Field::number("views").default_value(0)))
        .and_then(|e| e.field(Field::boolean("draft").default_value(false)))
        .expect("posts entity");
    let comments = Entity::new("comments")
        .field(Field::text("body").required())
        .expect("comments entity");
    let categories = Entity::new("categories")
        .field(Field::text("label").required())
        .expect("categories entity");

    EntityManager::builder(Arc::new(connection))
        .entity(users)
        .entity(posts)
        .entity(comments)
        .entity(categories)
        .relation(Relation::many_to_one("posts", "users"))
        .relation(Relation::many_to_one("comments", "posts"))
        .relation(Relation::many_to_one("comments", "users"))
        .relation(Relation::many_to_many("posts", "categories"))
        .build()
        .expect("Failed to build entity manager")
}

/// In-memory SQLite with the blog tables created
pub fn sqlite_blog() -> Arc<EntityManager> {
    let connection = Connection::sqlite_memory().expect("Failed to open SQLite");
    let em = blog_manager(connection);
    em.schema().sync().expect("Failed to sync schema");
    em
}

pub fn record(value: Value) -> Record {
    value.as_object().cloned().expect("record literal must be an object")
}

pub fn insert(em: &EntityManager, entity: &str, value: Value) -> Record {
    em.mutator(entity)
        .expect("mutator")
        .insert_one(&record(value))
        .expect("Failed to insert record")
}

/// Two users, three posts, comments and categories
pub fn seed(em: &EntityManager) {
    insert(em, "users", json!({"name": "ada", "email": "ada@example.com", "password": "s1"}));
    insert(em, "users", json!({"name": "bob", "active": false}));
    insert(em, "categories", json!({"label": "rust"}));
    insert(em, "categories", json!({"label": "sql"}));

    insert(em, "posts", json!({"title": "first", "views": 10, "users": {"$set": 1}, "categories": {"$attach": [1, 2]}}));
    insert(em, "posts", json!({"title": "second", "views": 3, "users": {"$set": 1}, "categories": {"$attach": 2}}));
    insert(em, "posts", json!({"title": "draft", "draft": true, "users": {"$set": 2}}));

    insert(em, "comments", json!({"body": "nice", "posts": {"$set": 1}, "users": {"$set": 2}}));
    insert(em, "comments", json!({"body": "thanks", "posts": {"$set": 1}, "users": {"$set": 1}}));
    insert(em, "comments", json!({"body": "hmm", "posts": {"$set": 2}, "users": {"$set": 2}}));
}
