//! Repository reads against an in-memory SQLite database

mod common;

use anchorage::{ReadOptions, RepoQuery, SortDir};
use common::{seed, sqlite_blog};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn titles(rows: &[anchorage::Record]) -> Vec<Value> {
    rows.iter().map(|row| row["title"].clone()).collect()
}

#[test]
fn test_find_many_defaults() {
    let em = sqlite_blog();
    seed(&em);

    let users = em.repo("users").unwrap().find_many(&RepoQuery::new()).unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(
        users[0],
        common::record(json!({"id": 1, "name": "ada", "email": "ada@example.com", "active": true}))
    );
    assert_eq!(users[1]["active"], json!(false));
    assert!(users.iter().all(|u| !u.contains_key("password")));
}

#[test]
fn test_select_sort_and_pagination() {
    let em = sqlite_blog();
    seed(&em);
    let posts = em.repo("posts").unwrap();

    let query = RepoQuery::new()
        .select(["id", "title"])
        .sort("views", SortDir::Desc)
        .limit(2);
    let rows = posts.find_many(&query).unwrap();
    assert_eq!(titles(&rows), vec![json!("first"), json!("second")]);
    assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["id", "title"]);

    let rows = posts.find_many(&query.offset(2)).unwrap();
    assert_eq!(titles(&rows), vec![json!("draft")]);
}

#[test]
fn test_where_operators() {
    let em = sqlite_blog();
    seed(&em);
    let posts = em.repo("posts").unwrap();
    let find = |filter: Value| posts.find_many(&RepoQuery::new().filter(filter)).unwrap();

    assert_eq!(titles(&find(json!({"title": {"$like": "*st"}}))), vec![json!("first")]);
    assert_eq!(titles(&find(json!({"views": {"$gte": 3, "$lt": 10}}))), vec![json!("second")]);
    assert_eq!(titles(&find(json!({"id": [1, 3]}))), vec![json!("first"), json!("draft")]);
    assert_eq!(titles(&find(json!({"draft": true}))), vec![json!("draft")]);
    assert_eq!(
        titles(&find(json!({"$or": [{"views": 10}, {"draft": true}]}))),
        vec![json!("first"), json!("draft")]
    );
    assert_eq!(find(json!({"id": {"$in": []}})).len(), 0);
}

#[test]
fn test_like_matches_percent_and_underscore_literally() {
    let em = sqlite_blog();
    seed(&em);
    common::insert(&em, "posts", json!({"title": "50% off"}));
    common::insert(&em, "posts", json!({"title": "a_b"}));
    let posts = em.repo("posts").unwrap();
    let find = |pattern: &str| {
        titles(&posts.find_many(&RepoQuery::new().filter(json!({"title": {"$like": pattern}}))).unwrap())
    };

    assert_eq!(find("*%*"), vec![json!("50% off")]);
    assert_eq!(find("a_b"), vec![json!("a_b")]);
    // `_` no longer stands for any one character
    assert!(find("fi_st").is_empty());
    assert_eq!(find("fi*st"), vec![json!("first")]);
}

#[test]
fn test_where_through_relations() {
    let em = sqlite_blog();
    seed(&em);
    let posts = em.repo("posts").unwrap();

    let rows = posts
        .find_many(&RepoQuery::new().filter(json!({"users.name": "ada"})))
        .unwrap();
    assert_eq!(titles(&rows), vec![json!("first"), json!("second")]);

    let rows = posts
        .find_many(&RepoQuery::new().filter(json!({"categories.label": "rust"})))
        .unwrap();
    assert_eq!(titles(&rows), vec![json!("first")]);

    // posts with a comment written by bob
    let rows = posts
        .find_many(&RepoQuery::new().filter(json!({"comments.users.name": "bob"})))
        .unwrap();
    assert_eq!(titles(&rows), vec![json!("first"), json!("second")]);
}

#[test]
fn test_single_row_reads() {
    let em = sqlite_blog();
    seed(&em);
    let users = em.repo("users").unwrap();

    assert_eq!(users.read_one(2).unwrap()["name"], json!("bob"));
    assert_eq!(users.read_one(99).unwrap_err().code(), "not_found");
    assert!(users.find_id(99).unwrap().is_none());

    let first = users
        .find_one(&RepoQuery::new().filter(json!({"active": false})))
        .unwrap()
        .unwrap();
    assert_eq!(first["name"], json!("bob"));
}

#[test]
fn test_json_looking_text_round_trips() {
    let em = sqlite_blog();
    let user = common::insert(&em, "users", json!({"name": "[1, 2]", "email": "{\"a\":1}"}));
    assert_eq!(user["name"], json!("[1, 2]"));

    let users = em.repo("users").unwrap();
    let stored = users.read_one(user["id"].clone()).unwrap();
    assert_eq!(stored["name"], json!("[1, 2]"));
    assert_eq!(stored["email"], json!("{\"a\":1}"));

    // the same text through an eager load
    common::insert(&em, "posts", json!({"title": "{}", "users": {"$set": user["id"].clone()}}));
    let post = em
        .repo("posts")
        .unwrap()
        .find_one(&RepoQuery::new().with("users", RepoQuery::new().select(["name"])))
        .unwrap()
        .unwrap();
    assert_eq!(post["title"], json!("{}"));
    assert_eq!(post["users"], json!({"name": "[1, 2]"}));
}

#[test]
fn test_hidden_fields_need_reveal() {
    let em = sqlite_blog();
    seed(&em);
    let users = em.repo("users").unwrap();
    let query = RepoQuery::new().filter(json!({"password": "s1"}));

    assert_eq!(users.find_many(&query).unwrap_err().code(), "invalid_search_params");

    let rows = users.find_many_with(&query, ReadOptions::revealed()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["password"], json!("s1"));

    // revealing one call leaves the next one untouched
    let rows = users.find_many(&RepoQuery::new()).unwrap();
    assert!(!rows[0].contains_key("password"));
}

#[test]
fn test_count_and_exists() {
    let em = sqlite_blog();
    seed(&em);
    let comments = em.repo("comments").unwrap();

    assert_eq!(comments.count(None).unwrap(), 3);
    assert_eq!(comments.count(Some(&json!({"posts_id": 1}))).unwrap(), 2);
    assert!(comments.exists(Some(&json!({"body": "hmm"}))).unwrap());
    assert!(!comments.exists(Some(&json!({"body": "nope"}))).unwrap());
}

#[test]
fn test_malformed_queries_are_rejected() {
    let em = sqlite_blog();
    let posts = em.repo("posts").unwrap();

    for filter in [json!({"nope": 1}), json!({"$xor": []}), json!({"views": {"$regex": "x"}}), json!([1])] {
        let err = posts.find_many(&RepoQuery::new().filter(filter)).unwrap_err();
        assert_eq!(err.code(), "invalid_search_params");
    }
    let err = RepoQuery::from_json(json!({"limit": "ten"})).unwrap_err();
    assert_eq!(err.code(), "invalid_search_params");
}

#[test]
fn test_file_database_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blog.db");
    let path = path.to_str().unwrap();

    let em = common::blog_manager(anchorage::Connection::sqlite(path).unwrap());
    em.schema().sync().unwrap();
    seed(&em);
    em.connection().close().unwrap();

    // syncing an existing schema is a no-op
    let em = common::blog_manager(anchorage::Connection::sqlite(path).unwrap());
    em.schema().sync().unwrap();
    let rows = em
        .repo("posts")
        .unwrap()
        .find_many(&RepoQuery::new().with("users", RepoQuery::new().select(["name"])))
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1]["users"], json!({"name": "ada"}));
}
