//! # Anchorage
//!
//! Schema-driven data access over SQLite and PostgreSQL.
//!
//! Entities are declared as typed fields, relations connect them, and an
//! [`EntityManager`] binds both to one [`Connection`]. Reads go through a
//! [`Repository`] and accept JSON-shaped queries whose `with` clauses load
//! related records in the same statement; writes go through a [`Mutator`]
//! that validates every value before it reaches the database.
//!
//! ```no_run
//! use anchorage::{Connection, Entity, EntityManager, Field, Relation, RepoQuery};
//! use std::sync::Arc;
//!
//! # fn main() -> anchorage::DataResult<()> {
//! let em = EntityManager::builder(Arc::new(Connection::sqlite_memory()?))
//!     .entity(Entity::new("users").field(Field::text("name").required())?)
//!     .entity(Entity::new("posts").field(Field::text("title"))?)
//!     .relation(Relation::many_to_one("posts", "users"))
//!     .build()?;
//! em.schema().sync()?;
//!
//! let posts = em.repo("posts")?.find_many(&RepoQuery::new().with("users", RepoQuery::new()))?;
//! # let _ = posts;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
#[cfg(feature = "tracing")]
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod mutator;
pub mod query;
pub mod relation;
pub mod repository;
pub mod schema;

/// One row or JSON document, keys in column order
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use config::{DataConfig, DriverKind};
pub use connection::Connection;
pub use driver::{DbError, Driver, RunResult};
pub use error::{DataError, DataResult, Violation};
pub use manager::{EntityManager, EntityManagerBuilder, Limits};
pub use mutator::{Mutator, WriteOptions};
pub use query::sql::{Dialect, SortDir};
pub use query::{ReadOptions, RepoQuery, Sort};
pub use relation::{Relation, RelationKind, Side};
pub use repository::Repository;
pub use schema::{Action, Entity, EntityKind, Field, FieldKind, SchemaManager, PRIMARY_FIELD};
