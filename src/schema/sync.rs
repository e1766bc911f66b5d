//! SchemaManager - creates the tables of an entity graph

use super::{ColumnType, Entity, PrimaryFormat};
use crate::error::DataResult;
use crate::manager::EntityManager;
use crate::query::sql::{Dialect, Ident};
use sea_query::{ColumnDef, Table, TableCreateStatement};

/// Generates and runs `CREATE TABLE IF NOT EXISTS` for every entity
pub struct SchemaManager<'a> {
    em: &'a EntityManager,
}

impl<'a> SchemaManager<'a> {
    pub fn new(em: &'a EntityManager) -> Self {
        Self { em }
    }

    fn dialect(&self) -> Dialect {
        self.em.connection().dialect()
    }

    /// One create statement per entity, in registration order
    pub fn create_statements(&self) -> Vec<TableCreateStatement> {
        let dialect = self.dialect();
        self.em
            .entities()
            .iter()
            .map(|entity| create_table(entity, dialect))
            .collect()
    }

    /// The statements rendered for the connection's dialect
    pub fn create_sql(&self) -> Vec<String> {
        let dialect = self.dialect();
        self.create_statements()
            .iter()
            .map(|stmt| dialect.build_table(stmt))
            .collect()
    }

    /// Create every missing table
    pub fn sync(&self) -> DataResult<()> {
        let connection = self.em.connection();
        for sql in self.create_sql() {
            connection.execute_raw(&sql)?;
        }
        log::info!(
            "schema synced: {} tables on {}",
            self.em.entities().len(),
            connection.driver_name()
        );
        Ok(())
    }
}

fn column(name: &str, column_type: ColumnType, dialect: Dialect) -> ColumnDef {
    let mut def = ColumnDef::new(Ident::new(name));
    match column_type {
        ColumnType::Primary(PrimaryFormat::Integer) => {
            match dialect {
                // INTEGER PRIMARY KEY AUTOINCREMENT aliases the rowid
                Dialect::Sqlite => def.integer(),
                // identity column
                Dialect::Postgres => def.big_integer(),
            };
            def.not_null().auto_increment().primary_key();
        }
        ColumnType::Primary(PrimaryFormat::Uuid) => {
            def.text().not_null().primary_key();
        }
        ColumnType::BigInteger => {
            def.big_integer();
        }
        ColumnType::Double => {
            def.double();
        }
        ColumnType::Boolean => {
            def.boolean();
        }
        ColumnType::Text => {
            def.text();
        }
        ColumnType::Json => {
            match dialect {
                Dialect::Sqlite => def.text(),
                Dialect::Postgres => def.json_binary(),
            };
        }
    }
    def
}

pub(crate) fn create_table(entity: &Entity, dialect: Dialect) -> TableCreateStatement {
    let mut table = Table::create();
    table.table(Ident::new(&entity.name)).if_not_exists();
    for field in entity.fields().iter().filter(|f| !f.is_virtual()) {
        let mut def = column(&field.name, field.column_type(), dialect);
        if field.is_required() && !field.is_primary() {
            def.not_null();
        }
        table.col(def);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, NumberConfig};

    fn posts() -> Entity {
        Entity::new("posts")
            .field(Field::text("title").required())
            .and_then(|e| e.field(Field::new("score", NumberConfig::default())))
            .and_then(|e| e.field(Field::json("meta")))
            .and_then(|e| e.field(Field::text("computed").virtual_field()))
            .unwrap()
    }

    #[test]
    fn test_sqlite_ddl() {
        let sql = Dialect::Sqlite.build_table(&create_table(&posts(), Dialect::Sqlite));
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"posts\""));
        assert!(sql.contains("\"id\" integer NOT NULL PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"title\" text NOT NULL"));
        assert!(sql.contains("\"meta\" text"));
        assert!(!sql.contains("computed"));
    }

    #[test]
    fn test_postgres_ddl() {
        let sql = Dialect::Postgres.build_table(&create_table(&posts(), Dialect::Postgres));
        assert!(sql.contains("\"id\" bigint GENERATED BY DEFAULT AS IDENTITY NOT NULL PRIMARY KEY"));
        assert!(sql.contains("\"meta\" jsonb"));
        assert!(sql.contains("\"score\" double precision"));
    }
}
