//! Schema definitions: fields, entities and DDL sync.

pub mod entity;
pub mod field;
pub mod sync;

#[doc(inline)]
pub use entity::{Entity, EntityConfig, EntityKind, ValidationOptions};
#[doc(inline)]
pub use field::{
    Action, ColumnType, DateFormat, Field, FieldConfig, FieldKind, NumberConfig, PrimaryFormat,
    TextConfig, Toggle, ValueContext, PRIMARY_FIELD,
};
#[doc(inline)]
pub use sync::SchemaManager;
