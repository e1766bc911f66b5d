//! Entities: ordered, named collections of fields.

use super::field::{Action, Field, PrimaryFormat, PRIMARY_FIELD};
use crate::error::{DataError, DataResult, Violation};
use crate::query::sql::SortDir;
use crate::Record;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Regular,
    /// Managed by the application; records are only created by trusted writes
    System,
    /// Connection table created for a many-to-many relation
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_singular: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default sort for reads that give none
    #[serde(default = "default_sort_field")]
    pub sort_field: String,
    #[serde(default)]
    pub sort_dir: SortDir,
}

fn default_sort_field() -> String {
    PRIMARY_FIELD.to_string()
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            name_singular: None,
            description: None,
            sort_field: default_sort_field(),
            sort_dir: SortDir::Asc,
        }
    }
}

/// Options for [`Entity::is_valid_data`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    /// Fail with [`DataError::InvalidData`] listing every violation instead of returning `false`
    pub explain: bool,
    /// Drop keys that match no field instead of reporting them
    pub ignore_unknown: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub config: EntityConfig,
    fields: Vec<Field>,
}

impl Entity {
    /// An entity with an integer primary key
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_primary(name, PrimaryFormat::Integer)
    }

    pub fn with_primary(name: impl Into<String>, format: PrimaryFormat) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Regular,
            config: EntityConfig::default(),
            fields: vec![Field::primary(format)],
        }
    }

    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn config(mut self, config: EntityConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder form of [`Entity::add_field`]
    pub fn field(mut self, field: Field) -> DataResult<Self> {
        self.add_field(field)?;
        Ok(self)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_system(&self) -> bool {
        self.kind == EntityKind::System
    }

    /// Append a field, keeping insertion order
    pub fn add_field(&mut self, field: Field) -> DataResult<()> {
        if self.has_field(&field.name) {
            return Err(DataError::DuplicateField {
                entity: self.name.clone(),
                field: field.name,
            });
        }
        if field.is_primary() {
            return Err(DataError::validation(
                &field.name,
                "primary",
                "an entity has exactly one primary field",
            ));
        }
        field.validate_definition()?;
        self.fields.push(field);
        Ok(())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get_field(&self, name: &str) -> DataResult<&Field> {
        self.find_field(name).ok_or_else(|| DataError::FieldNotFound {
            entity: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn get_primary_field(&self) -> &Field {
        // the constructor always places the primary field first
        &self.fields[0]
    }

    /// Column names selected for `context`: primary field plus visible stored fields
    pub fn get_select(&self, context: Option<Action>) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| !f.is_virtual() && !f.is_hidden(context))
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Every stored column, hidden or not
    pub fn get_columns(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| !f.is_virtual())
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn get_fillable_fields(&self, action: Option<Action>, include_virtual: bool) -> Vec<&Field> {
        self.fields
            .iter()
            .filter(|f| f.is_fillable(action) && (include_virtual || !f.is_virtual()))
            .collect()
    }

    pub fn get_required_fields(&self) -> Vec<&Field> {
        self.fields
            .iter()
            .filter(|f| !f.is_primary() && f.is_required())
            .collect()
    }

    pub fn get_default_object(&self) -> Record {
        self.fields
            .iter()
            .filter_map(|f| f.get_default().map(|d| (f.name.clone(), d.clone())))
            .collect()
    }

    /// Run every relevant field's persist validation for `action`
    pub fn is_valid_data(
        &self,
        data: &Record,
        action: Action,
        opts: ValidationOptions,
    ) -> DataResult<bool> {
        let mut violations = Vec::new();

        for (key, value) in data {
            let Some(field) = self.find_field(key) else {
                if !opts.ignore_unknown {
                    violations.push(Violation::new(key, "unknown", "is not a field of this entity"));
                }
                continue;
            };
            if !field.is_fillable(Some(action)) {
                violations.push(Violation::new(
                    key,
                    "fillable",
                    format!("is not fillable on {}", action.as_str()),
                ));
                continue;
            }
            if let Err(err) = field.transform_persist(Some(value), action) {
                violations.extend(err.violations());
            }
        }

        if action == Action::Create {
            for field in self.get_required_fields() {
                if data.contains_key(&field.name) {
                    continue;
                }
                if let Err(err) = field.transform_persist(None, action) {
                    violations.extend(err.violations());
                }
            }
        }

        if violations.is_empty() {
            Ok(true)
        } else if opts.explain {
            Err(DataError::InvalidData {
                entity: self.name.clone(),
                violations,
            })
        } else {
            Ok(false)
        }
    }

    /// Configuration dump, fields keyed by name in declaration order
    pub fn to_json(&self) -> Value {
        let fields: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    serde_json::to_value(f).unwrap_or(Value::Null),
                )
            })
            .collect();
        json!({
            "name": self.name,
            "type": self.kind,
            "config": self.config,
            "fields": fields,
        })
    }

    /// JSON-schema object for external type generation
    pub fn to_types(&self) -> Value {
        let stored = self.fields.iter().filter(|f| !f.is_virtual());
        let properties: serde_json::Map<String, Value> =
            stored.clone().map(|f| (f.name.clone(), f.schema())).collect();
        let required: Vec<&str> = stored
            .filter(|f| f.is_required())
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "type": "object",
            "title": self.name,
            "properties": properties,
            "required": required,
        })
    }
}
