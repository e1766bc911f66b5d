//! Error types for anchorage.
//!
//! Every failure surfaced to callers is a [`DataError`]. Each variant carries a
//! stable [`DataError::code`] discriminator so outer layers (HTTP handlers,
//! admin tooling) can map errors without matching on message text.
//!
//! Engine-level failures are wrapped as [`DataError::Driver`] around a
//! [`DbError`](crate::driver::DbError).

use crate::driver::DbError;
use serde::Serialize;
use std::fmt;

/// Result type for anchorage operations.
pub type DataResult<T> = Result<T, DataError>;

/// One failed constraint on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Field name the value was supplied for
    pub field: String,
    /// Name of the constraint that failed (`required`, `minimum`, `maxLength`, ...)
    pub constraint: String,
    /// Human-readable message
    pub message: String,
}

impl Violation {
    pub fn new(
        field: impl Into<String>,
        constraint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.constraint, self.message)
    }
}

struct Violations<'a>(&'a [Violation]);

impl fmt::Display for Violations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Errors raised by the schema, relation graph, query compiler and connection.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// A value violated a field constraint in `transform_persist`
    #[error("validation failed for field \"{field}\" ({constraint}): {message}")]
    Validation {
        field: String,
        constraint: String,
        message: String,
    },

    /// `Entity::is_valid_data` with `explain` found one or more violations
    #[error("invalid data for entity \"{entity}\": {}", Violations(.violations))]
    InvalidData {
        entity: String,
        violations: Vec<Violation>,
    },

    #[error("field \"{field}\" not found on entity \"{entity}\"")]
    FieldNotFound { entity: String, field: String },

    #[error("field \"{field}\" already exists on entity \"{entity}\"")]
    DuplicateField { entity: String, field: String },

    #[error("entity \"{0}\" not found")]
    EntityNotFound(String),

    #[error("entity \"{0}\" is already registered")]
    DuplicateEntity(String),

    #[error("relation \"{reference}\" not found on entity \"{entity}\"")]
    RelationNotFound { entity: String, reference: String },

    #[error("relation {relation} cannot be resolved: {reason}")]
    RelationResolution { relation: String, reason: String },

    #[error("relation {0} is used before it was initialized")]
    UninitializedRelation(String),

    #[error("invalid search params: {0}")]
    InvalidSearchParams(String),

    #[error("transaction state error: {0}")]
    TransactionState(String),

    #[error("driver \"{driver}\" does not support {capability}")]
    DriverCapability { driver: String, capability: String },

    /// A single-row read matched nothing
    #[error("no \"{entity}\" record matches the query")]
    NotFound { entity: String },

    /// Creation of a system entity outside a trusted write
    #[error("creating records of system entity \"{0}\" requires a trusted write")]
    SystemEntity(String),

    #[error(transparent)]
    Driver(#[from] DbError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DataError {
    /// Stable machine-readable discriminator
    pub fn code(&self) -> &'static str {
        match self {
            DataError::Validation { .. } => "validation",
            DataError::InvalidData { .. } => "invalid_data",
            DataError::FieldNotFound { .. } => "field_not_found",
            DataError::DuplicateField { .. } => "duplicate_field",
            DataError::EntityNotFound(_) => "entity_not_found",
            DataError::DuplicateEntity(_) => "duplicate_entity",
            DataError::RelationNotFound { .. } => "relation_not_found",
            DataError::RelationResolution { .. } => "relation_resolution",
            DataError::UninitializedRelation(_) => "uninitialized_relation",
            DataError::InvalidSearchParams(_) => "invalid_search_params",
            DataError::TransactionState(_) => "transaction_state",
            DataError::DriverCapability { .. } => "driver_capability",
            DataError::NotFound { .. } => "not_found",
            DataError::SystemEntity(_) => "system_entity",
            DataError::Driver(_) => "driver",
            DataError::Config(_) => "config",
        }
    }

    pub(crate) fn validation(
        field: impl Into<String>,
        constraint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        DataError::Validation {
            field: field.into(),
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    pub(crate) fn search(message: impl Into<String>) -> Self {
        DataError::InvalidSearchParams(message.into())
    }

    /// Violations carried by this error, if it is a validation failure
    pub fn violations(&self) -> Vec<Violation> {
        match self {
            DataError::Validation {
                field,
                constraint,
                message,
            } => vec![Violation::new(field, constraint, message)],
            DataError::InvalidData { violations, .. } => violations.clone(),
            _ => Vec::new(),
        }
    }
}

impl From<config::ConfigError> for DataError {
    fn from(err: config::ConfigError) -> Self {
        DataError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            DataError::validation("age", "minimum", "too small").code(),
            "validation"
        );
        assert_eq!(DataError::search("bad").code(), "invalid_search_params");
        assert_eq!(
            DataError::NotFound {
                entity: "posts".into()
            }
            .code(),
            "not_found"
        );
        assert_eq!(
            DataError::from(DbError::Closed).code(),
            "driver"
        );
    }

    #[test]
    fn test_validation_display_names_field_and_constraint() {
        let err = DataError::validation("age", "maximum", "must be at most 5");
        let display = err.to_string();
        assert!(display.contains("\"age\""));
        assert!(display.contains("maximum"));
    }

    #[test]
    fn test_invalid_data_lists_all_violations() {
        let err = DataError::InvalidData {
            entity: "users".into(),
            violations: vec![
                Violation::new("name", "required", "is required"),
                Violation::new("age", "minimum", "must be at least 3"),
            ],
        };
        let display = err.to_string();
        assert!(display.contains("name (required)"));
        assert!(display.contains("age (minimum)"));
        assert_eq!(err.violations().len(), 2);
    }
}
