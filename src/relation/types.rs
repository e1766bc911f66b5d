//! Relation building blocks: sides, anchors, kinds and configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One end of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Source => Side::Target,
            Side::Target => Side::Source,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Target => "target",
        }
    }
}

/// How many rows of an anchor's entity one row on the other side sees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    /// Optionally bounded
    Many(Option<u64>),
}

impl Cardinality {
    pub fn is_many(&self) -> bool {
        matches!(self, Cardinality::Many(_))
    }
}

/// One side of a relation
///
/// `reference` is the key under which this anchor's entity appears when it is
/// loaded from the opposite side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub entity: String,
    pub reference: String,
    pub cardinality: Cardinality,
}

impl Anchor {
    pub fn new(entity: impl Into<String>, cardinality: Cardinality) -> Self {
        let entity = entity.into();
        Self {
            reference: entity.clone(),
            entity,
            cardinality,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::OneToOne => "oneToOne",
            RelationKind::OneToMany => "oneToMany",
            RelationKind::ManyToOne => "manyToOne",
            RelationKind::ManyToMany => "manyToMany",
        }
    }

    /// Source and target cardinalities
    pub(crate) fn cardinalities(&self) -> (Cardinality, Cardinality) {
        match self {
            RelationKind::OneToOne => (Cardinality::One, Cardinality::One),
            RelationKind::OneToMany => (Cardinality::One, Cardinality::Many(None)),
            RelationKind::ManyToOne => (Cardinality::Many(None), Cardinality::One),
            RelationKind::ManyToMany => (Cardinality::Many(None), Cardinality::Many(None)),
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelationConfig {
    /// The owning-side foreign key is mandatory
    #[serde(default)]
    pub required: bool,
    /// Row cap for many-side eager loads that give no limit of their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_limit: Option<u64>,
    /// Many-to-many connection table name; defaults to `{source}_{target}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_table: Option<String>,
}
