//! Relation module for entity relationships.
//!
//! A [`Relation`] is a typed edge between two entities:
//! - `ManyToOne`: the source holds a foreign key to the target (`posts.users_id`)
//! - `OneToOne`: like many-to-one, with one row on both sides
//! - `OneToMany`: the target holds a foreign key to the source
//! - `ManyToMany`: rows are linked through a generated connection entity
//!
//! Relations are declared by entity *name* and only bound to live entities
//! when the [`EntityManager`] initializes them, so a relation may name an
//! entity registered after it.

pub mod helpers;
pub mod types;

#[doc(inline)]
pub use helpers::{foreign_key_name, join_condition};
#[doc(inline)]
pub use types::{Anchor, Cardinality, RelationConfig, RelationKind, Side};

use crate::error::{DataError, DataResult};
use crate::manager::{EntityManager, ManagerId};
use crate::query::sql::{qualified, Fragment, JoinClause, SubSelect};
use crate::schema::{Entity, PRIMARY_FIELD};
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Live entities a relation was initialized against
#[derive(Debug, Clone)]
struct Binding {
    manager: ManagerId,
    source: Arc<Entity>,
    target: Arc<Entity>,
    connection: Option<Arc<Entity>>,
}

#[derive(Debug, Clone)]
pub struct Relation {
    kind: RelationKind,
    source: Anchor,
    target: Anchor,
    directions: BTreeSet<Side>,
    config: RelationConfig,
    binding: OnceCell<Binding>,
}

impl Relation {
    pub fn new(kind: RelationKind, source: impl Into<String>, target: impl Into<String>) -> Self {
        let (source_card, target_card) = kind.cardinalities();
        Self {
            kind,
            source: Anchor::new(source, source_card),
            target: Anchor::new(target, target_card),
            directions: [Side::Source, Side::Target].into_iter().collect(),
            config: RelationConfig::default(),
            binding: OnceCell::new(),
        }
    }

    /// `source` rows each point at one `target` row
    pub fn many_to_one(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToOne, source, target)
    }

    pub fn one_to_one(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(RelationKind::OneToOne, source, target)
    }

    /// One `source` row owns many `target` rows
    pub fn one_to_many(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(RelationKind::OneToMany, source, target)
    }

    pub fn many_to_many(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToMany, source, target)
    }

    /// Key under which source rows appear when loaded from the target
    pub fn source_ref(mut self, reference: impl Into<String>) -> Self {
        self.source.reference = reference.into();
        self
    }

    /// Key under which target rows appear when loaded from the source
    pub fn target_ref(mut self, reference: impl Into<String>) -> Self {
        self.target.reference = reference.into();
        self
    }

    /// Upper bound on the many side(s)
    pub fn max_items(mut self, max: u64) -> Self {
        for anchor in [&mut self.source, &mut self.target] {
            if anchor.cardinality.is_many() {
                anchor.cardinality = Cardinality::Many(Some(max));
            }
        }
        self
    }

    pub fn required(mut self) -> Self {
        self.config.required = true;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.config.with_limit = Some(limit);
        self
    }

    pub fn connection_table(mut self, name: impl Into<String>) -> Self {
        self.config.connection_table = Some(name.into());
        self
    }

    pub fn directions(mut self, sides: impl IntoIterator<Item = Side>) -> Self {
        self.set_directions(sides);
        self
    }

    /// Restrict visibility to the given sides
    pub fn set_directions(&mut self, sides: impl IntoIterator<Item = Side>) {
        self.directions = sides.into_iter().collect();
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn source(&self) -> &Anchor {
        &self.source
    }

    pub fn target(&self) -> &Anchor {
        &self.target
    }

    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    pub fn anchor(&self, side: Side) -> &Anchor {
        match side {
            Side::Source => &self.source,
            Side::Target => &self.target,
        }
    }

    /// The anchor opposite `side`
    pub fn other(&self, side: Side) -> &Anchor {
        self.anchor(side.opposite())
    }

    /// Whether the entity at `side` can see the other side
    pub fn visible_from(&self, side: Side) -> bool {
        self.directions.contains(&side)
    }

    /// Whether `entity` is a side from which the opposite entity is listed
    pub fn is_listable_for(&self, entity: &str) -> bool {
        let listing_sides: &[Side] = match self.kind {
            RelationKind::ManyToOne => &[Side::Target],
            RelationKind::OneToMany => &[Side::Source],
            RelationKind::ManyToMany => &[Side::Source, Side::Target],
            RelationKind::OneToOne => &[],
        };
        listing_sides
            .iter()
            .any(|side| self.anchor(*side).entity == entity && self.visible_from(*side))
    }

    /// Side at `entity` from which `reference` names the opposite anchor
    pub fn side_for(&self, entity: &str, reference: &str) -> Option<Side> {
        [Side::Source, Side::Target].into_iter().find(|side| {
            self.anchor(*side).entity == entity
                && self.visible_from(*side)
                && self.other(*side).reference == reference
        })
    }

    /// Side whose entity stores the foreign key, and the column name
    pub fn foreign_key(&self) -> Option<(Side, String)> {
        match self.kind {
            RelationKind::ManyToOne | RelationKind::OneToOne => {
                Some((Side::Source, foreign_key_name(&self.target.reference)))
            }
            RelationKind::OneToMany => Some((Side::Target, foreign_key_name(&self.source.reference))),
            RelationKind::ManyToMany => None,
        }
    }

    /// Connection entity name for many-to-many relations
    pub fn connection_table_name(&self) -> Option<String> {
        match self.kind {
            RelationKind::ManyToMany => Some(
                self.config
                    .connection_table
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}", self.source.entity, self.target.entity)),
            ),
            _ => None,
        }
    }

    /// Connection-table columns pointing at the source and the target
    pub fn connection_columns(&self) -> Option<(String, String)> {
        match self.kind {
            RelationKind::ManyToMany => Some((
                foreign_key_name(&self.source.reference),
                foreign_key_name(&self.target.reference),
            )),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.binding.get().is_some()
    }

    /// Bind to the live entities of `em`
    ///
    /// Calling this again with the same manager is a no-op; a different
    /// manager is rejected.
    pub fn initialize(&self, em: &EntityManager) -> DataResult<()> {
        if let Some(binding) = self.binding.get() {
            return self.check_manager(binding, em.id());
        }

        if self.source.entity == self.target.entity
            && self.source.reference == self.target.reference
        {
            return Err(self.resolution_error(
                "a self-referencing relation needs distinct source and target references",
            ));
        }

        let resolve = |name: &str| {
            em.entity_arc(name)
                .ok_or_else(|| self.resolution_error(format!("entity \"{name}\" is not registered")))
        };
        let source = resolve(&self.source.entity)?;
        let target = resolve(&self.target.entity)?;
        let connection = match self.connection_table_name() {
            Some(table) => Some(resolve(&table)?),
            None => None,
        };

        let binding = Binding {
            manager: em.id(),
            source,
            target,
            connection,
        };
        if self.binding.set(binding).is_err() {
            // initialized concurrently; accept only if it was the same manager
            if let Some(existing) = self.binding.get() {
                return self.check_manager(existing, em.id());
            }
        }
        log::debug!("initialized relation {self}");
        Ok(())
    }

    fn check_manager(&self, binding: &Binding, manager: ManagerId) -> DataResult<()> {
        if binding.manager == manager {
            Ok(())
        } else {
            Err(self.resolution_error("already initialized by another entity manager"))
        }
    }

    fn resolution_error(&self, reason: impl Into<String>) -> DataError {
        DataError::RelationResolution {
            relation: self.to_string(),
            reason: reason.into(),
        }
    }

    fn binding(&self) -> DataResult<&Binding> {
        self.binding
            .get()
            .ok_or_else(|| DataError::UninitializedRelation(self.to_string()))
    }

    /// Live entity at `side`
    pub fn entity(&self, side: Side) -> DataResult<&Arc<Entity>> {
        let binding = self.binding()?;
        Ok(match side {
            Side::Source => &binding.source,
            Side::Target => &binding.target,
        })
    }

    /// Generated connection entity of a many-to-many relation
    pub fn connection_entity(&self) -> DataResult<Option<&Arc<Entity>>> {
        Ok(self.binding()?.connection.as_ref())
    }

    fn resolve_side(&self, entity: &str, reference: &str) -> DataResult<Side> {
        self.side_for(entity, reference)
            .ok_or_else(|| DataError::RelationNotFound {
                entity: entity.to_string(),
                reference: reference.to_string(),
            })
    }

    /// Row cap when loading `anchor`'s rows
    fn load_limit(&self, anchor: &Anchor) -> Option<u64> {
        match anchor.cardinality {
            Cardinality::One => Some(1),
            Cardinality::Many(bound) => match (bound, self.config.with_limit) {
                (Some(bound), Some(limit)) => Some(bound.min(limit)),
                (bound, limit) => bound.or(limit),
            },
        }
    }

    /// Rows of the side opposite `entity`, correlated to `parent_alias`
    fn linked(
        &self,
        entity: &str,
        reference: &str,
        parent_alias: &str,
        alias: &str,
    ) -> DataResult<(Side, SubSelect)> {
        let binding = self.binding()?;
        let side = self.resolve_side(entity, reference)?;
        let other = side.opposite();
        let other_entity = match other {
            Side::Source => &binding.source,
            Side::Target => &binding.target,
        };

        let mut sub = SubSelect::new(other_entity.name.clone(), alias);
        match self.kind {
            RelationKind::ManyToOne | RelationKind::OneToOne | RelationKind::OneToMany => {
                let (holder, fk) = self
                    .foreign_key()
                    .ok_or_else(|| self.resolution_error("missing foreign key"))?;
                let condition = if holder == other {
                    // the loaded rows point at the parent
                    join_condition(alias, &fk, parent_alias, PRIMARY_FIELD)
                } else {
                    // the parent points at the loaded row
                    join_condition(alias, PRIMARY_FIELD, parent_alias, &fk)
                };
                sub.conditions.push(condition);
            }
            RelationKind::ManyToMany => {
                let connection = binding
                    .connection
                    .as_ref()
                    .ok_or_else(|| self.resolution_error("missing connection entity"))?;
                let (source_col, target_col) = self
                    .connection_columns()
                    .ok_or_else(|| self.resolution_error("missing connection columns"))?;
                let (own_col, other_col) = match side {
                    Side::Source => (source_col, target_col),
                    Side::Target => (target_col, source_col),
                };
                let link_alias = format!("{alias}_{}", connection.name);
                sub.joins.push(JoinClause {
                    table: connection.name.clone(),
                    alias: link_alias.clone(),
                    left: qualified(&link_alias, &other_col),
                    right: qualified(alias, PRIMARY_FIELD),
                });
                sub.conditions.push(Fragment::new(format!(
                    "{} = {}",
                    qualified(&link_alias, &own_col),
                    qualified(parent_alias, PRIMARY_FIELD)
                )));
            }
        }
        Ok((side, sub))
    }

    /// Correlated sub-select loading the side opposite `entity` for eager loading
    ///
    /// One-cardinality sides are limited to a single row; many sides get the
    /// configured `with_limit` (or the anchor's bound).
    pub fn build_with(
        &self,
        entity: &str,
        reference: &str,
        parent_alias: &str,
        alias: &str,
    ) -> DataResult<SubSelect> {
        let (side, mut sub) = self.linked(entity, reference, parent_alias, alias)?;
        sub.limit = self.load_limit(self.other(side));
        Ok(sub)
    }

    /// Correlated sub-select for filtering by a related field, without limits
    pub fn build_join(
        &self,
        entity: &str,
        reference: &str,
        parent_alias: &str,
        alias: &str,
    ) -> DataResult<SubSelect> {
        let (_, sub) = self.linked(entity, reference, parent_alias, alias)?;
        Ok(sub)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.source.entity, self.source.reference, self.target.entity, self.target.reference, self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directions() {
        let relation = Relation::many_to_one("posts", "users");
        assert!(relation.visible_from(Side::Source));
        assert!(relation.visible_from(Side::Target));
        assert_eq!(relation.other(Side::Source).entity, "users");

        let relation = relation.directions([Side::Target]);
        assert!(!relation.visible_from(Side::Source));
        assert!(relation.visible_from(Side::Target));
    }

    #[test]
    fn test_listable_side() {
        let relation = Relation::many_to_one("posts", "users");
        assert!(relation.is_listable_for("users"));
        assert!(!relation.is_listable_for("posts"));

        let hidden = Relation::many_to_one("posts", "users").directions([Side::Source]);
        assert!(!hidden.is_listable_for("users"));

        let m2m = Relation::many_to_many("posts", "categories");
        assert!(m2m.is_listable_for("posts"));
        assert!(m2m.is_listable_for("categories"));
        assert!(!Relation::one_to_one("users", "settings").is_listable_for("users"));
    }

    #[test]
    fn test_side_for_respects_references_and_directions() {
        let relation = Relation::many_to_one("posts", "users").target_ref("author");
        assert_eq!(relation.side_for("posts", "author"), Some(Side::Source));
        assert_eq!(relation.side_for("users", "posts"), Some(Side::Target));
        assert_eq!(relation.side_for("posts", "users"), None);

        let relation = relation.directions([Side::Source]);
        assert_eq!(relation.side_for("users", "posts"), None);
    }

    #[test]
    fn test_foreign_keys_and_connection_tables() {
        assert_eq!(
            Relation::many_to_one("posts", "users").target_ref("author").foreign_key(),
            Some((Side::Source, "author_id".to_string()))
        );
        assert_eq!(
            Relation::one_to_many("users", "posts").foreign_key(),
            Some((Side::Target, "users_id".to_string()))
        );
        let m2m = Relation::many_to_many("posts", "categories");
        assert_eq!(m2m.foreign_key(), None);
        assert_eq!(m2m.connection_table_name().as_deref(), Some("posts_categories"));
        assert_eq!(
            m2m.connection_columns(),
            Some(("posts_id".to_string(), "categories_id".to_string()))
        );
    }

    #[test]
    fn test_query_building_requires_initialization() {
        let relation = Relation::many_to_one("posts", "users");
        let err = relation.build_with("posts", "users", "posts", "users").unwrap_err();
        assert_eq!(err.code(), "uninitialized_relation");
        assert!(!relation.is_initialized());
    }

    #[test]
    fn test_max_items_caps_with_limit() {
        let relation = Relation::many_to_one("posts", "users").max_items(3).with_limit(10);
        assert_eq!(relation.load_limit(relation.source()), Some(3));
        assert_eq!(relation.load_limit(relation.target()), Some(1));
    }
}
