//! The EntityManager: entities, relations and a connection in one graph.
//!
//! Build order is fixed:
//! 1. register every entity,
//! 2. check relation anchors and contribute foreign-key fields and
//!    many-to-many connection entities,
//! 3. freeze the entities behind `Arc`s,
//! 4. initialize every relation against the finished manager.
//!
//! Only the built manager hands out repositories and mutators.

use crate::config::DataConfig;
use crate::connection::Connection;
use crate::error::{DataError, DataResult};
use crate::mutator::Mutator;
use crate::relation::{Relation, Side};
use crate::repository::Repository;
use crate::schema::{Entity, EntityKind, Field, FieldKind, PrimaryFormat, SchemaManager};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one built manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerId(u64);

impl ManagerId {
    fn next() -> Self {
        ManagerId(NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Query ceilings applied by repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Deepest accepted `with` nesting
    pub max_with_depth: usize,
    /// Row limit when a query gives none
    pub default_limit: u64,
}

impl Default for Limits {
    fn default() -> Self {
        let config = DataConfig::default();
        Self::from(&config)
    }
}

impl From<&DataConfig> for Limits {
    fn from(config: &DataConfig) -> Self {
        Self {
            max_with_depth: config.max_with_depth,
            default_limit: config.default_limit,
        }
    }
}

pub struct EntityManagerBuilder {
    connection: Arc<Connection>,
    entities: Vec<Entity>,
    relations: Vec<Relation>,
    limits: Limits,
}

impl EntityManagerBuilder {
    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn build(self) -> DataResult<Arc<EntityManager>> {
        let EntityManagerBuilder {
            connection,
            mut entities,
            relations,
            limits,
        } = self;

        let mut index = HashMap::new();
        for (i, entity) in entities.iter().enumerate() {
            if index.insert(entity.name.clone(), i).is_some() {
                return Err(DataError::DuplicateEntity(entity.name.clone()));
            }
        }

        for relation in &relations {
            for side in [Side::Source, Side::Target] {
                let name = &relation.anchor(side).entity;
                if !index.contains_key(name) {
                    return Err(DataError::RelationResolution {
                        relation: relation.to_string(),
                        reason: format!("entity \"{name}\" is not registered"),
                    });
                }
            }
            contribute_fields(relation, &mut entities, &mut index)?;
        }

        let entities: Vec<Arc<Entity>> = entities.into_iter().map(Arc::new).collect();
        let em = EntityManager {
            id: ManagerId::next(),
            entities,
            index,
            relations,
            connection,
            limits,
        };
        for relation in &em.relations {
            relation.initialize(&em)?;
        }
        log::debug!(
            "entity manager built with {} entities and {} relations",
            em.entities.len(),
            em.relations.len()
        );
        Ok(Arc::new(em))
    }
}

fn primary_format(entity: &Entity) -> PrimaryFormat {
    match entity.get_primary_field().kind {
        FieldKind::Primary { format } => format,
        _ => PrimaryFormat::Integer,
    }
}

/// Foreign-key field pointing at `target`
fn foreign_key_field(name: &str, target: &Entity, required: bool) -> Field {
    let field = Field::relation(name, target.name.clone(), primary_format(target));
    if required {
        field.required()
    } else {
        field
    }
}

/// Add a field unless an equivalent foreign key was declared by hand
fn ensure_field(entity: &mut Entity, field: Field) -> DataResult<()> {
    if let Some(existing) = entity.find_field(&field.name) {
        if matches!(existing.kind, FieldKind::Relation { .. }) {
            return Ok(());
        }
    }
    entity.add_field(field)
}

fn contribute_fields(
    relation: &Relation,
    entities: &mut Vec<Entity>,
    index: &mut HashMap<String, usize>,
) -> DataResult<()> {
    if let Some((holder_side, fk)) = relation.foreign_key() {
        let holder = index[&relation.anchor(holder_side).entity];
        let referenced = index[&relation.other(holder_side).entity];
        let field = foreign_key_field(&fk, &entities[referenced], relation.config().required);
        return ensure_field(&mut entities[holder], field);
    }

    let (Some(table), Some((source_col, target_col))) =
        (relation.connection_table_name(), relation.connection_columns())
    else {
        return Ok(());
    };
    let source = &entities[index[&relation.source().entity]];
    let target = &entities[index[&relation.target().entity]];
    let source_field = foreign_key_field(&source_col, source, true);
    let target_field = foreign_key_field(&target_col, target, true);

    match index.get(&table).copied() {
        Some(i) if entities[i].kind == EntityKind::Generated => {
            ensure_field(&mut entities[i], source_field)?;
            ensure_field(&mut entities[i], target_field)
        }
        Some(_) => Err(DataError::DuplicateEntity(table)),
        None => {
            let connection = Entity::new(table.clone())
                .kind(EntityKind::Generated)
                .field(source_field)?
                .field(target_field)?;
            index.insert(table, entities.len());
            entities.push(connection);
            Ok(())
        }
    }
}

/// Registry of entities and relations bound to one connection
pub struct EntityManager {
    id: ManagerId,
    entities: Vec<Arc<Entity>>,
    index: HashMap<String, usize>,
    relations: Vec<Relation>,
    connection: Arc<Connection>,
    limits: Limits,
}

impl EntityManager {
    pub fn builder(connection: Arc<Connection>) -> EntityManagerBuilder {
        EntityManagerBuilder {
            connection,
            entities: Vec::new(),
            relations: Vec::new(),
            limits: Limits::default(),
        }
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Entities in registration order, generated connection entities last
    pub fn entities(&self) -> &[Arc<Entity>] {
        &self.entities
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn has_entity(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn entity(&self, name: &str) -> DataResult<&Arc<Entity>> {
        self.index
            .get(name)
            .map(|&i| &self.entities[i])
            .ok_or_else(|| DataError::EntityNotFound(name.to_string()))
    }

    pub(crate) fn entity_arc(&self, name: &str) -> Option<Arc<Entity>> {
        self.index.get(name).map(|&i| Arc::clone(&self.entities[i]))
    }

    /// Relations with an anchor on `entity`
    pub fn relations_of(&self, entity: &str) -> Vec<&Relation> {
        self.relations
            .iter()
            .filter(|r| r.source().entity == entity || r.target().entity == entity)
            .collect()
    }

    /// The relation and the side at `entity` from which `reference` is reachable
    pub fn relation_of(&self, entity: &str, reference: &str) -> DataResult<(&Relation, Side)> {
        self.relations
            .iter()
            .find_map(|r| r.side_for(entity, reference).map(|side| (r, side)))
            .ok_or_else(|| DataError::RelationNotFound {
                entity: entity.to_string(),
                reference: reference.to_string(),
            })
    }

    pub fn repo(&self, entity: &str) -> DataResult<Repository<'_>> {
        Ok(Repository::new(self, Arc::clone(self.entity(entity)?)))
    }

    pub fn mutator(&self, entity: &str) -> DataResult<Mutator<'_>> {
        Ok(Mutator::new(self, Arc::clone(self.entity(entity)?)))
    }

    pub fn schema(&self) -> SchemaManager<'_> {
        SchemaManager::new(self)
    }
}
