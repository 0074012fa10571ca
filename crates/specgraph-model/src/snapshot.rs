//! Immutable view of the whole entity corpus
//!
//! Analyzers receive a `&EntitySnapshot` and never mutate it. Mutating
//! operations clone the snapshot, apply their changes to the clone and hand
//! back the complete next state.

use crate::entity::{Entity, SubItem};
use crate::ids::{EntityId, SubItemId};
use crate::kind::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All entities keyed by ID, iterated in ID order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Entity>", into = "Vec<Entity>")]
pub struct EntitySnapshot {
    entities: BTreeMap<EntityId, Entity>,
}

impl EntitySnapshot {
    /// Create an empty snapshot
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a list of entities; later duplicates replace earlier ones
    #[must_use]
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            entities: entities.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    /// Insert or replace an entity, returning the previous version
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        self.entities.insert(entity.id.clone(), entity)
    }

    /// Number of entities
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the snapshot holds no entities
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up an entity
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Look up an entity (mutable)
    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Whether an entity exists
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Look up a sub-item inside its parent
    #[must_use]
    pub fn sub_item(&self, parent: &EntityId, id: &SubItemId) -> Option<&SubItem> {
        self.get(parent)?.item(id)
    }

    /// Iterate entities in ID order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Iterate entities mutably in ID order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// Entities of one kind
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.iter().filter(move |e| e.kind() == kind)
    }

    /// Consume into the entity list
    #[must_use]
    pub fn into_entities(self) -> Vec<Entity> {
        self.entities.into_values().collect()
    }
}

impl From<Vec<Entity>> for EntitySnapshot {
    fn from(entities: Vec<Entity>) -> Self {
        Self::from_entities(entities)
    }
}

impl From<EntitySnapshot> for Vec<Entity> {
    fn from(snapshot: EntitySnapshot) -> Self {
        snapshot.into_entities()
    }
}

impl FromIterator<Entity> for EntitySnapshot {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self::from_entities(iter)
    }
}
