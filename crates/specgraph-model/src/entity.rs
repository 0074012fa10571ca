//! Entities and their versioned sub-items

use crate::error::ModelError;
use crate::ids::{EntityId, SubItemId};
use crate::kind::{EntityKind, SubItemKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Free-form JSON payload of an entity or sub-item
pub type Payload = Map<String, Value>;

/// Top-level specification document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Derived identifier (kind, number, slug)
    pub id: EntityId,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Payload fields, including entity-level reference fields
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Payload,

    /// Owned sub-item collections keyed by kind
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collections: BTreeMap<SubItemKind, Vec<SubItem>>,
}

impl Entity {
    /// Create an empty entity
    ///
    /// # Errors
    /// Returns `ModelError::InvalidSlug` if the slug is not URL-safe
    pub fn new(
        kind: EntityKind,
        number: u32,
        slug: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, ModelError> {
        Ok(Self::with_id(EntityId::new(kind, number, slug)?, name))
    }

    /// Create an empty entity from an existing ID
    #[must_use]
    pub fn with_id(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            fields: Payload::new(),
            collections: BTreeMap::new(),
        }
    }

    /// Entity kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.id.kind()
    }

    /// Set a payload field (builder style)
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Append a sub-item (builder style)
    ///
    /// # Errors
    /// Returns `ModelError::WrongParent` if the item kind does not belong to this entity kind
    pub fn with_item(mut self, item: SubItem) -> Result<Self, ModelError> {
        self.push_item(item)?;
        Ok(self)
    }

    /// Append a sub-item to its collection
    ///
    /// # Errors
    /// Returns `ModelError::WrongParent` if the item kind does not belong to this entity kind
    pub fn push_item(&mut self, item: SubItem) -> Result<(), ModelError> {
        let kind = item.id.kind();
        if kind.parent_kind() != self.kind() {
            return Err(ModelError::WrongParent {
                kind,
                parent: self.kind(),
            });
        }
        self.collections.entry(kind).or_default().push(item);
        Ok(())
    }

    /// Items of one kind, in insertion order
    #[must_use]
    pub fn items(&self, kind: SubItemKind) -> &[SubItem] {
        self.collections
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All items across collections
    pub fn all_items(&self) -> impl Iterator<Item = &SubItem> {
        self.collections.values().flatten()
    }

    /// Find a sub-item by ID
    #[must_use]
    pub fn item(&self, id: &SubItemId) -> Option<&SubItem> {
        self.items(id.kind()).iter().find(|item| item.id == *id)
    }

    /// Find a sub-item by ID (mutable)
    pub fn item_mut(&mut self, id: &SubItemId) -> Option<&mut SubItem> {
        self.collections
            .get_mut(&id.kind())?
            .iter_mut()
            .find(|item| item.id == *id)
    }

    /// Next free ID for a kind: one past the highest number ever used, retired items included
    #[must_use]
    pub fn next_item_id(&self, kind: SubItemKind) -> SubItemId {
        let max = self
            .items(kind)
            .iter()
            .map(|item| item.id.number())
            .max()
            .unwrap_or(0);
        SubItemId::new(kind, max + 1)
    }
}

/// Referenceable, versionable unit nested in an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubItem {
    /// Namespaced ID, unique within the parent collection
    pub id: SubItemId,

    /// Payload fields, including reference fields
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Payload,

    /// Previous version in the chain
    #[serde(default)]
    pub supersedes: Option<SubItemId>,

    /// Next version in the chain; `None` while the item is active
    #[serde(default)]
    pub superseded_by: Option<SubItemId>,

    /// When `superseded_by` was set
    #[serde(default)]
    pub superseded_at: Option<DateTime<Utc>>,
}

impl SubItem {
    /// Create an active item with an empty payload
    #[must_use]
    pub fn new(id: SubItemId) -> Self {
        Self {
            id,
            fields: Payload::new(),
            supersedes: None,
            superseded_by: None,
            superseded_at: None,
        }
    }

    /// Set a payload field (builder style)
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Active items have not been superseded
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// Retired items have a successor
    #[inline]
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.superseded_by.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> Entity {
        Entity::new(EntityKind::Plan, 1, "auth", "Auth").unwrap()
    }

    #[test]
    fn push_item_rejects_foreign_kind() {
        let mut entity = plan();
        let result = entity.push_item(SubItem::new(SubItemId::new(SubItemKind::Criterion, 1)));
        assert_eq!(
            result,
            Err(ModelError::WrongParent {
                kind: SubItemKind::Criterion,
                parent: EntityKind::Plan,
            })
        );
    }

    #[test]
    fn next_item_id_counts_retired_items() {
        let mut retired = SubItem::new(SubItemId::new(SubItemKind::Task, 3));
        retired.superseded_by = Some(SubItemId::new(SubItemKind::Task, 4));

        let entity = plan()
            .with_item(SubItem::new(SubItemId::new(SubItemKind::Task, 1)))
            .unwrap()
            .with_item(retired)
            .unwrap();

        assert_eq!(
            entity.next_item_id(SubItemKind::Task),
            SubItemId::new(SubItemKind::Task, 4)
        );
        assert_eq!(
            entity.next_item_id(SubItemKind::Flow),
            SubItemId::new(SubItemKind::Flow, 1)
        );
    }

    #[test]
    fn entity_roundtrips_through_yaml() {
        let entity = plan()
            .with_field("criteria_id", "req-001-login/crit-001")
            .with_item(
                SubItem::new(SubItemId::new(SubItemKind::Task, 1)).with_field("title", "Schema"),
            )
            .unwrap();

        let yaml = serde_yaml::to_string(&entity).unwrap();
        let back: Entity = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, entity);
    }
}
