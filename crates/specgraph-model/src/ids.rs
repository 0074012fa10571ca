//! Stable identifiers
//!
//! IDs are immutable once assigned. Entity IDs derive from kind, number and
//! slug; sub-item IDs are namespaced by prefix and unique within their parent
//! collection. `NodeRef` qualifies a sub-item (or flow step) with its parent so
//! that every graph node has a globally unique key.

use crate::error::ModelError;
use crate::kind::{EntityKind, NodeKind, SubItemKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between the segments of a qualified node key
pub const KEY_SEPARATOR: char = '/';

/// Entity identifier: `{short}-{number:03}-{slug}`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    kind: EntityKind,
    number: u32,
    slug: String,
}

impl EntityId {
    /// Create a new entity ID
    ///
    /// # Errors
    /// Returns `ModelError::InvalidSlug` if the slug is not URL-safe
    pub fn new(kind: EntityKind, number: u32, slug: impl Into<String>) -> Result<Self, ModelError> {
        let slug = slug.into();
        if !is_valid_slug(&slug) {
            return Err(ModelError::InvalidSlug(slug));
        }
        Ok(Self { kind, number, slug })
    }

    /// Entity kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Sequential number, unique per kind
    #[inline]
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    /// URL-safe slug
    #[inline]
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}-{}", self.kind.short(), self.number, self.slug)
    }
}

impl FromStr for EntityId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidEntityId(s.to_string());

        let (short, rest) = s.split_once('-').ok_or_else(invalid)?;
        let kind = EntityKind::from_short(short).ok_or_else(invalid)?;
        let (digits, slug) = rest.split_once('-').ok_or_else(invalid)?;
        let number = parse_number(digits).ok_or_else(invalid)?;

        Self::new(kind, number, slug).map_err(|_| invalid())
    }
}

impl TryFrom<String> for EntityId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

/// Sub-item identifier: `{prefix}-{number:03}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubItemId {
    kind: SubItemKind,
    number: u32,
}

impl SubItemId {
    /// Create a new sub-item ID
    #[inline]
    #[must_use]
    pub const fn new(kind: SubItemKind, number: u32) -> Self {
        Self { kind, number }
    }

    /// Sub-item kind
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> SubItemKind {
        self.kind
    }

    /// Sequential number within the parent collection
    #[inline]
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for SubItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}", self.kind.prefix(), self.number)
    }
}

impl FromStr for SubItemId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidSubItemId(s.to_string());

        let (prefix, digits) = s.rsplit_once('-').ok_or_else(invalid)?;
        let kind = SubItemKind::from_prefix(prefix).ok_or_else(invalid)?;
        let number = parse_number(digits).ok_or_else(invalid)?;

        Ok(Self::new(kind, number))
    }
}

impl TryFrom<String> for SubItemId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubItemId> for String {
    fn from(id: SubItemId) -> Self {
        id.to_string()
    }
}

/// Fully qualified reference to any graph node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeRef {
    /// Top-level entity
    Entity(EntityId),
    /// Sub-item inside its parent entity
    SubItem {
        /// Owning entity
        parent: EntityId,
        /// Sub-item within the parent
        item: SubItemId,
    },
    /// Step inside a flow
    FlowStep {
        /// Entity owning the flow
        parent: EntityId,
        /// Flow owning the step
        flow: SubItemId,
        /// Step ID within the flow
        step: String,
    },
}

impl NodeRef {
    /// Kind of the referenced node
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Entity(id) => NodeKind::Entity(id.kind()),
            Self::SubItem { item, .. } => NodeKind::SubItem(item.kind()),
            Self::FlowStep { .. } => NodeKind::FlowStep,
        }
    }

    /// Entity that owns (or is) this node
    #[must_use]
    pub fn entity(&self) -> &EntityId {
        match self {
            Self::Entity(id) => id,
            Self::SubItem { parent, .. } | Self::FlowStep { parent, .. } => parent,
        }
    }

    /// Qualified key used as the graph node identifier
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(id) => write!(f, "{id}"),
            Self::SubItem { parent, item } => write!(f, "{parent}{KEY_SEPARATOR}{item}"),
            Self::FlowStep { parent, flow, step } => {
                write!(f, "{parent}{KEY_SEPARATOR}{flow}{KEY_SEPARATOR}{step}")
            }
        }
    }
}

impl FromStr for NodeRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidNodeRef(s.to_string());
        let segments: Vec<&str> = s.split(KEY_SEPARATOR).collect();

        match segments.as_slice() {
            [entity] => Ok(Self::Entity(entity.parse().map_err(|_| invalid())?)),
            [entity, item] => Ok(Self::SubItem {
                parent: entity.parse().map_err(|_| invalid())?,
                item: item.parse().map_err(|_| invalid())?,
            }),
            [entity, flow, step] if !step.is_empty() => {
                let flow: SubItemId = flow.parse().map_err(|_| invalid())?;
                if flow.kind() != SubItemKind::Flow {
                    return Err(invalid());
                }
                Ok(Self::FlowStep {
                    parent: entity.parse().map_err(|_| invalid())?,
                    flow,
                    step: (*step).to_string(),
                })
            }
            _ => Err(invalid()),
        }
    }
}

/// Whether a slug is URL-safe: lowercase alphanumeric words joined by single hyphens
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.split('-').all(|word| {
            !word.is_empty()
                && word
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

// Numbers render zero-padded to three digits, so only accept the canonical width
fn parse_number(digits: &str) -> Option<u32> {
    if digits.len() < 3 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 3 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}
