//! Error types for the specification model

use crate::kind::{EntityKind, SubItemKind};

/// Errors raised while constructing or parsing model values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Entity ID does not follow `{type}-{number}-{slug}`
    #[error("invalid entity id '{0}': expected {{type}}-{{number}}-{{slug}}")]
    InvalidEntityId(String),

    /// Sub-item ID does not follow `{prefix}-{number}`
    #[error("invalid sub-item id '{0}': expected {{prefix}}-{{number}}")]
    InvalidSubItemId(String),

    /// Unknown entity type tag or short type
    #[error("unknown entity kind '{0}'")]
    UnknownEntityKind(String),

    /// Unknown sub-item kind or prefix
    #[error("unknown sub-item kind '{0}'")]
    UnknownSubItemKind(String),

    /// Slug is not URL-safe
    #[error("invalid slug '{0}': use lowercase letters, digits and single hyphens")]
    InvalidSlug(String),

    /// Qualified node key could not be parsed
    #[error("invalid node reference '{0}'")]
    InvalidNodeRef(String),

    /// Sub-item kind does not belong to this entity kind
    #[error("{kind} items cannot belong to a {parent}")]
    WrongParent {
        /// Sub-item kind being attached
        kind: SubItemKind,
        /// Kind of the would-be parent
        parent: EntityKind,
    },
}
