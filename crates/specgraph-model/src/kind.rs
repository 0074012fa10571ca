//! Entity and sub-item kinds
//!
//! Kinds carry the naming conventions used in identifiers: every entity kind
//! has a short type (`req`, `pln`, ...) and every sub-item kind has an ID
//! prefix (`task`, `crit`, ...) plus the entity kind that owns it.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level specification document type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Requirement with acceptance criteria
    Requirement,
    /// Implementation plan
    Plan,
    /// System component
    Component,
    /// Project constitution
    Constitution,
    /// Architectural decision record
    Decision,
    /// Delivery milestone
    Milestone,
}

impl EntityKind {
    /// All entity kinds in canonical order
    pub const ALL: [EntityKind; 6] = [
        Self::Requirement,
        Self::Plan,
        Self::Component,
        Self::Constitution,
        Self::Decision,
        Self::Milestone,
    ];

    /// Short type used as the ID prefix
    #[inline]
    #[must_use]
    pub const fn short(self) -> &'static str {
        match self {
            Self::Requirement => "req",
            Self::Plan => "pln",
            Self::Component => "cmp",
            Self::Constitution => "con",
            Self::Decision => "dec",
            Self::Milestone => "mls",
        }
    }

    /// Human-readable name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requirement => "requirement",
            Self::Plan => "plan",
            Self::Component => "component",
            Self::Constitution => "constitution",
            Self::Decision => "decision",
            Self::Milestone => "milestone",
        }
    }

    /// Look up a kind by its short type
    #[must_use]
    pub fn from_short(short: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.short() == short)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.short() == s)
            .ok_or_else(|| ModelError::UnknownEntityKind(s.to_string()))
    }
}

/// Referenceable unit nested inside an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubItemKind {
    /// Plan task
    Task,
    /// Requirement acceptance criterion
    Criterion,
    /// Plan test case
    TestCase,
    /// Plan flow (owns flow steps)
    Flow,
    /// Plan API contract
    ApiContract,
    /// Plan data model
    DataModel,
}

impl SubItemKind {
    /// All sub-item kinds in canonical order
    pub const ALL: [SubItemKind; 6] = [
        Self::Task,
        Self::Criterion,
        Self::TestCase,
        Self::Flow,
        Self::ApiContract,
        Self::DataModel,
    ];

    /// ID prefix within the parent collection
    #[inline]
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Criterion => "crit",
            Self::TestCase => "tc",
            Self::Flow => "flow",
            Self::ApiContract => "api",
            Self::DataModel => "dm",
        }
    }

    /// Human-readable name (also the collection key)
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Criterion => "criterion",
            Self::TestCase => "test_case",
            Self::Flow => "flow",
            Self::ApiContract => "api_contract",
            Self::DataModel => "data_model",
        }
    }

    /// Entity kind that owns collections of this kind
    #[inline]
    #[must_use]
    pub const fn parent_kind(self) -> EntityKind {
        match self {
            Self::Criterion => EntityKind::Requirement,
            Self::Task | Self::TestCase | Self::Flow | Self::ApiContract | Self::DataModel => {
                EntityKind::Plan
            }
        }
    }

    /// Look up a kind by its ID prefix
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }
}

impl fmt::Display for SubItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubItemKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.prefix() == s)
            .ok_or_else(|| ModelError::UnknownSubItemKind(s.to_string()))
    }
}

/// Kind of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "node", content = "kind")]
pub enum NodeKind {
    /// Top-level entity
    Entity(EntityKind),
    /// Sub-item inside an entity
    SubItem(SubItemKind),
    /// Step inside a flow
    FlowStep,
}

impl NodeKind {
    /// Label used when grouping nodes by type
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Entity(kind) => kind.as_str(),
            Self::SubItem(kind) => kind.as_str(),
            Self::FlowStep => "flow_step",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_parses_name_and_short() {
        assert_eq!("plan".parse::<EntityKind>(), Ok(EntityKind::Plan));
        assert_eq!("pln".parse::<EntityKind>(), Ok(EntityKind::Plan));
        assert!("plans".parse::<EntityKind>().is_err());
    }

    #[test]
    fn sub_item_kind_parses_name_and_prefix() {
        assert_eq!("test_case".parse::<SubItemKind>(), Ok(SubItemKind::TestCase));
        assert_eq!("tc".parse::<SubItemKind>(), Ok(SubItemKind::TestCase));
        assert_eq!(SubItemKind::from_prefix("crit"), Some(SubItemKind::Criterion));
    }

    #[test]
    fn criteria_belong_to_requirements() {
        assert_eq!(SubItemKind::Criterion.parent_kind(), EntityKind::Requirement);
        assert_eq!(SubItemKind::Task.parent_kind(), EntityKind::Plan);
    }
}
