//! SpecGraph Model
//!
//! Typed specification entities and the reference fields that connect them.
//!
//! # Overview
//!
//! - **Entity**: requirement, plan, component, constitution, decision or milestone,
//!   identified by `{type}-{number}-{slug}`
//! - **SubItem**: versionable unit inside an entity (task, criterion, test case,
//!   flow, API contract, data model) with supersession fields
//! - **REFERENCE_FIELDS**: declarative table of every field that names another node
//!
//! # Example
//!
//! ```rust
//! use specgraph_model::{Entity, EntityKind, SubItem, SubItemId, SubItemKind};
//!
//! let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth backend")
//!     .unwrap()
//!     .with_field("criteria_id", "req-001-login/crit-001")
//!     .with_item(SubItem::new(SubItemId::new(SubItemKind::Task, 1)))
//!     .unwrap();
//!
//! assert_eq!(plan.id.to_string(), "pln-001-auth");
//! assert_eq!(plan.next_item_id(SubItemKind::Task).to_string(), "task-002");
//! ```

#![warn(missing_docs)]

pub mod entity;
pub mod error;
pub mod format;
pub mod ids;
pub mod kind;
pub mod schema;
pub mod snapshot;

// Re-exports
pub use entity::{Entity, Payload, SubItem};
pub use error::ModelError;
pub use ids::{EntityId, NodeRef, SubItemId};
pub use kind::{EntityKind, NodeKind, SubItemKind};
pub use schema::{EdgeKind, Owner, RefField, RefScope, RefSite, RefTarget, REFERENCE_FIELDS};
pub use snapshot::EntitySnapshot;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
