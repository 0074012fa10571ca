//! SpecGraph Core - service facade over the engine
//!
//! Wires an [`EntityStore`] to the analysis and mutation engine and exposes
//! every operation as an async call returning a [`ToolResult`]:
//!
//! - **Analysis**: dependencies, coverage, cycles, orphans, health report
//! - **Validation**: per-entity and corpus-wide reference checks, broken
//!   references, repair suggestions
//! - **Mutation**: supersession and validator-gated dependency edits, written
//!   back to the store
//!
//! # Example
//!
//! ```rust
//! use specgraph_core::prelude::*;
//! use specgraph_model::{Entity, EntityKind, EntitySnapshot};
//!
//! let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth").unwrap();
//! let store = MemoryStore::with_snapshot(EntitySnapshot::from_entities([plan]));
//! let service = SpecGraphService::new(store);
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let result = runtime.block_on(service.detect_cycles());
//! assert!(result.success);
//! ```

#![warn(unreachable_pub)]

pub mod service;
pub mod store;

// Re-exports
pub use service::{HealthReport, ServiceError, SpecGraphService, SupersedeResult, ToolError, ToolResult};
pub use store::{EntityStore, MemoryStore, StoreError, YamlDirStore};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the service
    pub use crate::{EntityStore, MemoryStore, SpecGraphService, ToolResult, YamlDirStore};
    pub use specgraph_engine::{EngineConfig, ValidationOptions};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
