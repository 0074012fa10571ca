//! SpecGraph Engine - specification graph consistency
//!
//! Treats the specification corpus as a directed graph of typed nodes and
//! reference edges and provides:
//! - Structural analysis: cycles, dependency metrics, coverage, orphans
//! - Reference integrity validation with repair suggestions
//! - The supersession protocol for versioned sub-items
//!
//! Every analysis is a pure function of an immutable [`EntitySnapshot`];
//! mutations return a complete next snapshot or fail without side effects.
//!
//! # Example
//!
//! ```rust
//! use specgraph_engine::prelude::*;
//! use specgraph_model::{Entity, EntityKind, EntitySnapshot, SubItem, SubItemId, SubItemKind};
//!
//! let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth")
//!     .unwrap()
//!     .with_item(SubItem::new(SubItemId::new(SubItemKind::Task, 1)))
//!     .unwrap();
//! let snapshot = EntitySnapshot::from_entities([plan]);
//!
//! let graph = GraphBuilder::new().build(&snapshot);
//! let cycles = CycleDetector::default().detect(&graph);
//! assert!(!cycles.has_cycles);
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod coverage;
pub mod cycles;
pub mod dependency;
pub mod error;
pub mod graph;
pub mod mutation;
pub mod orphans;
pub mod references;
pub mod suggest;
pub mod supersession;

// Re-exports
pub use config::EngineConfig;
pub use coverage::{CategoryCoverage, CoverageAnalyzer, CoverageReport};
pub use cycles::{cycle_through, detect_cycles, would_create_cycle, CycleDetector, CycleReport, CycleSummary};
pub use dependency::{DependencyAnalyzer, DependencyIssue, DependencyIssueKind, DependencyReport, NodeMetrics};
pub use error::{EngineError, EngineResult};
pub use graph::{DanglingEdge, DanglingReason, Edge, EdgeFilter, GraphBuilder, GraphNode, SpecGraph};
pub use mutation::{add_dependency, DependencyOutcome};
pub use orphans::{OrphanDetector, OrphanReport};
pub use references::{
    BrokenReason, BrokenReference, FixSuggestion, IssueKind, ReferenceIssue, ReferenceValidator,
    ValidationOptions, ValidationReport,
};
pub use specgraph_model::EntitySnapshot;
pub use suggest::{similarity, Suggester, Suggestion};
pub use supersession::{
    resolve_head, Clock, FixedClock, RewrittenReference, SupersessionEngine, SupersessionOutcome, SystemClock,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the engine
    pub use crate::{
        CoverageAnalyzer, CycleDetector, DependencyAnalyzer, EdgeFilter, EngineConfig, EngineError,
        GraphBuilder, OrphanDetector, ReferenceValidator, SpecGraph, SupersessionEngine,
        ValidationOptions,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
