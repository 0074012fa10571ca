//! Service facade
//!
//! Loads a snapshot from the store, runs the engine, and wraps every outcome
//! in a [`ToolResult`]. Nothing crosses this boundary as an `Err` or a panic:
//! engine errors, store errors and analyzer panics become a failed result
//! with a machine-readable error kind.
//!
//! Mutations are serialized per service; reads run on independent snapshots.

use crate::store::{EntityStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specgraph_engine::{
    BrokenReference, Clock, CoverageAnalyzer, CoverageReport, CycleDetector, CycleReport, DependencyAnalyzer,
    DependencyOutcome, DependencyReport, EngineConfig, EngineError, FixSuggestion, GraphBuilder, OrphanDetector,
    OrphanReport, ReferenceValidator, RewrittenReference, SpecGraph, SupersessionEngine, SystemClock,
    ValidationOptions, ValidationReport,
};
use specgraph_model::{EntityId, EntitySnapshot, Payload, SubItemId, SubItemKind};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::Mutex;

/// Failure description carried by a [`ToolResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Machine-readable kind (`not_found`, `already_superseded`, ...)
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

/// Uniform result envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult<T> {
    /// Whether the operation succeeded
    pub success: bool,
    /// Payload, present on success and for failed validations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    /// Advisory messages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> ToolResult<T> {
    /// Successful result
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Failed result
    #[must_use]
    pub fn fail(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolError {
                kind: kind.into(),
                message: message.into(),
            }),
            warnings: Vec::new(),
        }
    }

    /// With advisory messages
    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    fn from_error(operation: &str, error: &ServiceError) -> Self {
        tracing::warn!(operation, kind = error.kind(), %error, "operation failed");
        Self::fail(error.kind(), error.to_string())
    }
}

/// Errors raised inside the facade before conversion to [`ToolResult`]
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Engine rejected the operation
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Persistence failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Machine-readable kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Engine(e) => e.kind(),
            Self::Store(_) => "store_error",
        }
    }
}

type ServiceResult<T> = Result<T, ServiceError>;

/// Output of [`SpecGraphService::supersede`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupersedeResult {
    /// Parent entity
    pub parent: EntityId,
    /// Retired version
    pub old_id: SubItemId,
    /// New version
    pub new_id: SubItemId,
    /// Retirement time
    pub superseded_at: DateTime<Utc>,
    /// Update keys whose value changed
    pub changed_fields: Vec<String>,
    /// The new version's payload equals the old one
    pub no_changes: bool,
    /// References moved to the new version
    pub rewritten: Vec<RewrittenReference>,
    /// Entities written back to the store
    pub entities_saved: usize,
}

/// All read-only analyses over one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Dependency metrics
    pub dependencies: DependencyReport,
    /// Coverage
    pub coverage: CoverageReport,
    /// Cycles
    pub cycles: CycleReport,
    /// Orphans
    pub orphans: OrphanReport,
}

/// Engine operations over an [`EntityStore`]
pub struct SpecGraphService<S, C = SystemClock> {
    store: S,
    config: EngineConfig,
    clock: C,
    writes: Mutex<()>,
}

impl<S: EntityStore> SpecGraphService<S, SystemClock> {
    /// Service with default configuration and the wall clock
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: EntityStore, C: Clock + Clone> SpecGraphService<S, C> {
    /// Service with default configuration and `clock`
    #[must_use]
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            clock,
            writes: Mutex::new(()),
        }
    }

    /// With engine configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Engine configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fan-in/fan-out, coupling, depth and critical path
    pub async fn analyze_dependencies(&self) -> ToolResult<DependencyReport> {
        self.read("analyze_dependencies", |_, graph, config| {
            let report = DependencyAnalyzer::from_config(config).analyze(graph);
            let warnings = report.issues.iter().map(|i| i.message.clone()).collect();
            (report, warnings)
        })
        .await
    }

    /// Coverage by category
    pub async fn analyze_coverage(&self) -> ToolResult<CoverageReport> {
        self.read("analyze_coverage", |_, graph, config| {
            let report = CoverageAnalyzer::from_config(config).analyze(graph);
            let warnings = coverage_warnings(&report, config);
            (report, warnings)
        })
        .await
    }

    /// Circular dependency chains
    pub async fn detect_cycles(&self) -> ToolResult<CycleReport> {
        self.read("detect_cycles", |_, graph, config| {
            let report = CycleDetector::new(config.cycle_edges).detect(graph);
            let warnings = report
                .cycles
                .iter()
                .map(|c| format!("dependency cycle: {}", c.join(" -> ")))
                .collect();
            (report, warnings)
        })
        .await
    }

    /// Unreferenced specs
    pub async fn detect_orphans(&self) -> ToolResult<OrphanReport> {
        self.read("detect_orphans", |_, graph, _| {
            let report = OrphanDetector::new().detect(graph);
            let warnings = orphan_warnings(&report);
            (report, warnings)
        })
        .await
    }

    /// Validate the stored references of one entity
    pub async fn validate_entity_references(
        &self,
        entity: &str,
        options: ValidationOptions,
    ) -> ToolResult<ValidationReport> {
        let id = match parse_entity_id(entity) {
            Ok(id) => id,
            Err(e) => return ToolResult::from_error("validate_entity_references", &ServiceError::from(e)),
        };
        self.validation("validate_entity_references", move |snapshot, graph, _| {
            let entity = snapshot
                .get(&id)
                .ok_or_else(|| EngineError::not_found("entity", &id))?;
            Ok(ReferenceValidator::new(graph, snapshot).validate_entity(entity, options))
        })
        .await
    }

    /// Validate every reference in the corpus
    pub async fn validate_all_references(&self, options: ValidationOptions) -> ToolResult<ValidationReport> {
        self.validation("validate_all_references", move |snapshot, graph, _| {
            Ok(ReferenceValidator::new(graph, snapshot).validate_all(options))
        })
        .await
    }

    /// References that do not resolve
    pub async fn find_broken_references(&self) -> ToolResult<Vec<BrokenReference>> {
        self.read("find_broken_references", |snapshot, graph, _| {
            let broken = ReferenceValidator::new(graph, snapshot).find_broken_references();
            let warnings = broken
                .iter()
                .map(|b| format!("{}.{}: {} does not resolve", b.source, b.field, b.value))
                .collect();
            (broken, warnings)
        })
        .await
    }

    /// Ranked repair candidates for one entity's broken references
    pub async fn suggest_reference_fixes(&self, entity: &str) -> ToolResult<Vec<FixSuggestion>> {
        let operation = "suggest_reference_fixes";
        let id = match parse_entity_id(entity) {
            Ok(id) => id,
            Err(e) => return ToolResult::from_error(operation, &ServiceError::from(e)),
        };
        let result = self
            .analyze(operation, move |snapshot, graph, config| {
                if !snapshot.contains(&id) {
                    return Err(EngineError::not_found("entity", &id));
                }
                Ok(ReferenceValidator::new(graph, snapshot)
                    .with_config(config)
                    .suggest_fixes(&id))
            })
            .await;
        match result {
            Ok(fixes) => ToolResult::ok(fixes),
            Err(e) => ToolResult::from_error(operation, &e),
        }
    }

    /// Create a new version of a sub-item and rewrite every reference to the old one
    pub async fn supersede(
        &self,
        parent_id: &str,
        item_kind: &str,
        old_id: &str,
        updates: Payload,
    ) -> ToolResult<SupersedeResult> {
        let operation = "supersede";
        match self.try_supersede(parent_id, item_kind, old_id, updates).await {
            Ok(result) => ToolResult::ok(result),
            Err(e) => ToolResult::from_error(operation, &e),
        }
    }

    /// Append a dependency reference after validation
    pub async fn add_dependency(&self, source: &str, field: &str, target: &str) -> ToolResult<DependencyOutcome> {
        let operation = "add_dependency";
        match self.try_add_dependency(source, field, target).await {
            Ok(outcome) => ToolResult::ok(outcome),
            Err(e) => ToolResult::from_error(operation, &e),
        }
    }

    /// Dependencies, coverage, cycles and orphans in one pass over a shared snapshot
    pub async fn health_report(&self) -> ToolResult<HealthReport> {
        self.read("health_report", |_, graph, config| {
            let ((dependencies, coverage), (cycles, orphans)) = rayon::join(
                || {
                    rayon::join(
                        || DependencyAnalyzer::from_config(config).analyze(graph),
                        || CoverageAnalyzer::from_config(config).analyze(graph),
                    )
                },
                || {
                    rayon::join(
                        || CycleDetector::new(config.cycle_edges).detect(graph),
                        || OrphanDetector::new().detect(graph),
                    )
                },
            );

            let mut warnings: Vec<String> = dependencies.issues.iter().map(|i| i.message.clone()).collect();
            warnings.extend(coverage_warnings(&coverage, config));
            if cycles.has_cycles {
                warnings.push(format!("{} dependency cycles detected", cycles.summary.total_cycles));
            }
            warnings.extend(orphan_warnings(&orphans));

            let report = HealthReport {
                dependencies,
                coverage,
                cycles,
                orphans,
            };
            (report, warnings)
        })
        .await
    }

    async fn try_supersede(
        &self,
        parent_id: &str,
        item_kind: &str,
        old_id: &str,
        updates: Payload,
    ) -> ServiceResult<SupersedeResult> {
        let parent = parse_entity_id(parent_id)?;
        let kind: SubItemKind = item_kind
            .parse()
            .map_err(|_| EngineError::InvalidUpdate(format!("unknown item kind '{item_kind}'")))?;
        let old: SubItemId = old_id.parse().map_err(|_| EngineError::InvalidReferenceFormat {
            field: "old_id".to_string(),
            value: old_id.to_string(),
            expected: format!("{}-NNN", kind.prefix()),
        })?;

        let _guard = self.writes.lock().await;
        let snapshot = self.store.load_all_entities().await?;
        let engine = SupersessionEngine::with_clock(self.clock.clone()).with_config(&self.config);
        let outcome = guarded(|| engine.supersede(&snapshot, &parent, kind, old, updates))??;

        let entities_saved = self.store.save_changes(&snapshot, &outcome.snapshot).await?;
        Ok(SupersedeResult {
            parent,
            old_id: old,
            new_id: outcome.new_id,
            superseded_at: outcome.superseded_at,
            changed_fields: outcome.changed_fields,
            no_changes: outcome.no_changes,
            rewritten: outcome.rewritten,
            entities_saved,
        })
    }

    async fn try_add_dependency(&self, source: &str, field: &str, target: &str) -> ServiceResult<DependencyOutcome> {
        let _guard = self.writes.lock().await;
        let snapshot = self.store.load_all_entities().await?;
        let outcome = guarded(|| specgraph_engine::add_dependency(&snapshot, source, field, target, &self.config))??;
        if outcome.added {
            self.store.save_changes(&snapshot, &outcome.snapshot).await?;
        }
        Ok(outcome)
    }

    /// Build the graph and run an analysis that cannot fail on its own
    async fn read<T>(
        &self,
        operation: &str,
        analysis: impl FnOnce(&EntitySnapshot, &SpecGraph, &EngineConfig) -> (T, Vec<String>),
    ) -> ToolResult<T> {
        match self
            .analyze(operation, |snapshot, graph, config| Ok(analysis(snapshot, graph, config)))
            .await
        {
            Ok((data, warnings)) => ToolResult::ok(data).with_warnings(warnings),
            Err(e) => ToolResult::from_error(operation, &e),
        }
    }

    /// Run a validation; the result fails when the report has errors
    async fn validation(
        &self,
        operation: &str,
        analysis: impl FnOnce(&EntitySnapshot, &SpecGraph, &EngineConfig) -> Result<ValidationReport, EngineError>,
    ) -> ToolResult<ValidationReport> {
        match self.analyze(operation, analysis).await {
            Ok(report) => {
                let warnings = report.warnings.iter().map(|w| w.message.clone()).collect();
                let mut result = ToolResult::ok(report).with_warnings(warnings);
                if let Some(report) = result.data.as_ref().filter(|r| !r.valid) {
                    result.success = false;
                    result.error = Some(ToolError {
                        kind: "invalid_references".to_string(),
                        message: format!("{} invalid references", report.errors.len()),
                    });
                }
                result
            }
            Err(e) => ToolResult::from_error(operation, &e),
        }
    }

    async fn analyze<T>(
        &self,
        operation: &str,
        analysis: impl FnOnce(&EntitySnapshot, &SpecGraph, &EngineConfig) -> Result<T, EngineError>,
    ) -> ServiceResult<T> {
        let snapshot = self.store.load_all_entities().await?;
        let result = guarded(|| {
            let graph = GraphBuilder::new().build(&snapshot);
            analysis(&snapshot, &graph, &self.config)
        })??;
        tracing::debug!(operation, entities = snapshot.len(), "analysis complete");
        Ok(result)
    }
}

/// Run `f`, turning a panic into `AnalysisFailure`
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, EngineError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "analyzer panicked".to_string());
        EngineError::AnalysisFailure(message)
    })
}

fn parse_entity_id(value: &str) -> Result<EntityId, EngineError> {
    value.parse().map_err(|_| EngineError::InvalidReferenceFormat {
        field: "entity".to_string(),
        value: value.to_string(),
        expected: "{type}-{number}-{slug}".to_string(),
    })
}

fn coverage_warnings(report: &CoverageReport, config: &EngineConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if report.total_specs > 0 && report.coverage_percentage < config.min_coverage_percentage {
        warnings.push(format!(
            "coverage {:.1}% is below the {:.1}% minimum",
            report.coverage_percentage, config.min_coverage_percentage
        ));
    }
    warnings
}

fn orphan_warnings(report: &OrphanReport) -> Vec<String> {
    report
        .by_kind
        .iter()
        .map(|(kind, keys)| format!("{} orphaned {kind} specs: {}", keys.len(), keys.join(", ")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_become_analysis_failures() {
        let result: Result<(), _> = guarded(|| panic!("boom"));
        assert_eq!(result.unwrap_err(), EngineError::AnalysisFailure("boom".to_string()));
    }

    #[test]
    fn failed_result_serializes_without_data() {
        let result: ToolResult<u32> = ToolResult::fail("not_found", "entity not found: pln-001-x");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], serde_json::json!(false));
        assert!(json.get("data").is_none());
        assert_eq!(json["error"]["kind"], serde_json::json!("not_found"));
    }

    #[test]
    fn service_errors_keep_their_kind() {
        let error = ServiceError::from(StoreError::NotFound(parse_entity_id("pln-001-auth").unwrap()));
        let result: ToolResult<()> = ToolResult::from_error("supersede", &error);
        let tool_error = result.error.unwrap();
        assert_eq!(tool_error.kind, "store_error");
        assert_eq!(tool_error.message, "store error: entity not found: pln-001-auth");
    }

    #[test]
    fn entity_ids_are_parsed_strictly() {
        assert!(parse_entity_id("pln-001-auth").is_ok());
        assert_eq!(
            parse_entity_id("plan one").unwrap_err().kind(),
            "invalid_reference_format"
        );
    }
}
