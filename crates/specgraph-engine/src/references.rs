//! Reference integrity
//!
//! Checks every declared reference in one pass and accumulates issues:
//!
//! - **format**: the stored value matches its target's pattern
//! - **self reference**: a node does not name itself (unless allowed)
//! - **existence**: the value resolves to a node of the declared kind
//! - **supersession**: the target is not retired (warning naming the head)
//! - **cycles**: dependency edges not yet in the graph do not close a cycle
//!
//! Broken references can be ranked against same-kind candidates for repair.

use crate::config::EngineConfig;
use crate::cycles::would_create_cycle;
use crate::error::EngineError;
use crate::graph::{
    for_each_reference, DanglingEdge, DanglingReason, EdgeFilter, GraphBuilder, RefContext, SpecGraph,
};
use crate::suggest::{Suggester, Suggestion};
use serde::{Deserialize, Serialize};
use specgraph_model::format;
use specgraph_model::{Entity, EntityId, EntitySnapshot, NodeKind, NodeRef, RefField, RefScope, RefSite, SubItemId};

/// Category of a reference issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Target does not exist
    NotFound,
    /// Value does not match the target's pattern
    InvalidReferenceFormat,
    /// Node references itself
    SelfReference,
    /// Edge would close a dependency cycle
    WouldCreateCycle,
    /// Target exists but is retired
    SupersededTarget,
    /// Target exists but has the wrong kind
    KindMismatch,
}

impl IssueKind {
    /// Warnings are advisory; every other kind is an error
    #[inline]
    #[must_use]
    pub fn is_warning(self) -> bool {
        matches!(self, Self::SupersededTarget)
    }
}

/// One reference problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceIssue {
    /// Category
    pub kind: IssueKind,
    /// Key of the node holding the reference
    pub source: String,
    /// Field path
    pub field: String,
    /// Stored value
    pub value: String,
    /// Key the value resolves to
    pub resolved: String,
    /// Human-readable message
    pub message: String,
    /// Expected pattern, for format issues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Kind actually found, for kind mismatches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<NodeKind>,
    /// Current head of the chain, for superseded targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    /// Cycle the edge would close, for cycle issues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<String>>,
}

impl ReferenceIssue {
    fn new(kind: IssueKind, site: &Site<'_>, message: String) -> Self {
        Self {
            kind,
            source: site.source.clone(),
            field: site.field.path(),
            value: site.value.to_string(),
            resolved: site.resolved.clone(),
            message,
            expected: None,
            found: None,
            superseded_by: None,
            cycle: None,
        }
    }

    /// Fail-fast error equivalent for mutations
    #[must_use]
    pub fn into_error(self) -> EngineError {
        match self.kind {
            IssueKind::NotFound => EngineError::NotFound {
                what: "reference target".to_string(),
                id: self.resolved,
            },
            IssueKind::InvalidReferenceFormat | IssueKind::KindMismatch => {
                EngineError::InvalidReferenceFormat {
                    field: self.field,
                    value: self.value,
                    expected: self.expected.unwrap_or_default(),
                }
            }
            IssueKind::SelfReference => EngineError::SelfReference {
                id: self.source,
                field: self.field,
            },
            IssueKind::WouldCreateCycle => EngineError::WouldCreateCycle {
                from: self.source,
                to: self.resolved,
                path: self.cycle.unwrap_or_default(),
            },
            IssueKind::SupersededTarget => EngineError::AlreadySuperseded {
                id: self.resolved,
                superseded_by: self.superseded_by.unwrap_or_default(),
            },
        }
    }
}

/// Accumulated validation result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// No errors were found
    pub valid: bool,
    /// Number of reference values checked
    pub checked: usize,
    /// Hard failures
    pub errors: Vec<ReferenceIssue>,
    /// Advisory findings
    pub warnings: Vec<ReferenceIssue>,
}

impl ValidationReport {
    fn push(&mut self, issue: ReferenceIssue) {
        if issue.kind.is_warning() {
            self.warnings.push(issue);
        } else {
            self.errors.push(issue);
        }
    }

    fn merge(&mut self, other: ValidationReport) {
        self.checked += other.checked;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    fn finish(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }
}

/// Validation switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Accept references from a node to itself
    pub allow_self_reference: bool,
    /// Check dependency edges that are not yet in the graph for cycles
    pub check_cycles: bool,
    /// Edges followed by the cycle check
    pub cycle_edges: EdgeFilter,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            allow_self_reference: false,
            check_cycles: true,
            cycle_edges: EdgeFilter::Dependencies,
        }
    }
}

impl ValidationOptions {
    /// Options matching `config`
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            allow_self_reference: config.allow_self_reference,
            check_cycles: true,
            cycle_edges: config.cycle_edges,
        }
    }
}

/// Why a reference is broken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum BrokenReason {
    /// Value does not match the target's pattern
    InvalidFormat {
        /// Expected pattern
        expected: String,
    },
    /// No node has the resolved key
    NotFound,
    /// The node exists but has the wrong kind
    KindMismatch {
        /// Kind actually found
        found: NodeKind,
    },
}

/// Reference that did not resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenReference {
    /// Key of the node holding the reference
    pub source: String,
    /// Field path
    pub field: String,
    /// Stored value
    pub value: String,
    /// Key the value resolved to
    pub resolved: String,
    /// Failure reason
    #[serde(flatten)]
    pub reason: BrokenReason,
}

/// Repair candidates for one broken reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    /// The broken reference
    pub reference: BrokenReference,
    /// Ranked candidates, best first
    pub suggestions: Vec<Suggestion>,
}

/// A reference being checked
struct Site<'a> {
    source: String,
    field: &'static RefField,
    value: &'a str,
    resolved: String,
}

/// Validates references against a graph built from the same snapshot
#[derive(Debug, Clone)]
pub struct ReferenceValidator<'g> {
    graph: &'g SpecGraph,
    snapshot: &'g EntitySnapshot,
    suggester: Suggester,
}

impl<'g> ReferenceValidator<'g> {
    /// Create a validator
    #[must_use]
    pub fn new(graph: &'g SpecGraph, snapshot: &'g EntitySnapshot) -> Self {
        Self {
            graph,
            snapshot,
            suggester: Suggester::default(),
        }
    }

    /// With the suggestion settings of `config`
    #[must_use]
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.suggester = Suggester::from_config(config);
        self
    }

    /// Validate the references of one entity
    ///
    /// The entity may be a not-yet-committed edit: dependency edges it declares
    /// that are absent from the graph are checked for cycles before acceptance,
    /// against the corpus with the edit applied.
    #[must_use]
    pub fn validate_entity(&self, entity: &Entity, options: ValidationOptions) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut proposed: Vec<(Site<'_>, (String, String))> = Vec::new();

        for_each_reference(entity, |ctx, field, site, retired| {
            if retired {
                return;
            }
            report.checked += 1;
            let site = Site::new(ctx, field, site);
            if let Some(issue) = self.check(&site, options) {
                let blocking = !issue.kind.is_warning();
                report.push(issue);
                if blocking {
                    return;
                }
            }
            if options.check_cycles
                && options.cycle_edges.accepts(field.edge)
                && !self.has_edge(&site)
            {
                let edge = (site.source.clone(), site.resolved.clone());
                proposed.push((site, edge));
            }
        });

        if !proposed.is_empty() {
            let edges: Vec<(String, String)> = proposed.iter().map(|(_, e)| e.clone()).collect();
            let edited;
            let graph = if self.snapshot.get(&entity.id) == Some(entity) {
                self.graph
            } else {
                let mut next = self.snapshot.clone();
                next.insert(entity.clone());
                edited = GraphBuilder::new().build(&next);
                &edited
            };
            if let Some(cycle) = would_create_cycle(graph, &edges, options.cycle_edges) {
                let closing = proposed
                    .iter()
                    .find(|(site, _)| cycle.first() == Some(&site.source))
                    .map_or(&proposed[0].0, |(site, _)| site);
                report.push(cycle_issue(closing, cycle));
            }
        }

        tracing::debug!(
            entity = %entity.id,
            checked = report.checked,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "validated entity references"
        );
        report.finish()
    }

    /// Validate every entity in the snapshot
    #[must_use]
    pub fn validate_all(&self, options: ValidationOptions) -> ValidationReport {
        let mut report = ValidationReport::default();
        for entity in self.snapshot.iter() {
            report.merge(self.validate_entity(entity, options));
        }
        report.finish()
    }

    /// Every reference in the graph that did not resolve
    #[must_use]
    pub fn find_broken_references(&self) -> Vec<BrokenReference> {
        self.graph.dangling().iter().map(broken_from).collect()
    }

    /// Repair candidates for the broken references held by one entity
    #[must_use]
    pub fn suggest_fixes(&self, entity: &EntityId) -> Vec<FixSuggestion> {
        self.graph
            .dangling()
            .iter()
            .filter_map(|dangling| {
                let source: NodeRef = dangling.source.parse().ok()?;
                (source.entity() == entity).then(|| FixSuggestion {
                    reference: broken_from(dangling),
                    suggestions: self.suggester.suggest(
                        &dangling.value,
                        self.candidates(&source, dangling.field).iter().map(String::as_str),
                    ),
                })
            })
            .collect()
    }

    /// Check a single reference; `None` when it is valid
    fn check(&self, site: &Site<'_>, options: ValidationOptions) -> Option<ReferenceIssue> {
        let field = site.field;
        if !format::matches(field.target, field.scope, site.value) {
            let expected = format::pattern(field.target, field.scope);
            let mut issue = ReferenceIssue::new(
                IssueKind::InvalidReferenceFormat,
                site,
                format!(
                    "{}.{}: '{}' does not match {expected}",
                    site.source,
                    field.path(),
                    site.value
                ),
            );
            issue.expected = Some(expected);
            return Some(issue);
        }

        if site.resolved == site.source && !options.allow_self_reference {
            return Some(ReferenceIssue::new(
                IssueKind::SelfReference,
                site,
                format!("{}.{} references itself", site.source, field.path()),
            ));
        }

        let Some(node) = self.graph.node(&site.resolved) else {
            return Some(ReferenceIssue::new(
                IssueKind::NotFound,
                site,
                format!("{}.{}: {} not found", site.source, field.path(), site.resolved),
            ));
        };

        if !field.target.accepts(node.kind()) {
            let mut issue = ReferenceIssue::new(
                IssueKind::KindMismatch,
                site,
                format!(
                    "{}.{}: {} is a {}, expected {}",
                    site.source,
                    field.path(),
                    site.resolved,
                    node.kind(),
                    field.target
                ),
            );
            issue.expected = Some(format::pattern(field.target, field.scope));
            issue.found = Some(node.kind());
            return Some(issue);
        }

        if node.is_retired() {
            let head = chain_head(self.graph, &site.resolved);
            let mut issue = ReferenceIssue::new(
                IssueKind::SupersededTarget,
                site,
                format!(
                    "{}.{}: {} was superseded; current version is {head}",
                    site.source,
                    field.path(),
                    site.resolved
                ),
            );
            issue.superseded_by = Some(head);
            return Some(issue);
        }

        None
    }

    fn has_edge(&self, site: &Site<'_>) -> bool {
        self.graph
            .outbound(&site.source)
            .iter()
            .any(|e| e.target == site.resolved && e.field == site.field)
    }

    /// Same-kind candidates written the way `field` stores values from `source`
    fn candidates(&self, source: &NodeRef, field: &RefField) -> Vec<String> {
        let entity = source.entity();
        let own_key = source.key();
        self.graph
            .active_nodes()
            .filter(|n| field.target.accepts(n.kind()) && n.key != own_key)
            .filter_map(|n| match (&n.node, field.scope) {
                (_, RefScope::Global) => Some(n.key.clone()),
                (NodeRef::SubItem { parent, item }, RefScope::Sibling) => {
                    (parent == entity).then(|| item.to_string())
                }
                (NodeRef::FlowStep { parent, flow, step }, RefScope::Local) => {
                    (parent == entity && Some(flow) == owning_flow(source)).then(|| step.clone())
                }
                _ => None,
            })
            .collect()
    }
}

impl<'a> Site<'a> {
    fn new(ctx: RefContext<'_>, field: &'static RefField, site: RefSite<'a>) -> Self {
        Self {
            source: ctx.source_key(site.element),
            field,
            value: site.value,
            resolved: ctx.resolve(field, site.value),
        }
    }
}

fn owning_flow(source: &NodeRef) -> Option<&SubItemId> {
    match source {
        NodeRef::SubItem { item, .. } => Some(item),
        NodeRef::FlowStep { flow, .. } => Some(flow),
        NodeRef::Entity(_) => None,
    }
}

fn cycle_issue(site: &Site<'_>, cycle: Vec<String>) -> ReferenceIssue {
    let mut issue = ReferenceIssue::new(
        IssueKind::WouldCreateCycle,
        site,
        format!(
            "{}.{}: adding {} would create a cycle: {}",
            site.source,
            site.field.path(),
            site.value,
            cycle.join(" -> ")
        ),
    );
    issue.cycle = Some(cycle);
    issue
}

fn broken_from(dangling: &DanglingEdge) -> BrokenReference {
    let field = dangling.field;
    let reason = if !format::matches(field.target, field.scope, &dangling.value) {
        BrokenReason::InvalidFormat {
            expected: format::pattern(field.target, field.scope),
        }
    } else {
        match dangling.reason {
            DanglingReason::Missing => BrokenReason::NotFound,
            DanglingReason::KindMismatch(found) => BrokenReason::KindMismatch { found },
        }
    };
    BrokenReference {
        source: dangling.source.clone(),
        field: field.path(),
        value: dangling.value.clone(),
        resolved: dangling.resolved.clone(),
        reason,
    }
}

/// Follow `superseded_by` links to the active version
pub(crate) fn chain_head(graph: &SpecGraph, key: &str) -> String {
    let mut current = key.to_string();
    for _ in 0..graph.node_count() {
        match graph.node(&current).and_then(|n| n.superseded_by.clone()) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

/// Fail-fast check of a reference value that is not yet committed
///
/// Used by mutations to pre-check a single new value with the same rules.
pub(crate) fn check_new_reference(
    graph: &SpecGraph,
    snapshot: &EntitySnapshot,
    ctx: RefContext<'_>,
    field: &'static RefField,
    site: RefSite<'_>,
    options: ValidationOptions,
) -> Result<(), EngineError> {
    let validator = ReferenceValidator::new(graph, snapshot);
    let site = Site::new(ctx, field, site);

    if let Some(issue) = validator.check(&site, options) {
        return Err(issue.into_error());
    }

    if options.check_cycles && options.cycle_edges.accepts(field.edge) {
        let proposed = [(site.source.clone(), site.resolved.clone())];
        if let Some(cycle) = would_create_cycle(graph, &proposed, options.cycle_edges) {
            return Err(cycle_issue(&site, cycle).into_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use specgraph_model::{EntityKind, SubItem, SubItemKind};

    fn task(n: u32) -> SubItem {
        SubItem::new(SubItemId::new(SubItemKind::Task, n))
    }

    fn plan(tasks: Vec<SubItem>) -> Entity {
        tasks.into_iter().fold(
            Entity::new(EntityKind::Plan, 1, "auth", "Auth").unwrap(),
            |plan, t| plan.with_item(t).unwrap(),
        )
    }

    fn validate(snapshot: &EntitySnapshot) -> ValidationReport {
        let graph = GraphBuilder::new().build(snapshot);
        ReferenceValidator::new(&graph, snapshot).validate_all(ValidationOptions::default())
    }

    #[test]
    fn valid_references_pass() {
        let snapshot = EntitySnapshot::from_entities([plan(vec![
            task(1),
            task(2).with_field("depends_on", json!(["task-001"])),
        ])]);
        let report = validate(&snapshot);

        assert!(report.valid);
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn all_problems_accumulate_in_one_pass() {
        let snapshot = EntitySnapshot::from_entities([plan(vec![
            task(1).with_field("depends_on", json!(["task-1", "task-009", "task-001"])),
        ])]);
        let report = validate(&snapshot);

        let kinds: Vec<_> = report.errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                IssueKind::InvalidReferenceFormat,
                IssueKind::NotFound,
                IssueKind::SelfReference
            ]
        );
        assert_eq!(report.errors[0].expected.as_deref(), Some(r"^task-(?:\d{3}|[1-9]\d{3,})$"));
        assert!(!report.valid);
    }

    #[test]
    fn self_reference_can_be_allowed() {
        let snapshot =
            EntitySnapshot::from_entities([plan(vec![task(1).with_field("blocked_by", json!(["task-001"]))])]);
        let graph = GraphBuilder::new().build(&snapshot);
        let options = ValidationOptions {
            allow_self_reference: true,
            check_cycles: false,
            ..ValidationOptions::default()
        };

        assert!(ReferenceValidator::new(&graph, &snapshot).validate_all(options).valid);
    }

    #[test]
    fn superseded_target_warns_with_head() {
        let mut old = task(1);
        old.superseded_by = Some(SubItemId::new(SubItemKind::Task, 2));
        let mut middle = task(2);
        middle.superseded_by = Some(SubItemId::new(SubItemKind::Task, 3));
        let snapshot = EntitySnapshot::from_entities([plan(vec![
            old,
            middle,
            task(3),
            task(4).with_field("depends_on", json!(["task-001"])),
        ])]);
        let report = validate(&snapshot);

        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].superseded_by.as_deref(), Some("pln-001-auth/task-003"));
    }

    #[test]
    fn edited_entity_closing_a_cycle_is_rejected() {
        let snapshot = EntitySnapshot::from_entities([plan(vec![
            task(1),
            task(2).with_field("depends_on", json!(["task-001"])),
        ])]);
        let graph = GraphBuilder::new().build(&snapshot);

        let mut edited = snapshot.iter().next().unwrap().clone();
        edited
            .item_mut(&SubItemId::new(SubItemKind::Task, 1))
            .unwrap()
            .fields
            .insert("depends_on".into(), json!(["task-002"]));

        let report = ReferenceValidator::new(&graph, &snapshot)
            .validate_entity(&edited, ValidationOptions::default());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, IssueKind::WouldCreateCycle);
        assert_eq!(
            report.errors[0].cycle.as_deref(),
            Some(
                &[
                    "pln-001-auth/task-001".to_string(),
                    "pln-001-auth/task-002".to_string(),
                    "pln-001-auth/task-001".to_string()
                ][..]
            )
        );
    }

    #[test]
    fn reversing_a_dependency_in_one_edit_is_accepted() {
        let snapshot = EntitySnapshot::from_entities([plan(vec![
            task(1),
            task(2).with_field("depends_on", json!(["task-001"])),
        ])]);
        let graph = GraphBuilder::new().build(&snapshot);

        let mut edited = snapshot.iter().next().unwrap().clone();
        edited
            .item_mut(&SubItemId::new(SubItemKind::Task, 1))
            .unwrap()
            .fields
            .insert("depends_on".into(), json!(["task-002"]));
        edited
            .item_mut(&SubItemId::new(SubItemKind::Task, 2))
            .unwrap()
            .fields
            .remove("depends_on");

        let report = ReferenceValidator::new(&graph, &snapshot)
            .validate_entity(&edited, ValidationOptions::default());
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn broken_references_and_suggestions() {
        let snapshot = EntitySnapshot::from_entities([plan(vec![
            task(1),
            task(2),
            task(3).with_field("depends_on", json!(["task-004"])),
        ])]);
        let graph = GraphBuilder::new().build(&snapshot);
        let validator = ReferenceValidator::new(&graph, &snapshot);

        let broken = validator.find_broken_references();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].reason, BrokenReason::NotFound);

        let plan_id = snapshot.iter().next().unwrap().id.clone();
        let fixes = validator.suggest_fixes(&plan_id);
        let names: Vec<_> = fixes[0].suggestions.iter().map(|s| s.candidate.as_str()).collect();
        assert_eq!(names, vec!["task-001", "task-002"]);
    }
}
