//! Orphan detection
//!
//! A node is an orphan when nothing references it and it does not satisfy
//! the relationship its kind requires. Constitutions and plan-owned
//! sub-items are never orphans; retired sub-items are ignored.

use crate::graph::{GraphNode, SpecGraph};
use serde::{Deserialize, Serialize};
use specgraph_model::{EdgeKind, EntityKind, NodeKind, NodeRef, SubItemKind};
use std::collections::{BTreeMap, HashMap};

/// Orphans grouped by node type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanReport {
    /// Total orphan count
    pub total: usize,
    /// Orphan keys per node type label, in graph order
    pub by_kind: BTreeMap<String, Vec<String>>,
    /// Orphan count per node type label
    pub counts: BTreeMap<String, usize>,
}

impl OrphanReport {
    /// All orphan keys, grouped by type label
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_kind.values().flatten().map(String::as_str)
    }

    /// Whether `key` was reported
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys().any(|k| k == key)
    }
}

/// Finds unreferenced nodes
#[derive(Debug, Clone, Copy, Default)]
pub struct OrphanDetector;

impl OrphanDetector {
    /// Create a detector
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Detect orphans
    #[must_use]
    pub fn detect(&self, graph: &SpecGraph) -> OrphanReport {
        let criteria = criteria_by_requirement(graph);
        let mut report = OrphanReport::default();

        for node in graph.active_nodes() {
            let orphan = match node.kind() {
                NodeKind::Entity(kind) => entity_is_orphan(graph, node, kind, &criteria),
                NodeKind::SubItem(SubItemKind::Criterion) => !is_implemented(graph, &node.key),
                NodeKind::SubItem(_) | NodeKind::FlowStep => false,
            };
            if orphan {
                let label = node.kind().label().to_string();
                report.by_kind.entry(label).or_default().push(node.key.clone());
            }
        }

        report.counts = report
            .by_kind
            .iter()
            .map(|(kind, keys)| (kind.clone(), keys.len()))
            .collect();
        report.total = report.counts.values().sum();

        tracing::debug!(orphans = report.total, "orphan detection complete");
        report
    }
}

fn entity_is_orphan(
    graph: &SpecGraph,
    node: &GraphNode,
    kind: EntityKind,
    criteria: &HashMap<&str, Vec<&str>>,
) -> bool {
    if graph.fan_in(&node.key) > 0 {
        return false;
    }
    let has_outbound = |edge: EdgeKind| graph.outbound(&node.key).iter().any(|e| e.kind() == edge);

    match kind {
        EntityKind::Requirement => criteria
            .get(node.key.as_str())
            .map_or(true, |keys| keys.iter().all(|k| graph.fan_in(k) == 0)),
        EntityKind::Plan => !has_outbound(EdgeKind::Implements),
        EntityKind::Component => true,
        EntityKind::Decision => !has_outbound(EdgeKind::Affects),
        EntityKind::Milestone => !has_outbound(EdgeKind::DependsOn),
        EntityKind::Constitution => false,
    }
}

/// Whether a criterion has an inbound `Implements` edge
pub(crate) fn is_implemented(graph: &SpecGraph, key: &str) -> bool {
    graph
        .inbound(key)
        .iter()
        .any(|e| e.kind() == EdgeKind::Implements)
}

/// Active criterion keys per requirement key
pub(crate) fn criteria_by_requirement(graph: &SpecGraph) -> HashMap<&str, Vec<&str>> {
    let mut criteria: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in graph.active_nodes() {
        if let NodeRef::SubItem { parent, item } = &node.node {
            if item.kind() == SubItemKind::Criterion {
                if let Some(requirement) = graph.node(&parent.to_string()) {
                    criteria
                        .entry(requirement.key.as_str())
                        .or_default()
                        .push(node.key.as_str());
                }
            }
        }
    }
    criteria
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use serde_json::json;
    use specgraph_model::{Entity, EntitySnapshot, SubItem, SubItemId};

    fn requirement() -> Entity {
        Entity::new(EntityKind::Requirement, 1, "login", "Login")
            .unwrap()
            .with_item(SubItem::new(SubItemId::new(SubItemKind::Criterion, 1)))
            .unwrap()
            .with_item(SubItem::new(SubItemId::new(SubItemKind::Criterion, 2)))
            .unwrap()
    }

    fn detect(entities: Vec<Entity>) -> OrphanReport {
        let graph = GraphBuilder::new().build(&EntitySnapshot::from_entities(entities));
        OrphanDetector::new().detect(&graph)
    }

    #[test]
    fn unimplemented_requirement_and_criteria_are_orphans() {
        let report = detect(vec![requirement()]);

        assert_eq!(report.total, 3);
        assert_eq!(report.counts["requirement"], 1);
        assert_eq!(report.counts["criterion"], 2);
    }

    #[test]
    fn implementing_plan_adopts_requirement_and_criterion() {
        let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth")
            .unwrap()
            .with_field("criteria_id", "req-001-login/crit-001");
        let report = detect(vec![requirement(), plan]);

        assert!(!report.contains("req-001-login"));
        assert!(!report.contains("req-001-login/crit-001"));
        assert!(report.contains("req-001-login/crit-002"));
        assert!(!report.contains("pln-001-auth"));
    }

    #[test]
    fn plan_without_criteria_is_orphan() {
        let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth").unwrap();
        let report = detect(vec![plan]);
        assert_eq!(report.by_kind["plan"], vec!["pln-001-auth"]);
    }

    #[test]
    fn decision_with_affects_edge_is_not_orphan() {
        let component = Entity::new(EntityKind::Component, 1, "store", "Store").unwrap();
        let decision = Entity::new(EntityKind::Decision, 1, "use-redis", "Use Redis")
            .unwrap()
            .with_field("affects_components", json!(["cmp-001-store"]));
        let report = detect(vec![component, decision]);

        assert_eq!(report.total, 0);
    }

    #[test]
    fn constitution_is_never_orphan() {
        let constitution = Entity::new(EntityKind::Constitution, 1, "principles", "P").unwrap();
        assert_eq!(detect(vec![constitution]).total, 0);
    }

    #[test]
    fn retired_criteria_are_ignored() {
        let mut old = SubItem::new(SubItemId::new(SubItemKind::Criterion, 1));
        old.superseded_by = Some(SubItemId::new(SubItemKind::Criterion, 2));
        let requirement = Entity::new(EntityKind::Requirement, 1, "login", "Login")
            .unwrap()
            .with_item(old)
            .unwrap()
            .with_item(SubItem::new(SubItemId::new(SubItemKind::Criterion, 2)))
            .unwrap();
        let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth")
            .unwrap()
            .with_field("criteria_id", "req-001-login/crit-002");
        let report = detect(vec![requirement, plan]);

        assert_eq!(report.total, 0);
    }
}
