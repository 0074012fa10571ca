//! Coverage analysis
//!
//! | category    | covered when                                          |
//! |-------------|-------------------------------------------------------|
//! | requirement | an active criterion has an inbound `implements` edge  |
//! | plan        | it owns at least one active test case                 |
//! | component   | it has an inbound `verifies` edge                     |
//!
//! Adding a reference never lowers the covered count.

use crate::config::EngineConfig;
use crate::graph::SpecGraph;
use crate::orphans::{criteria_by_requirement, is_implemented, OrphanDetector};
use serde::{Deserialize, Serialize};
use specgraph_model::{EdgeKind, EntityKind, NodeKind, NodeRef, SubItemKind};
use std::collections::{BTreeMap, HashSet};

/// Entity kinds that take part in coverage, in report order
pub const COVERAGE_CATEGORIES: [EntityKind; 3] =
    [EntityKind::Requirement, EntityKind::Plan, EntityKind::Component];

/// Coverage of one category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryCoverage {
    /// Specs in the category
    pub total: usize,
    /// Covered specs
    pub covered: usize,
    /// `covered / total * 100`, 0 when empty
    pub percentage: f64,
    /// Uncovered spec keys
    pub uncovered: Vec<String>,
}

/// Result of [`CoverageAnalyzer::analyze`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Specs across all categories
    pub total_specs: usize,
    /// Covered specs across all categories
    pub covered_specs: usize,
    /// Percentage in 0..=100
    pub coverage_percentage: f64,
    /// Uncovered spec keys across all categories
    pub uncovered_specs: Vec<String>,
    /// Orphan keys (see [`OrphanDetector`])
    pub orphaned_specs: Vec<String>,
    /// Per-category breakdown keyed by kind name
    pub by_category: BTreeMap<String, CategoryCoverage>,
    /// Suggested follow-ups
    pub recommendations: Vec<String>,
}

/// Computes [`CoverageReport`]s
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageAnalyzer {
    min_coverage: f64,
}

impl Default for CoverageAnalyzer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl CoverageAnalyzer {
    /// Analyzer using the minimum coverage of `config`
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_coverage: config.min_coverage_percentage,
        }
    }

    /// Analyze coverage
    #[must_use]
    pub fn analyze(&self, graph: &SpecGraph) -> CoverageReport {
        let covered = covered_keys(graph);
        let mut report = CoverageReport::default();

        for kind in COVERAGE_CATEGORIES {
            let mut category = CategoryCoverage::default();
            for key in graph.keys_of_kind(NodeKind::Entity(kind)) {
                category.total += 1;
                if covered.contains(key) {
                    category.covered += 1;
                } else {
                    category.uncovered.push(key.to_string());
                }
            }
            category.percentage = percentage(category.covered, category.total);

            report.total_specs += category.total;
            report.covered_specs += category.covered;
            report.uncovered_specs.extend(category.uncovered.iter().cloned());
            report.by_category.insert(kind.as_str().to_string(), category);
        }

        report.coverage_percentage = percentage(report.covered_specs, report.total_specs);
        report.orphaned_specs = OrphanDetector::new()
            .detect(graph)
            .keys()
            .map(str::to_string)
            .collect();
        report.recommendations = self.recommendations(&report);

        tracing::debug!(
            total = report.total_specs,
            covered = report.covered_specs,
            percentage = report.coverage_percentage,
            "coverage analysis complete"
        );
        report
    }

    fn recommendations(&self, report: &CoverageReport) -> Vec<String> {
        let mut out = Vec::new();
        for kind in COVERAGE_CATEGORIES {
            let Some(category) = report.by_category.get(kind.as_str()) else {
                continue;
            };
            let missing = category.uncovered.len();
            if missing == 0 {
                continue;
            }
            let action = match kind {
                EntityKind::Requirement => "link them from a plan's criteria_id",
                EntityKind::Plan => "add test cases",
                _ => "reference them from a test case",
            };
            out.push(format!(
                "{missing} of {} {} specs are uncovered; {action}: {}",
                category.total,
                kind,
                category.uncovered.join(", ")
            ));
        }

        if report.total_specs > 0 && report.coverage_percentage < self.min_coverage {
            out.push(format!(
                "Coverage {:.1}% is below the {:.1}% minimum",
                report.coverage_percentage, self.min_coverage
            ));
        }
        if !report.orphaned_specs.is_empty() {
            out.push(format!(
                "{} orphaned specs have no inbound references",
                report.orphaned_specs.len()
            ));
        }
        out
    }
}

fn percentage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64 * 100.0
    }
}

fn covered_keys(graph: &SpecGraph) -> HashSet<&str> {
    let mut covered = HashSet::new();

    for (requirement, criteria) in criteria_by_requirement(graph) {
        if criteria.iter().any(|c| is_implemented(graph, c)) {
            covered.insert(requirement);
        }
    }

    for node in graph.active_nodes() {
        match (&node.node, node.kind()) {
            (NodeRef::SubItem { parent, .. }, NodeKind::SubItem(SubItemKind::TestCase)) => {
                if let Some(plan) = graph.node(&parent.to_string()) {
                    covered.insert(plan.key.as_str());
                }
            }
            (_, NodeKind::Entity(EntityKind::Component)) => {
                if graph
                    .inbound(&node.key)
                    .iter()
                    .any(|e| e.kind() == EdgeKind::Verifies)
                {
                    covered.insert(node.key.as_str());
                }
            }
            _ => {}
        }
    }
    covered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use serde_json::json;
    use specgraph_model::{Entity, EntitySnapshot, SubItem, SubItemId};

    fn analyze(entities: Vec<Entity>) -> CoverageReport {
        let graph = GraphBuilder::new().build(&EntitySnapshot::from_entities(entities));
        CoverageAnalyzer::default().analyze(&graph)
    }

    #[test]
    fn empty_corpus_has_zero_percent() {
        let report = analyze(Vec::new());
        assert_eq!(report.total_specs, 0);
        assert!(report.coverage_percentage.abs() < f64::EPSILON);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn categories_are_covered_by_their_relationships() {
        let requirement = Entity::new(EntityKind::Requirement, 1, "login", "Login")
            .unwrap()
            .with_item(SubItem::new(SubItemId::new(SubItemKind::Criterion, 1)))
            .unwrap();
        let component = Entity::new(EntityKind::Component, 1, "store", "Store").unwrap();
        let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth")
            .unwrap()
            .with_field("criteria_id", "req-001-login/crit-001")
            .with_item(
                SubItem::new(SubItemId::new(SubItemKind::TestCase, 1))
                    .with_field("components", json!(["cmp-001-store"])),
            )
            .unwrap();
        let report = analyze(vec![requirement, component, plan]);

        assert_eq!(report.total_specs, 3);
        assert_eq!(report.covered_specs, 3);
        assert!((report.coverage_percentage - 100.0).abs() < 1e-9);
        assert!(report.uncovered_specs.is_empty());
    }

    #[test]
    fn uncovered_specs_produce_recommendations() {
        let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth").unwrap();
        let component = Entity::new(EntityKind::Component, 1, "store", "Store").unwrap();
        let report = analyze(vec![plan, component]);

        assert_eq!(report.covered_specs, 0);
        assert_eq!(report.uncovered_specs, vec!["pln-001-auth", "cmp-001-store"]);
        assert_eq!(report.by_category["plan"].uncovered, vec!["pln-001-auth"]);
        assert!(report.recommendations.iter().any(|r| r.contains("below the 80.0% minimum")));
        assert_eq!(report.orphaned_specs, vec!["cmp-001-store", "pln-001-auth"]);
    }
}
