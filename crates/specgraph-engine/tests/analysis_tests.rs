use pretty_assertions::assert_eq;
use proptest::prelude::*;
use specgraph_engine::{
    add_dependency, detect_cycles, CoverageAnalyzer, DependencyAnalyzer, EdgeFilter, EngineConfig, GraphBuilder,
    OrphanDetector, ReferenceValidator, ValidationOptions,
};
use specgraph_model::{EntityKind, EntitySnapshot};
use specgraph_test_utils::{
    component, component_chain, component_ring, entity, plan_with, requirement_with_criteria, snapshot, test_case,
};

#[test]
fn three_component_ring_is_one_cycle_of_length_three() {
    let snap = snapshot([
        component(1, "a", &["cmp-002-b"]),
        component(2, "b", &["cmp-003-c"]),
        component(3, "c", &["cmp-001-a"]),
    ]);
    let graph = GraphBuilder::new().build(&snap);
    let report = detect_cycles(&graph, EdgeFilter::Dependencies);

    assert!(report.has_cycles);
    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.cycles[0].len(), 3);
}

#[test]
fn all_edge_filter_sees_non_dependency_cycles() {
    let snap = snapshot([
        component(1, "store", &[]),
        plan_with(1, "auth", [test_case(1, &["cmp-001-store"])]),
    ]);
    let graph = GraphBuilder::new().build(&snap);

    assert!(!detect_cycles(&graph, EdgeFilter::All).has_cycles);
    assert_eq!(graph.edge_count(), 1);
}

#[test]
fn full_corpus_reports_are_consistent() {
    let snap = snapshot([
        requirement_with_criteria(1, "login", 2),
        entity(EntityKind::Plan, 1, "auth").with_field("criteria_id", "req-001-login/crit-001"),
        component(1, "store", &[]),
        entity(EntityKind::Decision, 1, "use-jwt").with_field("affects_requirements", serde_json::json!(["req-001-login"])),
    ]);
    let graph = GraphBuilder::new().build(&snap);

    let deps = DependencyAnalyzer::default().analyze(&graph);
    assert_eq!(deps.total_nodes, 6);
    assert_eq!(deps.total_edges, 2);

    let coverage = CoverageAnalyzer::default().analyze(&graph);
    assert_eq!(coverage.by_category["requirement"].covered, 1);
    assert_eq!(coverage.by_category["plan"].covered, 0);
    assert_eq!(coverage.by_category["component"].covered, 0);

    let orphans = OrphanDetector::new().detect(&graph);
    assert_eq!(orphans.by_kind["component"], vec!["cmp-001-store"]);
    assert_eq!(orphans.by_kind["criterion"], vec!["req-001-login/crit-002"]);
    assert!(!orphans.contains("dec-001-use-jwt"));

    let validation = ReferenceValidator::new(&graph, &snap).validate_all(ValidationOptions::default());
    assert!(validation.valid);
    assert_eq!(validation.checked, 2);
}

fn acyclic_corpus(node_count: u32, edges: &[(u32, u32)]) -> EntitySnapshot {
    let mut deps: Vec<Vec<String>> = vec![Vec::new(); node_count as usize];
    for &(a, b) in edges {
        let (from, to) = (a.min(b) % node_count, a.max(b) % node_count);
        if from < to {
            deps[from as usize].push(format!("cmp-{:03}-n{}", to + 1, to + 1));
        }
    }
    snapshot((0..node_count).map(|i| {
        let refs: Vec<&str> = deps[i as usize].iter().map(String::as_str).collect();
        component(i + 1, &format!("n{}", i + 1), &refs)
    }))
}

proptest! {
    #[test]
    fn prop_injected_ring_reported_with_its_length(k in 1u32..12, tail in 0u32..5) {
        let mut entities = component_ring(k);
        entities.extend((0..tail).map(|i| component(100 + i, &format!("t{i}"), &["cmp-001-n1"])));
        let graph = GraphBuilder::new().build(&snapshot(entities));
        let report = detect_cycles(&graph, EdgeFilter::Dependencies);

        prop_assert!(report.has_cycles);
        prop_assert_eq!(report.cycles.len(), 1);
        prop_assert_eq!(report.cycles[0].len(), k as usize);
    }

    #[test]
    fn prop_forward_only_edges_are_acyclic(
        node_count in 1u32..15,
        edges in proptest::collection::vec((0u32..15, 0u32..15), 0..40)
    ) {
        let graph = GraphBuilder::new().build(&acyclic_corpus(node_count, &edges));
        let report = detect_cycles(&graph, EdgeFilter::All);
        prop_assert!(!report.has_cycles);
        prop_assert_eq!(report.summary.tangled_components, 0);
    }

    #[test]
    fn prop_accepted_dependencies_keep_graph_acyclic(
        edges in proptest::collection::vec((1u32..8, 1u32..8), 0..30)
    ) {
        let config = EngineConfig::default();
        let mut snap = snapshot(component_chain(7).into_iter().map(|mut c| {
            c.fields.clear();
            c
        }));

        for (from, to) in edges {
            let source = format!("cmp-{from:03}-n{from}");
            let target = format!("cmp-{to:03}-n{to}");
            if let Ok(outcome) = add_dependency(&snap, &source, "depends_on", &target, &config) {
                snap = outcome.snapshot;
            }
        }

        let graph = GraphBuilder::new().build(&snap);
        prop_assert!(!detect_cycles(&graph, EdgeFilter::Dependencies).has_cycles);
    }

    #[test]
    fn prop_adding_a_reference_covers_exactly_one_more_spec(
        components in 1u32..8,
        verified in proptest::collection::vec(1u32..8, 0..8),
        extra in 1u32..8,
    ) {
        let refs = |ids: &[u32]| -> Vec<String> {
            ids.iter()
                .filter(|&&n| n <= components)
                .map(|n| format!("cmp-{n:03}-c{n}"))
                .collect()
        };
        let build = |ids: &[u32]| {
            let names = refs(ids);
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let mut entities: Vec<_> = (1..=components).map(|n| component(n, &format!("c{n}"), &[])).collect();
            entities.push(plan_with(1, "p", [test_case(1, &names)]));
            snapshot(entities)
        };

        let before = CoverageAnalyzer::default().analyze(&GraphBuilder::new().build(&build(&verified)));
        let mut more = verified.clone();
        more.push(extra);
        let after = CoverageAnalyzer::default().analyze(&GraphBuilder::new().build(&build(&more)));

        let newly_covered = extra <= components && !refs(&verified).contains(&format!("cmp-{extra:03}-c{extra}"));
        if newly_covered {
            prop_assert_eq!(after.covered_specs, before.covered_specs + 1);
            prop_assert!(after.coverage_percentage > before.coverage_percentage);
        } else {
            prop_assert_eq!(after.covered_specs, before.covered_specs);
            prop_assert_eq!(after.uncovered_specs, before.uncovered_specs);
        }
    }
}
