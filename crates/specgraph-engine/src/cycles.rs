//! Cycle detection
//!
//! Depth-first search with a visited set and a recursion stack. A back edge
//! to a node still on the stack closes a cycle; the stack slice from that
//! node to the current one is reported. Each distinct cycle is reported once
//! regardless of the node the search entered it from.

use crate::graph::{EdgeFilter, SpecGraph};
use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Aggregate numbers for a cycle report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Number of distinct cycles reported
    pub total_cycles: usize,
    /// Node count of the longest reported cycle
    pub longest_cycle: usize,
    /// Nodes that belong to at least one strongly connected tangle
    pub nodes_in_cycles: usize,
    /// Strongly connected components with more than one node, or a self loop
    pub tangled_components: usize,
}

/// Result of [`CycleDetector::detect`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Whether any cycle was found
    pub has_cycles: bool,
    /// Each cycle as the ordered node keys along it, without repeating the first
    pub cycles: Vec<Vec<String>>,
    /// Aggregate numbers
    pub summary: CycleSummary,
}

/// Finds circular chains in a [`SpecGraph`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleDetector {
    filter: EdgeFilter,
}

impl CycleDetector {
    /// Create a detector following edges accepted by `filter`
    #[inline]
    #[must_use]
    pub fn new(filter: EdgeFilter) -> Self {
        Self { filter }
    }

    /// Edge filter in use
    #[inline]
    #[must_use]
    pub fn filter(&self) -> EdgeFilter {
        self.filter
    }

    /// Enumerate cycles; O(V+E)
    #[must_use]
    pub fn detect(&self, graph: &SpecGraph) -> CycleReport {
        let mut search = Search {
            graph,
            filter: self.filter,
            visited: HashSet::new(),
            on_stack: HashSet::new(),
            stack: Vec::new(),
            seen: HashSet::new(),
            cycles: Vec::new(),
        };

        for idx in graph.inner().node_indices() {
            if !search.visited.contains(&idx) {
                search.visit(idx);
            }
        }

        let cycles = search.cycles;
        let summary = self.summarize(graph, &cycles);
        tracing::debug!(
            cycles = summary.total_cycles,
            tangled = summary.tangled_components,
            "cycle detection complete"
        );

        CycleReport {
            has_cycles: !cycles.is_empty(),
            cycles,
            summary,
        }
    }

    fn summarize(&self, graph: &SpecGraph, cycles: &[Vec<String>]) -> CycleSummary {
        let filter = self.filter;
        let filtered = graph
            .inner()
            .filter_map(|_, _| Some(()), |_, edge| filter.accepts(edge.kind()).then_some(()));

        let mut tangled_components = 0;
        let mut nodes_in_cycles = 0;
        for component in tarjan_scc(&filtered) {
            let tangled = match component.as_slice() {
                [single] => filtered.contains_edge(*single, *single),
                _ => true,
            };
            if tangled {
                tangled_components += 1;
                nodes_in_cycles += component.len();
            }
        }

        CycleSummary {
            total_cycles: cycles.len(),
            longest_cycle: cycles.iter().map(Vec::len).max().unwrap_or(0),
            nodes_in_cycles,
            tangled_components,
        }
    }
}

struct Search<'g> {
    graph: &'g SpecGraph,
    filter: EdgeFilter,
    visited: HashSet<NodeIndex>,
    on_stack: HashSet<NodeIndex>,
    stack: Vec<NodeIndex>,
    seen: HashSet<Vec<NodeIndex>>,
    cycles: Vec<Vec<String>>,
}

impl Search<'_> {
    fn visit(&mut self, node: NodeIndex) {
        self.visited.insert(node);
        self.on_stack.insert(node);
        self.stack.push(node);

        for next in self.graph.successors(node, self.filter) {
            if self.on_stack.contains(&next) {
                self.record(next);
            } else if !self.visited.contains(&next) {
                self.visit(next);
            }
        }

        self.stack.pop();
        self.on_stack.remove(&node);
    }

    fn record(&mut self, start: NodeIndex) {
        let Some(pos) = self.stack.iter().position(|&n| n == start) else {
            return;
        };
        let path = &self.stack[pos..];
        if self.seen.insert(canonical(path)) {
            let inner = self.graph.inner();
            self.cycles
                .push(path.iter().map(|&n| inner[n].key.clone()).collect());
        }
    }
}

/// Rotation of a cycle starting at its smallest index
fn canonical(path: &[NodeIndex]) -> Vec<NodeIndex> {
    let start = path
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map_or(0, |(i, _)| i);
    let mut rotated = path[start..].to_vec();
    rotated.extend_from_slice(&path[..start]);
    rotated
}

/// Detect cycles with the given edge filter
#[must_use]
pub fn detect_cycles(graph: &SpecGraph, filter: EdgeFilter) -> CycleReport {
    CycleDetector::new(filter).detect(graph)
}

/// Check whether adding `proposed` edges (source key, target key) would close a cycle
///
/// Runs against the graph augmented with the proposed edges. Returns the first
/// cycle found as a key path that starts and ends at the proposed edge's source.
#[must_use]
pub fn would_create_cycle(
    graph: &SpecGraph,
    proposed: &[(String, String)],
    filter: EdgeFilter,
) -> Option<Vec<String>> {
    proposed
        .iter()
        .find_map(|(from, to)| path_between(graph, proposed, filter, to, from).map(|path| {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(from.clone());
            cycle.extend(path);
            cycle
        }))
}

/// Shortest cycle passing through `key`, starting and ending at it
#[must_use]
pub fn cycle_through(graph: &SpecGraph, key: &str, filter: EdgeFilter) -> Option<Vec<String>> {
    augmented_successors(graph, &[], filter, key)
        .into_iter()
        .filter_map(|next| path_between(graph, &[], filter, &next, key))
        .min_by_key(Vec::len)
        .map(|path| {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(key.to_string());
            cycle.extend(path);
            cycle
        })
}

/// Shortest key path from `start` to `goal`, both included
fn path_between(
    graph: &SpecGraph,
    proposed: &[(String, String)],
    filter: EdgeFilter,
    start: &str,
    goal: &str,
) -> Option<Vec<String>> {
    let mut previous: HashMap<String, String> = HashMap::new();
    let mut queue = VecDeque::from([start.to_string()]);
    let mut seen = HashSet::from([start.to_string()]);

    while let Some(current) = queue.pop_front() {
        if current == goal {
            let mut path = vec![current];
            while let Some(prev) = path.last().and_then(|key| previous.get(key)) {
                path.push(prev.clone());
            }
            path.reverse();
            return Some(path);
        }

        for next in augmented_successors(graph, proposed, filter, &current) {
            if seen.insert(next.clone()) {
                previous.insert(next.clone(), current.clone());
                queue.push_back(next);
            }
        }
    }
    None
}

fn augmented_successors(
    graph: &SpecGraph,
    proposed: &[(String, String)],
    filter: EdgeFilter,
    key: &str,
) -> Vec<String> {
    let mut next: Vec<String> = graph
        .index_of(key)
        .map(|idx| {
            graph
                .successors(idx, filter)
                .into_iter()
                .map(|n| graph.inner()[n].key.clone())
                .collect()
        })
        .unwrap_or_default();
    next.extend(
        proposed
            .iter()
            .filter(|(from, _)| from == key)
            .map(|(_, to)| to.clone()),
    );
    next
}
