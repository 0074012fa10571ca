//! Dependency metrics
//!
//! Fan-in, fan-out, coupling and stability per node; depth and critical
//! path over the DAG obtained by dropping the back edges of a depth-first
//! search. Every resolved edge counts; dangling references never do.
//! Retired sub-items are excluded from the node set.

use crate::config::EngineConfig;
use crate::graph::{EdgeFilter, SpecGraph};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Metrics of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Node key
    pub id: String,
    /// Inbound edge count
    pub fan_in: usize,
    /// Outbound edge count
    pub fan_out: usize,
    /// `(fan_in + fan_out) / |V|`
    pub coupling: f64,
    /// `fan_out / (fan_in + fan_out)`, 0.5 for an unconnected node
    pub stability: f64,
    /// Edges on the longest outgoing path
    pub depth: usize,
}

impl NodeMetrics {
    /// `fan_in + fan_out`
    #[inline]
    #[must_use]
    pub fn degree(&self) -> usize {
        self.fan_in + self.fan_out
    }
}

/// Dependency issue category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyIssueKind {
    /// Coupling above threshold
    HighCoupling,
    /// Fan-out above threshold
    HighFanOut,
}

/// Advisory finding about one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyIssue {
    /// Category
    pub kind: DependencyIssueKind,
    /// Node key
    pub node: String,
    /// Observed value
    pub value: f64,
    /// Threshold that was exceeded
    pub threshold: f64,
    /// Human-readable message
    pub message: String,
}

/// System-wide dependency analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyReport {
    /// Active node count
    pub total_nodes: usize,
    /// Resolved edge count
    pub total_edges: usize,
    /// `2E / V`
    pub average_degree: f64,
    /// Nodes by descending `fan_in + fan_out`, ties by key
    pub most_connected: Vec<NodeMetrics>,
    /// Longest path length in edges
    pub max_depth: usize,
    /// Mean depth over active nodes
    pub average_depth: f64,
    /// Node keys along the longest path
    pub critical_path: Vec<String>,
    /// Coupling and fan-out warnings
    pub issues: Vec<DependencyIssue>,
}

/// Computes [`DependencyReport`]s
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DependencyAnalyzer {
    coupling_threshold: f64,
    fan_out_threshold: usize,
    most_connected_limit: usize,
}

impl Default for DependencyAnalyzer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl DependencyAnalyzer {
    /// Analyzer using the thresholds of `config`
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            coupling_threshold: config.high_coupling_threshold,
            fan_out_threshold: config.high_fan_out_threshold,
            most_connected_limit: config.most_connected_limit,
        }
    }

    /// Analyze the whole graph
    #[must_use]
    pub fn analyze(&self, graph: &SpecGraph) -> DependencyReport {
        let depths = Depths::compute(graph);
        let metrics = all_metrics(graph, &depths);

        let total_nodes = metrics.len();
        let total_edges = graph.edge_count();
        let average_degree = if total_nodes == 0 {
            0.0
        } else {
            2.0 * total_edges as f64 / total_nodes as f64
        };

        let max_depth = metrics.iter().map(|m| m.depth).max().unwrap_or(0);
        let average_depth = if total_nodes == 0 {
            0.0
        } else {
            metrics.iter().map(|m| m.depth as f64).sum::<f64>() / total_nodes as f64
        };

        let issues = self.issues(&metrics);
        let critical_path = depths.critical_path(graph);

        let mut most_connected: Vec<NodeMetrics> =
            metrics.into_iter().filter(|m| m.degree() > 0).collect();
        most_connected.sort_by(|a, b| b.degree().cmp(&a.degree()).then_with(|| a.id.cmp(&b.id)));
        most_connected.truncate(self.most_connected_limit);

        tracing::debug!(
            nodes = total_nodes,
            edges = total_edges,
            max_depth,
            issues = issues.len(),
            "dependency analysis complete"
        );

        DependencyReport {
            total_nodes,
            total_edges,
            average_degree,
            most_connected,
            max_depth,
            average_depth,
            critical_path,
            issues,
        }
    }

    /// Metrics of a single node; `None` if the key is unknown or retired
    #[must_use]
    pub fn analyze_node(&self, graph: &SpecGraph, key: &str) -> Option<NodeMetrics> {
        let node = graph.node(key)?;
        if node.is_retired() {
            return None;
        }
        let depths = Depths::compute(graph);
        let idx = graph.index_of(key)?;
        Some(metrics_for(graph, idx, graph.active_node_count(), &depths))
    }

    fn issues(&self, metrics: &[NodeMetrics]) -> Vec<DependencyIssue> {
        let mut issues = Vec::new();
        for m in metrics {
            if m.coupling > self.coupling_threshold {
                issues.push(DependencyIssue {
                    kind: DependencyIssueKind::HighCoupling,
                    node: m.id.clone(),
                    value: m.coupling,
                    threshold: self.coupling_threshold,
                    message: format!(
                        "{} has high coupling ({:.2} > {:.2})",
                        m.id, m.coupling, self.coupling_threshold
                    ),
                });
            }
            if m.fan_out > self.fan_out_threshold {
                issues.push(DependencyIssue {
                    kind: DependencyIssueKind::HighFanOut,
                    node: m.id.clone(),
                    value: m.fan_out as f64,
                    threshold: self.fan_out_threshold as f64,
                    message: format!(
                        "{} depends on {} nodes (more than {})",
                        m.id, m.fan_out, self.fan_out_threshold
                    ),
                });
            }
        }
        issues
    }
}

fn all_metrics(graph: &SpecGraph, depths: &Depths) -> Vec<NodeMetrics> {
    let total = graph.active_node_count();
    graph
        .inner()
        .node_indices()
        .filter(|&idx| !graph.inner()[idx].is_retired())
        .map(|idx| metrics_for(graph, idx, total, depths))
        .collect()
}

fn metrics_for(graph: &SpecGraph, idx: NodeIndex, total: usize, depths: &Depths) -> NodeMetrics {
    let key = &graph.inner()[idx].key;
    let fan_in = graph.fan_in(key);
    let fan_out = graph.fan_out(key);
    let degree = fan_in + fan_out;

    let coupling = if total == 0 {
        0.0
    } else {
        degree as f64 / total as f64
    };
    let stability = if degree == 0 {
        0.5
    } else {
        fan_out as f64 / degree as f64
    };

    NodeMetrics {
        id: key.clone(),
        fan_in,
        fan_out,
        coupling,
        stability,
        depth: depths.depth(idx),
    }
}

/// Longest outgoing path per node, back edges dropped
struct Depths {
    depth: HashMap<NodeIndex, usize>,
    next: HashMap<NodeIndex, NodeIndex>,
}

impl Depths {
    fn compute(graph: &SpecGraph) -> Self {
        let mut state = Self {
            depth: HashMap::new(),
            next: HashMap::new(),
        };
        let mut on_stack = HashSet::new();
        for idx in graph.inner().node_indices() {
            if !state.depth.contains_key(&idx) {
                state.visit(graph, idx, &mut on_stack);
            }
        }
        state
    }

    fn visit(&mut self, graph: &SpecGraph, node: NodeIndex, on_stack: &mut HashSet<NodeIndex>) {
        on_stack.insert(node);
        let mut best = 0;
        let mut best_next = None;

        for next in graph.successors(node, EdgeFilter::All) {
            if on_stack.contains(&next) {
                continue;
            }
            if !self.depth.contains_key(&next) {
                self.visit(graph, next, on_stack);
            }
            let candidate = self.depth(next) + 1;
            if candidate > best {
                best = candidate;
                best_next = Some(next);
            }
        }

        on_stack.remove(&node);
        self.depth.insert(node, best);
        if let Some(next) = best_next {
            self.next.insert(node, next);
        }
    }

    fn depth(&self, node: NodeIndex) -> usize {
        self.depth.get(&node).copied().unwrap_or(0)
    }

    fn critical_path(&self, graph: &SpecGraph) -> Vec<String> {
        let inner = graph.inner();
        let mut start: Option<(NodeIndex, usize)> = None;
        for idx in inner.node_indices().filter(|&idx| !inner[idx].is_retired()) {
            let depth = self.depth(idx);
            if depth > 0 && start.map_or(true, |(_, best)| depth > best) {
                start = Some((idx, depth));
            }
        }

        let mut path = Vec::new();
        let mut current = start.map(|(idx, _)| idx);
        while let Some(idx) = current {
            path.push(inner[idx].key.clone());
            current = self.next.get(&idx).copied();
        }
        path
    }
}
