//! Specification graph
//!
//! `GraphBuilder::build` turns an entity snapshot into a directed graph:
//! one node per entity, sub-item and flow step, one edge per resolved
//! reference value. References that do not resolve are kept as dangling
//! edges so validators can report them.
//!
//! Edges declared by retired sub-items are skipped; retired items stay in
//! the graph as nodes so stale references to them still resolve and can be
//! reported against their successor.

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use specgraph_model::schema::{fields_for, FLOW_STEPS_FIELD};
use specgraph_model::{
    EdgeKind, Entity, EntityId, EntitySnapshot, NodeKind, NodeRef, Owner, RefField, RefScope,
    RefSite, SubItemId, SubItemKind,
};
use std::collections::HashMap;

/// Which edges a traversal follows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeFilter {
    /// `depends_on` and `blocked_by` edges only
    #[default]
    Dependencies,
    /// Every reference edge
    All,
}

impl EdgeFilter {
    /// Whether an edge of `kind` passes the filter
    #[inline]
    #[must_use]
    pub fn accepts(self, kind: EdgeKind) -> bool {
        match self {
            Self::Dependencies => kind.is_dependency(),
            Self::All => true,
        }
    }
}

/// Graph node: an entity, sub-item or flow step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Qualified key, unique across the graph
    pub key: String,
    /// Typed reference
    pub node: NodeRef,
    /// Successor key when the node is a retired sub-item
    pub superseded_by: Option<String>,
}

impl GraphNode {
    /// Node kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.node.kind()
    }

    /// Retired sub-items have a successor
    #[inline]
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.superseded_by.is_some()
    }
}

/// Graph edge weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    /// Field that declared the reference
    pub field: &'static RefField,
}

impl GraphEdge {
    /// Relationship kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EdgeKind {
        self.field.edge
    }
}

/// Borrowed view of a resolved edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge<'g> {
    /// Source node key
    pub source: &'g str,
    /// Target node key
    pub target: &'g str,
    /// Field that declared the reference
    pub field: &'static RefField,
}

impl Edge<'_> {
    /// Relationship kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EdgeKind {
        self.field.edge
    }
}

/// Why a reference did not produce an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "found")]
pub enum DanglingReason {
    /// No node has the resolved key
    Missing,
    /// The node exists but has the wrong kind
    KindMismatch(NodeKind),
}

/// Reference whose target is not a valid node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingEdge {
    /// Source node key
    pub source: String,
    /// Field that declared the reference
    pub field: &'static RefField,
    /// Raw stored value
    pub value: String,
    /// Key the value resolved to
    pub resolved: String,
    /// Failure reason
    pub reason: DanglingReason,
}

/// Location of a reference field: the entity and, for sub-item fields, the item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefContext<'a> {
    /// Entity owning the field (directly or through a sub-item)
    pub entity: &'a EntityId,
    /// Sub-item owning the field
    pub item: Option<&'a SubItemId>,
}

impl<'a> RefContext<'a> {
    /// Context for an entity-level field
    #[must_use]
    pub fn entity(entity: &'a EntityId) -> Self {
        Self { entity, item: None }
    }

    /// Context for a sub-item field
    #[must_use]
    pub fn item(entity: &'a EntityId, item: &'a SubItemId) -> Self {
        Self {
            entity,
            item: Some(item),
        }
    }

    /// Key of the node holding the reference
    ///
    /// Nested sites (flow steps) are attributed to the step element when it has an id.
    #[must_use]
    pub fn source_key(&self, element: Option<&str>) -> String {
        match (self.item, element) {
            (None, _) => self.entity.to_string(),
            (Some(item), None) => format!("{}/{}", self.entity, item),
            (Some(item), Some(step)) => format!("{}/{}/{}", self.entity, item, step),
        }
    }

    /// Resolve a stored reference value to the node key it names
    #[must_use]
    pub fn resolve(&self, field: &RefField, value: &str) -> String {
        match field.scope {
            RefScope::Global => value.to_string(),
            RefScope::Sibling => format!("{}/{}", self.entity, value),
            RefScope::Local => match self.item {
                Some(item) => format!("{}/{}/{}", self.entity, item, value),
                None => format!("{}/{}", self.entity, value),
            },
        }
    }

    /// Stored value that names `target` from this context, inverse of [`Self::resolve`]
    #[must_use]
    pub fn encode(&self, field: &RefField, target_parent: &EntityId, target: &SubItemId) -> String {
        match field.scope {
            RefScope::Global => format!("{target_parent}/{target}"),
            RefScope::Sibling | RefScope::Local => target.to_string(),
        }
    }
}

/// Visit every reference value of an entity and its sub-items, retired items included
pub fn for_each_reference<'a>(
    entity: &'a Entity,
    mut f: impl FnMut(RefContext<'a>, &'static RefField, RefSite<'a>, bool),
) {
    let ctx = RefContext::entity(&entity.id);
    for field in fields_for(Owner::Entity(entity.kind())) {
        field.visit(&entity.fields, |site| f(ctx, field, site, false));
    }
    for item in entity.all_items() {
        let ctx = RefContext::item(&entity.id, &item.id);
        for field in fields_for(Owner::SubItem(item.id.kind())) {
            field.visit(&item.fields, |site| f(ctx, field, site, item.is_retired()));
        }
    }
}

/// Directed graph of specification nodes and reference edges
#[derive(Debug, Clone, Default)]
pub struct SpecGraph {
    graph: DiGraph<GraphNode, GraphEdge>,
    index: HashMap<String, NodeIndex>,
    dangling: Vec<DanglingEdge>,
}

impl SpecGraph {
    /// Number of nodes, retired included
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of resolved edges
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether a node with this key exists
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Look up a node by key
    #[must_use]
    pub fn node(&self, key: &str) -> Option<&GraphNode> {
        self.index.get(key).map(|&idx| &self.graph[idx])
    }

    /// Nodes in insertion order (entities in ID order, each followed by its items)
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    /// Nodes that are not retired
    pub fn active_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes().filter(|n| !n.is_retired())
    }

    /// Number of nodes that are not retired
    #[must_use]
    pub fn active_node_count(&self) -> usize {
        self.active_nodes().count()
    }

    /// Resolved edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = Edge<'_>> {
        self.graph.edge_references().map(move |e| self.view(e.source(), e.target(), e.weight()))
    }

    /// References that did not resolve
    #[must_use]
    pub fn dangling(&self) -> &[DanglingEdge] {
        &self.dangling
    }

    /// Outgoing edges of a node, in insertion order
    #[must_use]
    pub fn outbound(&self, key: &str) -> Vec<Edge<'_>> {
        self.directed(key, Direction::Outgoing)
    }

    /// Incoming edges of a node, in insertion order
    #[must_use]
    pub fn inbound(&self, key: &str) -> Vec<Edge<'_>> {
        self.directed(key, Direction::Incoming)
    }

    /// Count of edges terminating at the node
    #[must_use]
    pub fn fan_in(&self, key: &str) -> usize {
        self.index
            .get(key)
            .map_or(0, |&idx| self.graph.edges_directed(idx, Direction::Incoming).count())
    }

    /// Count of edges originating from the node
    #[must_use]
    pub fn fan_out(&self, key: &str) -> usize {
        self.index
            .get(key)
            .map_or(0, |&idx| self.graph.edges_directed(idx, Direction::Outgoing).count())
    }

    /// Keys of nodes of one kind, in insertion order
    #[must_use]
    pub fn keys_of_kind(&self, kind: NodeKind) -> Vec<&str> {
        self.nodes()
            .filter(|n| n.kind() == kind)
            .map(|n| n.key.as_str())
            .collect()
    }

    pub(crate) fn inner(&self) -> &DiGraph<GraphNode, GraphEdge> {
        &self.graph
    }

    pub(crate) fn index_of(&self, key: &str) -> Option<NodeIndex> {
        self.index.get(key).copied()
    }

    /// Successor indices through edges accepted by `filter`, in edge insertion order
    pub(crate) fn successors(&self, idx: NodeIndex, filter: EdgeFilter) -> Vec<NodeIndex> {
        let mut edges: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| filter.accepts(e.weight().kind()))
            .map(|e| (e.id(), e.target()))
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, target)| target).collect()
    }

    fn directed(&self, key: &str, direction: Direction) -> Vec<Edge<'_>> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges_directed(idx, direction).collect();
        edges.sort_by_key(|e| e.id());
        edges
            .into_iter()
            .map(|e| self.view(e.source(), e.target(), e.weight()))
            .collect()
    }

    fn view(&self, source: NodeIndex, target: NodeIndex, weight: &GraphEdge) -> Edge<'_> {
        Edge {
            source: &self.graph[source].key,
            target: &self.graph[target].key,
            field: weight.field,
        }
    }

    fn add_node(&mut self, node: NodeRef, superseded_by: Option<String>) {
        let key = node.key();
        if self.index.contains_key(&key) {
            return;
        }
        let idx = self.graph.add_node(GraphNode {
            key: key.clone(),
            node,
            superseded_by,
        });
        self.index.insert(key, idx);
    }

    fn add_reference(&mut self, source: &str, field: &'static RefField, value: &str, resolved: String) {
        let Some(&from) = self.index.get(source) else {
            return;
        };
        let target = self.index.get(&resolved).copied();
        match target {
            Some(to) if field.target.accepts(self.graph[to].kind()) => {
                self.graph.add_edge(from, to, GraphEdge { field });
            }
            Some(to) => {
                let found = self.graph[to].kind();
                self.push_dangling(source, field, value, resolved, DanglingReason::KindMismatch(found));
            }
            None => self.push_dangling(source, field, value, resolved, DanglingReason::Missing),
        }
    }

    fn push_dangling(
        &mut self,
        source: &str,
        field: &'static RefField,
        value: &str,
        resolved: String,
        reason: DanglingReason,
    ) {
        self.dangling.push(DanglingEdge {
            source: source.to_string(),
            field,
            value: value.to_string(),
            resolved,
            reason,
        });
    }
}

/// Builds a [`SpecGraph`] from a snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    /// Create a builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the graph for a snapshot; pure function of its input
    #[must_use]
    pub fn build(&self, snapshot: &EntitySnapshot) -> SpecGraph {
        let mut graph = SpecGraph::default();

        for entity in snapshot.iter() {
            add_entity_nodes(&mut graph, entity);
        }

        for entity in snapshot.iter() {
            for_each_reference(entity, |ctx, field, site, retired| {
                if retired {
                    return;
                }
                let source = ctx.source_key(site.element);
                let resolved = ctx.resolve(field, site.value);
                graph.add_reference(&source, field, site.value, resolved);
            });
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            dangling = graph.dangling.len(),
            "built specification graph"
        );
        graph
    }
}

fn add_entity_nodes(graph: &mut SpecGraph, entity: &Entity) {
    graph.add_node(NodeRef::Entity(entity.id.clone()), None);

    for item in entity.all_items() {
        let successor = item
            .superseded_by
            .map(|next| format!("{}/{}", entity.id, next));
        graph.add_node(
            NodeRef::SubItem {
                parent: entity.id.clone(),
                item: item.id,
            },
            successor,
        );

        if item.id.kind() == SubItemKind::Flow {
            for step in flow_step_ids(item) {
                graph.add_node(
                    NodeRef::FlowStep {
                        parent: entity.id.clone(),
                        flow: item.id,
                        step: step.to_string(),
                    },
                    None,
                );
            }
        }
    }
}

fn flow_step_ids(flow: &specgraph_model::SubItem) -> impl Iterator<Item = &str> {
    flow.fields
        .get(FLOW_STEPS_FIELD)
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|step| step.get("id").and_then(serde_json::Value::as_str))
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use specgraph_model::{EntityKind, SubItem};
    use serde_json::json;

    fn task(n: u32) -> SubItem {
        SubItem::new(SubItemId::new(SubItemKind::Task, n))
    }

    fn plan_with_tasks() -> Entity {
        Entity::new(EntityKind::Plan, 1, "auth", "Auth")
            .unwrap()
            .with_item(task(1))
            .unwrap()
            .with_item(task(2).with_field("depends_on", json!(["task-001"])))
            .unwrap()
            .with_item(task(3).with_field("depends_on", json!(["task-001", "task-009"])))
            .unwrap()
    }

    #[test]
    fn builds_nodes_for_entities_and_items() {
        let snapshot = EntitySnapshot::from_entities([plan_with_tasks()]);
        let graph = GraphBuilder::new().build(&snapshot);

        assert_eq!(graph.node_count(), 4);
        assert!(graph.contains("pln-001-auth"));
        assert!(graph.contains("pln-001-auth/task-003"));
    }

    #[test]
    fn sibling_references_resolve_within_parent() {
        let snapshot = EntitySnapshot::from_entities([plan_with_tasks()]);
        let graph = GraphBuilder::new().build(&snapshot);

        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.fan_in("pln-001-auth/task-001"), 2);
        assert_eq!(graph.fan_out("pln-001-auth/task-003"), 1);
    }

    #[test]
    fn missing_targets_are_kept_as_dangling() {
        let snapshot = EntitySnapshot::from_entities([plan_with_tasks()]);
        let graph = GraphBuilder::new().build(&snapshot);

        let dangling = graph.dangling();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].source, "pln-001-auth/task-003");
        assert_eq!(dangling[0].resolved, "pln-001-auth/task-009");
        assert_eq!(dangling[0].reason, DanglingReason::Missing);
    }

    #[test]
    fn wrong_kind_targets_are_dangling() {
        let component = Entity::new(EntityKind::Component, 1, "store", "Store").unwrap();
        let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth")
            .unwrap()
            .with_field("depends_on", json!(["cmp-001-store"]));
        let graph = GraphBuilder::new().build(&EntitySnapshot::from_entities([component, plan]));

        assert_eq!(graph.edge_count(), 0);
        assert_eq!(
            graph.dangling()[0].reason,
            DanglingReason::KindMismatch(NodeKind::Entity(EntityKind::Component))
        );
    }

    #[test]
    fn flow_steps_become_nodes_with_local_edges() {
        let flow = SubItem::new(SubItemId::new(SubItemKind::Flow, 1)).with_field(
            "steps",
            json!([
                {"id": "step-001", "next_steps": ["step-002"]},
                {"id": "step-002", "next_steps": []}
            ]),
        );
        let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth")
            .unwrap()
            .with_item(flow)
            .unwrap();
        let graph = GraphBuilder::new().build(&EntitySnapshot::from_entities([plan]));

        let edges: Vec<_> = graph.edges().map(|e| (e.source, e.target)).collect();
        assert_eq!(
            edges,
            vec![("pln-001-auth/flow-001/step-001", "pln-001-auth/flow-001/step-002")]
        );
    }

    #[test]
    fn retired_items_keep_node_but_drop_outgoing_edges() {
        let mut old = task(2).with_field("depends_on", json!(["task-001"]));
        old.superseded_by = Some(SubItemId::new(SubItemKind::Task, 3));
        let plan = Entity::new(EntityKind::Plan, 1, "auth", "Auth")
            .unwrap()
            .with_item(task(1))
            .unwrap()
            .with_item(old)
            .unwrap();
        let graph = GraphBuilder::new().build(&EntitySnapshot::from_entities([plan]));

        let node = graph.node("pln-001-auth/task-002").unwrap();
        assert!(node.is_retired());
        assert_eq!(node.superseded_by.as_deref(), Some("pln-001-auth/task-003"));
        assert_eq!(graph.edge_count(), 0);
    }
}
