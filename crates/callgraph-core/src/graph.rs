//! Call graph wrapper using petgraph::StableDiGraph keyed by MethodId

use crate::layout::{self, Blueprint};
use crate::model::*;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

/// A method in the call graph. Positions are written only by the layout composer.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: MethodId,
    pub position: Point,
    pub raw_layout_position: Point,
}

impl Node {
    fn new(id: MethodId) -> Self {
        Node {
            id,
            position: Point::ORIGIN,
            raw_layout_position: Point::ORIGIN,
        }
    }
}

/// A directed call edge. At most one per `(source, target)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: MethodId,
    pub target: MethodId,
}

impl Edge {
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("edge endpoint {0} is not a node of this graph")]
    UnknownNode(MethodId),
}

/// The call graph: a directed graph with identity-deduplicated nodes and edges.
#[derive(Clone, Default)]
pub struct CallGraph {
    inner: StableDiGraph<Node, Edge>,
    node_index: HashMap<MethodId, NodeIndex>,
    edge_index: HashMap<EdgeId, EdgeIndex>,
}

impl std::fmt::Debug for CallGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a scope's methods and its dependency view.
    ///
    /// Every scope method becomes a node even without edges; dependency
    /// endpoints outside the scope are added on first reference.
    pub fn from_view(
        methods: &BTreeSet<MethodId>,
        view: &HashSet<Dependency>,
    ) -> Result<Self, GraphError> {
        let mut graph = CallGraph::new();
        for &method in methods {
            graph.add_node(method);
        }
        let mut dependencies: Vec<Dependency> = view.iter().copied().collect();
        dependencies.sort();
        for dependency in dependencies {
            graph.add_node(dependency.caller);
            graph.add_node(dependency.callee);
            graph.add_edge(dependency.caller, dependency.callee)?;
        }
        Ok(graph)
    }

    /// Add a node if absent. Returns true if it was inserted.
    pub fn add_node(&mut self, id: MethodId) -> bool {
        if self.node_index.contains_key(&id) {
            return false;
        }
        let idx = self.inner.add_node(Node::new(id));
        self.node_index.insert(id, idx);
        true
    }

    /// Add an edge between two existing nodes. Returns true if it was inserted.
    pub fn add_edge(&mut self, source: MethodId, target: MethodId) -> Result<bool, GraphError> {
        let id = EdgeId::new(source, target);
        if self.edge_index.contains_key(&id) {
            return Ok(false);
        }
        let source_idx = *self
            .node_index
            .get(&source)
            .ok_or(GraphError::UnknownNode(source))?;
        let target_idx = *self
            .node_index
            .get(&target)
            .ok_or(GraphError::UnknownNode(target))?;
        let idx = self
            .inner
            .add_edge(source_idx, target_idx, Edge { id, source, target });
        self.edge_index.insert(id, idx);
        Ok(true)
    }

    /// Get a node by ID.
    pub fn node(&self, id: MethodId) -> Option<&Node> {
        let idx = *self.node_index.get(&id)?;
        self.inner.node_weight(idx)
    }

    /// Get a mutable node by ID.
    pub fn node_mut(&mut self, id: MethodId) -> Option<&mut Node> {
        let idx = *self.node_index.get(&id)?;
        self.inner.node_weight_mut(idx)
    }

    /// Get an edge by ID.
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        let idx = *self.edge_index.get(&id)?;
        self.inner.edge_weight(idx)
    }

    pub fn contains_node(&self, id: MethodId) -> bool {
        self.node_index.contains_key(&id)
    }

    pub fn contains_edge(&self, source: MethodId, target: MethodId) -> bool {
        self.edge_index.contains_key(&EdgeId::new(source, target))
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    /// Iterate over all edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.inner
            .edge_indices()
            .filter_map(move |idx| self.inner.edge_weight(idx))
    }

    /// Node IDs in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.nodes().map(|n| n.id)
    }

    /// Outgoing edges of a node (a self-loop appears here and in `in_edges`).
    pub fn out_edges(&self, id: MethodId) -> impl Iterator<Item = &Edge> {
        self.directed_edges(id, Direction::Outgoing)
    }

    /// Incoming edges of a node.
    pub fn in_edges(&self, id: MethodId) -> impl Iterator<Item = &Edge> {
        self.directed_edges(id, Direction::Incoming)
    }

    fn directed_edges(&self, id: MethodId, direction: Direction) -> impl Iterator<Item = &Edge> {
        self.node_index
            .get(&id)
            .copied()
            .into_iter()
            .flat_map(move |idx| {
                self.inner
                    .edges_directed(idx, direction)
                    .map(|edge_ref| edge_ref.weight())
            })
    }

    /// Callers and callees of a node, excluding the node itself.
    pub fn neighbors(&self, id: MethodId) -> BTreeSet<MethodId> {
        self.in_edges(id)
            .map(|e| e.source)
            .chain(self.out_edges(id).map(|e| e.target))
            .filter(|&n| n != id)
            .collect()
    }

    /// Partition the graph into weakly connected components.
    ///
    /// Components come out ordered by their earliest-inserted node, and each
    /// one keeps node insertion order, so the result is deterministic.
    pub fn connected_components(&self) -> Vec<CallGraph> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut components = Vec::new();

        for root in self.inner.node_indices() {
            if !visited.insert(root) {
                continue;
            }
            let mut members = vec![root];
            let mut queue = VecDeque::from([root]);
            while let Some(current) = queue.pop_front() {
                for neighbor in self.inner.neighbors_undirected(current) {
                    // self-loops don't expand the frontier
                    if neighbor != current && visited.insert(neighbor) {
                        members.push(neighbor);
                        queue.push_back(neighbor);
                    }
                }
            }
            components.push(self.subgraph(members));
        }

        components
    }

    fn subgraph(&self, mut members: Vec<NodeIndex>) -> CallGraph {
        members.sort();
        let mut component = CallGraph::new();
        let mut edge_indices = Vec::new();
        for &idx in &members {
            let node = &self.inner[idx];
            component.add_node(node.id);
            if let Some(copy) = component.node_mut(node.id) {
                copy.position = node.position;
                copy.raw_layout_position = node.raw_layout_position;
            }
            edge_indices.extend(
                self.inner
                    .edges_directed(idx, Direction::Outgoing)
                    .map(|edge_ref| edge_ref.id()),
            );
        }
        edge_indices.sort();
        for edge_idx in edge_indices {
            let edge = &self.inner[edge_idx];
            // endpoints of an edge always share a component
            let _ = component.add_edge(edge.source, edge.target);
        }
        component
    }

    /// The composed layout, before any viewport fitting.
    pub fn raw_layout(&self) -> Blueprint {
        self.nodes().map(|n| (n.id, n.raw_layout_position)).collect()
    }

    /// Current display positions.
    pub fn positions(&self) -> Blueprint {
        self.nodes().map(|n| (n.id, n.position)).collect()
    }

    /// Store a composed layout as both raw layout and display position.
    pub fn apply_layout(&mut self, blueprint: &Blueprint) -> Result<(), GraphError> {
        for (&id, &point) in blueprint {
            let node = self.node_mut(id).ok_or(GraphError::UnknownNode(id))?;
            node.raw_layout_position = point;
            node.position = point;
        }
        Ok(())
    }

    /// Stretch display positions to the viewport; the raw layout is untouched.
    pub fn fit_to_viewport(&mut self) {
        let fitted = layout::fit_to_viewport(&self.raw_layout());
        for node in self.inner.node_weights_mut() {
            if let Some(&point) = fitted.get(&node.id) {
                node.position = point;
            }
        }
    }

    /// Reset display positions to the raw layout.
    pub fn fit_to_best_ratio(&mut self) {
        for node in self.inner.node_weights_mut() {
            node.position = node.raw_layout_position;
        }
    }
}
