//! Published build results and the diff between consecutive generations

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::CallGraph;
use crate::model::{EdgeId, MethodId, MethodInfo, Point};
use crate::symbols::SymbolTable;
use crate::view::Scope;

/// An immutable, fully laid-out build result.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    /// Monotonically increasing across publications of one builder.
    pub generation: u64,
    pub built_at: DateTime<Utc>,
    pub scope: Scope,
    pub graph: CallGraph,
    /// Metadata for every node that has a declaration.
    pub methods: BTreeMap<MethodId, MethodInfo>,
    /// Changes against the snapshot this one replaced, filled in on publish.
    pub diff: SnapshotDiff,
}

impl GraphSnapshot {
    pub fn new(scope: Scope, graph: CallGraph, symbols: &SymbolTable) -> Self {
        let methods = graph
            .node_ids()
            .filter_map(|id| symbols.lookup(id).map(|info| (id, info)))
            .collect();
        GraphSnapshot {
            generation: 0,
            built_at: Utc::now(),
            scope,
            graph,
            methods,
            diff: SnapshotDiff::default(),
        }
    }

    pub fn method(&self, id: MethodId) -> Option<&MethodInfo> {
        self.methods.get(&id)
    }

    /// Serializable form with positions fitted to the viewport when `fit` is set.
    pub fn to_document(&self, fit: bool) -> GraphDocument {
        let mut graph = self.graph.clone();
        if fit {
            graph.fit_to_viewport();
        }
        let nodes = graph
            .nodes()
            .map(|node| {
                let info = self.method(node.id);
                NodeDocument {
                    id: node.id,
                    name: info.map(|m| m.signature()),
                    qualified_name: info.map(|m| m.qualified_name.clone()),
                    file: info.map(|m| m.file.to_string()),
                    line: info.and_then(|m| m.line),
                    position: node.position,
                }
            })
            .collect();
        let edges = graph.edges().map(|edge| edge.id).collect();
        GraphDocument {
            generation: self.generation,
            built_at: self.built_at,
            scope: self.scope.clone(),
            nodes,
            edges,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: MethodId,
    pub name: Option<String>,
    pub qualified_name: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub position: Point,
}

/// JSON shape handed to renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub generation: u64,
    pub built_at: DateTime<Utc>,
    pub scope: Scope,
    pub nodes: Vec<NodeDocument>,
    pub edges: Vec<EdgeId>,
}

/// Holds the latest published snapshot. Readers clone the `Arc`.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    current: RwLock<Option<Arc<GraphSnapshot>>>,
    generation: AtomicU64,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp the next generation and the diff against the current snapshot
    /// onto `snapshot`, then make it current.
    /// Returns the published snapshot and the one it replaced.
    pub fn publish(&self, mut snapshot: GraphSnapshot) -> (Arc<GraphSnapshot>, Option<Arc<GraphSnapshot>>) {
        let mut current = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        snapshot.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        snapshot.diff = SnapshotDiff::between(current.as_deref(), &snapshot);
        let snapshot = Arc::new(snapshot);
        let previous = current.replace(Arc::clone(&snapshot));
        (snapshot, previous)
    }

    pub fn current(&self) -> Option<Arc<GraphSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Latest generation number handed out; 0 before the first publication.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Nodes and edges added or removed between two generations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub from_generation: u64,
    pub to_generation: u64,
    pub added_nodes: Vec<MethodId>,
    pub removed_nodes: Vec<MethodId>,
    pub added_edges: Vec<EdgeId>,
    pub removed_edges: Vec<EdgeId>,
}

impl SnapshotDiff {
    /// Compare two snapshots; `old = None` treats everything in `new` as added.
    pub fn between(old: Option<&GraphSnapshot>, new: &GraphSnapshot) -> Self {
        let old_nodes: BTreeSet<MethodId> = old.map(|s| s.graph.node_ids().collect()).unwrap_or_default();
        let new_nodes: BTreeSet<MethodId> = new.graph.node_ids().collect();
        let old_edges: BTreeSet<EdgeId> = old
            .map(|s| s.graph.edges().map(|e| e.id).collect())
            .unwrap_or_default();
        let new_edges: BTreeSet<EdgeId> = new.graph.edges().map(|e| e.id).collect();

        SnapshotDiff {
            from_generation: old.map_or(0, |s| s.generation),
            to_generation: new.generation,
            added_nodes: new_nodes.difference(&old_nodes).copied().collect(),
            removed_nodes: old_nodes.difference(&new_nodes).copied().collect(),
            added_edges: new_edges.difference(&old_edges).copied().collect(),
            removed_edges: old_edges.difference(&new_edges).copied().collect(),
        }
    }

    /// Check if this diff is empty (no changes).
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}
