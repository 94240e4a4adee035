//! Display filtering on top of a published snapshot
//!
//! Filtering never rebuilds or re-lays-out the graph; it only decides which
//! of the snapshot's nodes and edges a renderer shows, and which are highlighted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{EdgeId, MethodId, MethodInfo, Visibility};
use crate::snapshot::GraphSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayFilter {
    pub public: bool,
    pub restricted: bool,
    pub private: bool,
    /// Case-insensitive substring matched against names.
    pub query: Option<String>,
}

impl Default for DisplayFilter {
    fn default() -> Self {
        DisplayFilter {
            public: true,
            restricted: true,
            private: true,
            query: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisibleSet {
    pub nodes: BTreeSet<MethodId>,
    pub edges: BTreeSet<EdgeId>,
    pub highlighted: BTreeSet<MethodId>,
}

impl DisplayFilter {
    pub fn shows(&self, visibility: Visibility) -> bool {
        match visibility {
            Visibility::Public => self.public,
            Visibility::Restricted => self.restricted,
            Visibility::Private => self.private,
        }
    }

    /// True when `method` matches the query. An empty or missing query matches nothing.
    pub fn is_queried(&self, method: &MethodInfo) -> bool {
        let Some(query) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
            return false;
        };
        let query = query.to_lowercase();
        method.name.to_lowercase().contains(&query) || method.qualified_name.to_lowercase().contains(&query)
    }

    /// Nodes shown under this filter, edges between two shown nodes, and query hits.
    ///
    /// Nodes without metadata (external endpoints) are treated as private.
    pub fn apply(&self, snapshot: &GraphSnapshot) -> VisibleSet {
        let mut visible = VisibleSet::default();
        for id in snapshot.graph.node_ids() {
            let method = snapshot.method(id);
            let visibility = method.map_or(Visibility::Private, |m| m.visibility);
            if !self.shows(visibility) {
                continue;
            }
            visible.nodes.insert(id);
            if method.is_some_and(|m| self.is_queried(m)) {
                visible.highlighted.insert(id);
            }
        }
        visible.edges = snapshot
            .graph
            .edges()
            .filter(|e| visible.nodes.contains(&e.source) && visible.nodes.contains(&e.target))
            .map(|e| e.id)
            .collect();
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CallGraph;
    use crate::model::FileId;
    use crate::symbols::SymbolTable;
    use crate::view::{AreaScope, Scope};

    fn sample() -> (GraphSnapshot, MethodInfo, MethodInfo, MethodInfo) {
        let file = FileId::new("src/lib.rs");
        let api = MethodInfo::new(file.clone(), "Server::start", "start")
            .with_owner("Server")
            .with_visibility(Visibility::Public);
        let inner = MethodInfo::new(file.clone(), "Server::bind_socket", "bind_socket")
            .with_owner("Server")
            .with_visibility(Visibility::Restricted);
        let helper = MethodInfo::new(file, "parse_addr", "parse_addr");

        let symbols = SymbolTable::new();
        let mut graph = CallGraph::new();
        for method in [&api, &inner, &helper] {
            symbols.insert(method.clone());
            graph.add_node(method.id);
        }
        graph.add_edge(api.id, inner.id).unwrap();
        graph.add_edge(inner.id, helper.id).unwrap();

        let snapshot = GraphSnapshot::new(Scope::Area(AreaScope::whole_project()), graph, &symbols);
        (snapshot, api, inner, helper)
    }

    #[test]
    fn test_hidden_visibility_drops_touching_edges() {
        let (snapshot, api, inner, helper) = sample();
        let filter = DisplayFilter {
            private: false,
            ..DisplayFilter::default()
        };
        let visible = filter.apply(&snapshot);

        assert_eq!(visible.nodes, BTreeSet::from([api.id, inner.id]));
        assert!(!visible.nodes.contains(&helper.id));
        assert_eq!(visible.edges, BTreeSet::from([EdgeId::new(api.id, inner.id)]));
    }

    #[test]
    fn test_query_is_case_insensitive() {
        let (snapshot, _, inner, _) = sample();
        let filter = DisplayFilter {
            query: Some("SOCKET".to_string()),
            ..DisplayFilter::default()
        };
        assert_eq!(filter.apply(&snapshot).highlighted, BTreeSet::from([inner.id]));

        let blank = DisplayFilter {
            query: Some("  ".to_string()),
            ..DisplayFilter::default()
        };
        assert!(blank.apply(&snapshot).highlighted.is_empty());
    }
}
