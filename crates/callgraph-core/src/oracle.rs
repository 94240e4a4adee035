//! Default layout oracle: deterministic layered (Sugiyama-style) placement
//!
//! Phases:
//!   1. Cycle breaking (DFS back edges are ignored for ranking)
//!   2. Rank assignment (longest path from sources, Kahn order)
//!   3. Ordering within ranks (barycenter sweeps)
//!   4. Coordinates: x = rank, y = position within rank
//!
//! Output is in abstract units; the composer normalizes it.

use std::collections::HashMap;

use tracing::trace;

use crate::cancel::CancellationToken;
use crate::graph::CallGraph;
use crate::layout::{Blueprint, LayoutError, LayoutOracle};
use crate::model::{MethodId, Point};

const DEFAULT_SWEEPS: usize = 4;

/// Left-to-right layered layout. Callers sit left of their callees.
#[derive(Debug, Clone)]
pub struct LayeredLayout {
    sweeps: usize,
}

impl Default for LayeredLayout {
    fn default() -> Self {
        LayeredLayout {
            sweeps: DEFAULT_SWEEPS,
        }
    }
}

impl LayeredLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of down+up barycenter passes.
    pub fn with_sweeps(mut self, sweeps: usize) -> Self {
        self.sweeps = sweeps;
        self
    }
}

impl LayoutOracle for LayeredLayout {
    fn layout(&self, component: &CallGraph, cancel: &CancellationToken) -> Result<Blueprint, LayoutError> {
        let graph = LayerGraph::from_component(component);
        if graph.ids.is_empty() {
            return Ok(Blueprint::new());
        }

        let ranks = graph.assign_ranks();
        let mut rank_order = build_rank_buckets(&ranks);

        for sweep in 0..self.sweeps {
            if cancel.is_cancelled() {
                return Err(LayoutError::Cancelled);
            }
            for r in 1..rank_order.len() {
                reorder_rank(&mut rank_order, r, r - 1, &graph.rev, graph.ids.len());
            }
            for r in (0..rank_order.len().saturating_sub(1)).rev() {
                reorder_rank(&mut rank_order, r, r + 1, &graph.adj, graph.ids.len());
            }
            trace!("Barycenter sweep {} done", sweep);
        }

        let mut blueprint = Blueprint::new();
        for (rank, order) in rank_order.iter().enumerate() {
            for (position, &v) in order.iter().enumerate() {
                blueprint.insert(graph.ids[v], Point::new(rank as f64, position as f64));
            }
        }
        Ok(blueprint)
    }
}

/// Dense, index-based view of a component with back edges removed.
struct LayerGraph {
    /// Node ids sorted ascending; index = dense id.
    ids: Vec<MethodId>,
    adj: Vec<Vec<usize>>,
    rev: Vec<Vec<usize>>,
}

impl LayerGraph {
    fn from_component(component: &CallGraph) -> Self {
        let mut ids: Vec<MethodId> = component.node_ids().collect();
        ids.sort();
        let index: HashMap<MethodId, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut successors = vec![Vec::new(); ids.len()];
        for edge in component.edges() {
            if edge.is_self_loop() {
                continue;
            }
            if let (Some(&u), Some(&v)) = (index.get(&edge.source), index.get(&edge.target)) {
                successors[u].push(v);
            }
        }
        for list in &mut successors {
            list.sort_unstable();
            list.dedup();
        }

        let adj = remove_back_edges(&successors);
        let mut rev = vec![Vec::new(); ids.len()];
        for (u, targets) in adj.iter().enumerate() {
            for &v in targets {
                rev[v].push(u);
            }
        }

        LayerGraph { ids, adj, rev }
    }

    /// Sources get rank 0; every other node gets 1 + max rank of its predecessors.
    fn assign_ranks(&self) -> Vec<usize> {
        let n = self.ids.len();
        let mut in_degree: Vec<usize> = self.rev.iter().map(Vec::len).collect();
        let mut queue: Vec<usize> = (0..n).filter(|&v| in_degree[v] == 0).collect();
        let mut ranks = vec![0usize; n];

        let mut head = 0;
        while head < queue.len() {
            let u = queue[head];
            head += 1;
            for &v in &self.adj[u] {
                ranks[v] = ranks[v].max(ranks[u] + 1);
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    queue.push(v);
                }
            }
        }
        ranks
    }
}

/// Drop every edge that closes a cycle in a DFS from the lowest index.
fn remove_back_edges(successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        OnStack,
        Done,
    }

    let n = successors.len();
    let mut state = vec![State::Unvisited; n];
    let mut adj = vec![Vec::new(); n];

    for root in 0..n {
        if state[root] != State::Unvisited {
            continue;
        }
        state[root] = State::OnStack;
        let mut stack = vec![(root, 0usize)];
        while let Some(frame) = stack.last_mut() {
            let u = frame.0;
            if let Some(&v) = successors[u].get(frame.1) {
                frame.1 += 1;
                match state[v] {
                    State::OnStack => {}
                    State::Done => adj[u].push(v),
                    State::Unvisited => {
                        adj[u].push(v);
                        state[v] = State::OnStack;
                        stack.push((v, 0));
                    }
                }
            } else {
                state[u] = State::Done;
                stack.pop();
            }
        }
    }
    adj
}

fn build_rank_buckets(ranks: &[usize]) -> Vec<Vec<usize>> {
    let max_rank = ranks.iter().copied().max().unwrap_or(0);
    let mut buckets = vec![Vec::new(); max_rank + 1];
    for (v, &r) in ranks.iter().enumerate() {
        buckets[r].push(v);
    }
    buckets
}

/// Reorder rank `r` by the mean position of each node's neighbors in rank `fixed`.
///
/// Nodes without neighbors there keep their current slot order at the end; ties
/// break on dense index.
fn reorder_rank(rank_order: &mut [Vec<usize>], r: usize, fixed: usize, neighbors: &[Vec<usize>], n: usize) {
    let mut fixed_pos = vec![usize::MAX; n];
    for (pos, &v) in rank_order[fixed].iter().enumerate() {
        fixed_pos[v] = pos;
    }

    let mut scored: Vec<(usize, f64)> = rank_order[r]
        .iter()
        .map(|&v| (v, barycenter(&fixed_pos, &neighbors[v])))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    rank_order[r] = scored.into_iter().map(|(v, _)| v).collect();
}

fn barycenter(positions: &[usize], neighbors: &[usize]) -> f64 {
    let (sum, count) = neighbors
        .iter()
        .filter_map(|&nb| positions.get(nb).copied().filter(|&p| p != usize::MAX))
        .fold((0.0, 0usize), |(sum, count), p| (sum + p as f64, count + 1));
    if count == 0 {
        f64::MAX
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_with_back_edge() -> CallGraph {
        let mut graph = CallGraph::new();
        for id in 1..=4 {
            graph.add_node(MethodId(id));
        }
        graph.add_edge(MethodId(1), MethodId(2)).unwrap();
        graph.add_edge(MethodId(2), MethodId(3)).unwrap();
        graph.add_edge(MethodId(3), MethodId(1)).unwrap();
        graph.add_edge(MethodId(1), MethodId(4)).unwrap();
        graph.add_edge(MethodId(4), MethodId(4)).unwrap();
        graph
    }

    #[test]
    fn test_layout_places_every_node_once() {
        let graph = chain_with_back_edge();
        let blueprint = LayeredLayout::new()
            .layout(&graph, &CancellationToken::new())
            .unwrap();
        assert_eq!(blueprint.len(), 4);

        let mut positions: Vec<(i64, i64)> = blueprint
            .values()
            .map(|p| (p.x as i64, p.y as i64))
            .collect();
        positions.sort();
        positions.dedup();
        assert_eq!(positions.len(), 4, "two nodes share a slot");
    }

    #[test]
    fn test_callers_rank_left_of_callees() {
        let graph = chain_with_back_edge();
        let blueprint = LayeredLayout::new()
            .layout(&graph, &CancellationToken::new())
            .unwrap();
        assert_eq!(blueprint[&MethodId(1)].x, 0.0);
        assert_eq!(blueprint[&MethodId(2)].x, 1.0);
        assert_eq!(blueprint[&MethodId(3)].x, 2.0);
        assert_eq!(blueprint[&MethodId(4)].x, 1.0);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let graph = chain_with_back_edge();
        let oracle = LayeredLayout::new();
        let token = CancellationToken::new();
        assert_eq!(oracle.layout(&graph, &token).unwrap(), oracle.layout(&graph, &token).unwrap());
    }

    #[test]
    fn test_cancelled_layout_reports_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = LayeredLayout::new().layout(&chain_with_back_edge(), &token);
        assert_eq!(result, Err(LayoutError::Cancelled));
    }
}
