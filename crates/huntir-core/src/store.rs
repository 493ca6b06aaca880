//! # Graph Store (C2)
//!
//! A directed-graph abstraction over typed [`Node`]s with unlabeled edges.
//! No IR-specific behavior lives here — singleton dedup, versioning, and
//! deref belong to [`crate::algebra`]; this module only provides the
//! primitive add/query operations a graph algebra is built on top of.
//!
//! `BTreeMap`/`BTreeSet` only, never `HashMap`/`HashSet`, so that iteration
//! order — and therefore segmenter bucket contents and serialized document
//! order — is reproducible across runs.

use crate::error::IrError;
use crate::id::NodeId;
use crate::instruction::Node;
use std::collections::{BTreeMap, BTreeSet};

/// Primitive operations a directed, unlabeled graph of IR nodes must
/// support. [`DiGraph`] is the only implementation — the engine performs
/// no durable persistence (spec Non-goals), so there is no second backend
/// to abstract over today, but the trait seam matches the shape the rest
/// of the stack expects (see [`crate::backend::Backend`]).
pub trait Store {
    /// Insert a node. Idempotent: inserting a node whose id is already
    /// present is a no-op.
    fn add_node(&mut self, node: Node);

    /// Insert an edge. Fails with `InstructionNotFound` if either endpoint
    /// is absent.
    fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<(), IrError>;

    fn contains_node(&self, id: NodeId) -> bool;

    fn get_node(&self, id: NodeId) -> Option<&Node>;

    /// All nodes, in id order.
    fn nodes(&self) -> Vec<&Node>;

    /// All edges, in `(from, to)` order.
    fn edges(&self) -> Vec<(NodeId, NodeId)>;

    /// Nodes with an edge `n -> id` i.e. direct predecessors of `id`.
    fn predecessors(&self, id: NodeId) -> BTreeSet<NodeId>;

    /// Nodes with an edge `id -> n` i.e. direct successors of `id`.
    fn successors(&self, id: NodeId) -> BTreeSet<NodeId>;

    fn in_degree(&self, id: NodeId) -> usize;

    fn out_degree(&self, id: NodeId) -> usize;

    /// All nodes reachable from `id` by following edges forward (not
    /// including `id` itself), bounded by [`crate::limits::MAX_TRAVERSAL_DEPTH`].
    fn descendants(&self, id: NodeId) -> BTreeSet<NodeId>;

    /// All nodes that can reach `id` by following edges forward (not
    /// including `id` itself), bounded by [`crate::limits::MAX_TRAVERSAL_DEPTH`].
    fn ancestors(&self, id: NodeId) -> BTreeSet<NodeId>;

    /// The induced subgraph over exactly `node_ids`: those nodes plus every
    /// edge of `self` whose endpoints are both in the set.
    #[must_use]
    fn subgraph(&self, node_ids: &BTreeSet<NodeId>) -> Self
    where
        Self: Sized;

    /// Remove every edge in `edges` (a set of `(from, to)` pairs) that is
    /// present; missing edges are ignored.
    fn remove_edges(&mut self, edges: &BTreeSet<(NodeId, NodeId)>);

    fn node_count(&self) -> usize;

    fn edge_count(&self) -> usize;
}

// =============================================================================
// DIGRAPH
// =============================================================================

/// The sole `Store` implementation: an in-memory, `BTreeMap`-backed DAG.
#[derive(Debug, Clone, Default)]
pub struct DiGraph {
    nodes: BTreeMap<NodeId, Node>,
    /// Adjacency: `from -> {to, ...}`.
    out: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// Reverse adjacency: `to -> {from, ...}`.
    inn: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl DiGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bfs_forward(&self, start: NodeId) -> BTreeSet<NodeId> {
        self.bfs(start, &self.out)
    }

    fn bfs_backward(&self, start: NodeId) -> BTreeSet<NodeId> {
        self.bfs(start, &self.inn)
    }

    fn bfs(
        &self,
        start: NodeId,
        adjacency: &BTreeMap<NodeId, BTreeSet<NodeId>>,
    ) -> BTreeSet<NodeId> {
        let mut visited = BTreeSet::new();
        let mut frontier = vec![start];
        let mut depth = 0usize;
        while !frontier.is_empty() && depth < crate::limits::MAX_TRAVERSAL_DEPTH {
            let mut next = Vec::new();
            for node in frontier {
                if let Some(neighbors) = adjacency.get(&node) {
                    for &neighbor in neighbors {
                        if visited.insert(neighbor) {
                            next.push(neighbor);
                        }
                    }
                }
            }
            frontier = next;
            depth += 1;
        }
        visited
    }
}

impl Store for DiGraph {
    fn add_node(&mut self, node: Node) {
        let id = node.id();
        self.nodes.entry(id).or_insert(node);
        self.out.entry(id).or_default();
        self.inn.entry(id).or_default();
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<(), IrError> {
        if !self.nodes.contains_key(&from) {
            return Err(IrError::InstructionNotFound(from));
        }
        if !self.nodes.contains_key(&to) {
            return Err(IrError::InstructionNotFound(to));
        }
        self.out.entry(from).or_default().insert(to);
        self.inn.entry(to).or_default().insert(from);
        Ok(())
    }

    fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn nodes(&self) -> Vec<&Node> {
        self.nodes.values().collect()
    }

    fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.out
            .iter()
            .flat_map(|(&from, tos)| tos.iter().map(move |&to| (from, to)))
            .collect()
    }

    fn predecessors(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.inn.get(&id).cloned().unwrap_or_default()
    }

    fn successors(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.out.get(&id).cloned().unwrap_or_default()
    }

    fn in_degree(&self, id: NodeId) -> usize {
        self.inn.get(&id).map_or(0, BTreeSet::len)
    }

    fn out_degree(&self, id: NodeId) -> usize {
        self.out.get(&id).map_or(0, BTreeSet::len)
    }

    fn descendants(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.bfs_forward(id)
    }

    fn ancestors(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.bfs_backward(id)
    }

    fn subgraph(&self, node_ids: &BTreeSet<NodeId>) -> Self {
        let mut result = Self::new();
        for &id in node_ids {
            if let Some(node) = self.nodes.get(&id) {
                result.add_node(node.clone());
            }
        }
        for (from, to) in self.edges() {
            if node_ids.contains(&from) && node_ids.contains(&to) {
                // Both endpoints already present; add_edge cannot fail here.
                let _ = result.add_edge(from, to);
            }
        }
        result
    }

    fn remove_edges(&mut self, edges: &BTreeSet<(NodeId, NodeId)>) {
        for &(from, to) in edges {
            if let Some(tos) = self.out.get_mut(&from) {
                tos.remove(&to);
            }
            if let Some(froms) = self.inn.get_mut(&to) {
                froms.remove(&from);
            }
        }
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn edge_count(&self) -> usize {
        self.out.values().map(BTreeSet::len).sum()
    }
}
