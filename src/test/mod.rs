//! Shared helpers for the in-crate unit tests.

pub mod fixtures;

use crate::utils::graph::{GraphBase, NodeId, Predecessors, RootedGraph, Successors};

/// A small adjacency-list graph for exercising the graph algorithms without
/// building SSA.
///
/// Successors and predecessors are reported in the order the edges were given.
pub struct TestGraph {
    successors: Vec<Vec<NodeId>>,
    predecessors: Vec<Vec<NodeId>>,
    entry: NodeId,
}

impl TestGraph {
    pub fn new(node_count: usize, edges: &[(usize, usize)], entry: usize) -> Self {
        let mut successors = vec![Vec::new(); node_count];
        let mut predecessors = vec![Vec::new(); node_count];
        for &(from, to) in edges {
            successors[from].push(NodeId::new(to));
            predecessors[to].push(NodeId::new(from));
        }
        Self {
            successors,
            predecessors,
            entry: NodeId::new(entry),
        }
    }
}

impl GraphBase for TestGraph {
    fn node_count(&self) -> usize {
        self.successors.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.successors.len()).map(NodeId::new)
    }
}

impl Successors for TestGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.successors
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .copied()
    }
}

impl Predecessors for TestGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.predecessors
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .copied()
    }
}

impl RootedGraph for TestGraph {
    fn entry(&self) -> NodeId {
        self.entry
    }
}
