//! Trait definitions for graph abstractions.
//!
//! The trait hierarchy is minimal and composable:
//!
//! - [`GraphBase`] - Core properties: node count and node iteration
//! - [`Successors`] - Forward edge traversal (outgoing edges)
//! - [`Predecessors`] - Backward edge traversal (incoming edges)
//! - [`RootedGraph`] - Graphs with a designated entry node (for dominator computation)
//!
//! All adjacency queries return iterators rather than collections. Node ids are dense:
//! a graph with `node_count() == n` uses ids `0..n`, and ids of removed nodes simply
//! have no edges.

use crate::utils::graph::NodeId;

/// Core graph properties shared by all graph types.
pub trait GraphBase {
    /// Returns the number of node slots in the graph, including removed nodes.
    fn node_count(&self) -> usize;

    /// Returns an iterator over all node ids in the graph.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward edge traversal.
pub trait Successors: GraphBase {
    /// Returns an iterator over the direct successors of `node`.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward edge traversal.
pub trait Predecessors: GraphBase {
    /// Returns an iterator over the direct predecessors of `node`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph with a designated entry node.
///
/// Control flow graphs are rooted at the function entry block; dominance is only
/// meaningful relative to such a root.
pub trait RootedGraph: Successors + Predecessors {
    /// Returns the entry node of the graph.
    fn entry(&self) -> NodeId;
}
