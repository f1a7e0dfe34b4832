//! Node identifier implementation for control flow graphs.
//!
//! This module provides the [`NodeId`] type, a strongly-typed identifier for nodes
//! within a graph. For SSA functions a node is a basic block and the wrapped value is
//! the block index, so `NodeId::new(b)` and block `b` always name the same block.

use std::fmt;

/// A strongly-typed identifier for nodes within a graph.
///
/// `NodeId` wraps a `usize` index, providing type safety to prevent accidental mixing
/// of node indices with other integer values such as instruction or variable indices.
///
/// # Examples
///
/// ```rust
/// use loopidiom::utils::graph::NodeId;
/// use std::collections::HashMap;
///
/// let header = NodeId::new(1);
/// let latch = NodeId::new(2);
/// assert_ne!(header, latch);
///
/// let mut depth: HashMap<NodeId, usize> = HashMap::new();
/// depth.insert(header, 1);
/// assert_eq!(depth[&header], 1);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index value.
    ///
    /// # Arguments
    ///
    /// * `index` - The raw node index (0-based)
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index value of this node identifier.
    ///
    /// The index can be used to index into vectors that store per-node data.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    #[inline]
    fn from(node: NodeId) -> Self {
        node.0
    }
}
