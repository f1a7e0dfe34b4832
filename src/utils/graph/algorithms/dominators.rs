//! Dominator tree computation and batched maintenance.
//!
//! A node `d` **dominates** a node `n` if every path from the entry node to `n`
//! passes through `d`. The **immediate dominator** of `n` is the closest strict
//! dominator of `n`; making it the parent of `n` forms the dominator tree.
//!
//! Trees are computed with the Lengauer-Tarjan algorithm with path compression.
//! Nodes that are not reachable from the entry have no immediate dominator, are
//! dominated by nothing and dominate nothing.
//!
//! # Batched Updates
//!
//! Transformations that rewire several edges at once describe each change as a
//! [`DomTreeUpdate`] and hand the whole batch to [`DominatorTree::apply_updates`]
//! after the CFG has been edited. The batch is checked against the CFG first: the
//! net effect of the batch on every edge it mentions must match the graph, so an
//! update list that forgot an edge or names the wrong endpoint is reported as
//! [`Error::Malformed`](crate::Error::Malformed) instead of silently producing a
//! stale tree.

use std::collections::HashMap;

use crate::{
    utils::graph::{NodeId, Successors},
    Result,
};

/// Marker for "no node" in the internal index tables.
const UNDEFINED: NodeId = NodeId(usize::MAX);

/// Result of dominator tree computation.
///
/// # Examples
///
/// ```rust
/// use loopidiom::utils::graph::{algorithms::compute_dominators, NodeId};
/// use loopidiom::prelude::*;
///
/// // entry -> a -> b
/// let mut f = FunctionBuilder::new("chain", SsaType::Void);
/// let entry = f.block("entry");
/// let a = f.block("a");
/// let b = f.block("b");
/// f.switch_to(entry);
/// f.jump(a);
/// f.switch_to(a);
/// f.jump(b);
/// f.switch_to(b);
/// f.ret(None);
/// let ssa = f.finish()?;
///
/// let dom = compute_dominators(&ssa, NodeId::new(entry));
/// assert!(dom.dominates(NodeId::new(entry), NodeId::new(b)));
/// assert_eq!(dom.immediate_dominator(NodeId::new(b)), Some(NodeId::new(a)));
/// # Ok::<(), loopidiom::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// The entry (root) node of the dominator tree
    entry: NodeId,
    /// Immediate dominator for each node; the entry maps to itself and
    /// unreachable nodes map to `UNDEFINED`
    idom: Vec<NodeId>,
    /// Number of nodes in the graph when the tree was computed
    node_count: usize,
}

/// Direction of a single edge change in an update batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// The edge was added to the CFG.
    Insert,
    /// The edge was removed from the CFG.
    Delete,
}

/// One edge change reported to [`DominatorTree::apply_updates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomTreeUpdate {
    /// Whether the edge was inserted or deleted.
    pub kind: UpdateKind,
    /// Source block of the edge.
    pub from: NodeId,
    /// Target block of the edge.
    pub to: NodeId,
}

impl DomTreeUpdate {
    /// Creates an update recording that the edge `from -> to` was added.
    #[must_use]
    pub fn insert(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            kind: UpdateKind::Insert,
            from: from.into(),
            to: to.into(),
        }
    }

    /// Creates an update recording that the edge `from -> to` was removed.
    #[must_use]
    pub fn delete(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            kind: UpdateKind::Delete,
            from: from.into(),
            to: to.into(),
        }
    }
}

impl DominatorTree {
    /// Returns the entry (root) node of the dominator tree.
    #[inline]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns `true` if `node` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        node.index() < self.node_count && self.idom[node.index()] != UNDEFINED
    }

    /// Returns the immediate dominator of a node.
    ///
    /// Returns `None` for the entry node, for unreachable nodes and for nodes that
    /// did not exist when the tree was computed.
    #[inline]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry || !self.is_reachable(node) {
            None
        } else {
            Some(self.idom[node.index()])
        }
    }

    /// Checks if node `a` dominates node `b`.
    ///
    /// A reachable node dominates itself. Unreachable nodes take no part in
    /// dominance, so any query involving one returns `false`.
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        if a == b {
            return true;
        }

        let mut current = b;
        while current != self.entry {
            let idom = self.idom[current.index()];
            if idom == a {
                return true;
            }
            current = idom;
        }

        a == self.entry
    }

    /// Checks if node `a` strictly dominates node `b`.
    #[inline]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns an iterator over all dominators of a node, from the node itself
    /// up to and including the entry node.
    ///
    /// The iterator is empty for unreachable nodes.
    pub fn dominators(&self, node: NodeId) -> DominatorIterator<'_> {
        DominatorIterator {
            tree: self,
            current: self.is_reachable(node).then_some(node),
        }
    }

    /// Returns the depth of a node in the dominator tree (entry has depth 0).
    ///
    /// Unreachable nodes report depth 0.
    pub fn depth(&self, node: NodeId) -> usize {
        self.dominators(node).count().saturating_sub(1)
    }

    /// Returns all children of a node in the dominator tree.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        (0..self.node_count)
            .map(NodeId::new)
            .filter(|&n| n != self.entry && self.idom[n.index()] == node)
            .collect()
    }

    /// Returns the number of nodes in the dominator tree.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Applies a batch of edge updates that has already been performed on `graph`.
    ///
    /// Every edge named in the batch is checked against the current graph: if the
    /// inserts outnumber the deletes for an edge the edge must exist, if the
    /// deletes outnumber the inserts it must not exist. The tree is then brought up
    /// to date with the graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) if the batch disagrees
    /// with the graph. The tree is left unchanged in that case.
    pub fn apply_updates<G>(&mut self, graph: &G, updates: &[DomTreeUpdate]) -> Result<()>
    where
        G: Successors,
    {
        let mut net: HashMap<(NodeId, NodeId), i32> = HashMap::new();
        for update in updates {
            let delta = match update.kind {
                UpdateKind::Insert => 1,
                UpdateKind::Delete => -1,
            };
            *net.entry((update.from, update.to)).or_insert(0) += delta;
        }

        for (&(from, to), &delta) in &net {
            let present = from.index() < graph.node_count() && graph.successors(from).any(|s| s == to);
            if delta > 0 && !present {
                return Err(malformed_error!(
                    "dominator update inserts edge {} -> {} which is not in the CFG",
                    from,
                    to
                ));
            }
            if delta < 0 && present {
                return Err(malformed_error!(
                    "dominator update deletes edge {} -> {} which is still in the CFG",
                    from,
                    to
                ));
            }
        }

        *self = compute_dominators(graph, self.entry);
        Ok(())
    }

    /// Replaces the tree with one computed for a new entry node.
    ///
    /// Used when the entry block itself is merged away.
    pub fn recompute_with_entry<G>(&mut self, graph: &G, entry: NodeId)
    where
        G: Successors,
    {
        *self = compute_dominators(graph, entry);
    }
}

/// Iterator over dominators of a node, from the node up to the entry.
pub struct DominatorIterator<'a> {
    tree: &'a DominatorTree,
    current: Option<NodeId>,
}

impl Iterator for DominatorIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;

        if current == self.tree.entry {
            self.current = None;
        } else {
            self.current = Some(self.tree.idom[current.index()]);
        }
        Some(current)
    }
}

/// Computes the dominator tree for a graph using the Lengauer-Tarjan algorithm.
///
/// # Complexity
///
/// - Time: O(E α(V)) where α is the inverse Ackermann function
/// - Space: O(V + E)
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: Successors,
{
    let node_count = graph.node_count();

    if node_count == 0 || entry.index() >= node_count {
        return DominatorTree {
            entry,
            idom: vec![UNDEFINED; node_count],
            node_count,
        };
    }

    let mut lt = LengauerTarjan::new(node_count, entry);
    lt.compute(graph);

    DominatorTree {
        entry,
        idom: lt.idom,
        node_count,
    }
}

/// Internal state for the Lengauer-Tarjan algorithm.
struct LengauerTarjan {
    entry: NodeId,
    /// DFS number for each node (0 = not visited)
    dfnum: Vec<usize>,
    /// Node with each DFS number (inverse of dfnum)
    vertex: Vec<NodeId>,
    /// Parent in DFS tree
    parent: Vec<NodeId>,
    /// Semidominator
    semi: Vec<NodeId>,
    /// Immediate dominator (final result)
    idom: Vec<NodeId>,
    /// Ancestor in the forest for link-eval
    ancestor: Vec<NodeId>,
    /// Best node on path to ancestor (for path compression)
    best: Vec<NodeId>,
    /// Nodes whose semidominator is this node
    bucket: Vec<Vec<NodeId>>,
    /// Reverse adjacency, built once from the successor lists
    preds: Vec<Vec<NodeId>>,
    dfs_counter: usize,
}

impl LengauerTarjan {
    fn new(n: usize, entry: NodeId) -> Self {
        Self {
            entry,
            dfnum: vec![0; n],
            vertex: vec![UNDEFINED; n],
            parent: vec![UNDEFINED; n],
            semi: (0..n).map(NodeId::new).collect(),
            idom: vec![UNDEFINED; n],
            ancestor: vec![UNDEFINED; n],
            best: (0..n).map(NodeId::new).collect(),
            bucket: vec![Vec::new(); n],
            preds: vec![Vec::new(); n],
            dfs_counter: 0,
        }
    }

    fn compute<G: Successors>(&mut self, graph: &G) {
        for node in graph.node_ids() {
            for succ in graph.successors(node) {
                if succ.index() < self.preds.len() {
                    self.preds[succ.index()].push(node);
                }
            }
        }

        self.dfs(graph, self.entry);

        for i in (1..self.dfs_counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w.index()];

            let preds = std::mem::take(&mut self.preds[w.index()]);
            for &v in &preds {
                if self.dfnum[v.index()] == 0 {
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u.index()].index()]
                    < self.dfnum[self.semi[w.index()].index()]
                {
                    self.semi[w.index()] = self.semi[u.index()];
                }
            }
            self.preds[w.index()] = preds;

            let semi_w = self.semi[w.index()];
            self.bucket[semi_w.index()].push(w);
            self.ancestor[w.index()] = parent_w;

            let bucket = std::mem::take(&mut self.bucket[parent_w.index()]);
            for v in bucket {
                let u = self.eval(v);
                if self.semi[u.index()] == self.semi[v.index()] {
                    self.idom[v.index()] = parent_w;
                } else {
                    self.idom[v.index()] = u;
                }
            }
        }

        for i in 1..self.dfs_counter {
            let w = self.vertex[i];
            if self.idom[w.index()] != self.semi[w.index()] {
                self.idom[w.index()] = self.idom[self.idom[w.index()].index()];
            }
        }

        self.idom[self.entry.index()] = self.entry;
    }

    fn dfs<G: Successors>(&mut self, graph: &G, start: NodeId) {
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            let idx = node.index();
            if self.dfnum[idx] != 0 {
                continue;
            }

            self.dfs_counter += 1;
            self.dfnum[idx] = self.dfs_counter;
            self.vertex[self.dfs_counter - 1] = node;

            for succ in graph.successors(node) {
                if succ.index() < self.dfnum.len() && self.dfnum[succ.index()] == 0 {
                    self.parent[succ.index()] = node;
                    stack.push(succ);
                }
            }
        }
    }

    fn eval(&mut self, v: NodeId) -> NodeId {
        if self.ancestor[v.index()] == UNDEFINED {
            return v;
        }
        self.compress(v);
        self.best[v.index()]
    }

    fn compress(&mut self, v: NodeId) {
        // Iterative path compression; deep CFGs would overflow the recursive form.
        let mut path = Vec::new();
        let mut current = v;
        while self.ancestor[self.ancestor[current.index()].index()] != UNDEFINED {
            path.push(current);
            current = self.ancestor[current.index()];
        }

        while let Some(node) = path.pop() {
            let ancestor = self.ancestor[node.index()];
            let best_ancestor = self.best[ancestor.index()];
            let best_node = self.best[node.index()];
            if self.dfnum[self.semi[best_ancestor.index()].index()]
                < self.dfnum[self.semi[best_node.index()].index()]
            {
                self.best[node.index()] = best_ancestor;
            }
            self.ancestor[node.index()] = self.ancestor[ancestor.index()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestGraph;

    fn n(i: usize) -> NodeId {
        NodeId::new(i)
    }

    #[test]
    fn test_diamond() {
        //      0
        //     / \
        //    1   2
        //     \ /
        //      3
        let graph = TestGraph::new(4, &[(0, 1), (0, 2), (1, 3), (2, 3)], 0);
        let dom = compute_dominators(&graph, n(0));

        assert_eq!(dom.immediate_dominator(n(0)), None);
        assert_eq!(dom.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(dom.immediate_dominator(n(3)), Some(n(0)));
        assert!(!dom.strictly_dominates(n(1), n(3)));
        assert!(dom.dominates(n(3), n(3)));
    }

    #[test]
    fn test_loop_header_dominates_latch() {
        // 0 -> 1 -> 2 -> 1, 2 -> 3
        let graph = TestGraph::new(4, &[(0, 1), (1, 2), (2, 1), (2, 3)], 0);
        let dom = compute_dominators(&graph, n(0));

        assert!(dom.dominates(n(1), n(2)));
        assert!(dom.dominates(n(2), n(3)));
        assert_eq!(dom.depth(n(3)), 3);
        assert_eq!(dom.dominators(n(3)).collect::<Vec<_>>(), vec![n(3), n(2), n(1), n(0)]);
        assert_eq!(dom.children(n(1)), vec![n(2)]);
    }

    #[test]
    fn test_unreachable_nodes_take_no_part() {
        // 2 is unreachable and loops on itself
        let graph = TestGraph::new(3, &[(0, 1), (2, 2), (2, 1)], 0);
        let dom = compute_dominators(&graph, n(0));

        assert!(!dom.is_reachable(n(2)));
        assert!(!dom.dominates(n(2), n(2)));
        assert!(!dom.dominates(n(0), n(2)));
        assert_eq!(dom.immediate_dominator(n(2)), None);
        assert_eq!(dom.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(dom.dominators(n(2)).count(), 0);
    }

    #[test]
    fn test_apply_updates_validates_batch() {
        let before = TestGraph::new(3, &[(0, 1), (1, 2)], 0);
        let mut dom = compute_dominators(&before, n(0));

        // Redirect 0 -> 1 to 0 -> 2
        let after = TestGraph::new(3, &[(0, 2), (1, 2)], 0);
        let wrong = [DomTreeUpdate::insert(0usize, 2usize)];
        assert!(dom.apply_updates(&after, &wrong).is_err());

        let right = [
            DomTreeUpdate::delete(0usize, 1usize),
            DomTreeUpdate::insert(0usize, 2usize),
        ];
        dom.apply_updates(&after, &right).unwrap();
        assert!(!dom.is_reachable(n(1)));
        assert_eq!(dom.immediate_dominator(n(2)), Some(n(0)));
    }

    #[test]
    fn test_apply_updates_cancelling_pair() {
        // Delete and re-insert of the same edge has no net effect
        let graph = TestGraph::new(2, &[(0, 1)], 0);
        let mut dom = compute_dominators(&graph, n(0));
        let updates = [
            DomTreeUpdate::delete(0usize, 1usize),
            DomTreeUpdate::insert(0usize, 1usize),
        ];
        dom.apply_updates(&graph, &updates).unwrap();
        assert!(dom.dominates(n(0), n(1)));
    }

    #[test]
    fn test_nodes_added_after_computation() {
        let graph = TestGraph::new(2, &[(0, 1)], 0);
        let dom = compute_dominators(&graph, n(0));
        assert!(!dom.is_reachable(n(5)));
        assert!(!dom.dominates(n(0), n(5)));
    }
}
