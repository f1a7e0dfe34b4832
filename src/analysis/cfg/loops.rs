//! Natural loop detection and the mutable loop forest.
//!
//! # Loop Structure
//!
//! A loop in simplified form has the following structure:
//!
//! ```text
//!     [preheader]     <- Unique out-of-loop predecessor, branches only to the header
//!          |
//!          v
//!     [header] <------+  <- Single entry point, dominates all loop nodes
//!          |          |
//!          v          |
//!     [body ...]      |  <- Loop body nodes
//!          |          |
//!          v          |
//!     [latch] --------+  <- Single back edge source
//!          |
//!          v
//!     [exit ...]         <- Exit blocks, reached only from inside the loop
//! ```
//!
//! [`LoopInfo`] stores only what detection establishes: the header, the body and the
//! nesting. Preheader, latches and exits are derived from the function on demand,
//! because the rewrites of the idiom pass change the CFG around a loop while the
//! loop itself is still being processed.
//!
//! # Maintenance
//!
//! [`LoopForest`] is kept in sync by the transformations that change loops: a
//! deleted loop is removed with [`LoopForest::remove_loop`], deleted blocks with
//! [`LoopForest::remove_block`], and new blocks placed inside a loop are registered
//! with [`LoopForest::add_block_to_loop`].
//!
//! ```rust
//! use loopidiom::analysis::cfg::detect_loops;
//! use loopidiom::utils::graph::{algorithms::compute_dominators, NodeId, RootedGraph};
//! use loopidiom::prelude::*;
//!
//! let mut f = FunctionBuilder::new("spin", SsaType::Void);
//! let c = f.param(SsaType::Bool, false);
//! let entry = f.block("entry");
//! let body = f.block("body");
//! let exit = f.block("exit");
//! f.switch_to(entry);
//! f.jump(body);
//! f.switch_to(body);
//! f.branch(c, body, exit);
//! f.switch_to(exit);
//! f.ret(None);
//! let ssa = f.finish()?;
//!
//! let dom = compute_dominators(&ssa, ssa.entry());
//! let forest = detect_loops(&ssa, &dom);
//! let l = forest.loop_for_header(NodeId::new(body)).unwrap();
//! assert_eq!(l.preheader(&ssa), Some(NodeId::new(entry)));
//! assert_eq!(l.exit_blocks(&ssa), vec![NodeId::new(exit)]);
//! # Ok::<(), loopidiom::Error>(())
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    analysis::ssa::SsaFunction,
    utils::graph::{algorithms::DominatorTree, GraphBase, NodeId, Predecessors, Successors},
};

/// A natural loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopInfo {
    /// The header block (single entry point, dominates all loop nodes).
    pub header: NodeId,

    /// All blocks in the loop body, including the header and nested loops.
    pub body: HashSet<NodeId>,

    /// Loop nesting depth (0 = outermost).
    pub depth: usize,

    /// Parent loop header, if this loop is nested.
    pub parent: Option<NodeId>,

    /// Immediate child loop headers.
    pub children: Vec<NodeId>,
}

impl LoopInfo {
    /// Creates a new `LoopInfo` containing only its header.
    #[must_use]
    pub fn new(header: NodeId) -> Self {
        let mut body = HashSet::new();
        body.insert(header);
        Self {
            header,
            body,
            depth: 0,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Returns true if this loop contains the given block.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.body.contains(&node)
    }

    /// Returns the number of blocks in the loop.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Returns true if this is an innermost loop (no children).
    #[must_use]
    pub fn is_innermost(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns the body blocks in index order.
    #[must_use]
    pub fn blocks(&self) -> Vec<NodeId> {
        let mut blocks: Vec<NodeId> = self.body.iter().copied().collect();
        blocks.sort_unstable();
        blocks
    }

    /// Returns the unique predecessor of the header outside the loop.
    #[must_use]
    pub fn loop_predecessor(&self, ssa: &SsaFunction) -> Option<NodeId> {
        let mut outside = ssa
            .block_predecessors(self.header.index())
            .into_iter()
            .map(NodeId::new)
            .filter(|p| !self.contains(*p));
        let first = outside.next()?;
        outside.next().is_none().then_some(first)
    }

    /// Returns the preheader: the unique out-of-loop predecessor of the header, if
    /// its only successor is the header.
    #[must_use]
    pub fn preheader(&self, ssa: &SsaFunction) -> Option<NodeId> {
        let pred = self.loop_predecessor(ssa)?;
        (ssa.block_successors(pred.index()) == [self.header.index()]).then_some(pred)
    }

    /// Returns the blocks inside the loop that branch to the header.
    #[must_use]
    pub fn latches(&self, ssa: &SsaFunction) -> Vec<NodeId> {
        ssa.block_predecessors(self.header.index())
            .into_iter()
            .map(NodeId::new)
            .filter(|p| self.contains(*p))
            .collect()
    }

    /// Returns the latch if there is exactly one.
    #[must_use]
    pub fn single_latch(&self, ssa: &SsaFunction) -> Option<NodeId> {
        let latches = self.latches(ssa);
        (latches.len() == 1).then(|| latches[0])
    }

    /// Returns the number of edges from inside the loop to the header.
    #[must_use]
    pub fn back_edge_count(&self, ssa: &SsaFunction) -> usize {
        self.latches(ssa).len()
    }

    /// Returns every `(exiting, exit)` edge, ordered by block index.
    #[must_use]
    pub fn exit_edges(&self, ssa: &SsaFunction) -> Vec<(NodeId, NodeId)> {
        let mut edges = Vec::new();
        for block in self.blocks() {
            for succ in ssa.block_successors(block.index()) {
                let succ = NodeId::new(succ);
                if !self.contains(succ) {
                    edges.push((block, succ));
                }
            }
        }
        edges
    }

    /// Returns the distinct blocks outside the loop reached from inside it.
    #[must_use]
    pub fn exit_blocks(&self, ssa: &SsaFunction) -> Vec<NodeId> {
        let set: BTreeSet<NodeId> = self.exit_edges(ssa).into_iter().map(|(_, e)| e).collect();
        set.into_iter().collect()
    }

    /// Returns the distinct blocks inside the loop with a successor outside it.
    #[must_use]
    pub fn exiting_blocks(&self, ssa: &SsaFunction) -> Vec<NodeId> {
        let set: BTreeSet<NodeId> = self.exit_edges(ssa).into_iter().map(|(e, _)| e).collect();
        set.into_iter().collect()
    }

    /// Returns the exit block if all exit edges lead to the same block.
    #[must_use]
    pub fn unique_exit_block(&self, ssa: &SsaFunction) -> Option<NodeId> {
        let exits = self.exit_blocks(ssa);
        (exits.len() == 1).then(|| exits[0])
    }

    /// Returns true if every exit block is reached only from inside the loop.
    #[must_use]
    pub fn has_dedicated_exits(&self, ssa: &SsaFunction) -> bool {
        self.exit_blocks(ssa).iter().all(|exit| {
            ssa.block_predecessors(exit.index())
                .into_iter()
                .all(|p| self.contains(NodeId::new(p)))
        })
    }

    /// Returns true if the loop has a preheader, a single latch and dedicated exits.
    #[must_use]
    pub fn is_simplify_form(&self, ssa: &SsaFunction) -> bool {
        self.preheader(ssa).is_some()
            && self.single_latch(ssa).is_some()
            && self.has_dedicated_exits(ssa)
    }
}

/// Loop forest containing all loops in a function.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    /// All loops, ordered by header.
    loops: Vec<LoopInfo>,
    /// Map from block to the header of the innermost loop containing it.
    block_to_loop: HashMap<NodeId, NodeId>,
}

impl LoopForest {
    /// Creates an empty loop forest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all loops in the forest.
    #[must_use]
    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    /// Returns the number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns true if there are no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Returns the innermost loop containing the given block.
    #[must_use]
    pub fn innermost_loop(&self, block: NodeId) -> Option<&LoopInfo> {
        self.block_to_loop
            .get(&block)
            .and_then(|&header| self.loop_for_header(header))
    }

    /// Returns the loop with the given header.
    #[must_use]
    pub fn loop_for_header(&self, header: NodeId) -> Option<&LoopInfo> {
        self.loops.iter().find(|l| l.header == header)
    }

    /// Returns true if the loop headed by `header` contains `block`.
    #[must_use]
    pub fn contains(&self, header: NodeId, block: NodeId) -> bool {
        self.loop_for_header(header)
            .is_some_and(|l| l.contains(block))
    }

    /// Returns the loop depth for a block (0 if not in any loop).
    #[must_use]
    pub fn loop_depth(&self, block: NodeId) -> usize {
        self.innermost_loop(block).map_or(0, |l| l.depth + 1)
    }

    /// Returns true if the loop `inner` is `outer` or nested inside it.
    #[must_use]
    pub fn is_nested_in(&self, inner: NodeId, outer: NodeId) -> bool {
        let mut current = Some(inner);
        while let Some(header) = current {
            if header == outer {
                return true;
            }
            current = self.loop_for_header(header).and_then(|l| l.parent);
        }
        false
    }

    /// Returns all loop headers, children before their parents.
    ///
    /// Sibling loops appear in header order.
    #[must_use]
    pub fn by_depth_descending(&self) -> Vec<NodeId> {
        let mut sorted: Vec<&LoopInfo> = self.loops.iter().collect();
        sorted.sort_by_key(|l| (std::cmp::Reverse(l.depth), l.header));
        sorted.into_iter().map(|l| l.header).collect()
    }

    /// Removes the loop headed by `header` together with all loops nested in it.
    ///
    /// Blocks that belonged to the removed loops are mapped to the parent loop, if
    /// any. Returns false if no such loop exists.
    pub fn remove_loop(&mut self, header: NodeId) -> bool {
        let Some(info) = self.loop_for_header(header) else {
            return false;
        };
        let parent = info.parent;
        let removed: HashSet<NodeId> = self
            .loops
            .iter()
            .filter(|l| self.is_nested_in(l.header, header))
            .map(|l| l.header)
            .collect();

        self.loops.retain(|l| !removed.contains(&l.header));
        if let Some(parent) = parent {
            if let Some(p) = self.loops.iter_mut().find(|l| l.header == parent) {
                p.children.retain(|c| *c != header);
            }
        }

        let remapped: Vec<NodeId> = self
            .block_to_loop
            .iter()
            .filter(|(_, h)| removed.contains(h))
            .map(|(b, _)| *b)
            .collect();
        for block in remapped {
            match parent {
                Some(parent) => {
                    self.block_to_loop.insert(block, parent);
                }
                None => {
                    self.block_to_loop.remove(&block);
                }
            }
        }
        true
    }

    /// Registers a new loop made of `blocks` (the header included), nested in
    /// `parent`.
    ///
    /// The blocks are also added to every enclosing loop and become innermost
    /// members of the new loop. Returns false if `header` already heads a loop.
    pub fn add_loop(&mut self, header: NodeId, parent: Option<NodeId>, blocks: &[NodeId]) -> bool {
        if self.loop_for_header(header).is_some() {
            return false;
        }
        let parent = parent.filter(|p| self.loop_for_header(*p).is_some());
        let mut info = LoopInfo::new(header);
        info.body.extend(blocks.iter().copied());
        info.parent = parent;
        info.depth = parent
            .and_then(|p| self.loop_for_header(p))
            .map_or(0, |p| p.depth + 1);

        if let Some(parent) = parent {
            if let Some(p) = self.loops.iter_mut().find(|l| l.header == parent) {
                p.children.push(header);
                p.children.sort_unstable();
            }
            for &block in &info.body {
                self.add_block_to_loop(block, parent);
            }
        }
        for &block in &info.body {
            self.block_to_loop.insert(block, header);
        }

        let position = self
            .loops
            .iter()
            .position(|l| l.header > header)
            .unwrap_or(self.loops.len());
        self.loops.insert(position, info);
        true
    }

    /// Adds `block` to the loop headed by `header` and every loop enclosing it,
    /// making `header` its innermost loop.
    pub fn add_block_to_loop(&mut self, block: NodeId, header: NodeId) {
        let mut current = Some(header);
        while let Some(h) = current {
            match self.loops.iter_mut().find(|l| l.header == h) {
                Some(l) => {
                    l.body.insert(block);
                    current = l.parent;
                }
                None => break,
            }
        }
        if self.loop_for_header(header).is_some() {
            self.block_to_loop.insert(block, header);
        }
    }

    /// Forgets a deleted block.
    pub fn remove_block(&mut self, block: NodeId) {
        for l in &mut self.loops {
            l.body.remove(&block);
        }
        self.block_to_loop.remove(&block);
    }

    /// Returns true if both forests describe the same loops with the same bodies
    /// and nesting.
    #[must_use]
    pub fn structurally_matches(&self, other: &LoopForest) -> bool {
        if self.loops.len() != other.loops.len() {
            return false;
        }
        self.loops.iter().all(|l| {
            other.loop_for_header(l.header).is_some_and(|o| {
                o.body == l.body && o.parent == l.parent && o.depth == l.depth
            })
        }) && self.block_to_loop == other.block_to_loop
    }
}

/// Detects all natural loops in a graph using dominance-based back edge detection.
///
/// # Algorithm
///
/// 1. Finds back edges using dominance (n → h where h dominates n)
/// 2. For each back edge, computes the natural loop body
/// 3. Establishes nesting relationships
///
/// Unreachable blocks never form or join a loop.
#[must_use]
pub fn detect_loops<G>(graph: &G, dominators: &DominatorTree) -> LoopForest
where
    G: GraphBase + Successors + Predecessors,
{
    let mut loops_by_header: HashMap<NodeId, LoopInfo> = HashMap::new();

    for node in graph.node_ids() {
        if !dominators.is_reachable(node) {
            continue;
        }
        for succ in graph.successors(node) {
            if dominators.dominates(succ, node) {
                let loop_info = loops_by_header
                    .entry(succ)
                    .or_insert_with(|| LoopInfo::new(succ));
                expand_loop_body(graph, dominators, loop_info, node);
            }
        }
    }

    let mut loops: Vec<LoopInfo> = loops_by_header.into_values().collect();
    compute_nesting(&mut loops);
    loops.sort_by_key(|l| l.header.index());

    let mut forest = LoopForest {
        loops,
        block_to_loop: HashMap::new(),
    };
    for l in &forest.loops {
        for &block in &l.body {
            let deeper = forest
                .block_to_loop
                .get(&block)
                .and_then(|h| forest.loops.iter().find(|o| o.header == *h))
                .map_or(true, |existing| existing.depth < l.depth);
            if deeper {
                forest.block_to_loop.insert(block, l.header);
            }
        }
    }
    forest
}

/// Adds every node that reaches `latch` without passing the header.
fn expand_loop_body<G>(graph: &G, dominators: &DominatorTree, loop_info: &mut LoopInfo, latch: NodeId)
where
    G: Predecessors,
{
    let mut worklist = vec![latch];
    while let Some(node) = worklist.pop() {
        if node == loop_info.header || !loop_info.body.insert(node) {
            continue;
        }
        for pred in graph.predecessors(node) {
            if dominators.is_reachable(pred) && !loop_info.body.contains(&pred) {
                worklist.push(pred);
            }
        }
    }
}

/// Computes loop nesting relationships and depths.
fn compute_nesting(loops: &mut [LoopInfo]) {
    let n = loops.len();
    let header_to_idx: HashMap<NodeId, usize> = loops
        .iter()
        .enumerate()
        .map(|(i, l)| (l.header, i))
        .collect();

    // The parent is the smallest other loop containing this loop's header
    for i in 0..n {
        let header = loops[i].header;
        let parent = (0..n)
            .filter(|&j| j != i && loops[j].body.contains(&header))
            .min_by_key(|&j| (loops[j].size(), loops[j].header));
        loops[i].parent = parent.map(|j| loops[j].header);
    }

    for i in 0..n {
        if let Some(parent_header) = loops[i].parent {
            if let Some(&parent_idx) = header_to_idx.get(&parent_header) {
                let child = loops[i].header;
                loops[parent_idx].children.push(child);
            }
        }
    }
    for l in loops.iter_mut() {
        l.children.sort_unstable();
    }

    for i in 0..n {
        let mut depth = 0;
        let mut current = loops[i].parent;
        while let Some(parent_header) = current {
            depth += 1;
            current = header_to_idx
                .get(&parent_header)
                .and_then(|&idx| loops[idx].parent);
        }
        loops[i].depth = depth;
    }
}
