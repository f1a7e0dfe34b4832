//! Analyses the idiom pass keeps up to date while it rewrites a function.
//!
//! [`FunctionAnalyses`] bundles the dominator tree, the loop forest, scalar
//! evolution and the alias oracle of one function. Rewrites that change the CFG
//! report their edits through [`DominatorTree::apply_updates`] and the loop forest
//! mutators, so the bundle stays valid without being recomputed between loops.

use std::collections::HashSet;

use crate::{
    analysis::{
        alias::{AliasOracle, AliasQuery, BasicAliasOracle},
        cfg::{detect_loops, LoopForest},
        scev::ScalarEvolution,
        SsaFunction,
    },
    utils::graph::{
        algorithms::{compute_dominators, DominatorTree},
        NodeId,
    },
    Error, Result,
};

/// Dominators, loops, scalar evolution and alias information for one function.
pub struct FunctionAnalyses {
    /// Dominator tree of the CFG.
    pub dom: DominatorTree,
    /// Natural loops.
    pub loops: LoopForest,
    /// Symbolic value descriptions and trip counts.
    pub se: ScalarEvolution,
    /// Memory effect queries.
    pub oracle: Box<dyn AliasOracle>,
}

impl FunctionAnalyses {
    /// Computes every analysis from scratch, using the [`BasicAliasOracle`].
    #[must_use]
    pub fn compute(ssa: &SsaFunction) -> Self {
        Self::with_oracle(ssa, Box::new(BasicAliasOracle::new()))
    }

    /// Computes every analysis from scratch with a caller supplied alias oracle.
    #[must_use]
    pub fn with_oracle(ssa: &SsaFunction, oracle: Box<dyn AliasOracle>) -> Self {
        let dom = compute_dominators(ssa, NodeId::new(ssa.entry_block()));
        let loops = detect_loops(ssa, &dom);
        Self {
            dom,
            loops,
            se: ScalarEvolution::new(),
            oracle,
        }
    }

    /// Builds an alias query about the loop headed by `header`.
    #[must_use]
    pub fn alias_query<'a>(
        &'a self,
        ssa: &'a SsaFunction,
        header: NodeId,
        trip_count: Option<u64>,
    ) -> AliasQuery<'a> {
        AliasQuery {
            ssa,
            loops: &self.loops,
            se: &self.se,
            header,
            trip_count,
        }
    }

    /// Checks the maintained dominator tree and loop forest against freshly
    /// computed ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] naming the first disagreement.
    pub fn verify(&self, ssa: &SsaFunction) -> Result<()> {
        let entry = NodeId::new(ssa.entry_block());
        if self.dom.entry() != entry {
            return Err(Error::Verification(format!(
                "dominator tree rooted at {} but entry is {}",
                self.dom.entry(),
                entry
            )));
        }

        let fresh = compute_dominators(ssa, entry);
        for block in ssa.live_blocks().map(NodeId::new) {
            if self.dom.is_reachable(block) != fresh.is_reachable(block)
                || self.dom.immediate_dominator(block) != fresh.immediate_dominator(block)
            {
                return Err(Error::Verification(format!(
                    "stale dominator information for {}",
                    block
                )));
            }
        }

        let loops = detect_loops(ssa, &fresh);
        if !self.loops.structurally_matches(&loops) {
            return Err(Error::Verification("stale loop forest".to_string()));
        }
        Ok(())
    }
}

/// Tracks loops deleted while a function is processed.
///
/// Loop headers are collected before any rewrite; a loop deleted by an earlier
/// rewrite must not be visited afterwards.
#[derive(Debug, Default)]
pub struct LoopPassManager {
    deleted: Vec<NodeId>,
    seen: HashSet<NodeId>,
}

impl LoopPassManager {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the loop headed by `header` no longer exists.
    pub fn mark_loop_deleted(&mut self, header: NodeId) {
        if self.seen.insert(header) {
            self.deleted.push(header);
        }
    }

    /// Returns `true` if the loop headed by `header` was deleted.
    #[must_use]
    pub fn is_deleted(&self, header: NodeId) -> bool {
        self.seen.contains(&header)
    }

    /// Returns the deleted loops in deletion order.
    #[must_use]
    pub fn deleted_loops(&self) -> &[NodeId] {
        &self.deleted
    }
}
