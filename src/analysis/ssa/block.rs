//! SSA basic blocks containing phi nodes and instructions.
//!
//! # Block Structure
//!
//! ```text
//! b1 (body):
//!   // Phi nodes (executed "simultaneously" at block entry)
//!   v3 = phi(v1 from b0, v7 from b1)
//!
//!   // Instructions (executed sequentially, terminator last)
//!   v5 = ptradd v0, v3
//!   store v5, v2
//!   v7 = add v3, v6
//!   branch v8, b2, b1
//! ```
//!
//! Blocks hold handles into the function's instruction arena rather than the
//! instructions themselves; see [`InstId`].
//!
//! A removed block keeps its index so that block indices stay stable, but it has no
//! phis, no instructions and takes no part in the CFG.

use crate::analysis::ssa::{InstId, PhiNode, SsaVarId};

/// An SSA basic block.
#[derive(Debug, Clone)]
pub struct SsaBlock {
    /// Block index within the function.
    pub(crate) id: usize,
    /// Name used when printing.
    pub(crate) name: String,
    /// Phi nodes at block entry.
    pub(crate) phis: Vec<PhiNode>,
    /// Instructions in execution order; the terminator is last.
    pub(crate) instructions: Vec<InstId>,
    /// Whether the block has been deleted from the function.
    pub(crate) removed: bool,
}

impl SsaBlock {
    /// Creates a new empty block.
    #[must_use]
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            phis: Vec::new(),
            instructions: Vec::new(),
            removed: false,
        }
    }

    /// Returns the block index.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Returns the block name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the phi nodes of this block.
    #[must_use]
    pub fn phi_nodes(&self) -> &[PhiNode] {
        &self.phis
    }

    /// Returns the instruction handles of this block, terminator last.
    #[must_use]
    pub fn instructions(&self) -> &[InstId] {
        &self.instructions
    }

    /// Returns the number of instructions, including the terminator.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the block was removed from its function.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.removed
    }

    /// Finds the phi node defining `var`.
    #[must_use]
    pub fn find_phi_defining(&self, var: SsaVarId) -> Option<&PhiNode> {
        self.phis.iter().find(|phi| phi.result() == var)
    }

    pub(crate) fn find_phi_defining_mut(&mut self, var: SsaVarId) -> Option<&mut PhiNode> {
        self.phis.iter_mut().find(|phi| phi.result() == var)
    }

    /// Returns the handle of the last instruction.
    #[must_use]
    pub fn last_instruction(&self) -> Option<InstId> {
        self.instructions.last().copied()
    }
}
