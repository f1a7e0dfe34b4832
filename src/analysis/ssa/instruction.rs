//! Instruction storage with generation-checked handles.
//!
//! Instructions live in an arena owned by the function. Blocks refer to them by
//! [`InstId`], a weak handle made of a slot index and the generation of the slot at
//! the time the instruction was created. Erasing an instruction bumps the slot's
//! generation, so analyses that kept an [`InstId`] across a rewrite can ask the
//! function whether the instruction still exists instead of dangling.

use std::fmt;

use crate::analysis::ssa::SsaOp;

/// Weak handle to an instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl InstId {
    /// Returns the arena slot of the instruction.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Returns the generation this handle was issued for.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}.{}", self.index, self.generation)
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.index)
    }
}

/// An instruction placed in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaInstruction {
    /// The operation.
    pub op: SsaOp,
    /// Block the instruction is placed in.
    pub block: usize,
}

impl SsaInstruction {
    /// Creates a new instruction.
    #[must_use]
    pub const fn new(op: SsaOp, block: usize) -> Self {
        Self { op, block }
    }
}

impl fmt::Display for SsaInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)
    }
}

/// One arena slot. An empty slot keeps its generation for the next occupant.
#[derive(Debug, Clone, Default)]
pub(crate) struct InstSlot {
    pub(crate) generation: u32,
    pub(crate) inst: Option<SsaInstruction>,
}
