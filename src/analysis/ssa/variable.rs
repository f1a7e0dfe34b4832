//! SSA variable representation and identifiers.
//!
//! Each SSA variable has a unique identifier and is assigned exactly once. The
//! identifier itself carries no meaning; the type and the defining site live in
//! the function's variable table as an [`SsaVariable`].
//!
//! # Definition Sites
//!
//! A variable is defined by one of:
//!
//! 1. **Parameters** - values passed by the caller
//! 2. **Instructions** - the destination of an [`SsaOp`](crate::analysis::ssa::SsaOp)
//! 3. **Phi nodes** - merged values at control flow joins
//!
//! Variables whose definition was erased, or which were created but not yet placed,
//! are [`DefSite::Unplaced`]. The verifier rejects any use of such a variable.

use std::fmt;

use crate::analysis::ssa::{InstId, SsaType};

/// Unique identifier for an SSA variable.
///
/// This is a lightweight handle into the variable table of an
/// [`SsaFunction`](crate::analysis::ssa::SsaFunction). It is unique within one
/// function but not across functions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsaVarId(usize);

impl SsaVarId {
    /// Creates a new SSA variable identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index into the variable table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SsaVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for SsaVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where an SSA variable gets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefSite {
    /// The n-th function parameter.
    Param(usize),
    /// The destination of an instruction.
    Instruction(InstId),
    /// The result of a phi node in the given block.
    Phi(usize),
    /// No definition: created but not yet placed, or its definition was erased.
    Unplaced,
}

impl DefSite {
    /// Returns the defining instruction, if any.
    #[must_use]
    pub const fn instruction(&self) -> Option<InstId> {
        match self {
            Self::Instruction(id) => Some(*id),
            _ => None,
        }
    }
}

/// An entry of the variable table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaVariable {
    /// Identifier of this variable.
    pub id: SsaVarId,
    /// Type of the value.
    pub ty: SsaType,
    /// Definition site.
    pub def: DefSite,
}

impl SsaVariable {
    /// Creates a new unplaced variable.
    #[must_use]
    pub const fn new(id: SsaVarId, ty: SsaType) -> Self {
        Self {
            id,
            ty,
            def: DefSite::Unplaced,
        }
    }

    /// Returns `true` if the variable is a parameter.
    #[must_use]
    pub const fn is_param(&self) -> bool {
        matches!(self.def, DefSite::Param(_))
    }

    /// Returns `true` if the variable is the result of a phi node.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self.def, DefSite::Phi(_))
    }
}
