//! Phi node representation for SSA form.
//!
//! Phi nodes merge values at control flow join points. When several paths reach a
//! block, each phi of the block selects the value belonging to the edge that was
//! taken.
//!
//! # Semantics
//!
//! A phi node `v3 = phi(v1 from b1, v2 from b2)` means:
//! - If control came from block b1, use value v1
//! - If control came from block b2, use value v2
//!
//! Phi nodes are evaluated simultaneously at the entry of their block, before any
//! instruction of the block executes.
//!
//! # Invariants
//!
//! Each phi has exactly one operand per distinct predecessor of its block, even when
//! a predecessor reaches the block through both arms of a branch.

use std::fmt;

use crate::analysis::ssa::SsaVarId;

/// An operand of a phi node: a value coming from a specific predecessor block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiOperand {
    /// The SSA variable providing the value.
    value: SsaVarId,
    /// The predecessor block from which this value comes.
    predecessor: usize,
}

impl PhiOperand {
    /// Creates a new phi operand.
    #[must_use]
    pub const fn new(value: SsaVarId, predecessor: usize) -> Self {
        Self { value, predecessor }
    }

    /// Returns the SSA variable providing the value.
    #[must_use]
    pub const fn value(&self) -> SsaVarId {
        self.value
    }

    /// Returns the predecessor block index.
    #[must_use]
    pub const fn predecessor(&self) -> usize {
        self.predecessor
    }
}

impl fmt::Display for PhiOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from b{}", self.value, self.predecessor)
    }
}

/// A phi node that merges values at a control flow join point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiNode {
    /// The SSA variable defined by this phi node.
    result: SsaVarId,
    /// Operands from each predecessor block.
    operands: Vec<PhiOperand>,
}

impl PhiNode {
    /// Creates a phi node with no operands.
    #[must_use]
    pub fn new(result: SsaVarId) -> Self {
        Self {
            result,
            operands: Vec::new(),
        }
    }

    /// Returns the SSA variable defined by this phi node.
    #[must_use]
    pub const fn result(&self) -> SsaVarId {
        self.result
    }

    /// Returns the operands of this phi node.
    #[must_use]
    pub fn operands(&self) -> &[PhiOperand] {
        &self.operands
    }

    /// Returns the number of operands.
    #[must_use]
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Returns `true` if this phi node has no operands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    /// Finds the operand coming from the specified predecessor block.
    #[must_use]
    pub fn operand_from(&self, predecessor: usize) -> Option<&PhiOperand> {
        self.operands
            .iter()
            .find(|op| op.predecessor == predecessor)
    }

    /// Returns the value coming from the specified predecessor block.
    #[must_use]
    pub fn value_from(&self, predecessor: usize) -> Option<SsaVarId> {
        self.operand_from(predecessor).map(PhiOperand::value)
    }

    /// Returns all the SSA variables used by this phi node.
    pub fn used_variables(&self) -> impl Iterator<Item = SsaVarId> + '_ {
        self.operands.iter().map(|op| op.value)
    }

    /// Sets the operand value for a specific predecessor.
    ///
    /// If an operand from that predecessor already exists, it is updated.
    /// Otherwise, a new operand is added.
    pub fn set_operand(&mut self, predecessor: usize, value: SsaVarId) {
        if let Some(existing) = self
            .operands
            .iter_mut()
            .find(|op| op.predecessor == predecessor)
        {
            existing.value = value;
        } else {
            self.operands.push(PhiOperand::new(value, predecessor));
        }
    }

    /// Removes the operand for `predecessor`. Returns the removed value.
    pub fn remove_operand(&mut self, predecessor: usize) -> Option<SsaVarId> {
        let index = self
            .operands
            .iter()
            .position(|op| op.predecessor == predecessor)?;
        Some(self.operands.remove(index).value)
    }

    /// Renames the predecessor `old` to `new`, keeping the value.
    ///
    /// If an operand for `new` already exists the `old` operand is dropped instead.
    /// Returns `true` if an operand for `old` existed.
    pub fn rename_predecessor(&mut self, old: usize, new: usize) -> bool {
        if old == new {
            return self.operand_from(old).is_some();
        }
        if self.operand_from(new).is_some() {
            return self.remove_operand(old).is_some();
        }
        match self.operands.iter_mut().find(|op| op.predecessor == old) {
            Some(op) => {
                op.predecessor = new;
                true
            }
            None => false,
        }
    }

    /// Replaces every operand value equal to `old` with `new`.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        let mut count = 0;
        for op in &mut self.operands {
            if op.value == old {
                op.value = new;
                count += 1;
            }
        }
        count
    }
}

impl fmt::Display for PhiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = phi(", self.result)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{operand}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phi_operand_display() {
        let operand = PhiOperand::new(SsaVarId::new(3), 1);
        assert_eq!(format!("{operand}"), "v3 from b1");
    }

    #[test]
    fn test_set_operand_updates_existing() {
        let mut phi = PhiNode::new(SsaVarId::new(5));
        phi.set_operand(2, SsaVarId::new(1));
        phi.set_operand(2, SsaVarId::new(9));
        assert_eq!(phi.operand_count(), 1);
        assert_eq!(phi.value_from(2), Some(SsaVarId::new(9)));
    }

    #[test]
    fn test_rename_predecessor() {
        let mut phi = PhiNode::new(SsaVarId::new(5));
        phi.set_operand(1, SsaVarId::new(1));
        phi.set_operand(2, SsaVarId::new(2));

        assert!(phi.rename_predecessor(1, 7));
        assert_eq!(phi.value_from(7), Some(SsaVarId::new(1)));
        assert!(phi.operand_from(1).is_none());

        // Renaming onto an existing predecessor drops the old operand
        assert!(phi.rename_predecessor(7, 2));
        assert_eq!(phi.operand_count(), 1);
        assert_eq!(phi.value_from(2), Some(SsaVarId::new(2)));
    }

    #[test]
    fn test_remove_and_replace() {
        let mut phi = PhiNode::new(SsaVarId::new(5));
        phi.set_operand(0, SsaVarId::new(1));
        phi.set_operand(1, SsaVarId::new(1));
        assert_eq!(phi.replace_uses(SsaVarId::new(1), SsaVarId::new(4)), 2);
        assert_eq!(phi.remove_operand(0), Some(SsaVarId::new(4)));
        assert_eq!(phi.remove_operand(0), None);
        assert_eq!(format!("{phi}"), "v5 = phi(v4 from b1)");
    }
}
