//! SSA function representation.
//!
//! An `SsaFunction` owns everything that makes up one function: its parameters,
//! its blocks, the variable table and the instruction arena.
//!
//! # Structure
//!
//! ```text
//! SsaFunction
//! ├── params: Vec<Param>           // parameter variables and their noalias marks
//! ├── blocks: Vec<SsaBlock>        // indexed by block id, removed blocks stay as tombstones
//! ├── variables: Vec<SsaVariable>  // type and definition site of every variable
//! ├── slots: Vec<InstSlot>         // instruction arena, addressed by InstId
//! └── entry: usize                 // entry block
//! ```
//!
//! # Editing
//!
//! All mutation goes through methods that keep the variable table in sync: placing
//! an instruction records it as the definition of its destination, erasing it marks
//! the destination [`DefSite::Unplaced`]. CFG edits (`redirect_edge`,
//! `remove_block`) never touch dominator trees or loop forests; callers report
//! those changes themselves.

use std::{collections::HashSet, fmt};

use crate::{
    analysis::ssa::{
        instruction::InstSlot, ConstValue, DefSite, InstId, PhiNode, SsaBlock, SsaInstruction,
        SsaOp, SsaType, SsaVarId, SsaVariable,
    },
    utils::graph::{GraphBase, NodeId, Predecessors, RootedGraph, Successors},
    Result,
};

/// A function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    /// Variable holding the parameter value.
    pub var: SsaVarId,
    /// The pointed-to memory is not accessed through any other pointer.
    pub noalias: bool,
}

/// A place where a variable is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseSite {
    /// Operand of an instruction.
    Inst {
        /// Block containing the instruction.
        block: usize,
        /// The reading instruction.
        inst: InstId,
    },
    /// Incoming value of a phi node.
    Phi {
        /// Block containing the phi.
        block: usize,
        /// Result of the reading phi.
        phi: SsaVarId,
        /// Predecessor the value flows in from.
        predecessor: usize,
    },
}

impl UseSite {
    /// Returns the block containing the user.
    #[must_use]
    pub const fn block(&self) -> usize {
        match self {
            Self::Inst { block, .. } | Self::Phi { block, .. } => *block,
        }
    }

    /// Returns the reading instruction, if the user is not a phi.
    #[must_use]
    pub const fn inst(&self) -> Option<InstId> {
        match self {
            Self::Inst { inst, .. } => Some(*inst),
            Self::Phi { .. } => None,
        }
    }
}

/// A function in SSA form.
#[derive(Debug, Clone)]
pub struct SsaFunction {
    name: String,
    params: Vec<Param>,
    return_type: SsaType,
    opt_size: bool,
    blocks: Vec<SsaBlock>,
    variables: Vec<SsaVariable>,
    slots: Vec<InstSlot>,
    free_slots: Vec<u32>,
    entry: usize,
}

impl SsaFunction {
    /// Creates an empty function.
    #[must_use]
    pub fn new(name: impl Into<String>, return_type: SsaType) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type,
            opt_size: false,
            blocks: Vec::new(),
            variables: Vec::new(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            entry: 0,
        }
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the function.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns the return type.
    #[must_use]
    pub const fn return_type(&self) -> SsaType {
        self.return_type
    }

    /// Returns the parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Returns `true` if `var` is a parameter marked noalias.
    #[must_use]
    pub fn is_noalias_param(&self, var: SsaVarId) -> bool {
        self.params.iter().any(|p| p.var == var && p.noalias)
    }

    /// Returns `true` if the function is optimized for size.
    #[must_use]
    pub const fn opt_size(&self) -> bool {
        self.opt_size
    }

    /// Marks the function as optimized for size.
    pub fn set_opt_size(&mut self, opt_size: bool) {
        self.opt_size = opt_size;
    }

    /// Returns the entry block index.
    #[must_use]
    pub const fn entry_block(&self) -> usize {
        self.entry
    }

    /// Makes `block` the entry block.
    pub fn set_entry_block(&mut self, block: usize) {
        self.entry = block;
    }

    /// Returns all blocks, including removed ones.
    #[must_use]
    pub fn blocks(&self) -> &[SsaBlock] {
        &self.blocks
    }

    /// Returns the number of block slots, including removed blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns a live block.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&SsaBlock> {
        self.blocks.get(index).filter(|b| !b.removed)
    }

    /// Returns `true` if `index` names a block that has not been removed.
    #[must_use]
    pub fn is_live_block(&self, index: usize) -> bool {
        self.block(index).is_some()
    }

    /// Returns the indices of all live blocks.
    pub fn live_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.iter().filter(|b| !b.removed).map(|b| b.id)
    }

    /// Returns the variable table.
    #[must_use]
    pub fn variables(&self) -> &[SsaVariable] {
        &self.variables
    }

    /// Returns a variable's table entry.
    #[must_use]
    pub fn variable(&self, id: SsaVarId) -> Option<&SsaVariable> {
        self.variables.get(id.index())
    }

    /// Returns the type of a variable, or `Void` for an unknown id.
    #[must_use]
    pub fn var_type(&self, id: SsaVarId) -> SsaType {
        self.variable(id).map_or(SsaType::Void, |v| v.ty)
    }

    /// Returns the definition site of a variable.
    #[must_use]
    pub fn def_site(&self, id: SsaVarId) -> DefSite {
        self.variable(id).map_or(DefSite::Unplaced, |v| v.def)
    }

    /// Creates a fresh, unplaced variable.
    pub fn new_var(&mut self, ty: SsaType) -> SsaVarId {
        let id = SsaVarId::new(self.variables.len());
        self.variables.push(SsaVariable::new(id, ty));
        id
    }

    /// Appends a parameter and returns its variable.
    pub fn add_param(&mut self, ty: SsaType, noalias: bool) -> SsaVarId {
        let var = self.new_var(ty);
        self.variables[var.index()].def = DefSite::Param(self.params.len());
        self.params.push(Param { var, noalias });
        var
    }

    /// Appends an empty block and returns its index.
    pub fn add_block(&mut self, name: impl Into<String>) -> usize {
        let id = self.blocks.len();
        self.blocks.push(SsaBlock::new(id, name));
        id
    }

    /// Deletes a block.
    ///
    /// Every instruction and phi of the block is erased and the phi operands that
    /// successors received from the block are dropped. The index stays reserved.
    /// Predecessors that still branch to the block are left untouched.
    pub fn remove_block(&mut self, index: usize) {
        if !self.is_live_block(index) {
            return;
        }

        for succ in self.block_successors(index) {
            self.remove_phi_predecessor(succ, index);
        }

        let insts = std::mem::take(&mut self.blocks[index].instructions);
        for id in insts.into_iter().rev() {
            self.release_slot(id);
        }

        let phis = std::mem::take(&mut self.blocks[index].phis);
        for phi in phis {
            self.set_def(phi.result(), DefSite::Unplaced);
        }

        self.blocks[index].removed = true;
    }

    /// Returns `true` if the handle refers to an instruction that still exists.
    #[must_use]
    pub fn is_live(&self, id: InstId) -> bool {
        self.slots
            .get(id.index())
            .is_some_and(|s| s.generation == id.generation && s.inst.is_some())
    }

    /// Returns a live instruction.
    #[must_use]
    pub fn inst(&self, id: InstId) -> Option<&SsaInstruction> {
        self.slots
            .get(id.index())
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.inst.as_ref())
    }

    /// Returns the operation of a live instruction.
    #[must_use]
    pub fn op(&self, id: InstId) -> Option<&SsaOp> {
        self.inst(id).map(|i| &i.op)
    }

    /// Returns the operation of a live instruction for in-place editing.
    ///
    /// Changing the destination of the operation is not supported.
    pub fn op_mut(&mut self, id: InstId) -> Option<&mut SsaOp> {
        self.slots
            .get_mut(id.index())
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.inst.as_mut())
            .map(|i| &mut i.op)
    }

    /// Iterates the instructions of a block in order.
    pub fn block_ops(&self, block: usize) -> impl Iterator<Item = (InstId, &SsaOp)> + '_ {
        self.block(block)
            .map(|b| b.instructions.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |&id| self.op(id).map(|op| (id, op)))
    }

    /// Returns the number of live instructions in the function.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.slots.iter().filter(|s| s.inst.is_some()).count()
    }

    fn set_def(&mut self, var: SsaVarId, def: DefSite) {
        if let Some(v) = self.variables.get_mut(var.index()) {
            v.def = def;
        }
    }

    fn alloc_slot(&mut self, op: SsaOp, block: usize) -> InstId {
        let dest = op.dest();
        let inst = SsaInstruction::new(op, block);
        let id = if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.inst = Some(inst);
            InstId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(InstSlot {
                generation: 0,
                inst: Some(inst),
            });
            InstId {
                index,
                generation: 0,
            }
        };
        if let Some(dest) = dest {
            self.set_def(dest, DefSite::Instruction(id));
        }
        id
    }

    fn release_slot(&mut self, id: InstId) -> Option<SsaOp> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|s| s.generation == id.generation)?;
        let inst = slot.inst.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(id.index);
        if let Some(dest) = inst.op.dest() {
            if self.def_site(dest) == DefSite::Instruction(id) {
                self.set_def(dest, DefSite::Unplaced);
            }
        }
        Some(inst.op)
    }

    /// Appends an instruction at the end of a block.
    pub fn push(&mut self, block: usize, op: SsaOp) -> InstId {
        let id = self.alloc_slot(op, block);
        self.blocks[block].instructions.push(id);
        id
    }

    /// Inserts an instruction before the terminator of a block, or at its end if the
    /// block has no terminator yet.
    pub fn insert_before_terminator(&mut self, block: usize, op: SsaOp) -> InstId {
        let position = match self.terminator_id(block) {
            Some(_) => self.blocks[block].instructions.len() - 1,
            None => self.blocks[block].instructions.len(),
        };
        let id = self.alloc_slot(op, block);
        self.blocks[block].instructions.insert(position, id);
        id
    }

    /// Inserts an instruction right after the phis of a block.
    pub fn insert_at_front(&mut self, block: usize, op: SsaOp) -> InstId {
        let id = self.alloc_slot(op, block);
        self.blocks[block].instructions.insert(0, id);
        id
    }

    /// Inserts an instruction immediately before `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) if `anchor` is not live.
    pub fn insert_before(&mut self, anchor: InstId, op: SsaOp) -> Result<InstId> {
        let block = self
            .inst(anchor)
            .map(|i| i.block)
            .ok_or_else(|| malformed_error!("insertion anchor {} was erased", anchor))?;
        let position = self.blocks[block]
            .instructions
            .iter()
            .position(|&i| i == anchor)
            .ok_or_else(|| malformed_error!("instruction {} not listed in b{}", anchor, block))?;
        let id = self.alloc_slot(op, block);
        self.blocks[block].instructions.insert(position, id);
        Ok(id)
    }

    /// Erases an instruction and returns its operation.
    ///
    /// The destination variable, if any, becomes unplaced. Remaining uses of it are
    /// left for the caller to rewrite. Returns `None` for stale handles.
    pub fn erase(&mut self, id: InstId) -> Option<SsaOp> {
        let block = self.inst(id)?.block;
        if let Some(b) = self.blocks.get_mut(block) {
            b.instructions.retain(|&i| i != id);
        }
        self.release_slot(id)
    }

    /// Replaces the terminator of a block, appending one if there is none.
    pub fn set_terminator(&mut self, block: usize, op: SsaOp) -> InstId {
        if let Some(old) = self.terminator_id(block) {
            self.erase(old);
        }
        self.push(block, op)
    }

    /// Moves the non-terminator instructions of `from` to the front of `to`,
    /// keeping their order and handles.
    pub(crate) fn splice_to_front(&mut self, from: usize, to: usize) {
        let terminator = self.terminator_id(from);
        let moved: Vec<InstId> = self.blocks[from]
            .instructions
            .iter()
            .copied()
            .filter(|&i| Some(i) != terminator)
            .collect();
        self.blocks[from].instructions.retain(|&i| Some(i) == terminator);
        for &id in &moved {
            if let Some(inst) = self.slots[id.index()].inst.as_mut() {
                inst.block = to;
            }
        }
        let rest = std::mem::take(&mut self.blocks[to].instructions);
        self.blocks[to].instructions = moved.into_iter().chain(rest).collect();
    }

    /// Moves every phi of `from` to `to`.
    pub(crate) fn move_phis(&mut self, from: usize, to: usize) {
        let phis = std::mem::take(&mut self.blocks[from].phis);
        for phi in &phis {
            self.set_def(phi.result(), DefSite::Phi(to));
        }
        self.blocks[to].phis.extend(phis);
    }

    /// Adds an empty phi to `block` and returns its result variable.
    pub fn add_phi(&mut self, block: usize, ty: SsaType) -> SsaVarId {
        let var = self.new_var(ty);
        self.blocks[block].phis.push(PhiNode::new(var));
        self.set_def(var, DefSite::Phi(block));
        var
    }

    /// Returns the phi of `block` defining `result`.
    #[must_use]
    pub fn phi(&self, block: usize, result: SsaVarId) -> Option<&PhiNode> {
        self.block(block)?.find_phi_defining(result)
    }

    /// Returns the phi of `block` defining `result` for editing.
    pub fn phi_mut(&mut self, block: usize, result: SsaVarId) -> Option<&mut PhiNode> {
        self.blocks
            .get_mut(block)
            .filter(|b| !b.removed)?
            .find_phi_defining_mut(result)
    }

    /// Returns the phi defining `var`, wherever it is.
    #[must_use]
    pub fn phi_defining(&self, var: SsaVarId) -> Option<&PhiNode> {
        match self.def_site(var) {
            DefSite::Phi(block) => self.phi(block, var),
            _ => None,
        }
    }

    /// Removes the phi defining `result` from `block`.
    pub fn remove_phi(&mut self, block: usize, result: SsaVarId) -> Option<PhiNode> {
        let b = self.blocks.get_mut(block)?;
        let index = b.phis.iter().position(|p| p.result() == result)?;
        let phi = b.phis.remove(index);
        self.set_def(result, DefSite::Unplaced);
        Some(phi)
    }

    /// Returns the defining instruction of `var`.
    #[must_use]
    pub fn def_instruction(&self, var: SsaVarId) -> Option<InstId> {
        self.def_site(var).instruction().filter(|&id| self.is_live(id))
    }

    /// Returns the defining operation of `var`.
    #[must_use]
    pub fn def_op(&self, var: SsaVarId) -> Option<&SsaOp> {
        self.def_instruction(var).and_then(|id| self.op(id))
    }

    /// Returns the block in which `var` is defined.
    ///
    /// Parameters are defined on entry to the function and have no block.
    #[must_use]
    pub fn def_block(&self, var: SsaVarId) -> Option<usize> {
        match self.def_site(var) {
            DefSite::Instruction(id) => self.inst(id).map(|i| i.block),
            DefSite::Phi(block) => Some(block),
            DefSite::Param(_) | DefSite::Unplaced => None,
        }
    }

    /// Returns the constant `var` is defined as.
    #[must_use]
    pub fn const_value(&self, var: SsaVarId) -> Option<ConstValue> {
        match self.def_op(var)? {
            SsaOp::Const { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Returns the sign-extended integer constant `var` is defined as.
    #[must_use]
    pub fn const_int(&self, var: SsaVarId) -> Option<i128> {
        self.const_value(var)?.as_i128()
    }

    /// Returns every place `var` is read.
    #[must_use]
    pub fn users(&self, var: SsaVarId) -> Vec<UseSite> {
        let mut users = Vec::new();
        for block in self.blocks.iter().filter(|b| !b.removed) {
            for phi in &block.phis {
                for operand in phi.operands() {
                    if operand.value() == var {
                        users.push(UseSite::Phi {
                            block: block.id,
                            phi: phi.result(),
                            predecessor: operand.predecessor(),
                        });
                    }
                }
            }
            for &id in &block.instructions {
                if self.op(id).is_some_and(|op| op.uses().contains(&var)) {
                    users.push(UseSite::Inst {
                        block: block.id,
                        inst: id,
                    });
                }
            }
        }
        users
    }

    /// Returns `true` if `var` is read anywhere.
    #[must_use]
    pub fn has_uses(&self, var: SsaVarId) -> bool {
        !self.users(var).is_empty()
    }

    /// Rewrites the uses of `old` selected by `filter` to read `new`.
    ///
    /// Returns the number of operands changed.
    pub fn replace_uses_if<F>(&mut self, old: SsaVarId, new: SsaVarId, filter: F) -> usize
    where
        F: Fn(&UseSite) -> bool,
    {
        let mut count = 0;
        for site in self.users(old) {
            if !filter(&site) {
                continue;
            }
            match site {
                UseSite::Inst { inst, .. } => {
                    if let Some(op) = self.op_mut(inst) {
                        count += op.replace_uses(old, new);
                    }
                }
                UseSite::Phi {
                    block,
                    phi,
                    predecessor,
                } => {
                    if let Some(node) = self.phi_mut(block, phi) {
                        node.set_operand(predecessor, new);
                        count += 1;
                    }
                }
            }
        }
        count
    }

    /// Rewrites every use of `old` to read `new`.
    pub fn replace_all_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        self.replace_uses_if(old, new, |_| true)
    }

    /// Rewrites the uses of `old` in blocks outside `inside` to read `new`.
    pub fn replace_uses_outside(
        &mut self,
        old: SsaVarId,
        new: SsaVarId,
        inside: &HashSet<usize>,
    ) -> usize {
        self.replace_uses_if(old, new, |site| !inside.contains(&site.block()))
    }

    /// Returns the handle of the block terminator.
    #[must_use]
    pub fn terminator_id(&self, block: usize) -> Option<InstId> {
        let last = self.block(block)?.last_instruction()?;
        self.op(last)
            .filter(|op| op.is_terminator())
            .map(|_| last)
    }

    /// Returns the block terminator.
    #[must_use]
    pub fn terminator(&self, block: usize) -> Option<&SsaOp> {
        self.terminator_id(block).and_then(|id| self.op(id))
    }

    /// Returns the distinct successors of a block, in branch order.
    #[must_use]
    pub fn block_successors(&self, block: usize) -> Vec<usize> {
        let mut result: Vec<usize> = Vec::with_capacity(2);
        if let Some(term) = self.terminator(block) {
            for succ in term.successors() {
                if !result.contains(&succ) {
                    result.push(succ);
                }
            }
        }
        result
    }

    /// Returns the distinct live predecessors of a block, in index order.
    #[must_use]
    pub fn block_predecessors(&self, block: usize) -> Vec<usize> {
        self.live_blocks()
            .filter(|&b| {
                self.terminator(b)
                    .is_some_and(|t| t.successors().contains(&block))
            })
            .collect()
    }

    /// Retargets the edges `from -> old_to` to `from -> new_to`.
    ///
    /// Phi nodes of either target are not touched. Returns `true` if the
    /// terminator of `from` changed.
    pub fn redirect_edge(&mut self, from: usize, old_to: usize, new_to: usize) -> bool {
        match self.terminator_id(from) {
            Some(id) => self
                .op_mut(id)
                .is_some_and(|op| op.redirect_target(old_to, new_to)),
            None => false,
        }
    }

    /// Renames the incoming block `old` to `new` in every phi of `block`.
    pub fn replace_phi_predecessor(&mut self, block: usize, old: usize, new: usize) {
        if let Some(b) = self.blocks.get_mut(block) {
            for phi in &mut b.phis {
                phi.rename_predecessor(old, new);
            }
        }
    }

    /// Drops the operand for `pred` from every phi of `block`.
    pub fn remove_phi_predecessor(&mut self, block: usize, pred: usize) {
        if let Some(b) = self.blocks.get_mut(block) {
            for phi in &mut b.phis {
                phi.remove_operand(pred);
            }
        }
    }

    /// Creates a constant at the end of the entry block's non-terminator code.
    pub fn entry_const(&mut self, ty: SsaType, value: ConstValue) -> SsaVarId {
        let dest = self.new_var(ty);
        let entry = self.entry;
        self.insert_before_terminator(entry, SsaOp::Const { dest, value });
        dest
    }

    /// Runs the IR verifier on this function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`](crate::Error::Verification) describing the
    /// first violated rule.
    pub fn verify(&self) -> Result<()> {
        super::verify::verify(self)
    }
}

impl GraphBase for SsaFunction {
    fn node_count(&self) -> usize {
        self.blocks.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.blocks.len()).map(NodeId::new)
    }
}

impl Successors for SsaFunction {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.block_successors(node.index())
            .into_iter()
            .map(NodeId::new)
    }
}

impl Predecessors for SsaFunction {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.block_predecessors(node.index())
            .into_iter()
            .map(NodeId::new)
    }
}

impl RootedGraph for SsaFunction {
    fn entry(&self) -> NodeId {
        NodeId::new(self.entry)
    }
}

impl fmt::Display for SsaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", param.var, self.var_type(param.var))?;
            if param.noalias {
                write!(f, " noalias")?;
            }
        }
        writeln!(f, ") -> {} {{", self.return_type)?;

        for block in self.blocks.iter().filter(|b| !b.removed) {
            let marker = if block.id == self.entry { " (entry)" } else { "" };
            writeln!(f, "b{} {}{}:", block.id, block.name, marker)?;
            for phi in &block.phis {
                writeln!(f, "    {}", phi)?;
            }
            for &id in &block.instructions {
                if let Some(op) = self.op(id) {
                    writeln!(f, "    {}", op)?;
                }
            }
        }
        writeln!(f, "}}")
    }
}
