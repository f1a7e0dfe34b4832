//! Programmatic construction of SSA functions.
//!
//! [`FunctionBuilder`] appends instructions to a current block and creates the
//! destination variables itself, so building a function reads like writing it:
//!
//! ```rust
//! use loopidiom::prelude::*;
//!
//! let mut f = FunctionBuilder::new("add1", SsaType::I32);
//! let x = f.param(SsaType::I32, false);
//! let entry = f.block("entry");
//! f.switch_to(entry);
//! let one = f.const_int(SsaType::I32, 1);
//! let sum = f.add(x, one);
//! f.ret(Some(sum));
//! let ssa = f.finish()?;
//! assert_eq!(ssa.live_blocks().count(), 1);
//! # Ok::<(), loopidiom::Error>(())
//! ```
//!
//! Phi nodes are created empty with [`FunctionBuilder::phi`] and filled with
//! [`FunctionBuilder::phi_incoming`] once the incoming values exist, which is how
//! loop-carried values are expressed. [`FunctionBuilder::finish`] runs the verifier.
//!
//! The first block created is the entry block.

use crate::{
    analysis::ssa::{
        BitCountKind, CallEffects, CastKind, CmpKind, ConstValue, MemFlags, SsaFunction, SsaOp,
        SsaType, SsaVarId,
    },
    Result,
};

/// Builder for [`SsaFunction`].
#[derive(Debug)]
pub struct FunctionBuilder {
    ssa: SsaFunction,
    current: usize,
}

impl FunctionBuilder {
    /// Starts a new function.
    #[must_use]
    pub fn new(name: impl Into<String>, return_type: SsaType) -> Self {
        Self {
            ssa: SsaFunction::new(name, return_type),
            current: 0,
        }
    }

    /// Declares the next parameter.
    pub fn param(&mut self, ty: SsaType, noalias: bool) -> SsaVarId {
        self.ssa.add_param(ty, noalias)
    }

    /// Creates a new block and returns its index. Does not switch to it.
    pub fn block(&mut self, name: &str) -> usize {
        self.ssa.add_block(name)
    }

    /// Directs subsequent instructions to `block`.
    pub fn switch_to(&mut self, block: usize) {
        self.current = block;
    }

    /// Returns the block instructions are currently appended to.
    #[must_use]
    pub const fn current_block(&self) -> usize {
        self.current
    }

    /// Marks the function as optimized for size.
    pub fn opt_size(&mut self, opt_size: bool) {
        self.ssa.set_opt_size(opt_size);
    }

    fn def(&mut self, ty: SsaType, make: impl FnOnce(SsaVarId) -> SsaOp) -> SsaVarId {
        let dest = self.ssa.new_var(ty);
        self.ssa.push(self.current, make(dest));
        dest
    }

    fn binary(
        &mut self,
        left: SsaVarId,
        right: SsaVarId,
        make: impl FnOnce(SsaVarId, SsaVarId, SsaVarId) -> SsaOp,
    ) -> SsaVarId {
        let ty = self.ssa.var_type(left);
        self.def(ty, |dest| make(dest, left, right))
    }

    /// Materializes an integer (or null pointer) constant.
    pub fn const_int(&mut self, ty: SsaType, value: i128) -> SsaVarId {
        self.def(ty, |dest| SsaOp::Const {
            dest,
            value: ConstValue::int(ty, value),
        })
    }

    /// Materializes an arbitrary constant.
    pub fn const_value(&mut self, ty: SsaType, value: ConstValue) -> SsaVarId {
        self.def(ty, |dest| SsaOp::Const { dest, value })
    }

    /// `left + right`
    pub fn add(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(left, right, |dest, left, right| SsaOp::Add { dest, left, right })
    }

    /// `left - right`
    pub fn sub(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(left, right, |dest, left, right| SsaOp::Sub { dest, left, right })
    }

    /// `left * right`
    pub fn mul(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(left, right, |dest, left, right| SsaOp::Mul { dest, left, right })
    }

    /// `left & right`
    pub fn and(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(left, right, |dest, left, right| SsaOp::And { dest, left, right })
    }

    /// `left | right`
    pub fn or(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(left, right, |dest, left, right| SsaOp::Or { dest, left, right })
    }

    /// `left ^ right`
    pub fn xor(&mut self, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.binary(left, right, |dest, left, right| SsaOp::Xor { dest, left, right })
    }

    /// `value << amount`
    pub fn shl(&mut self, value: SsaVarId, amount: SsaVarId) -> SsaVarId {
        self.binary(value, amount, |dest, value, amount| SsaOp::Shl {
            dest,
            value,
            amount,
        })
    }

    /// Logical `value >> amount`
    pub fn lshr(&mut self, value: SsaVarId, amount: SsaVarId) -> SsaVarId {
        self.binary(value, amount, |dest, value, amount| SsaOp::Shr {
            dest,
            value,
            amount,
            arithmetic: false,
        })
    }

    /// Arithmetic `value >> amount`
    pub fn ashr(&mut self, value: SsaVarId, amount: SsaVarId) -> SsaVarId {
        self.binary(value, amount, |dest, value, amount| SsaOp::Shr {
            dest,
            value,
            amount,
            arithmetic: true,
        })
    }

    /// Integer comparison producing a `Bool`.
    pub fn cmp(&mut self, kind: CmpKind, left: SsaVarId, right: SsaVarId) -> SsaVarId {
        self.def(SsaType::Bool, |dest| SsaOp::Cmp {
            dest,
            kind,
            left,
            right,
        })
    }

    /// Conversion of `operand` to `ty`.
    pub fn cast(&mut self, kind: CastKind, operand: SsaVarId, ty: SsaType) -> SsaVarId {
        self.def(ty, |dest| SsaOp::Cast {
            dest,
            kind,
            operand,
        })
    }

    /// Zero extension to `ty`.
    pub fn zext(&mut self, operand: SsaVarId, ty: SsaType) -> SsaVarId {
        self.cast(CastKind::ZExt, operand, ty)
    }

    /// Sign extension to `ty`.
    pub fn sext(&mut self, operand: SsaVarId, ty: SsaType) -> SsaVarId {
        self.cast(CastKind::SExt, operand, ty)
    }

    /// Truncation to `ty`.
    pub fn trunc(&mut self, operand: SsaVarId, ty: SsaType) -> SsaVarId {
        self.cast(CastKind::Trunc, operand, ty)
    }

    /// Pointer to `ty` integer.
    pub fn ptr_to_int(&mut self, operand: SsaVarId, ty: SsaType) -> SsaVarId {
        self.cast(CastKind::PtrToInt, operand, ty)
    }

    /// Integer to pointer of type `ty`.
    pub fn int_to_ptr(&mut self, operand: SsaVarId, ty: SsaType) -> SsaVarId {
        self.cast(CastKind::IntToPtr, operand, ty)
    }

    /// `base + offset` bytes; the result has the type of `base`.
    pub fn ptr_add(&mut self, base: SsaVarId, offset: SsaVarId) -> SsaVarId {
        let ty = self.ssa.var_type(base);
        self.def(ty, |dest| SsaOp::PtrAdd { dest, base, offset })
    }

    /// Fresh stack object of `size` bytes.
    pub fn alloca(&mut self, size: u64) -> SsaVarId {
        self.def(SsaType::Ptr(0), |dest| SsaOp::Alloca { dest, size })
    }

    /// Simple load of a `ty` value.
    pub fn load(&mut self, ty: SsaType, addr: SsaVarId) -> SsaVarId {
        self.load_with(ty, addr, MemFlags::empty(), natural_align(ty))
    }

    /// Load with explicit flags and alignment.
    pub fn load_with(
        &mut self,
        ty: SsaType,
        addr: SsaVarId,
        flags: MemFlags,
        align: u32,
    ) -> SsaVarId {
        self.def(ty, |dest| SsaOp::Load {
            dest,
            addr,
            flags,
            align,
        })
    }

    /// Simple store of `value`.
    pub fn store(&mut self, addr: SsaVarId, value: SsaVarId) {
        let align = natural_align(self.ssa.var_type(value));
        self.store_with(addr, value, MemFlags::empty(), align);
    }

    /// Store with explicit flags and alignment.
    pub fn store_with(&mut self, addr: SsaVarId, value: SsaVarId, flags: MemFlags, align: u32) {
        self.ssa.push(
            self.current,
            SsaOp::Store {
                addr,
                value,
                flags,
                align,
            },
        );
    }

    /// Fill `len` bytes at `addr` with the `i8` value `value`.
    pub fn memset(&mut self, addr: SsaVarId, value: SsaVarId, len: SsaVarId, volatile: bool) {
        self.ssa.push(
            self.current,
            SsaOp::MemSet {
                addr,
                value,
                len,
                align: 1,
                volatile,
            },
        );
    }

    /// Copy `len` bytes from `src` to `dest`.
    pub fn memcpy(&mut self, dest: SsaVarId, src: SsaVarId, len: SsaVarId) {
        self.ssa.push(
            self.current,
            SsaOp::MemCpy {
                dest,
                src,
                len,
                align: 1,
                element_size: None,
            },
        );
    }

    /// Bit count of `operand`.
    pub fn bit_count(&mut self, kind: BitCountKind, operand: SsaVarId, zero_is_undef: bool) -> SsaVarId {
        let ty = self.ssa.var_type(operand);
        self.def(ty, |dest| SsaOp::BitCount {
            dest,
            kind,
            operand,
            zero_is_undef,
        })
    }

    /// Call to `callee`. A `Void` return type produces no result variable.
    pub fn call(
        &mut self,
        callee: &str,
        args: &[SsaVarId],
        ret: SsaType,
        effects: CallEffects,
    ) -> Option<SsaVarId> {
        let dest = (ret != SsaType::Void).then(|| self.ssa.new_var(ret));
        self.ssa.push(
            self.current,
            SsaOp::Call {
                dest,
                callee: callee.to_string(),
                args: args.to_vec(),
                effects,
            },
        );
        dest
    }

    /// Memory barrier.
    pub fn fence(&mut self) {
        self.ssa.push(self.current, SsaOp::Fence);
    }

    /// Creates an empty phi at the start of the current block.
    pub fn phi(&mut self, ty: SsaType) -> SsaVarId {
        self.ssa.add_phi(self.current, ty)
    }

    /// Adds (or replaces) the value `phi` receives from `pred`.
    pub fn phi_incoming(&mut self, phi: SsaVarId, value: SsaVarId, pred: usize) {
        if let Some(block) = self.ssa.def_block(phi) {
            if let Some(node) = self.ssa.phi_mut(block, phi) {
                node.set_operand(pred, value);
            }
        }
    }

    /// Unconditional branch.
    pub fn jump(&mut self, target: usize) {
        self.ssa.push(self.current, SsaOp::Jump { target });
    }

    /// Conditional branch.
    pub fn branch(&mut self, condition: SsaVarId, true_target: usize, false_target: usize) {
        self.ssa.push(
            self.current,
            SsaOp::Branch {
                condition,
                true_target,
                false_target,
            },
        );
    }

    /// Return.
    pub fn ret(&mut self, value: Option<SsaVarId>) {
        self.ssa.push(self.current, SsaOp::Return { value });
    }

    /// Marks the end of the current block as unreachable.
    pub fn unreachable(&mut self) {
        self.ssa.push(self.current, SsaOp::Unreachable);
    }

    /// Gives access to the function under construction.
    pub fn function_mut(&mut self) -> &mut SsaFunction {
        &mut self.ssa
    }

    /// Verifies and returns the finished function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`](crate::Error::Verification) if the function
    /// is not well formed.
    pub fn finish(self) -> Result<SsaFunction> {
        self.ssa.verify()?;
        Ok(self.ssa)
    }
}

/// Natural alignment of a scalar type, capped at 16.
pub(crate) fn natural_align(ty: SsaType) -> u32 {
    (ty.store_size().clamp(1, 16)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::ssa::DefSite, Error};

    #[test]
    fn test_empty_function_is_rejected() {
        let f = FunctionBuilder::new("empty", SsaType::Void);
        assert!(matches!(f.finish(), Err(Error::Verification(_))));
    }

    #[test]
    fn test_types_follow_operands() {
        let mut f = FunctionBuilder::new("t", SsaType::Void);
        let p = f.param(SsaType::Ptr(1), false);
        let entry = f.block("entry");
        f.switch_to(entry);
        let eight = f.const_int(SsaType::I64, 8);
        let q = f.ptr_add(p, eight);
        let x = f.load(SsaType::I16, q);
        let wide = f.zext(x, SsaType::I64);
        let c = f.cmp(CmpKind::Ult, wide, eight);
        f.ret(None);
        let ssa = f.finish().unwrap();

        assert_eq!(ssa.var_type(q), SsaType::Ptr(1));
        assert_eq!(ssa.var_type(x), SsaType::I16);
        assert_eq!(ssa.var_type(wide), SsaType::I64);
        assert_eq!(ssa.var_type(c), SsaType::Bool);
    }

    #[test]
    fn test_phi_incoming() {
        let mut f = FunctionBuilder::new("loop", SsaType::Void);
        let entry = f.block("entry");
        let body = f.block("body");
        let exit = f.block("exit");
        f.switch_to(entry);
        let zero = f.const_int(SsaType::I32, 0);
        f.jump(body);
        f.switch_to(body);
        let i = f.phi(SsaType::I32);
        let one = f.const_int(SsaType::I32, 1);
        let next = f.add(i, one);
        let ten = f.const_int(SsaType::I32, 10);
        let done = f.cmp(CmpKind::Eq, next, ten);
        f.branch(done, exit, body);
        f.phi_incoming(i, zero, entry);
        f.phi_incoming(i, next, body);
        f.switch_to(exit);
        f.ret(None);
        let ssa = f.finish().unwrap();

        assert_eq!(ssa.def_site(i), DefSite::Phi(body));
        let phi = ssa.phi(body, i).unwrap();
        assert_eq!(phi.value_from(entry), Some(zero));
        assert_eq!(phi.value_from(body), Some(next));
    }

    #[test]
    fn test_void_call_has_no_result() {
        let mut f = FunctionBuilder::new("c", SsaType::Void);
        let entry = f.block("entry");
        f.switch_to(entry);
        assert!(f.call("g", &[], SsaType::Void, CallEffects::all()).is_none());
        assert!(f.call("h", &[], SsaType::I32, CallEffects::empty()).is_some());
        f.ret(None);
        assert!(f.finish().is_ok());
    }

    #[test]
    fn test_natural_align() {
        assert_eq!(natural_align(SsaType::Bool), 1);
        assert_eq!(natural_align(SsaType::I32), 4);
        assert_eq!(natural_align(SsaType::Ptr(0)), 8);
        assert_eq!(natural_align(SsaType::I128), 16);
    }
}
