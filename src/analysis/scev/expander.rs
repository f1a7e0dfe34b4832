//! Materializes symbolic expressions as SSA instructions.
//!
//! An [`Expander`] appends code to one block, in front of its terminator. Every
//! inserted instruction is recorded so that a transform which gives up after
//! expanding part of its operands can remove them again with
//! [`Expander::rollback`].

use crate::{
    analysis::{
        cfg::LoopForest,
        scev::{ScalarEvolution, SymExpr},
        ssa::{CastKind, ConstValue, InstId, SsaFunction, SsaOp, SsaType, SsaVarId},
    },
    utils::graph::NodeId,
    Error, Result,
};

/// Emits code for [`SymExpr`]s at the end of a block.
pub struct Expander<'a> {
    ssa: &'a mut SsaFunction,
    se: &'a ScalarEvolution,
    loops: &'a LoopForest,
    block: usize,
    inserted: Vec<InstId>,
}

impl<'a> Expander<'a> {
    /// Creates an expander that inserts before the terminator of `block`.
    pub fn new(
        ssa: &'a mut SsaFunction,
        se: &'a ScalarEvolution,
        loops: &'a LoopForest,
        block: usize,
    ) -> Self {
        Self {
            ssa,
            se,
            loops,
            block,
            inserted: Vec::new(),
        }
    }

    /// Returns the instructions inserted so far, in insertion order.
    #[must_use]
    pub fn inserted(&self) -> &[InstId] {
        &self.inserted
    }

    /// Gives access to the function being expanded into.
    pub fn function_mut(&mut self) -> &mut SsaFunction {
        &mut *self.ssa
    }

    /// Emits code computing `expr` as a value of type `ty`.
    ///
    /// Pointer-typed results are formed as a pointer base plus a byte offset when
    /// the expression has a pointer term with coefficient one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] for a recurrence that has no matching phi
    /// in its loop header.
    pub fn expand(&mut self, expr: &SymExpr, ty: SsaType) -> Result<SsaVarId> {
        match expr {
            SymExpr::Constant(c) => Ok(self.constant(ty, *c)),
            SymExpr::Value(v) => Ok(self.convert(*v, ty)),
            SymExpr::ZeroExtend { operand, bits } => {
                let narrow = SsaType::int(*bits)
                    .ok_or_else(|| Error::NotSupported(format!("extension from i{}", bits)))?;
                let inner = self.expand(operand, narrow)?;
                Ok(self.convert_unsigned(inner, ty))
            }
            SymExpr::Product(factors) => {
                let int_ty = integer_type(ty);
                let mut acc: Option<SsaVarId> = None;
                for factor in factors {
                    let value = self.expand(factor, int_ty)?;
                    acc = Some(match acc {
                        Some(prev) => self.binary(int_ty, prev, value, BinaryKind::Mul),
                        None => value,
                    });
                }
                let product = acc.ok_or_else(|| Error::NotSupported("empty product".into()))?;
                Ok(self.convert(product, ty))
            }
            SymExpr::Sum { constant, terms } => self.expand_sum(*constant, terms, ty),
            SymExpr::AddRec { header, .. } => {
                let phi = self.find_recurrence_phi(expr, *header).ok_or_else(|| {
                    Error::NotSupported(format!("no phi computes recurrence {}", expr))
                })?;
                Ok(self.convert(phi, ty))
            }
        }
    }

    /// Erases every instruction this expander inserted.
    pub fn rollback(self) {
        for id in self.inserted.into_iter().rev() {
            self.ssa.erase(id);
        }
    }

    fn expand_sum(&mut self, constant: i128, terms: &[(SymExpr, i128)], ty: SsaType) -> Result<SsaVarId> {
        if ty.is_pointer() {
            let base = terms
                .iter()
                .position(|(t, k)| *k == 1 && self.is_pointer_expr(t));
            if let Some(index) = base {
                let base_ptr = self.expand(&terms[index].0, ty)?;
                let rest: Vec<(SymExpr, i128)> = terms
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index)
                    .map(|(_, t)| t.clone())
                    .collect();
                let offset_expr = SymExpr::from_terms(constant, rest);
                if offset_expr.is_zero() {
                    return Ok(base_ptr);
                }
                let offset = self.expand(&offset_expr, SsaType::I64)?;
                let dest = self.ssa.new_var(ty);
                self.emit(SsaOp::PtrAdd {
                    dest,
                    base: base_ptr,
                    offset,
                });
                return Ok(dest);
            }
        }

        let int_ty = integer_type(ty);
        let mut acc: Option<SsaVarId> = None;
        for (term, k) in terms {
            let value = self.expand(term, int_ty)?;
            acc = Some(match (acc, *k) {
                (None, 1) => value,
                (None, k) => {
                    let factor = self.constant(int_ty, k);
                    self.binary(int_ty, value, factor, BinaryKind::Mul)
                }
                (Some(prev), 1) => self.binary(int_ty, prev, value, BinaryKind::Add),
                (Some(prev), -1) => self.binary(int_ty, prev, value, BinaryKind::Sub),
                (Some(prev), k) => {
                    let factor = self.constant(int_ty, k);
                    let scaled = self.binary(int_ty, value, factor, BinaryKind::Mul);
                    self.binary(int_ty, prev, scaled, BinaryKind::Add)
                }
            });
        }
        let mut sum = match acc {
            Some(v) => v,
            None => self.constant(int_ty, 0),
        };
        if constant != 0 {
            let c = self.constant(int_ty, constant);
            sum = self.binary(int_ty, sum, c, BinaryKind::Add);
        }
        Ok(self.convert(sum, ty))
    }

    fn is_pointer_expr(&self, expr: &SymExpr) -> bool {
        match expr {
            SymExpr::Value(v) => self.ssa.var_type(*v).is_pointer(),
            SymExpr::AddRec { start, .. } => self.is_pointer_expr(start),
            SymExpr::Sum { terms, .. } => terms
                .iter()
                .any(|(t, k)| *k == 1 && self.is_pointer_expr(t)),
            _ => false,
        }
    }

    fn find_recurrence_phi(&self, expr: &SymExpr, header: NodeId) -> Option<SsaVarId> {
        let block = self.ssa.block(header.index())?;
        block
            .phi_nodes()
            .iter()
            .map(|phi| phi.result())
            .find(|&phi| self.se.expr(&*self.ssa, self.loops, phi) == *expr)
    }

    fn emit(&mut self, op: SsaOp) -> InstId {
        let id = self.ssa.insert_before_terminator(self.block, op);
        self.inserted.push(id);
        id
    }

    fn constant(&mut self, ty: SsaType, value: i128) -> SsaVarId {
        let dest = self.ssa.new_var(ty);
        if ty.is_pointer() && value != 0 {
            let int = self.constant(SsaType::I64, value);
            self.emit(SsaOp::Cast {
                dest,
                kind: CastKind::IntToPtr,
                operand: int,
            });
        } else {
            self.emit(SsaOp::Const {
                dest,
                value: ConstValue::int(ty, value),
            });
        }
        dest
    }

    fn binary(&mut self, ty: SsaType, left: SsaVarId, right: SsaVarId, kind: BinaryKind) -> SsaVarId {
        let dest = self.ssa.new_var(ty);
        self.emit(match kind {
            BinaryKind::Add => SsaOp::Add { dest, left, right },
            BinaryKind::Sub => SsaOp::Sub { dest, left, right },
            BinaryKind::Mul => SsaOp::Mul { dest, left, right },
        });
        dest
    }

    fn cast(&mut self, kind: CastKind, operand: SsaVarId, ty: SsaType) -> SsaVarId {
        let dest = self.ssa.new_var(ty);
        self.emit(SsaOp::Cast {
            dest,
            kind,
            operand,
        });
        dest
    }

    /// Converts `var` to `ty`, sign-extending narrower integers.
    fn convert(&mut self, var: SsaVarId, ty: SsaType) -> SsaVarId {
        self.convert_with(var, ty, CastKind::SExt)
    }

    /// Converts `var` to `ty`, zero-extending narrower integers.
    fn convert_unsigned(&mut self, var: SsaVarId, ty: SsaType) -> SsaVarId {
        self.convert_with(var, ty, CastKind::ZExt)
    }

    fn convert_with(&mut self, var: SsaVarId, ty: SsaType, extend: CastKind) -> SsaVarId {
        let from = self.ssa.var_type(var);
        if from == ty {
            return var;
        }
        match (from.is_pointer(), ty.is_pointer()) {
            (true, true) => {
                let int = self.cast(CastKind::PtrToInt, var, SsaType::I64);
                self.cast(CastKind::IntToPtr, int, ty)
            }
            (true, false) => {
                let int = self.cast(CastKind::PtrToInt, var, SsaType::I64);
                self.convert_with(int, ty, extend)
            }
            (false, true) => {
                let int = self.convert_with(var, SsaType::I64, extend);
                self.cast(CastKind::IntToPtr, int, ty)
            }
            (false, false) if from.bits() > ty.bits() => self.cast(CastKind::Trunc, var, ty),
            (false, false) => self.cast(extend, var, ty),
        }
    }
}

#[derive(Clone, Copy)]
enum BinaryKind {
    Add,
    Sub,
    Mul,
}

/// Integer type used for arithmetic feeding a value of type `ty`.
fn integer_type(ty: SsaType) -> SsaType {
    if ty.is_pointer() {
        SsaType::I64
    } else {
        ty
    }
}
