//! Population count loops.
//!
//! ```text
//! precondition:
//!   br (x != 0), preheader, exit
//! body:
//!   x1  = phi [x, preheader], [x2, body]
//!   cnt = phi [0, preheader], [c2, body]
//!   c2  = cnt + 1
//!   x2  = x1 & (x1 - 1)
//!   br (x2 != 0), body, exit
//! ```
//!
//! The loop runs once per set bit of `x`. The rewrite computes `ctpop(x)` in
//! the precondition block, tests it instead of `x`, replaces the counter after
//! the loop by it and drives the loop with a down-counting trip counter, so that
//! later passes can delete it once nothing reads its values.

use std::collections::HashSet;

use log::trace;

use crate::{
    analysis::ssa::{BitCountKind, CmpKind, SsaFunction, SsaOp, SsaType, SsaVarId},
    compiler::{
        events::EventKind,
        passes::idiom::{
            block_size, emit, emit_const, emit_resize, find_counter, is_bare_jump,
            make_countable, match_nonzero_test, recurrence_phi, InsertPoint, LoopIdiomRecognize,
            PopcountLoop,
        },
        target::Primitive,
    },
    Result,
};

impl LoopIdiomRecognize<'_> {
    /// Recognizes and rewrites a population count loop.
    pub(super) fn recognize_popcount(&mut self) -> Result<bool> {
        let Some(found) = self.detect_popcount() else {
            return Ok(false);
        };
        self.transform_popcount(&found)?;
        Ok(true)
    }

    fn detect_popcount(&self) -> Option<PopcountLoop> {
        if !self.target.fast_popcount || !self.target.has_primitive(Primitive::Ctpop) {
            return None;
        }
        let ssa = &*self.ssa;
        let info = self.analyses.loops.loop_for_header(self.header)?;
        if info.back_edge_count(ssa) != 1 || info.size() != 1 {
            return None;
        }
        let body = self.header.index();
        if block_size(ssa, body) >= self.config.popcount_max_body_size {
            trace!("{}: popcount candidate b{} is too large", ssa.name(), body);
            return None;
        }

        let preheader = info.preheader(ssa)?.index();
        if !is_bare_jump(ssa, preheader) {
            return None;
        }
        let preds = ssa.block_predecessors(preheader);
        let [precondition] = preds.as_slice() else {
            return None;
        };
        if !matches!(ssa.terminator(*precondition), Some(SsaOp::Branch { .. })) {
            return None;
        }

        let cleared = match_nonzero_test(ssa, body, body)?;
        let x1 = match_clear_lowest_bit(ssa, cleared)?;
        let phi_x = recurrence_phi(ssa, x1, cleared, body)?;
        let (counter, counter_phi, _) = find_counter(ssa, body, false, true)?;

        let seed = match_nonzero_test(ssa, *precondition, preheader)?;
        let phi = ssa.phi(body, phi_x)?;
        if phi.value_from(preheader) != Some(seed) {
            return None;
        }
        Some(PopcountLoop {
            precondition: *precondition,
            counter,
            counter_phi,
            seed,
        })
    }

    fn transform_popcount(&mut self, found: &PopcountLoop) -> Result<()> {
        let body = self.header.index();
        let preheader = self.preheader()?;
        let ssa = &mut *self.ssa;
        let at = InsertPoint::BeforeTerminator(found.precondition);
        let count_ty = ssa.var_type(found.counter_phi);
        let seed_ty = ssa.var_type(found.seed);

        let popcount = emit(ssa, at, seed_ty, |dest| SsaOp::BitCount {
            dest,
            kind: BitCountKind::Ctpop,
            operand: found.seed,
            zero_is_undef: false,
        })?;
        let trip_count = emit_resize(ssa, at, popcount, count_ty)?;
        let init = ssa
            .phi(body, found.counter_phi)
            .and_then(|p| p.value_from(preheader))
            .ok_or_else(|| malformed_error!("counter has no value from the preheader"))?;
        let new_count = if ssa.const_int(init) == Some(0) {
            trip_count
        } else {
            emit(ssa, at, count_ty, |dest| SsaOp::Add {
                dest,
                left: trip_count,
                right: init,
            })?
        };

        retarget_precondition(ssa, found.precondition, trip_count, count_ty)?;
        make_countable(ssa, body, preheader, trip_count, CmpKind::Ugt, CmpKind::Sle)?;
        ssa.replace_uses_outside(found.counter, new_count, &HashSet::from([body]));
        self.analyses.se.forget_loop(self.header);

        self.record(
            EventKind::PopcountFormed,
            format!(
                "Replaced the population count loop in {} function with a call to ctpop()",
                self.ssa.name()
            ),
        );
        Ok(())
    }
}

/// Matches `x & (x - 1)` and returns `x`.
fn match_clear_lowest_bit(ssa: &SsaFunction, var: SsaVarId) -> Option<SsaVarId> {
    let SsaOp::And { left, right, .. } = ssa.def_op(var)? else {
        return None;
    };
    [(*left, *right), (*right, *left)]
        .into_iter()
        .find_map(|(dec, x)| is_decrement_of(ssa, dec, x).then_some(x))
}

/// Returns `true` if `dec` is `x - 1` or `x + (-1)`.
fn is_decrement_of(ssa: &SsaFunction, dec: SsaVarId, x: SsaVarId) -> bool {
    match ssa.def_op(dec) {
        Some(SsaOp::Add { left, right, .. }) => *left == x && ssa.const_int(*right) == Some(-1),
        Some(SsaOp::Sub { left, right, .. }) => *left == x && ssa.const_int(*right) == Some(1),
        _ => false,
    }
}

/// Makes the precondition branch test `count` against zero instead of the seed.
fn retarget_precondition(
    ssa: &mut SsaFunction,
    precondition: usize,
    count: SsaVarId,
    ty: SsaType,
) -> Result<()> {
    let terminator = ssa
        .terminator_id(precondition)
        .ok_or_else(|| malformed_error!("precondition b{} has no terminator", precondition))?;
    let Some(SsaOp::Branch { condition, .. }) = ssa.op(terminator).cloned() else {
        return Err(malformed_error!("precondition b{} does not branch", precondition));
    };
    let Some(SsaOp::Cmp { kind, .. }) = ssa.def_op(condition).cloned() else {
        return Err(malformed_error!("precondition b{} does not compare", precondition));
    };

    let at = InsertPoint::Before(terminator);
    let zero = emit_const(ssa, at, ty, 0)?;
    let tested = emit(ssa, at, SsaType::Bool, |dest| SsaOp::Cmp {
        dest,
        kind,
        left: count,
        right: zero,
    })?;
    if let Some(SsaOp::Branch { condition: c, .. }) = ssa.op_mut(terminator) {
        *c = tested;
    }
    if !ssa.has_uses(condition) {
        if let Some(old) = ssa.def_instruction(condition) {
            ssa.erase(old);
        }
    }
    Ok(())
}
