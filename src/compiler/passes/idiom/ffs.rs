//! Shift-until-zero loops.
//!
//! ```text
//! body:
//!   x   = phi [n, preheader], [x.next, body]
//!   cnt = phi [c0, preheader], [cnt.next, body]
//!   x.next   = x >> 1          ; or x << 1
//!   cnt.next = cnt + 1         ; or cnt - 1
//!   br (x.next == 0), exit, body
//! ```
//!
//! A right shift runs `bitwidth - ctlz(n)` times, a left shift
//! `bitwidth - cttz(n)` times. The rewrite computes that count in the preheader,
//! replaces the counter read after the loop and drives the loop with a
//! down-counting trip counter.

use std::collections::HashSet;

use log::trace;

use crate::{
    analysis::{
        ssa::{BitCountKind, CmpKind, SsaOp, SsaVarId},
        valuetracking::is_known_non_negative,
    },
    compiler::{
        events::EventKind,
        passes::idiom::{
            block_size, emit, emit_const, emit_resize, find_counter, make_countable,
            match_nonzero_test, recurrence_phi, InsertPoint, LoopIdiomRecognize,
            ShiftUntilZeroLoop,
        },
        target::{Primitive, TCC_BASIC},
    },
    Result,
};

impl LoopIdiomRecognize<'_> {
    /// Recognizes and rewrites a shift-until-zero loop.
    pub(super) fn recognize_ffs(&mut self) -> Result<bool> {
        let Some(found) = self.detect_ffs() else {
            return Ok(false);
        };
        self.transform_ffs(&found)?;
        Ok(true)
    }

    fn detect_ffs(&self) -> Option<ShiftUntilZeroLoop> {
        let ssa = &*self.ssa;
        let info = self.analyses.loops.loop_for_header(self.header)?;
        if info.back_edge_count(ssa) != 1 || info.size() != 1 {
            return None;
        }
        let body = self.header.index();
        let preheader = info.preheader(ssa)?.index();

        let shifted = match_nonzero_test(ssa, body, body)?;
        let (scan, value, arithmetic) = match ssa.def_op(shifted)? {
            SsaOp::Shl { value, amount, .. } if ssa.const_int(*amount) == Some(1) => {
                (BitCountKind::Cttz, *value, false)
            }
            SsaOp::Shr {
                value,
                amount,
                arithmetic,
                ..
            } if ssa.const_int(*amount) == Some(1) => (BitCountKind::Ctlz, *value, *arithmetic),
            _ => return None,
        };
        let primitive = match scan {
            BitCountKind::Cttz => Primitive::Cttz,
            _ => Primitive::Ctlz,
        };
        if !self.target.has_primitive(primitive) {
            return None;
        }

        let phi_x = recurrence_phi(ssa, value, shifted, body)?;
        let seed = ssa.phi(body, phi_x)?.value_from(preheader)?;
        if arithmetic && !is_known_non_negative(ssa, seed) {
            trace!("{}: arithmetic shift of a possibly negative value", ssa.name());
            return None;
        }
        let (counter, counter_phi, increment) = find_counter(ssa, body, true, false)?;

        let used_outside = |var: SsaVarId| ssa.users(var).iter().any(|u| u.block() != body);
        let phi_used_outside = used_outside(counter_phi);
        if phi_used_outside && used_outside(counter) {
            return None;
        }

        // Without a zero test in front of the loop, a zero seed runs the body once.
        let mut zero_check = false;
        if !phi_used_outside {
            let preds = ssa.block_predecessors(preheader);
            let [guard] = preds.as_slice() else {
                return None;
            };
            if match_nonzero_test(ssa, *guard, preheader) != Some(seed) {
                return None;
            }
            zero_check = true;
        }

        if block_size(ssa, body) != self.config.ffs_canonical_size
            && self.target.primitive_cost(primitive) > TCC_BASIC
        {
            trace!("{}: bit scan is not cheap enough", ssa.name());
            return None;
        }

        Some(ShiftUntilZeroLoop {
            scan,
            seed,
            shifted,
            counter,
            counter_phi,
            increment,
            phi_used_outside,
            zero_check,
        })
    }

    fn transform_ffs(&mut self, found: &ShiftUntilZeroLoop) -> Result<()> {
        let body = self.header.index();
        let preheader = self.preheader()?;
        let ssa = &mut *self.ssa;
        let at = InsertPoint::BeforeTerminator(preheader);
        let ty = ssa.var_type(found.seed);
        let counter_ty = ssa.var_type(found.counter);

        let scanned = if found.phi_used_outside {
            let one = emit_const(ssa, at, ty, 1)?;
            let seed = found.seed;
            let shift = ssa
                .def_op(found.shifted)
                .cloned()
                .ok_or_else(|| malformed_error!("shift of the loop was erased"))?;
            emit(ssa, at, ty, |dest| match shift {
                SsaOp::Shr { arithmetic, .. } => SsaOp::Shr {
                    dest,
                    value: seed,
                    amount: one,
                    arithmetic,
                },
                _ => SsaOp::Shl {
                    dest,
                    value: seed,
                    amount: one,
                },
            })?
        } else {
            found.seed
        };

        let zeros = emit(ssa, at, ty, |dest| SsaOp::BitCount {
            dest,
            kind: found.scan,
            operand: scanned,
            zero_is_undef: found.zero_check,
        })?;
        let width = emit_const(ssa, at, ty, i128::from(ty.bits()))?;
        let significant = emit(ssa, at, ty, |dest| SsaOp::Sub {
            dest,
            left: width,
            right: zeros,
        })?;
        let trip_count = if found.phi_used_outside {
            let one = emit_const(ssa, at, ty, 1)?;
            emit(ssa, at, ty, |dest| SsaOp::Add {
                dest,
                left: significant,
                right: one,
            })?
        } else {
            significant
        };

        let mut new_count = emit_resize(ssa, at, significant, counter_ty)?;
        let init = ssa
            .phi(body, found.counter_phi)
            .and_then(|p| p.value_from(preheader))
            .ok_or_else(|| malformed_error!("counter has no value from the preheader"))?;
        if found.increment == 1 {
            if ssa.const_int(init) != Some(0) {
                let counted = new_count;
                new_count = emit(ssa, at, counter_ty, |dest| SsaOp::Add {
                    dest,
                    left: counted,
                    right: init,
                })?;
            }
        } else {
            let counted = new_count;
            new_count = emit(ssa, at, counter_ty, |dest| SsaOp::Sub {
                dest,
                left: init,
                right: counted,
            })?;
        }

        make_countable(ssa, body, preheader, trip_count, CmpKind::Ne, CmpKind::Eq)?;
        let replaced = if found.phi_used_outside {
            found.counter_phi
        } else {
            found.counter
        };
        ssa.replace_uses_outside(replaced, new_count, &HashSet::from([body]));
        self.analyses.se.forget_loop(self.header);

        self.record(
            EventKind::BitScanFormed,
            format!(
                "Replaced the shift-until-zero loop in {} function with a call to {}()",
                self.ssa.name(),
                match found.scan {
                    BitCountKind::Cttz => Primitive::Cttz,
                    _ => Primitive::Ctlz,
                }
            ),
        );
        Ok(())
    }
}
