//! Element-wise buffer comparison loops.
//!
//! ```text
//! header:
//!   i  = phi [0, preheader], [i.next, latch]
//!   a  = load (p + i * w)
//!   b  = load (q + i * w)
//!   br (a == b), latch, unequal.exit
//! latch:
//!   i.next = i + 1
//!   br (i.next == n), equal.exit, header
//! ```
//!
//! Nothing computed in the loop survives it; only the exit taken matters. The
//! loop is replaced by one `bcmp(p, q, n * w)` (or `memcmp`) in the preheader and
//! a branch on its result to either exit.
//!
//! Rewriting happens in three steps, each leaving the dominator tree and the
//! loop forest valid:
//!
//! 1. The loop is cut from its preheader and given a stand-in preheader and a
//!    single stand-in exit, the dispatch block. Its exiting edges go to the
//!    dispatch block and each real exit is entered through a new "equal" or
//!    "unequal" block instead.
//! 2. The loop is deleted.
//! 3. The preheader is reconnected through the stand-in preheader, the dispatch
//!    block branches on the comparison result and the stand-ins are merged away.
//!
//! When the loop was nested, the dispatch block and the two outcome blocks form a
//! new loop in its place whose back edges are never taken, so that the parent
//! loop keeps exactly the blocks it had before.

use std::collections::HashSet;

use log::trace;

use crate::{
    analysis::{
        scev::{Expander, SymExpr},
        ssa::{CmpKind, CompareKind, InstId, SsaFunction, SsaOp, SsaType, SsaVarId, POINTER_BITS},
    },
    compiler::{
        events::EventKind,
        passes::idiom::{defined_in, emit, emit_const, ByteCompareLoop, InsertPoint, LoopIdiomRecognize},
        target::Primitive,
        transforms::{delete_dead_loop, merge_block_into_only_pred},
    },
    utils::graph::{algorithms::DomTreeUpdate, NodeId},
    Result,
};

impl LoopIdiomRecognize<'_> {
    /// Recognizes and rewrites a buffer comparison loop.
    pub(super) fn recognize_bcmp(&mut self) -> Result<bool> {
        let Some(found) = self.detect_bcmp() else {
            return Ok(false);
        };
        self.transform_bcmp(&found)
    }

    fn detect_bcmp(&self) -> Option<ByteCompareLoop> {
        if !self.target.has_primitive(Primitive::Bcmp) && !self.target.has_primitive(Primitive::MemCmp)
        {
            return None;
        }
        let ssa = &*self.ssa;
        let loops = &self.analyses.loops;
        let se = &self.analyses.se;
        let info = loops.loop_for_header(self.header)?;
        if !info.is_simplify_form(ssa) || info.size() > 2 || info.exit_edges(ssa).len() != 2 {
            return None;
        }
        let header = self.header.index();
        let latch = info.single_latch(ssa)?.index();

        let SsaOp::Branch {
            condition,
            true_target,
            false_target,
        } = ssa.terminator(header)?
        else {
            return None;
        };
        let SsaOp::Cmp {
            kind, left, right, ..
        } = ssa.def_op(*condition)?
        else {
            return None;
        };
        let equal = match kind {
            CmpKind::Eq => *true_target,
            CmpKind::Ne => *false_target,
            _ => return None,
        };
        if equal != latch {
            return None;
        }

        let SsaOp::Branch {
            condition: latch_condition,
            true_target: latch_true,
            false_target: latch_false,
        } = ssa.terminator(latch)?
        else {
            return None;
        };
        if !matches!(ssa.def_op(*latch_condition), Some(SsaOp::Cmp { .. }))
            || (*latch_true != header && *latch_false != header)
        {
            return None;
        }

        let blocks: HashSet<usize> = info.blocks().into_iter().map(NodeId::index).collect();
        let load_a = ssa.def_instruction(*left)?;
        let load_b = ssa.def_instruction(*right)?;
        let (
            SsaOp::Load {
                addr: addr_a,
                flags: flags_a,
                ..
            },
            SsaOp::Load {
                addr: addr_b,
                flags: flags_b,
                ..
            },
        ) = (ssa.op(load_a)?, ssa.op(load_b)?)
        else {
            return None;
        };
        if !blocks.contains(&ssa.def_block(*left)?) || !blocks.contains(&ssa.def_block(*right)?) {
            return None;
        }

        if let Some(var) = defined_in(ssa, &blocks)
            .into_iter()
            .find(|&v| ssa.users(v).iter().any(|u| !blocks.contains(&u.block())))
        {
            trace!("{}: {} is used after the compare loop", ssa.name(), var);
            return None;
        }
        if !only_reads_through(ssa, &blocks, [load_a, load_b]) {
            trace!("{}: compare loop has other side effects", ssa.name());
            return None;
        }

        let ty = ssa.var_type(*left);
        if !ty.is_integer() || ty.bits() % 8 != 0 {
            return None;
        }
        let width = i128::from(ty.store_size());

        let rec_a = se.affine_recurrence(ssa, loops, *addr_a, self.header)?;
        let rec_b = se.affine_recurrence(ssa, loops, *addr_b, self.header)?;
        if rec_a.constant_step() != Some(width) || rec_b.constant_step() != Some(width) {
            return None;
        }
        let available = |expr: &SymExpr| {
            se.is_available_at_loop_entry(ssa, loops, &self.analyses.dom, expr, self.header)
        };
        if !available(&rec_a.start) || !available(&rec_b.start) {
            return None;
        }

        let exit_count = se.exit_count(ssa, loops, self.header, NodeId::new(latch))?;
        if exit_count.bits > POINTER_BITS || !available(&exit_count.count) {
            return None;
        }
        let iterations = se.add(ssa, loops, &exit_count.count, &SymExpr::Constant(1));
        let iterations = if exit_count.bits < POINTER_BITS {
            iterations.zext(exit_count.bits)
        } else {
            iterations
        };
        let num_bytes = se.mul(ssa, loops, &iterations, &SymExpr::Constant(width));

        let space = |addr: SsaVarId| ssa.var_type(addr).address_space().unwrap_or(0);
        if space(*addr_a) != 0 || space(*addr_b) != 0 || !flags_a.is_simple() || !flags_b.is_simple()
        {
            self.record_missed(
                "Unsupported loads in idiom - only support identical, simple loads from address space 0.",
            );
            return None;
        }

        Some(ByteCompareLoop {
            compare: *condition,
            load_a,
            load_b,
            src_a: rec_a.start,
            src_b: rec_b.start,
            num_bytes,
            latch,
        })
    }

    fn transform_bcmp(&mut self, found: &ByteCompareLoop) -> Result<bool> {
        let header = self.header;
        let preheader = self.preheader()?;
        let (parent, exit_edges) = {
            let info = self
                .analyses
                .loops
                .loop_for_header(header)
                .ok_or_else(|| malformed_error!("no loop headed by {}", header))?;
            (info.parent, info.exit_edges(self.ssa))
        };

        let Some((compared_equal, primitive)) = self.emit_compare(found, preheader)? else {
            return Ok(false);
        };
        self.analyses.se.forget_loop(header);

        // Cut the loop loose and give it a stand-in preheader and a single exit.
        let ssa = &mut *self.ssa;
        let h = header.index();
        if let Some(terminator) = ssa.terminator_id(preheader) {
            ssa.erase(terminator);
        }
        let phony_preheader = ssa.add_block("bcmp.preheader");
        ssa.push(phony_preheader, SsaOp::Jump { target: h });
        ssa.replace_phi_predecessor(h, preheader, phony_preheader);
        let dispatch = ssa.add_block("bcmp.dispatch");
        ssa.push(dispatch, SsaOp::Unreachable);
        let equal = ssa.add_block("bcmp.equal");
        let unequal = ssa.add_block("bcmp.unequal");

        let mut updates = vec![
            DomTreeUpdate::delete(preheader, h),
            DomTreeUpdate::insert(phony_preheader, h),
        ];
        let mut outcomes = Vec::with_capacity(2);
        for (exiting, exit) in exit_edges {
            let (from, to) = (exiting.index(), exit.index());
            let outcome = if from == found.latch { equal } else { unequal };
            ssa.push(outcome, SsaOp::Jump { target: to });
            ssa.replace_phi_predecessor(to, from, outcome);
            ssa.redirect_edge(from, to, dispatch);
            updates.extend([
                DomTreeUpdate::insert(outcome, to),
                DomTreeUpdate::delete(from, to),
                DomTreeUpdate::insert(from, dispatch),
            ]);
            outcomes.push((outcome, to));
        }
        self.analyses.dom.apply_updates(&*self.ssa, &updates)?;

        delete_dead_loop(self.ssa, self.analyses, header)?;
        self.lpm.mark_loop_deleted(header);

        // Reconnect the preheader and decide the exit by the comparison.
        let ssa = &mut *self.ssa;
        ssa.push(preheader, SsaOp::Jump { target: phony_preheader });
        ssa.set_terminator(
            dispatch,
            SsaOp::Branch {
                condition: compared_equal,
                true_target: equal,
                false_target: unequal,
            },
        );
        self.analyses.dom.apply_updates(
            &*self.ssa,
            &[
                DomTreeUpdate::insert(preheader, phony_preheader),
                DomTreeUpdate::insert(dispatch, equal),
                DomTreeUpdate::insert(dispatch, unequal),
            ],
        )?;
        merge_block_into_only_pred(self.ssa, self.analyses, dispatch)?;

        match parent {
            None => {
                self.analyses.loops.remove_block(NodeId::new(preheader));
                merge_block_into_only_pred(self.ssa, self.analyses, dispatch)?;
            }
            Some(parent) => {
                let ssa = &mut *self.ssa;
                let mut updates = Vec::with_capacity(2);
                for (outcome, to) in outcomes {
                    let always = emit_const(
                        ssa,
                        InsertPoint::BeforeTerminator(outcome),
                        SsaType::Bool,
                        1,
                    )?;
                    ssa.set_terminator(
                        outcome,
                        SsaOp::Branch {
                            condition: always,
                            true_target: to,
                            false_target: dispatch,
                        },
                    );
                    updates.push(DomTreeUpdate::insert(outcome, dispatch));
                }
                self.analyses.dom.apply_updates(&*self.ssa, &updates)?;
                self.analyses.loops.add_loop(
                    NodeId::new(dispatch),
                    Some(parent),
                    &[
                        NodeId::new(dispatch),
                        NodeId::new(equal),
                        NodeId::new(unequal),
                    ],
                );
            }
        }

        self.record(
            EventKind::CompareFormed,
            format!(
                "Transformed bcmp idiom into a call to {}() function",
                primitive
            ),
        );
        Ok(true)
    }

    /// Emits the comparison primitive and the test of its result at the end of
    /// `preheader`.
    ///
    /// # Returns
    ///
    /// The `equal` flag and the primitive called, or `None` if an operand could
    /// not be expanded. Nothing is left behind in that case.
    fn emit_compare(
        &mut self,
        found: &ByteCompareLoop,
        preheader: usize,
    ) -> Result<Option<(SsaVarId, Primitive)>> {
        let ty_a = pointer_type(self.ssa, found.load_a)?;
        let ty_b = pointer_type(self.ssa, found.load_b)?;
        let (kind, primitive) = if self.target.has_primitive(Primitive::Bcmp) {
            (CompareKind::Bcmp, Primitive::Bcmp)
        } else {
            (CompareKind::Memcmp, Primitive::MemCmp)
        };

        let analyses = &*self.analyses;
        let mut expander = Expander::new(self.ssa, &analyses.se, &analyses.loops, preheader);
        let Ok((left, right, len)) = expand_operands(&mut expander, found, ty_a, ty_b) else {
            trace!("compare loop {}: operands cannot be expanded", self.header);
            expander.rollback();
            return Ok(None);
        };

        let ssa = expander.function_mut();
        let at = InsertPoint::BeforeTerminator(preheader);
        let result = emit(ssa, at, SsaType::I32, |dest| SsaOp::MemCmp {
            dest,
            kind,
            left,
            right,
            len,
        })?;
        let zero = emit_const(ssa, at, SsaType::I32, 0)?;
        let compared_equal = emit(ssa, at, SsaType::Bool, |dest| SsaOp::Cmp {
            dest,
            kind: CmpKind::Eq,
            left: result,
            right: zero,
        })?;
        Ok(Some((compared_equal, primitive)))
    }
}

/// Returns `true` if nothing in `blocks` but `loads` and the terminators touches
/// memory, may unwind or is atomic.
fn only_reads_through(ssa: &SsaFunction, blocks: &HashSet<usize>, loads: [InstId; 2]) -> bool {
    blocks.iter().all(|&block| {
        ssa.block_ops(block).all(|(id, op)| {
            loads.contains(&id)
                || op.is_terminator()
                || !(op.has_side_effects()
                    || matches!(op, SsaOp::Load { flags, .. } if flags.is_atomic()))
        })
    })
}

fn expand_operands(
    expander: &mut Expander<'_>,
    found: &ByteCompareLoop,
    ty_a: SsaType,
    ty_b: SsaType,
) -> Result<(SsaVarId, SsaVarId, SsaVarId)> {
    let left = expander.expand(&found.src_a, ty_a)?;
    let right = expander.expand(&found.src_b, ty_b)?;
    let len = expander.expand(&found.num_bytes, SsaType::I64)?;
    Ok((left, right, len))
}

/// Returns the type of the address a load reads from.
fn pointer_type(ssa: &SsaFunction, load: InstId) -> Result<SsaType> {
    match ssa.op(load) {
        Some(SsaOp::Load { addr, .. }) => Ok(ssa.var_type(*addr)),
        _ => Err(malformed_error!("compared value is no longer loaded")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::{
            analyses::{FunctionAnalyses, LoopPassManager},
            config::IdiomConfig,
            events::EventLog,
            target::{Primitives, TargetInfo},
        },
        emulation::Interpreter,
        test::fixtures,
    };

    struct Outcome {
        changed: bool,
        events: EventLog,
        analyses: FunctionAnalyses,
    }

    fn recognize(ssa: &mut SsaFunction, header: usize, target: &TargetInfo) -> Outcome {
        let mut analyses = FunctionAnalyses::compute(ssa);
        let mut lpm = LoopPassManager::new();
        let config = IdiomConfig::default();
        let events = EventLog::new();
        let changed = {
            let mut recognizer =
                LoopIdiomRecognize::new(ssa, &mut analyses, &mut lpm, target, &config, &events);
            recognizer.run_on_loop(NodeId::new(header)).unwrap()
        };
        ssa.verify().unwrap();
        analyses.verify(ssa).unwrap();
        Outcome {
            changed,
            events,
            analyses,
        }
    }

    fn compare_kinds(ssa: &SsaFunction) -> Vec<CompareKind> {
        ssa.live_blocks()
            .flat_map(|b| {
                ssa.block_ops(b)
                    .filter_map(|(_, op)| match op {
                        SsaOp::MemCmp { kind, .. } => Some(*kind),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn run_on(ssa: &SsaFunction, a: &[u8], b: &[u8], n: u128) -> Option<u128> {
        Interpreter::new(ssa)
            .with_memory(0x1000, a)
            .with_memory(0x2000, b)
            .run(&[0x1000, 0x2000, n])
            .unwrap()
    }

    #[test]
    fn test_compare_loop_becomes_bcmp() {
        let mut fixture = fixtures::byte_compare(SsaType::I8);
        let outcome = recognize(&mut fixture.ssa, fixture.header, &TargetInfo::default());

        assert!(outcome.changed);
        assert!(outcome.events.has(EventKind::CompareFormed));
        assert!(!fixture.ssa.is_live_block(fixture.header));
        assert!(!fixture.ssa.is_live_block(fixture.latch));
        assert!(outcome.analyses.loops.is_empty());
        assert_eq!(compare_kinds(&fixture.ssa), vec![CompareKind::Bcmp]);
    }

    #[test]
    fn test_memcmp_without_bcmp() {
        let mut fixture = fixtures::byte_compare(SsaType::I32);
        let mut target = TargetInfo::default();
        target.primitives.remove(Primitives::BCMP);
        let outcome = recognize(&mut fixture.ssa, fixture.header, &target);

        assert!(outcome.changed);
        assert_eq!(compare_kinds(&fixture.ssa), vec![CompareKind::Memcmp]);
    }

    #[test]
    fn test_no_compare_primitive() {
        let mut fixture = fixtures::byte_compare(SsaType::I8);
        let mut target = TargetInfo::default();
        target.primitives.remove(Primitives::BCMP | Primitives::MEMCMP);
        let outcome = recognize(&mut fixture.ssa, fixture.header, &target);
        assert!(!outcome.changed);
    }

    #[test]
    fn test_result_is_preserved() {
        let a = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let cases: [(&[u8], u128); 5] = [
            (&[1, 2, 3, 4, 5, 6, 7, 8], 8),
            (&[1, 2, 3, 4, 5, 6, 7, 9], 8),
            (&[1, 2, 3, 4, 5, 6, 7, 9], 7),
            (&[0, 2, 3, 4, 5, 6, 7, 8], 1),
            (&[1, 2, 3, 4, 5, 6, 7, 8], 1),
        ];
        let original = fixtures::byte_compare(SsaType::I8).ssa;
        let mut fixture = fixtures::byte_compare(SsaType::I8);
        recognize(&mut fixture.ssa, fixture.header, &TargetInfo::default());
        for (b, n) in cases {
            assert_eq!(
                run_on(&original, &a, b, n),
                run_on(&fixture.ssa, &a, b, n),
                "n = {}",
                n
            );
        }
    }

    #[test]
    fn test_wide_elements_scale_length() {
        let a = [0u8; 16];
        let mut b = [0u8; 16];
        b[13] = 1;
        let original = fixtures::byte_compare(SsaType::I32).ssa;
        let mut fixture = fixtures::byte_compare(SsaType::I32);
        recognize(&mut fixture.ssa, fixture.header, &TargetInfo::default());
        for n in [1u128, 3, 4] {
            assert_eq!(run_on(&original, &a, &b, n), run_on(&fixture.ssa, &a, &b, n));
        }
    }

    #[test]
    fn test_volatile_load_is_missed() {
        let mut fixture = fixtures::byte_compare(SsaType::I8);
        let load = fixture
            .ssa
            .block_ops(fixture.header)
            .find(|(_, op)| matches!(op, SsaOp::Load { .. }))
            .map(|(id, _)| id)
            .unwrap();
        if let Some(SsaOp::Load { flags, .. }) = fixture.ssa.op_mut(load) {
            *flags = crate::analysis::ssa::MemFlags::VOLATILE;
        }
        let outcome = recognize(&mut fixture.ssa, fixture.header, &TargetInfo::default());

        assert!(!outcome.changed);
        assert!(outcome.events.has(EventKind::IdiomMissed));
    }

    #[test]
    fn test_nested_compare_keeps_parent_loop() {
        let original = fixtures::byte_compare_nested(SsaType::I8).ssa;
        let mut fixture = fixtures::byte_compare_nested(SsaType::I8);
        let outcome = recognize(&mut fixture.ssa, fixture.header, &TargetInfo::default());

        assert!(outcome.changed);
        let loops = &outcome.analyses.loops;
        assert_eq!(loops.len(), 2);
        let phony = loops
            .loops()
            .iter()
            .find(|l| l.header != NodeId::new(fixture.outer))
            .unwrap();
        assert_eq!(phony.parent, Some(NodeId::new(fixture.outer)));
        assert_eq!(phony.size(), 3);

        let a = [7u8, 7, 7, 7];
        for (b, n, m) in [([7u8, 7, 7, 7], 4u128, 3u128), ([7, 7, 0, 7], 4, 2), ([7, 7, 0, 7], 2, 5)] {
            let expected = Interpreter::new(&original)
                .with_memory(0x1000, &a)
                .with_memory(0x2000, &b)
                .run(&[0x1000, 0x2000, n, m])
                .unwrap();
            let actual = Interpreter::new(&fixture.ssa)
                .with_memory(0x1000, &a)
                .with_memory(0x2000, &b)
                .run(&[0x1000, 0x2000, n, m])
                .unwrap();
            assert_eq!(expected, actual);
        }
    }
}
