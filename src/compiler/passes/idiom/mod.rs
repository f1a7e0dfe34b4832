//! Loop idiom recognition.
//!
//! This pass looks for loops that compute one of a fixed set of well-known shapes
//! and replaces them, or the part of them that forms the shape, with a single
//! primitive.
//!
//! # Idioms
//!
//! | Loop shape                                   | Replacement                    |
//! |----------------------------------------------|--------------------------------|
//! | strided stores of a byte-uniform value       | `memset`                       |
//! | strided stores of a constant (≤ 16 bytes)    | `memset_pattern16`             |
//! | strided store of a same-strided load         | `memcpy`                       |
//! | existing `memset` per iteration, contiguous  | one wider `memset`             |
//! | element-wise equality compare of two buffers | `bcmp` / `memcmp`, loop erased |
//! | `x &= x - 1` with a `+1` counter             | `ctpop`, loop made countable   |
//! | `x >>= 1` / `x <<= 1` until zero, counted    | `ctlz` / `cttz`, made countable|
//!
//! # Dispatch
//!
//! Loops are visited innermost first. A loop needs a preheader, and functions
//! named after one of the library primitives are left alone. If the target has
//! any library primitive and the loop has a computable back-edge-taken count, the
//! store based rewrites of [`countable`] run; otherwise the loop is offered to
//! the byte compare, find-first-set and popcount matchers, in that order, and the
//! first that applies wins.
//!
//! Every matcher is a pure detector producing an [`IdiomMatch`]; the rewrite
//! consumes it immediately. A rejected candidate leaves the function untouched.
//!
//! # Example
//!
//! Before:
//! ```text
//! body:
//!   i = phi [0, preheader], [next, body]
//!   addr = p + i * 4
//!   store.i32 addr, 0
//!   next = i + 1
//!   br (next == n), exit, body
//! ```
//!
//! After:
//! ```text
//! preheader:
//!   memset p, 0, n * 4
//! body:
//!   i = phi [0, preheader], [next, body]
//!   next = i + 1
//!   br (next == n), exit, body
//! ```

mod bcmp;
mod countable;
mod ffs;
mod popcount;
mod stores;

use std::collections::HashSet;

use log::{debug, trace};

use crate::{
    analysis::{
        scev::SymExpr,
        ssa::{
            BitCountKind, CastKind, CmpKind, ConstValue, InstId, SsaFunction, SsaOp, SsaType,
            SsaVarId,
        },
    },
    compiler::{
        analyses::{FunctionAnalyses, LoopPassManager},
        config::IdiomConfig,
        events::{EventKind, EventLog},
        pass::SsaPass,
        target::{Primitive, TargetInfo},
        CompilerContext,
    },
    utils::graph::NodeId,
    Result,
};

/// Name the pass reports in events.
pub const PASS_NAME: &str = "loop-idiom";

/// A strided fill of a value over the iterations of a loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StridedFill {
    /// Instructions the fill replaces.
    pub stores: Vec<InstId>,
    /// The first store of the run; it supplies value and alignment.
    pub head: InstId,
    /// The stored value.
    pub value: SsaVarId,
    /// Address of the head store on the first iteration.
    pub start: SymExpr,
    /// Address increment per iteration, in bytes.
    pub stride: i128,
    /// Bytes written per iteration.
    pub size: u64,
    /// Alignment of the head store.
    pub align: u32,
    /// Address space of the stored-to pointer.
    pub address_space: u32,
    /// The run moves towards lower addresses.
    pub negative: bool,
    /// The run is one existing fill primitive being widened.
    pub whole_loop_fill: bool,
}

/// A strided store of a same-strided load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StridedCopy {
    /// The store.
    pub store: InstId,
    /// The load feeding the store.
    pub load: InstId,
    /// Address of the store on the first iteration.
    pub store_start: SymExpr,
    /// Address of the load on the first iteration.
    pub load_start: SymExpr,
    /// Address increment per iteration, in bytes.
    pub stride: i128,
    /// Bytes copied per iteration.
    pub size: u64,
    /// Alignment of the store.
    pub store_align: u32,
    /// Alignment of the load.
    pub load_align: u32,
    /// Address space of the store pointer.
    pub store_space: u32,
    /// Address space of the load pointer.
    pub load_space: u32,
    /// The store or the load is an unordered atomic access.
    pub atomic: bool,
}

/// A clear-lowest-set-bit loop counting the set bits of its seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopcountLoop {
    /// Block ending in the `seed != 0` test in front of the preheader.
    pub precondition: usize,
    /// The counter increment `cnt + 1`.
    pub counter: SsaVarId,
    /// The counter phi.
    pub counter_phi: SsaVarId,
    /// The value whose bits are counted.
    pub seed: SsaVarId,
}

/// A shift-until-zero loop counting the significant bits of its seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftUntilZeroLoop {
    /// `Ctlz` for right shifts, `Cttz` for left shifts.
    pub scan: BitCountKind,
    /// The value entering the loop.
    pub seed: SsaVarId,
    /// The shifted value `x >> 1` or `x << 1`.
    pub shifted: SsaVarId,
    /// The counter update `cnt ± 1`.
    pub counter: SsaVarId,
    /// The counter phi.
    pub counter_phi: SsaVarId,
    /// `1` for an incrementing counter, `-1` for a decrementing one.
    pub increment: i128,
    /// The counter phi, rather than its update, is read after the loop.
    pub phi_used_outside: bool,
    /// A zero test on the seed guards the loop, so the scan may treat zero as undefined.
    pub zero_check: bool,
}

/// An element-wise equality comparison of two buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteCompareLoop {
    /// The equality comparison of the two loaded elements.
    pub compare: SsaVarId,
    /// Load from the first buffer.
    pub load_a: InstId,
    /// Load from the second buffer.
    pub load_b: InstId,
    /// First buffer.
    pub src_a: SymExpr,
    /// Second buffer.
    pub src_b: SymExpr,
    /// Bytes compared when the buffers are equal.
    pub num_bytes: SymExpr,
    /// The block deciding whether to continue after an equal element.
    pub latch: usize,
}

/// A recognized idiom, produced by a detector and consumed by its rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdiomMatch {
    /// Byte fill.
    Fill(StridedFill),
    /// 16-byte pattern fill.
    PatternFill(StridedFill),
    /// Block copy.
    Copy(StridedCopy),
    /// Population count.
    Popcount(PopcountLoop),
    /// Leading or trailing zero count.
    FindFirstSet(ShiftUntilZeroLoop),
    /// Block equality compare.
    ByteCompare(ByteCompareLoop),
}

impl IdiomMatch {
    /// Returns the event recorded when the match is rewritten.
    #[must_use]
    pub fn event_kind(&self) -> EventKind {
        match self {
            Self::Fill(_) => EventKind::FillFormed,
            Self::PatternFill(_) => EventKind::PatternFillFormed,
            Self::Copy(_) => EventKind::CopyFormed,
            Self::Popcount(_) => EventKind::PopcountFormed,
            Self::FindFirstSet(_) => EventKind::BitScanFormed,
            Self::ByteCompare(_) => EventKind::CompareFormed,
        }
    }
}

/// Runs idiom recognition on the loops of one function.
///
/// The recognizer borrows the function together with its analyses, which every
/// rewrite keeps up to date.
pub struct LoopIdiomRecognize<'a> {
    ssa: &'a mut SsaFunction,
    analyses: &'a mut FunctionAnalyses,
    lpm: &'a mut LoopPassManager,
    target: &'a TargetInfo,
    config: &'a IdiomConfig,
    events: &'a EventLog,
    header: NodeId,
    apply_code_size_heuristics: bool,
}

impl<'a> LoopIdiomRecognize<'a> {
    /// Creates a recognizer for `ssa`.
    ///
    /// # Arguments
    ///
    /// * `ssa` - The function to rewrite
    /// * `analyses` - Analyses of `ssa`, updated by every rewrite
    /// * `lpm` - Records loops deleted by a rewrite
    /// * `target` - Available primitives and their costs
    /// * `config` - Enabled rewrites and thresholds
    /// * `events` - Receives one event per rewrite and per diagnosed miss
    pub fn new(
        ssa: &'a mut SsaFunction,
        analyses: &'a mut FunctionAnalyses,
        lpm: &'a mut LoopPassManager,
        target: &'a TargetInfo,
        config: &'a IdiomConfig,
        events: &'a EventLog,
    ) -> Self {
        Self {
            ssa,
            analyses,
            lpm,
            target,
            config,
            events,
            header: NodeId::new(0),
            apply_code_size_heuristics: false,
        }
    }

    /// Runs recognition on the loop headed by `header`.
    ///
    /// # Returns
    ///
    /// `true` if the function was changed.
    ///
    /// # Errors
    ///
    /// Returns an error if a rewrite finds the IR or the analyses inconsistent.
    pub fn run_on_loop(&mut self, header: NodeId) -> Result<bool> {
        let Some(info) = self.analyses.loops.loop_for_header(header) else {
            return Ok(false);
        };
        if info.preheader(self.ssa).is_none() {
            trace!("{}: loop {} has no preheader", self.ssa.name(), header);
            return Ok(false);
        }
        if Primitive::is_library_name(self.ssa.name()) {
            trace!("{}: not rewriting the implementation of a primitive", self.ssa.name());
            return Ok(false);
        }

        self.header = header;
        self.apply_code_size_heuristics =
            self.ssa.opt_size() && self.config.use_code_size_heuristics;

        if self.target.has_any_library_primitive() {
            let be_count = self.analyses.se.backedge_taken_count(
                self.ssa,
                &self.analyses.loops,
                &self.analyses.dom,
                header,
            );
            if let Some(be_count) = be_count {
                return self.run_on_countable_loop(&be_count);
            }
        }
        self.run_on_noncountable_loop()
    }

    fn run_on_noncountable_loop(&mut self) -> Result<bool> {
        debug!(
            "{}: scanning noncountable loop {}",
            self.ssa.name(),
            self.header
        );
        if self.config.enable_bcmp && self.recognize_bcmp()? {
            return Ok(true);
        }
        if self.config.enable_ffs && self.recognize_ffs()? {
            return Ok(true);
        }
        if self.config.enable_popcount && self.recognize_popcount()? {
            return Ok(true);
        }
        Ok(false)
    }

    /// Returns the preheader of the current loop.
    fn preheader(&self) -> Result<usize> {
        self.analyses
            .loops
            .loop_for_header(self.header)
            .and_then(|l| l.preheader(self.ssa))
            .map(NodeId::index)
            .ok_or_else(|| malformed_error!("loop {} lost its preheader", self.header))
    }

    /// Records a rewrite of the current loop.
    fn record(&self, kind: EventKind, message: String) {
        debug!("{}: {}", self.ssa.name(), message);
        self.events
            .record(kind)
            .at(self.ssa.name(), self.header.index())
            .pass(PASS_NAME)
            .message(message);
    }

    /// Records an opportunity that was found but not taken.
    fn record_missed(&self, reason: &str) {
        debug!("{}: missed idiom: {}", self.ssa.name(), reason);
        self.events
            .record(EventKind::IdiomMissed)
            .at(self.ssa.name(), self.header.index())
            .pass(PASS_NAME)
            .message(reason);
    }
}

/// Counts the instructions of `block` the way the size gates do: phis and every
/// non-free instruction, the terminator included.
fn block_size(ssa: &SsaFunction, block: usize) -> usize {
    let phis = ssa.block(block).map_or(0, |b| b.phi_nodes().len());
    phis + ssa.block_ops(block).filter(|(_, op)| !op.is_free()).count()
}

/// Matches a branch on `value == 0` / `value != 0` that enters `loop_entry` when
/// `value` is non-zero, and returns `value`.
fn match_nonzero_test(ssa: &SsaFunction, block: usize, loop_entry: usize) -> Option<SsaVarId> {
    let SsaOp::Branch {
        condition,
        true_target,
        false_target,
    } = ssa.terminator(block)?
    else {
        return None;
    };
    let SsaOp::Cmp {
        kind, left, right, ..
    } = ssa.def_op(*condition)?
    else {
        return None;
    };
    if ssa.const_int(*right) != Some(0) {
        return None;
    }
    match kind {
        CmpKind::Ne if *true_target == loop_entry => Some(*left),
        CmpKind::Eq if *false_target == loop_entry => Some(*left),
        _ => None,
    }
}

/// Returns `var` if it is a phi of `block` that receives `next` on some edge.
fn recurrence_phi(
    ssa: &SsaFunction,
    var: SsaVarId,
    next: SsaVarId,
    block: usize,
) -> Option<SsaVarId> {
    let phi = ssa.phi(block, var)?;
    phi.operands()
        .iter()
        .any(|o| o.value() == next)
        .then_some(var)
}

/// Finds an `add cnt, ±1` in `block` whose `cnt` is a recurrence of `block`.
///
/// Returns the update, its phi and the increment. `live_out` restricts the
/// search to updates read outside `block`.
fn find_counter(
    ssa: &SsaFunction,
    block: usize,
    allow_decrement: bool,
    live_out: bool,
) -> Option<(SsaVarId, SsaVarId, i128)> {
    ssa.block_ops(block).find_map(|(_, op)| {
        let SsaOp::Add { dest, left, right } = op else {
            return None;
        };
        let (phi_side, increment) = match (ssa.const_int(*right), ssa.const_int(*left)) {
            (Some(k), _) => (*left, k),
            (None, Some(k)) => (*right, k),
            (None, None) => return None,
        };
        let increment = wrap_signed(increment, ssa.var_type(*dest).bits());
        if increment != 1 && !(allow_decrement && increment == -1) {
            return None;
        }
        let phi = recurrence_phi(ssa, phi_side, *dest, block)?;
        if live_out && !ssa.users(*dest).iter().any(|u| u.block() != block) {
            return None;
        }
        Some((*dest, phi, increment))
    })
}

/// Reinterprets a constant of width `bits` as signed.
fn wrap_signed(value: i128, bits: u32) -> i128 {
    if bits >= 128 {
        return value;
    }
    let shift = 128 - bits;
    (value << shift) >> shift
}

/// Returns the variables defined in the blocks of `blocks`.
fn defined_in(ssa: &SsaFunction, blocks: &HashSet<usize>) -> HashSet<SsaVarId> {
    let mut defs = HashSet::new();
    for &block in blocks {
        if let Some(b) = ssa.block(block) {
            defs.extend(b.phi_nodes().iter().map(|p| p.result()));
        }
        defs.extend(ssa.block_ops(block).filter_map(|(_, op)| op.dest()));
    }
    defs
}

/// Where [`emit`] places a new instruction.
#[derive(Debug, Clone, Copy)]
enum InsertPoint {
    /// In front of the terminator of a block.
    BeforeTerminator(usize),
    /// In front of an instruction.
    Before(InstId),
}

/// Inserts the instruction `build` creates for a fresh variable of type `ty`
/// and returns that variable.
fn emit(
    ssa: &mut SsaFunction,
    at: InsertPoint,
    ty: SsaType,
    build: impl FnOnce(SsaVarId) -> SsaOp,
) -> Result<SsaVarId> {
    let dest = ssa.new_var(ty);
    let op = build(dest);
    match at {
        InsertPoint::BeforeTerminator(block) => {
            ssa.insert_before_terminator(block, op);
        }
        InsertPoint::Before(anchor) => {
            ssa.insert_before(anchor, op)?;
        }
    }
    Ok(dest)
}

/// Emits an integer constant.
fn emit_const(ssa: &mut SsaFunction, at: InsertPoint, ty: SsaType, value: i128) -> Result<SsaVarId> {
    emit(ssa, at, ty, |dest| SsaOp::Const {
        dest,
        value: ConstValue::int(ty, value),
    })
}

/// Zero-extends or truncates `value` to `ty`; returns it unchanged if it already has that type.
fn emit_resize(ssa: &mut SsaFunction, at: InsertPoint, value: SsaVarId, ty: SsaType) -> Result<SsaVarId> {
    let from = ssa.var_type(value).bits();
    let kind = match from.cmp(&ty.bits()) {
        std::cmp::Ordering::Equal => return Ok(value),
        std::cmp::Ordering::Less => CastKind::ZExt,
        std::cmp::Ordering::Greater => CastKind::Trunc,
    };
    emit(ssa, at, ty, |dest| SsaOp::Cast {
        dest,
        kind,
        operand: value,
    })
}

/// Gives the single-block loop `body` an explicit trip counter.
///
/// A new phi starts at `trip_count` on entry from `preheader` and is decremented
/// in front of the latch comparison, which is rewritten to test the decremented
/// value against zero. `continue_kind` is used when the branch stays in the loop
/// on true, `exit_kind` when it leaves on true.
fn make_countable(
    ssa: &mut SsaFunction,
    body: usize,
    preheader: usize,
    trip_count: SsaVarId,
    continue_kind: CmpKind,
    exit_kind: CmpKind,
) -> Result<()> {
    let Some(SsaOp::Branch {
        condition,
        true_target,
        ..
    }) = ssa.terminator(body).cloned()
    else {
        return Err(malformed_error!("latch b{} does not end in a branch", body));
    };
    let compare = ssa
        .def_instruction(condition)
        .ok_or_else(|| malformed_error!("latch condition of b{} is not an instruction", body))?;

    let ty = ssa.var_type(trip_count);
    let counter = ssa.add_phi(body, ty);
    let at = InsertPoint::Before(compare);
    let one = emit_const(ssa, at, ty, 1)?;
    let decremented = emit(ssa, at, ty, |dest| SsaOp::Sub {
        dest,
        left: counter,
        right: one,
    })?;
    let zero = emit_const(ssa, at, ty, 0)?;
    if let Some(phi) = ssa.phi_mut(body, counter) {
        phi.set_operand(preheader, trip_count);
        phi.set_operand(body, decremented);
    }

    let kind = if true_target == body {
        continue_kind
    } else {
        exit_kind
    };
    match ssa.op_mut(compare) {
        Some(SsaOp::Cmp {
            kind: k,
            left,
            right,
            ..
        }) => {
            *k = kind;
            *left = decremented;
            *right = zero;
            Ok(())
        }
        _ => Err(malformed_error!("latch condition of b{} is not a comparison", body)),
    }
}

/// Returns `true` if `block` consists of nothing but an unconditional jump.
fn is_bare_jump(ssa: &SsaFunction, block: usize) -> bool {
    ssa.block(block).is_some_and(|b| b.phi_nodes().is_empty())
        && ssa.block_ops(block).count() == 1
        && matches!(ssa.terminator(block), Some(SsaOp::Jump { .. }))
}

/// The loop idiom pass.
///
/// Builds the analyses of each function and runs [`LoopIdiomRecognize`] on its
/// loops, innermost first. Loops deleted by a rewrite are skipped.
///
/// # Example
///
/// ```rust
/// use loopidiom::prelude::*;
///
/// let mut scheduler = PassScheduler::default();
/// scheduler.add_pass(Box::new(LoopIdiomPass::new()));
/// assert_eq!(scheduler.passes[0].name(), "loop-idiom");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopIdiomPass;

impl LoopIdiomPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SsaPass for LoopIdiomPass {
    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn should_run(&self, _name: &str, ctx: &CompilerContext) -> bool {
        let config = &ctx.config;
        config.enable_memset
            || config.enable_memcpy
            || config.enable_bcmp
            || config.enable_popcount
            || config.enable_ffs
    }

    fn run_on_function(&self, ssa: &mut SsaFunction, ctx: &CompilerContext) -> Result<bool> {
        let mut analyses = FunctionAnalyses::compute(ssa);
        if analyses.loops.is_empty() {
            return Ok(false);
        }

        let mut lpm = LoopPassManager::new();
        let mut changed = false;
        for header in analyses.loops.by_depth_descending() {
            if lpm.is_deleted(header) || analyses.loops.loop_for_header(header).is_none() {
                continue;
            }
            let mut recognizer = LoopIdiomRecognize::new(
                ssa,
                &mut analyses,
                &mut lpm,
                &ctx.target,
                &ctx.config,
                &ctx.events,
            );
            changed |= recognizer.run_on_loop(header)?;
        }

        if changed {
            for header in lpm.deleted_loops() {
                ctx.events
                    .record(EventKind::LoopDeleted)
                    .at(ssa.name(), header.index())
                    .pass(PASS_NAME);
            }
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Replaces fill, copy, compare and bit counting loops with primitives"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::ssa::{FunctionBuilder, SsaType},
        compiler::Primitives,
        test::fixtures,
    };

    fn run(ssa: &mut SsaFunction, target: TargetInfo, config: IdiomConfig) -> (bool, CompilerContext) {
        let ctx = CompilerContext::new(target, config);
        let changed = LoopIdiomPass::new().run_on_function(ssa, &ctx).unwrap();
        ssa.verify().unwrap();
        (changed, ctx)
    }

    #[test]
    fn test_library_named_function_is_skipped() {
        let mut fixture = fixtures::zero_fill_named("memset", None);
        let (changed, ctx) = run(&mut fixture.ssa, TargetInfo::default(), IdiomConfig::default());
        assert!(!changed);
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn test_loop_without_preheader_is_skipped() {
        let mut fixture = fixtures::loop_without_preheader();
        let (changed, _) = run(&mut fixture, TargetInfo::default(), IdiomConfig::default());
        assert!(!changed);
    }

    #[test]
    fn test_countable_loop_without_library_goes_noncountable() {
        let mut fixture = fixtures::zero_fill(None);
        let mut target = TargetInfo::default();
        target.primitives = Primitives::BIT_COUNTS;
        let (changed, ctx) = run(&mut fixture.ssa, target, IdiomConfig::default());
        assert!(!changed);
        assert!(!ctx.events.has(EventKind::FillFormed));
    }

    #[test]
    fn test_disabled_config_does_not_run() {
        let ctx = CompilerContext::new(TargetInfo::default(), IdiomConfig::disabled());
        assert!(!LoopIdiomPass::new().should_run("f", &ctx));
    }

    #[test]
    fn test_function_without_loops() {
        let mut f = FunctionBuilder::new("flat", SsaType::Void);
        let entry = f.block("entry");
        f.switch_to(entry);
        f.ret(None);
        let mut ssa = f.finish().unwrap();
        let (changed, _) = run(&mut ssa, TargetInfo::default(), IdiomConfig::default());
        assert!(!changed);
    }

    /// Runs the recognizer on the loop headed by `body` with analyses whose
    /// trip-count cache was primed before the rewrite.
    fn rewrite_with_primed_cache(ssa: &mut SsaFunction, body: usize) -> FunctionAnalyses {
        let header = NodeId::new(body);
        let mut analyses = FunctionAnalyses::compute(ssa);
        let before = analyses
            .se
            .backedge_taken_count(ssa, &analyses.loops, &analyses.dom, header);
        assert!(before.is_none());
        assert!(analyses.se.is_cached(header));

        let (target, config, events) = (TargetInfo::default(), IdiomConfig::default(), EventLog::new());
        let mut lpm = LoopPassManager::new();
        let changed = LoopIdiomRecognize::new(ssa, &mut analyses, &mut lpm, &target, &config, &events)
            .run_on_loop(header)
            .unwrap();
        assert!(changed);
        analyses.verify(ssa).unwrap();
        analyses
    }

    #[test]
    fn test_bit_counting_rewrites_invalidate_trip_counts() {
        let popcount = fixtures::popcount(SsaType::I32, 0);
        let shift = fixtures::shift_until_zero(fixtures::ShiftKind::Lshr, 1, false);
        for mut fixture in [popcount, shift] {
            let header = NodeId::new(fixture.body);
            let analyses = rewrite_with_primed_cache(&mut fixture.ssa, fixture.body);
            assert!(!analyses.se.is_cached(header));

            let after = analyses
                .se
                .backedge_taken_count(&fixture.ssa, &analyses.loops, &analyses.dom, header);
            let fresh = FunctionAnalyses::compute(&fixture.ssa);
            let expected = fresh
                .se
                .backedge_taken_count(&fixture.ssa, &fresh.loops, &fresh.dom, header);
            assert!(after.is_some());
            assert_eq!(after, expected);
        }
    }

    #[test]
    fn test_compare_rewrite_forgets_deleted_loop() {
        let mut fixture = fixtures::byte_compare(SsaType::I8);
        let analyses = rewrite_with_primed_cache(&mut fixture.ssa, fixture.header);
        assert!(!analyses.se.is_cached(NodeId::new(fixture.header)));
        assert!(analyses.loops.is_empty());
    }

    #[test]
    fn test_block_size_skips_constants() {
        let fixture = fixtures::zero_fill(None);
        assert_eq!(block_size(&fixture.ssa, fixture.body), 7);
    }

    #[test]
    fn test_match_nonzero_test() {
        let fixture = fixtures::popcount(SsaType::I32, 0);
        let ssa = &fixture.ssa;
        assert_eq!(
            match_nonzero_test(ssa, fixture.precondition, fixture.preheader),
            Some(fixture.seed)
        );
        assert_eq!(match_nonzero_test(ssa, fixture.precondition, fixture.body), None);
    }

    #[test]
    fn test_wrap_signed() {
        assert_eq!(wrap_signed(255, 8), -1);
        assert_eq!(wrap_signed(1, 8), 1);
        assert_eq!(wrap_signed(-1, 128), -1);
    }
}
