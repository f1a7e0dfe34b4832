//! Memory effect queries over a loop.
//!
//! The idiom rewrites replace a set of stores (and loads) by one primitive that
//! touches a whole region at once. That is only valid if no other instruction in
//! the loop reads or writes the region, which is what
//! [`AliasOracle::may_loop_access`] answers.
//!
//! [`BasicAliasOracle`] reasons about addresses as symbolic expressions:
//!
//! - accesses based on different identified objects (stack allocations,
//!   `noalias` parameters) never overlap
//! - accesses based on the same pointer are compared by their constant byte
//!   ranges, including the range a recurrence sweeps over a loop with a known
//!   trip count
//! - everything else may overlap

use bitflags::bitflags;

use crate::{
    analysis::{
        cfg::LoopForest,
        scev::{ScalarEvolution, SymExpr},
        ssa::{CallEffects, InstId, SsaFunction, SsaOp, SsaVarId},
        valuetracking::{is_identified_object, underlying_object},
    },
    utils::graph::NodeId,
};

bitflags! {
    /// Whether an instruction reads and/or writes a location.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModRef: u8 {
        /// The location may be read.
        const REF = 0x01;
        /// The location may be written.
        const MOD = 0x02;
        /// The location may be read and written.
        const MODREF = Self::REF.bits() | Self::MOD.bits();
    }
}

/// A region of memory: `size` bytes starting at `ptr`.
///
/// A `size` of `None` covers an unknown number of bytes from `ptr` on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLocation {
    /// Address of the first byte.
    pub ptr: SymExpr,
    /// Length in bytes, if known.
    pub size: Option<u64>,
}

impl MemoryLocation {
    /// Creates a location.
    #[must_use]
    pub fn new(ptr: SymExpr, size: Option<u64>) -> Self {
        Self { ptr, size }
    }
}

/// Everything an oracle may consult while answering a query about one loop.
#[derive(Clone, Copy)]
pub struct AliasQuery<'a> {
    /// The function.
    pub ssa: &'a SsaFunction,
    /// Its loop forest.
    pub loops: &'a LoopForest,
    /// Its scalar evolution.
    pub se: &'a ScalarEvolution,
    /// Header of the loop the query is about.
    pub header: NodeId,
    /// Number of iterations of that loop, if constant.
    pub trip_count: Option<u64>,
}

/// Answers memory effect questions.
pub trait AliasOracle: Send + Sync {
    /// Returns how instruction `inst` may access `loc` during the loop in `ctx`.
    fn mod_ref(&self, ctx: &AliasQuery<'_>, inst: InstId, loc: &MemoryLocation) -> ModRef;

    /// Returns `true` if any instruction of the loop, other than those in
    /// `ignore`, may access `loc` in one of the ways in `access`.
    fn may_loop_access(
        &self,
        ctx: &AliasQuery<'_>,
        loc: &MemoryLocation,
        access: ModRef,
        ignore: &[InstId],
    ) -> bool {
        let Some(info) = ctx.loops.loop_for_header(ctx.header) else {
            return true;
        };
        info.blocks().into_iter().any(|block| {
            ctx.ssa
                .block_ops(block.index())
                .filter(|(id, _)| !ignore.contains(id))
                .any(|(id, _)| self.mod_ref(ctx, id, loc).intersects(access))
        })
    }
}

/// Alias oracle based on underlying objects and constant offsets.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicAliasOracle;

impl BasicAliasOracle {
    /// Creates the oracle.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` if the two regions may overlap during the loop.
    pub fn may_alias(&self, ctx: &AliasQuery<'_>, a: &MemoryLocation, b: &MemoryLocation) -> bool {
        let (Some(base_a), Some(base_b)) = (pointer_base(ctx.ssa, &a.ptr), pointer_base(ctx.ssa, &b.ptr))
        else {
            return true;
        };

        if base_a != base_b {
            let object_a = underlying_object(ctx.ssa, base_a);
            let object_b = underlying_object(ctx.ssa, base_b);
            return !(object_a != object_b
                && is_identified_object(ctx.ssa, object_a)
                && is_identified_object(ctx.ssa, object_b));
        }

        let base = SymExpr::Value(base_a);
        let offset_a = ctx.se.sub(ctx.ssa, ctx.loops, &a.ptr, &base);
        let offset_b = ctx.se.sub(ctx.ssa, ctx.loops, &b.ptr, &base);
        match (byte_range(ctx, &offset_a, a.size), byte_range(ctx, &offset_b, b.size)) {
            (Some((lo_a, hi_a)), Some((lo_b, hi_b))) => lo_a < hi_b && lo_b < hi_a,
            _ => true,
        }
    }

    fn location(ctx: &AliasQuery<'_>, ptr: SsaVarId, size: Option<u64>) -> MemoryLocation {
        MemoryLocation::new(ctx.se.expr(ctx.ssa, ctx.loops, ptr), size)
    }
}

impl AliasOracle for BasicAliasOracle {
    fn mod_ref(&self, ctx: &AliasQuery<'_>, inst: InstId, loc: &MemoryLocation) -> ModRef {
        let Some(op) = ctx.ssa.op(inst) else {
            return ModRef::empty();
        };
        let ssa = ctx.ssa;
        let const_len = |len: &SsaVarId| ssa.const_int(*len).and_then(|v| u64::try_from(v).ok());

        let accesses: Vec<(MemoryLocation, ModRef)> = match op {
            SsaOp::Load {
                dest, addr, flags, ..
            } => {
                let effect = if flags.is_unordered() {
                    ModRef::REF
                } else {
                    ModRef::MODREF
                };
                let size = ssa.var_type(*dest).store_size();
                vec![(Self::location(ctx, *addr, Some(size)), effect)]
            }
            SsaOp::Store {
                addr, value, flags, ..
            } => {
                let effect = if flags.is_unordered() {
                    ModRef::MOD
                } else {
                    ModRef::MODREF
                };
                let size = ssa.var_type(*value).store_size();
                vec![(Self::location(ctx, *addr, Some(size)), effect)]
            }
            SsaOp::MemSet { addr, len, .. } | SsaOp::MemSetPattern { addr, len, .. } => {
                vec![(Self::location(ctx, *addr, const_len(len)), ModRef::MOD)]
            }
            SsaOp::MemCpy { dest, src, len, .. } => vec![
                (Self::location(ctx, *dest, const_len(len)), ModRef::MOD),
                (Self::location(ctx, *src, const_len(len)), ModRef::REF),
            ],
            SsaOp::MemCmp {
                left, right, len, ..
            } => vec![
                (Self::location(ctx, *left, const_len(len)), ModRef::REF),
                (Self::location(ctx, *right, const_len(len)), ModRef::REF),
            ],
            SsaOp::Call { effects, .. } => {
                let mut effect = ModRef::empty();
                if effects.contains(CallEffects::READS) {
                    effect |= ModRef::REF;
                }
                if effects.contains(CallEffects::WRITES) {
                    effect |= ModRef::MOD;
                }
                return effect;
            }
            SsaOp::Fence => return ModRef::MODREF,
            _ => return ModRef::empty(),
        };

        accesses
            .into_iter()
            .filter(|(access, _)| self.may_alias(ctx, access, loc))
            .fold(ModRef::empty(), |acc, (_, effect)| acc | effect)
    }
}

/// Returns the pointer-typed value an address expression is based on.
fn pointer_base(ssa: &SsaFunction, expr: &SymExpr) -> Option<SsaVarId> {
    match expr {
        SymExpr::Value(v) if ssa.var_type(*v).is_pointer() => Some(*v),
        SymExpr::AddRec { start, .. } => pointer_base(ssa, start),
        SymExpr::Sum { terms, .. } => {
            let mut bases = terms
                .iter()
                .filter(|(_, k)| *k == 1)
                .filter_map(|(t, _)| pointer_base(ssa, t));
            let base = bases.next()?;
            bases.next().is_none().then_some(base)
        }
        _ => None,
    }
}

/// Returns the half-open byte range `[lo, hi)` an access at `offset` covers over the loop.
fn byte_range(ctx: &AliasQuery<'_>, offset: &SymExpr, size: Option<u64>) -> Option<(i128, i128)> {
    let size = i128::from(size?);
    match offset {
        SymExpr::Constant(c) => Some((*c, c + size)),
        SymExpr::AddRec {
            start,
            step,
            header,
        } if *header == ctx.header => {
            let (start, step) = (start.as_constant()?, step.as_constant()?);
            let iterations = i128::from(ctx.trip_count?);
            if iterations == 0 {
                return Some((start, start));
            }
            let last = start.checked_add(step.checked_mul(iterations - 1)?)?;
            Some((start.min(last), start.max(last) + size))
        }
        _ => None,
    }
}
