//! Classification of the stores of a countable loop.
//!
//! A store qualifies when its address is an affine recurrence of the current loop
//! with a constant stride and its access is plain enough to be merged into a
//! primitive covering every iteration. Fill candidates are grouped by the object
//! they write, so that adjacent stores into one object can be merged into a
//! single run.

use log::trace;

use crate::{
    analysis::{
        scev::{AffineRecurrence, SymExpr},
        ssa::{InstId, MemFlags, SsaOp, SsaVarId},
        valuetracking::{bytewise_value, memset_pattern_value, underlying_object, ByteValue},
    },
    compiler::{passes::idiom::LoopIdiomRecognize, target::Primitive},
};

/// What a legal store can become.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StoreKind {
    /// Part of a byte fill.
    Fill,
    /// Part of a 16-byte pattern fill.
    PatternFill,
    /// A copy from a same-strided load.
    Copy {
        /// Either access is unordered atomic.
        atomic: bool,
    },
}

/// Candidate stores of one block, in program order.
#[derive(Debug, Default)]
pub(super) struct StoreCandidates {
    /// Byte fill candidates keyed by the underlying object they write.
    pub fills: Vec<(SsaVarId, Vec<InstId>)>,
    /// Pattern fill candidates keyed by the underlying object they write.
    pub pattern_fills: Vec<(SsaVarId, Vec<InstId>)>,
    /// Copy candidates.
    pub copies: Vec<InstId>,
}

impl StoreCandidates {
    fn push_grouped(groups: &mut Vec<(SsaVarId, Vec<InstId>)>, object: SsaVarId, store: InstId) {
        match groups.iter_mut().find(|(o, _)| *o == object) {
            Some((_, group)) => group.push(store),
            None => groups.push((object, vec![store])),
        }
    }

    /// Returns `true` if no store qualified.
    pub fn is_empty(&self) -> bool {
        self.fills.is_empty() && self.pattern_fills.is_empty() && self.copies.is_empty()
    }
}

/// A qualifying store with everything the merge needs.
#[derive(Debug, Clone)]
pub(super) struct StoreInfo {
    pub id: InstId,
    pub value: SsaVarId,
    pub start: SymExpr,
    pub stride: i128,
    pub size: u64,
    pub align: u32,
    pub address_space: u32,
}

impl LoopIdiomRecognize<'_> {
    /// Collects the candidate stores of `block`.
    pub(super) fn collect_stores(&self, block: usize) -> StoreCandidates {
        let mut candidates = StoreCandidates::default();
        for (id, op) in self.ssa.block_ops(block) {
            let SsaOp::Store { addr, .. } = op else {
                continue;
            };
            let Some(kind) = self.classify_store(id) else {
                continue;
            };
            let object = underlying_object(self.ssa, *addr);
            match kind {
                StoreKind::Fill => StoreCandidates::push_grouped(&mut candidates.fills, object, id),
                StoreKind::PatternFill => {
                    StoreCandidates::push_grouped(&mut candidates.pattern_fills, object, id);
                }
                StoreKind::Copy { .. } => candidates.copies.push(id),
            }
        }
        trace!(
            "{}: b{} has {} fill groups, {} pattern groups, {} copies",
            self.ssa.name(),
            block,
            candidates.fills.len(),
            candidates.pattern_fills.len(),
            candidates.copies.len()
        );
        candidates
    }

    /// Decides whether the store `id` can take part in a rewrite, and which.
    pub(super) fn classify_store(&self, id: InstId) -> Option<StoreKind> {
        let SsaOp::Store {
            addr, value, flags, ..
        } = self.ssa.op(id)?
        else {
            return None;
        };
        if !flags.is_unordered() || flags.contains(MemFlags::NONTEMPORAL) {
            return None;
        }

        let value_ty = self.ssa.var_type(*value);
        if value_ty
            .address_space()
            .is_some_and(|space| self.target.is_non_integral_address_space(space))
        {
            return None;
        }
        let bits = value_ty.bits();
        if bits == 0 || bits % 8 != 0 {
            return None;
        }

        let rec = self.store_recurrence(*addr)?;
        let stride = rec.constant_step()?;
        let atomic = flags.is_atomic();
        let address_space = self.ssa.var_type(*addr).address_space().unwrap_or(0);

        if !atomic && self.target.has_primitive(Primitive::MemSet) && self.config.enable_memset {
            let invariant = match bytewise_value(self.ssa, *value) {
                Some(ByteValue::Var(v)) => self.is_invariant(v),
                Some(_) => true,
                None => false,
            };
            if invariant {
                return Some(StoreKind::Fill);
            }
        }

        if !atomic
            && self.target.has_primitive(Primitive::MemSetPattern16)
            && self.config.enable_memset
            && address_space == 0
            && !self.target.big_endian
            && memset_pattern_value(self.ssa, *value).is_some()
        {
            return Some(StoreKind::PatternFill);
        }

        if self.target.has_primitive(Primitive::MemCpy) && self.config.enable_memcpy {
            let size = value_ty.store_size() as i128;
            if stride != size && stride != -size {
                return None;
            }
            let load = self.ssa.def_instruction(*value)?;
            let SsaOp::Load {
                addr: load_addr,
                flags: load_flags,
                ..
            } = self.ssa.op(load)?
            else {
                return None;
            };
            if !load_flags.is_unordered() {
                return None;
            }
            let load_rec = self.store_recurrence(*load_addr)?;
            if load_rec.constant_step() != Some(stride) {
                return None;
            }
            return Some(StoreKind::Copy {
                atomic: atomic || load_flags.is_atomic(),
            });
        }
        None
    }

    /// Returns the recurrence `addr` follows in the current loop, if its step is constant.
    pub(super) fn store_recurrence(&self, addr: SsaVarId) -> Option<AffineRecurrence> {
        let rec = self
            .analyses
            .se
            .affine_recurrence(self.ssa, &self.analyses.loops, addr, self.header)?;
        rec.constant_step().map(|_| rec)
    }

    /// Describes a live, classified store for the merge.
    pub(super) fn store_info(&self, id: InstId) -> Option<StoreInfo> {
        let SsaOp::Store {
            addr, value, align, ..
        } = self.ssa.op(id)?
        else {
            return None;
        };
        let rec = self.store_recurrence(*addr)?;
        Some(StoreInfo {
            id,
            value: *value,
            stride: rec.constant_step()?,
            start: rec.start,
            size: self.ssa.var_type(*value).store_size(),
            align: *align,
            address_space: self.ssa.var_type(*addr).address_space().unwrap_or(0),
        })
    }

    /// Returns `true` if `var` has the same value on every iteration of the current loop.
    pub(super) fn is_invariant(&self, var: SsaVarId) -> bool {
        self.ssa.const_value(var).is_some()
            || self.analyses.se.is_loop_invariant(
                self.ssa,
                &self.analyses.loops,
                &SymExpr::Value(var),
                self.header,
            )
    }
}
