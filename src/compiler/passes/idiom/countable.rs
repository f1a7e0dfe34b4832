//! Store based rewrites of loops with a computable back-edge-taken count.
//!
//! Every block of the loop that belongs to no inner loop and dominates all exits
//! runs on each iteration. Its candidate stores are merged into runs covering one
//! stride, and each run is replaced by a single fill or copy in the preheader
//! when no other instruction of the loop can observe the region it writes.
//! Existing fill primitives covering one stride per iteration are widened the
//! same way.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::{
    analysis::{
        alias::{MemoryLocation, ModRef},
        scev::{ExitCount, Expander, SymExpr},
        ssa::{ConstValue, InstId, SsaOp, SsaType},
        valuetracking::{bytewise_value, memset_pattern_value, ByteValue},
        SsaFunction,
    },
    compiler::{
        events::EventKind,
        passes::idiom::{
            stores::StoreInfo, IdiomMatch, LoopIdiomRecognize, StridedCopy, StridedFill,
        },
        target::Primitive,
    },
    utils::graph::NodeId,
    Result,
};

impl LoopIdiomRecognize<'_> {
    /// Runs the store based rewrites on the current loop.
    ///
    /// # Arguments
    ///
    /// * `be_count` - The back-edge-taken count of the loop
    ///
    /// # Returns
    ///
    /// `true` if anything was rewritten.
    pub(super) fn run_on_countable_loop(&mut self, be_count: &ExitCount) -> Result<bool> {
        if be_count.count.as_constant() == Some(0) {
            trace!("{}: loop {} runs once", self.ssa.name(), self.header);
            return Ok(false);
        }
        let Some(info) = self.analyses.loops.loop_for_header(self.header) else {
            return Ok(false);
        };
        let blocks = info.blocks();
        let exits = info.exit_blocks(self.ssa);
        debug!(
            "{}: scanning countable loop {} ({} blocks)",
            self.ssa.name(),
            self.header,
            blocks.len()
        );

        let may_throw = blocks
            .iter()
            .any(|b| self.ssa.block_ops(b.index()).any(|(_, op)| op.may_throw()));
        if may_throw {
            trace!("{}: loop {} may throw", self.ssa.name(), self.header);
            return Ok(false);
        }

        let mut changed = false;
        for block in blocks {
            let innermost = self.analyses.loops.innermost_loop(block).map(|l| l.header);
            if innermost != Some(self.header) {
                continue;
            }
            changed |= self.run_on_loop_block(block.index(), be_count, &exits)?;
        }
        Ok(changed)
    }

    fn run_on_loop_block(
        &mut self,
        block: usize,
        be_count: &ExitCount,
        exits: &[NodeId],
    ) -> Result<bool> {
        let node = NodeId::new(block);
        if !exits.iter().all(|&e| self.analyses.dom.dominates(node, e)) {
            return Ok(false);
        }

        let candidates = self.collect_stores(block);
        let mut changed = false;
        for (_, group) in &candidates.fills {
            changed |= self.process_loop_stores(group, be_count, false)?;
        }
        for (_, group) in &candidates.pattern_fills {
            changed |= self.process_loop_stores(group, be_count, true)?;
        }
        for &store in &candidates.copies {
            if !self.ssa.is_live(store) {
                continue;
            }
            if let Some(copy) = self.detect_copy(store) {
                changed |= self.rewrite_strided(IdiomMatch::Copy(copy), be_count)?;
            }
        }
        changed |= self.widen_fills(block, be_count)?;
        Ok(changed)
    }

    /// Merges adjacent stores of one object into runs covering a whole stride
    /// and rewrites each run.
    fn process_loop_stores(
        &mut self,
        group: &[InstId],
        be_count: &ExitCount,
        pattern: bool,
    ) -> Result<bool> {
        let mut stores: Vec<StoreInfo> = group
            .iter()
            .filter(|&&id| self.ssa.is_live(id))
            .filter_map(|&id| self.store_info(id))
            .collect();
        let mut heads: Vec<usize> = Vec::new();
        let mut head_set: HashSet<usize> = HashSet::new();
        let mut tails: HashSet<usize> = HashSet::new();
        let mut chain: HashMap<usize, usize> = HashMap::new();
        let limit = self.config.max_store_run_search.unwrap_or(usize::MAX);

        for i in 0..stores.len() {
            let stride = stores[i].stride;
            let size = stores[i].size as i128;
            if stride == size || stride == -size {
                if head_set.insert(i) {
                    heads.push(i);
                }
                continue;
            }

            let forward = i + 1..stores.len();
            let backward = (0..i).rev();
            for k in forward.chain(backward).take(limit) {
                if stores[k].stride != stride {
                    continue;
                }
                let gap = self.analyses.se.sub(
                    self.ssa,
                    &self.analyses.loops,
                    &stores[k].start,
                    &stores[i].start,
                );
                if gap.as_constant() != Some(size) {
                    continue;
                }
                if !self.merge_values(&mut stores, i, k, pattern) {
                    continue;
                }
                if head_set.insert(i) {
                    heads.push(i);
                }
                tails.insert(k);
                chain.insert(i, k);
                break;
            }
        }

        let mut transformed: HashSet<usize> = HashSet::new();
        let mut changed = false;
        for &head in &heads {
            if tails.contains(&head) || transformed.contains(&head) {
                continue;
            }
            let mut run = Vec::new();
            let mut total: i128 = 0;
            let mut next = Some(head);
            while let Some(index) = next {
                let linked = tails.contains(&index) || head_set.contains(&index);
                if !linked || transformed.contains(&index) {
                    break;
                }
                run.push(index);
                total += stores[index].size as i128;
                next = chain.get(&index).copied();
            }

            let first = &stores[head];
            if total != first.stride && total != -first.stride {
                continue;
            }
            let Ok(size) = u64::try_from(total) else {
                continue;
            };
            let fill = StridedFill {
                stores: run.iter().map(|&r| stores[r].id).collect(),
                head: first.id,
                value: first.value,
                start: first.start.clone(),
                stride: first.stride,
                size,
                align: first.align,
                address_space: first.address_space,
                negative: total == -first.stride,
                whole_loop_fill: false,
            };
            let idiom = if pattern {
                IdiomMatch::PatternFill(fill)
            } else {
                IdiomMatch::Fill(fill)
            };
            if self.rewrite_strided(idiom, be_count)? {
                transformed.extend(run);
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Checks that stores `i` and `k` write the same value, resolving undef to
    /// whatever the other store writes.
    fn merge_values(&self, stores: &mut [StoreInfo], i: usize, k: usize, pattern: bool) -> bool {
        if pattern {
            let a = memset_pattern_value(self.ssa, stores[i].value);
            return a.is_some() && a == memset_pattern_value(self.ssa, stores[k].value);
        }
        let a = bytewise_value(self.ssa, stores[i].value);
        let b = bytewise_value(self.ssa, stores[k].value);
        match (a, b) {
            (Some(ByteValue::Undef), Some(_)) => {
                stores[i].value = stores[k].value;
                true
            }
            (Some(_), Some(ByteValue::Undef)) => {
                stores[k].value = stores[i].value;
                true
            }
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Describes the copy a classified store of a load performs.
    fn detect_copy(&self, store: InstId) -> Option<StridedCopy> {
        let SsaOp::Store {
            addr,
            value,
            flags,
            align,
        } = self.ssa.op(store)?
        else {
            return None;
        };
        let load = self.ssa.def_instruction(*value)?;
        let SsaOp::Load {
            addr: load_addr,
            flags: load_flags,
            align: load_align,
            ..
        } = self.ssa.op(load)?
        else {
            return None;
        };
        let store_rec = self.store_recurrence(*addr)?;
        let load_rec = self.store_recurrence(*load_addr)?;
        Some(StridedCopy {
            store,
            load,
            stride: store_rec.constant_step()?,
            store_start: store_rec.start,
            load_start: load_rec.start,
            size: self.ssa.var_type(*value).store_size(),
            store_align: *align,
            load_align: *load_align,
            store_space: self.ssa.var_type(*addr).address_space().unwrap_or(0),
            load_space: self.ssa.var_type(*load_addr).address_space().unwrap_or(0),
            atomic: flags.is_atomic() || load_flags.is_atomic(),
        })
    }

    /// Widens fill primitives that cover exactly one stride per iteration.
    fn widen_fills(&mut self, block: usize, be_count: &ExitCount) -> Result<bool> {
        if !self.target.has_primitive(Primitive::MemSet) || !self.config.enable_memset {
            return Ok(false);
        }
        let collect = |ssa: &SsaFunction| -> Vec<InstId> {
            ssa.block_ops(block)
                .filter(|(_, op)| matches!(op, SsaOp::MemSet { .. }))
                .map(|(id, _)| id)
                .collect()
        };

        let mut candidates = collect(self.ssa);
        let mut changed = false;
        let mut index = 0;
        while index < candidates.len() {
            let id = candidates[index];
            let next = candidates.get(index + 1).copied();
            index += 1;
            if !self.ssa.is_live(id) {
                continue;
            }
            let Some(fill) = self.detect_widenable_fill(id) else {
                continue;
            };
            if !self.rewrite_strided(IdiomMatch::Fill(fill), be_count)? {
                continue;
            }
            changed = true;
            if next.is_some_and(|n| !self.ssa.is_live(n)) {
                candidates = collect(self.ssa);
                index = 0;
            }
        }
        Ok(changed)
    }

    fn detect_widenable_fill(&self, id: InstId) -> Option<StridedFill> {
        let SsaOp::MemSet {
            addr,
            value,
            len,
            align,
            volatile,
        } = self.ssa.op(id)?
        else {
            return None;
        };
        if *volatile {
            return None;
        }
        let size = u64::try_from(self.ssa.const_int(*len)?).ok()?;
        if size >> 32 != 0 {
            return None;
        }
        let rec = self.store_recurrence(*addr)?;
        let stride = rec.constant_step()?;
        let signed_size = i128::from(size);
        if stride != signed_size && stride != -signed_size {
            return None;
        }
        if !self.is_invariant(*value) {
            return None;
        }
        Some(StridedFill {
            stores: vec![id],
            head: id,
            value: *value,
            start: rec.start,
            stride,
            size,
            align: *align,
            address_space: self.ssa.var_type(*addr).address_space().unwrap_or(0),
            negative: stride == -signed_size,
            whole_loop_fill: true,
        })
    }

    /// Rewrites a fill or copy match into a primitive in the preheader.
    ///
    /// # Returns
    ///
    /// `false` if a legality or profitability check rejected the rewrite; the
    /// function is unchanged in that case.
    pub(super) fn rewrite_strided(&mut self, idiom: IdiomMatch, be_count: &ExitCount) -> Result<bool> {
        match idiom {
            IdiomMatch::Fill(fill) | IdiomMatch::PatternFill(fill) => self.rewrite_fill(&fill, be_count),
            IdiomMatch::Copy(copy) => self.rewrite_copy(&copy, be_count),
            other => Err(malformed_error!(
                "{} is not a strided rewrite",
                other.event_kind()
            )),
        }
    }

    /// Returns `true` if code size heuristics forbid rewriting a multi-block
    /// top-level loop.
    fn avoid_for_multi_block_loop(&self, is_fill: bool, whole_loop_fill: bool) -> bool {
        let Some(info) = self.analyses.loops.loop_for_header(self.header) else {
            return true;
        };
        if self.apply_code_size_heuristics
            && info.size() > 1
            && info.parent.is_none()
            && (!is_fill || !whole_loop_fill)
        {
            debug!(
                "{}: rewrite of multi-block top-level loop {} avoided for code size",
                self.ssa.name(),
                self.header
            );
            return true;
        }
        false
    }

    /// Start of the region for a run moving towards lower addresses.
    fn region_start(&self, start: &SymExpr, negative: bool, size: u64, be_count: &ExitCount) -> SymExpr {
        if !negative {
            return start.clone();
        }
        let (ssa, loops, se) = (&*self.ssa, &self.analyses.loops, &self.analyses.se);
        let span = se.mul(ssa, loops, &be_count.widened(), &SymExpr::Constant(i128::from(size)));
        se.sub(ssa, loops, start, &span)
    }

    /// Bytes covered by `size` bytes per iteration.
    fn region_bytes(&self, size: u64, be_count: &ExitCount) -> SymExpr {
        let (ssa, loops, se) = (&*self.ssa, &self.analyses.loops, &self.analyses.se);
        let trips = se.trip_count(ssa, loops, be_count);
        se.mul(ssa, loops, &trips, &SymExpr::Constant(i128::from(size)))
    }

    fn constant_trip_count(be_count: &ExitCount) -> Option<u64> {
        be_count
            .count
            .as_constant()
            .and_then(|c| u64::try_from(c).ok())
            .and_then(|c| c.checked_add(1))
    }

    fn rewrite_fill(&mut self, fill: &StridedFill, be_count: &ExitCount) -> Result<bool> {
        let byte = bytewise_value(self.ssa, fill.value);
        let pattern = match byte {
            Some(_) => None,
            None => memset_pattern_value(self.ssa, fill.value),
        };
        if byte.is_none()
            && (pattern.is_none() || !self.target.has_primitive(Primitive::MemSetPattern16))
        {
            return Ok(false);
        }

        let preheader = self.preheader()?;
        let start = self.region_start(&fill.start, fill.negative, fill.size, be_count);
        if !self.analyses.se.is_available_at_loop_entry(
            self.ssa,
            &self.analyses.loops,
            &self.analyses.dom,
            &start,
            self.header,
        ) {
            return Ok(false);
        }
        let trip_count = Self::constant_trip_count(be_count);
        let location = MemoryLocation::new(
            start.clone(),
            trip_count.and_then(|t| t.checked_mul(fill.size)),
        );
        let avoid = self.avoid_for_multi_block_loop(true, fill.whole_loop_fill);
        let num_bytes = self.region_bytes(fill.size, be_count);
        let header = self.header;

        let analyses = &*self.analyses;
        let mut expander = Expander::new(self.ssa, &analyses.se, &analyses.loops, preheader);
        let Ok(base) = expander.expand(&start, SsaType::Ptr(fill.address_space)) else {
            expander.rollback();
            return Ok(false);
        };

        let clobbered = {
            let ssa = &*expander.function_mut();
            let query = analyses.alias_query(ssa, header, trip_count);
            analyses
                .oracle
                .may_loop_access(&query, &location, ModRef::MODREF, &fill.stores)
        };
        if clobbered {
            trace!("loop {} reads or writes the filled region", header);
            expander.rollback();
            return Ok(false);
        }
        if avoid {
            expander.rollback();
            return Ok(false);
        }

        let Ok(len) = expander.expand(&num_bytes, SsaType::I64) else {
            expander.rollback();
            return Ok(false);
        };

        let ssa = expander.function_mut();
        let op = match (byte, pattern) {
            (Some(ByteValue::Var(value)), _) => SsaOp::MemSet {
                addr: base,
                value,
                len,
                align: fill.align,
                volatile: false,
            },
            (Some(splat), _) => {
                let byte = match splat {
                    ByteValue::Splat(b) => b,
                    _ => 0,
                };
                let value = ssa.new_var(SsaType::I8);
                ssa.insert_before_terminator(
                    preheader,
                    SsaOp::Const {
                        dest: value,
                        value: ConstValue::int(SsaType::I8, i128::from(byte)),
                    },
                );
                SsaOp::MemSet {
                    addr: base,
                    value,
                    len,
                    align: fill.align,
                    volatile: false,
                }
            }
            (None, Some(pattern)) => SsaOp::MemSetPattern {
                addr: base,
                pattern,
                len,
                align: fill.align,
            },
            (None, None) => return Err(malformed_error!("fill without a fill value")),
        };
        ssa.insert_before_terminator(preheader, op);
        for &store in &fill.stores {
            self.ssa.erase(store);
        }

        let (kind, primitive) = if byte.is_some() {
            (EventKind::FillFormed, Primitive::MemSet)
        } else {
            (
                EventKind::PatternFillFormed,
                Primitive::MemSetPattern16,
            )
        };
        self.record(
            kind,
            format!(
                "Transformed loop-strided store in {} function into a call to {}() function",
                self.ssa.name(),
                primitive
            ),
        );
        Ok(true)
    }

    fn rewrite_copy(&mut self, copy: &StridedCopy, be_count: &ExitCount) -> Result<bool> {
        let negative = i128::from(copy.size) == -copy.stride;
        if copy.atomic {
            let align = copy.store_align.min(copy.load_align);
            if !self.target.has_primitive(Primitive::MemCpyElementAtomic)
                || u64::from(align) < copy.size
                || copy.size > u64::from(self.target.max_atomic_element_size)
            {
                trace!("unordered atomic copy of {} bytes not supported", copy.size);
                return Ok(false);
            }
        }

        let preheader = self.preheader()?;
        let store_start = self.region_start(&copy.store_start, negative, copy.size, be_count);
        let load_start = self.region_start(&copy.load_start, negative, copy.size, be_count);
        for start in [&store_start, &load_start] {
            if !self.analyses.se.is_available_at_loop_entry(
                self.ssa,
                &self.analyses.loops,
                &self.analyses.dom,
                start,
                self.header,
            ) {
                return Ok(false);
            }
        }
        let trip_count = Self::constant_trip_count(be_count);
        let region = trip_count.and_then(|t| t.checked_mul(copy.size));
        let store_location = MemoryLocation::new(store_start.clone(), region);
        let load_location = MemoryLocation::new(load_start.clone(), region);
        let avoid = self.avoid_for_multi_block_loop(false, false);
        let num_bytes = self.region_bytes(copy.size, be_count);
        let header = self.header;
        let ignore = [copy.store];

        let analyses = &*self.analyses;
        let mut expander = Expander::new(self.ssa, &analyses.se, &analyses.loops, preheader);
        let Ok(dest) = expander.expand(&store_start, SsaType::Ptr(copy.store_space)) else {
            expander.rollback();
            return Ok(false);
        };
        let store_clobbered = {
            let ssa = &*expander.function_mut();
            let query = analyses.alias_query(ssa, header, trip_count);
            analyses
                .oracle
                .may_loop_access(&query, &store_location, ModRef::MODREF, &ignore)
        };
        if store_clobbered {
            trace!("loop {} accesses the copy destination", header);
            expander.rollback();
            return Ok(false);
        }

        let Ok(src) = expander.expand(&load_start, SsaType::Ptr(copy.load_space)) else {
            expander.rollback();
            return Ok(false);
        };
        let load_clobbered = {
            let ssa = &*expander.function_mut();
            let query = analyses.alias_query(ssa, header, trip_count);
            analyses
                .oracle
                .may_loop_access(&query, &load_location, ModRef::MOD, &ignore)
        };
        if load_clobbered || avoid {
            expander.rollback();
            return Ok(false);
        }

        let Ok(len) = expander.expand(&num_bytes, SsaType::I64) else {
            expander.rollback();
            return Ok(false);
        };
        let element_size = if copy.atomic {
            u32::try_from(copy.size).ok()
        } else {
            None
        };
        expander.function_mut().insert_before_terminator(
            preheader,
            SsaOp::MemCpy {
                dest,
                src,
                len,
                align: copy.store_align.min(copy.load_align),
                element_size,
            },
        );
        self.ssa.erase(copy.store);

        self.record(
            EventKind::CopyFormed,
            format!(
                "Formed a call to {}() intrinsic from load and store instruction in {} function",
                if copy.atomic {
                    Primitive::MemCpyElementAtomic
                } else {
                    Primitive::MemCpy
                },
                self.ssa.name()
            ),
        );
        Ok(true)
    }
}
