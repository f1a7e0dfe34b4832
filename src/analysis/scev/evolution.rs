//! Scalar evolution: symbolic values, affine recurrences and trip counts.
//!
//! [`ScalarEvolution`] maps SSA values to [`SymExpr`]s. Header phis whose
//! back-edge value differs from the phi by a loop-invariant amount become
//! recurrences, which lets address computations inside a loop be described as
//! `{start,+,stride}` and lets the number of iterations be derived from the
//! loop's exit condition.
//!
//! The analysis is computed lazily. Expressions and back-edge-taken counts are
//! cached; once the IR of a loop changes, [`ScalarEvolution::forget_loop`] must
//! be called before the loop is queried again.

use std::{cell::RefCell, collections::HashMap};

use crate::{
    analysis::{
        cfg::LoopForest,
        scev::SymExpr,
        ssa::{mask_bits, CastKind, CmpKind, DefSite, SsaFunction, SsaOp, SsaVarId, POINTER_BITS},
    },
    utils::graph::{algorithms::DominatorTree, NodeId},
};

/// Recursion limit when building expressions; deeper values become opaque.
const MAX_EXPRESSION_DEPTH: usize = 64;

/// Upper bound on the iterations simulated for fully constant exit conditions.
const MAX_SIMULATED_ITERATIONS: u64 = 1 << 20;

/// Number of times a loop's back edge is taken before it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitCount {
    /// The count, wrapping at `bits`.
    pub count: SymExpr,
    /// Width of the comparison the count was derived from.
    pub bits: u32,
}

impl ExitCount {
    /// Returns the count as a pointer-width value.
    ///
    /// Counts derived from narrower comparisons are zero-extended.
    #[must_use]
    pub fn widened(&self) -> SymExpr {
        if self.bits >= POINTER_BITS {
            return self.count.clone();
        }
        self.count.zext(self.bits)
    }
}

/// `{start,+,step}` over the loop headed by `header`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffineRecurrence {
    /// Value on the first iteration.
    pub start: SymExpr,
    /// Increment per iteration.
    pub step: SymExpr,
    /// Header of the loop.
    pub header: NodeId,
}

impl AffineRecurrence {
    /// Extracts the recurrence from `expr` if it is one over `header`.
    #[must_use]
    pub fn from_expr(expr: &SymExpr, header: NodeId) -> Option<Self> {
        let (start, step, h) = expr.as_add_rec()?;
        (h == header).then(|| Self {
            start: start.clone(),
            step: step.clone(),
            header,
        })
    }

    /// Returns the step if it is a constant.
    #[must_use]
    pub fn constant_step(&self) -> Option<i128> {
        self.step.as_constant()
    }
}

/// Lazily computed symbolic view of the values of one function.
#[derive(Debug, Default)]
pub struct ScalarEvolution {
    values: RefCell<HashMap<SsaVarId, SymExpr>>,
    exit_counts: RefCell<HashMap<NodeId, Option<ExitCount>>>,
}

impl ScalarEvolution {
    /// Creates an analysis with empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the symbolic expression for `var`.
    ///
    /// # Arguments
    ///
    /// * `ssa` - The function `var` belongs to
    /// * `loops` - The loop forest of `ssa`
    /// * `var` - The value to describe
    ///
    /// # Returns
    ///
    /// The expression, or [`SymExpr::Value`] if nothing is known about `var`.
    pub fn expr(&self, ssa: &SsaFunction, loops: &LoopForest, var: SsaVarId) -> SymExpr {
        if let Some(e) = self.values.borrow().get(&var) {
            return e.clone();
        }
        let mut memo = HashMap::new();
        let result = self.compute(ssa, loops, var, &mut memo, 0);
        self.values.borrow_mut().extend(memo);
        result
    }

    /// Returns the affine recurrence `var` follows in the loop headed by `header`.
    pub fn affine_recurrence(
        &self,
        ssa: &SsaFunction,
        loops: &LoopForest,
        var: SsaVarId,
        header: NodeId,
    ) -> Option<AffineRecurrence> {
        AffineRecurrence::from_expr(&self.expr(ssa, loops, var), header)
    }

    /// Builds the canonical sum `a + b`.
    pub fn add(&self, ssa: &SsaFunction, loops: &LoopForest, a: &SymExpr, b: &SymExpr) -> SymExpr {
        let (ca, mut terms) = a.linear_terms();
        let (cb, tb) = b.linear_terms();
        terms.extend(tb);
        self.fold_sum(ssa, loops, ca.wrapping_add(cb), terms)
    }

    /// Builds the canonical difference `a - b`.
    pub fn sub(&self, ssa: &SsaFunction, loops: &LoopForest, a: &SymExpr, b: &SymExpr) -> SymExpr {
        self.add(ssa, loops, a, &b.neg())
    }

    /// Builds the canonical product `a * b`.
    pub fn mul(&self, ssa: &SsaFunction, loops: &LoopForest, a: &SymExpr, b: &SymExpr) -> SymExpr {
        if let Some(k) = a.as_constant() {
            return b.scale(k);
        }
        if let Some(k) = b.as_constant() {
            return a.scale(k);
        }

        for (rec, other) in [(a, b), (b, a)] {
            if let Some((start, step, header)) = rec.as_add_rec() {
                if self.is_loop_invariant(ssa, loops, other, header) {
                    let start = self.mul(ssa, loops, start, other);
                    let step = self.mul(ssa, loops, step, other);
                    return Self::add_rec(start, step, header);
                }
            }
        }

        for (sum, other) in [(a, b), (b, a)] {
            if let SymExpr::Sum { constant, terms } = sum {
                let mut distributed = vec![(other.scale(*constant), 1)];
                for (term, k) in terms {
                    distributed.push((self.mul(ssa, loops, term, other).scale(*k), 1));
                }
                return self.fold_sum(ssa, loops, 0, distributed);
            }
        }

        SymExpr::product(vec![a.clone(), b.clone()])
    }

    /// Builds `{start,+,step}<header>`, collapsing a zero step to `start`.
    #[must_use]
    pub fn add_rec(start: SymExpr, step: SymExpr, header: NodeId) -> SymExpr {
        if step.is_zero() {
            return start;
        }
        SymExpr::AddRec {
            start: Box::new(start),
            step: Box::new(step),
            header,
        }
    }

    /// Returns `true` if `expr` has the same value on every iteration of the loop
    /// headed by `header`.
    ///
    /// Values defined inside the loop are variant. A recurrence is invariant only
    /// if it belongs to a loop strictly enclosing this one.
    pub fn is_loop_invariant(
        &self,
        ssa: &SsaFunction,
        loops: &LoopForest,
        expr: &SymExpr,
        header: NodeId,
    ) -> bool {
        let Some(info) = loops.loop_for_header(header) else {
            return false;
        };
        match expr {
            SymExpr::Constant(_) => true,
            SymExpr::Value(v) => match ssa.def_site(*v) {
                DefSite::Param(_) => true,
                DefSite::Unplaced => false,
                _ => ssa
                    .def_block(*v)
                    .is_some_and(|b| !info.contains(NodeId::new(b))),
            },
            SymExpr::ZeroExtend { operand, .. } => {
                self.is_loop_invariant(ssa, loops, operand, header)
            }
            SymExpr::Product(factors) => factors
                .iter()
                .all(|f| self.is_loop_invariant(ssa, loops, f, header)),
            SymExpr::Sum { terms, .. } => terms
                .iter()
                .all(|(t, _)| self.is_loop_invariant(ssa, loops, t, header)),
            SymExpr::AddRec {
                start,
                step,
                header: h,
            } => {
                *h != header
                    && loops.is_nested_in(header, *h)
                    && self.is_loop_invariant(ssa, loops, start, header)
                    && self.is_loop_invariant(ssa, loops, step, header)
            }
        }
    }

    /// Returns `true` if `expr` can be materialized in front of the loop headed by `header`.
    ///
    /// This requires the expression to be loop invariant and every value it
    /// refers to to be defined in a block that strictly dominates the header.
    pub fn is_available_at_loop_entry(
        &self,
        ssa: &SsaFunction,
        loops: &LoopForest,
        dom: &DominatorTree,
        expr: &SymExpr,
        header: NodeId,
    ) -> bool {
        self.is_loop_invariant(ssa, loops, expr, header)
            && expr.values().into_iter().all(|v| match ssa.def_site(v) {
                DefSite::Param(_) => true,
                DefSite::Unplaced => false,
                _ => ssa
                    .def_block(v)
                    .is_some_and(|b| dom.strictly_dominates(NodeId::new(b), header)),
            })
    }

    /// Computes how often the back edge is taken before the loop leaves through `exiting`.
    ///
    /// The exiting block must end in a conditional branch on an integer
    /// comparison between a recurrence of this loop and a loop-invariant value.
    /// Symbolic counts are derived for `!=` conditions with a unit step; fully
    /// constant conditions are evaluated directly. Relational exits such as
    /// `i < n` against a symbolic bound are not counted.
    ///
    /// # Arguments
    ///
    /// * `ssa` - The function containing the loop
    /// * `loops` - The loop forest of `ssa`
    /// * `header` - Header of the loop
    /// * `exiting` - A block inside the loop with a successor outside it
    ///
    /// # Returns
    ///
    /// The count, or `None` if it cannot be computed.
    pub fn exit_count(
        &self,
        ssa: &SsaFunction,
        loops: &LoopForest,
        header: NodeId,
        exiting: NodeId,
    ) -> Option<ExitCount> {
        let info = loops.loop_for_header(header)?;
        let SsaOp::Branch {
            condition,
            true_target,
            false_target,
        } = ssa.terminator(exiting.index())?
        else {
            return None;
        };

        let continue_on_true = match (
            info.contains(NodeId::new(*true_target)),
            info.contains(NodeId::new(*false_target)),
        ) {
            (true, false) => true,
            (false, true) => false,
            _ => return None,
        };

        let SsaOp::Cmp {
            kind, left, right, ..
        } = ssa.def_op(*condition)?
        else {
            return None;
        };
        let bits = ssa.var_type(*left).bits();
        let mut kind = if continue_on_true { *kind } else { kind.inverse() };
        let mut lhs = self.expr(ssa, loops, *left);
        let mut rhs = self.expr(ssa, loops, *right);
        if lhs.as_add_rec().map(|r| r.2) != Some(header) {
            std::mem::swap(&mut lhs, &mut rhs);
            kind = kind.swapped();
        }

        let (start, step, h) = lhs.as_add_rec()?;
        if h != header || !self.is_loop_invariant(ssa, loops, &rhs, header) {
            return None;
        }

        if rhs.is_zero() {
            kind = match kind {
                CmpKind::Ugt => CmpKind::Ne,
                CmpKind::Ule => CmpKind::Eq,
                other => other,
            };
        }

        if kind == CmpKind::Ne {
            let count = match step.as_constant() {
                Some(1) => Some(self.sub(ssa, loops, &rhs, start)),
                Some(-1) => Some(self.sub(ssa, loops, start, &rhs)),
                _ => None,
            };
            if let Some(count) = count {
                let count = match count.as_constant() {
                    Some(c) => SymExpr::Constant(((c as u128) & mask_bits(bits)) as i128),
                    None => count,
                };
                return Some(ExitCount { count, bits });
            }
        }

        let (s, st, r) = (start.as_constant()?, step.as_constant()?, rhs.as_constant()?);
        simulate_exit(kind, s, st, r, bits).map(|n| ExitCount {
            count: SymExpr::Constant(n),
            bits,
        })
    }

    /// Returns the back-edge-taken count of the loop headed by `header`.
    ///
    /// The loop must have a single exiting block that dominates every latch.
    /// Results, including failures, are cached until [`Self::forget_loop`].
    pub fn backedge_taken_count(
        &self,
        ssa: &SsaFunction,
        loops: &LoopForest,
        dom: &DominatorTree,
        header: NodeId,
    ) -> Option<ExitCount> {
        if let Some(cached) = self.exit_counts.borrow().get(&header) {
            return cached.clone();
        }

        let result = loops.loop_for_header(header).and_then(|info| {
            let exiting = info.exiting_blocks(ssa);
            let [exiting] = exiting.as_slice() else {
                return None;
            };
            let latches = info.latches(ssa);
            if latches.is_empty() || !latches.iter().all(|&l| dom.dominates(*exiting, l)) {
                return None;
            }
            self.exit_count(ssa, loops, header, *exiting)
        });

        self.exit_counts.borrow_mut().insert(header, result.clone());
        result
    }

    /// Returns the number of iterations, `backedge_taken_count + 1`, as a pointer-width value.
    pub fn trip_count(&self, ssa: &SsaFunction, loops: &LoopForest, count: &ExitCount) -> SymExpr {
        self.add(ssa, loops, &count.widened(), &SymExpr::Constant(1))
    }

    /// Drops everything cached about the loop headed by `header`.
    ///
    /// Cached value expressions are dropped as a whole, since values outside the
    /// loop may have been described in terms of values inside it.
    pub fn forget_loop(&self, header: NodeId) {
        self.exit_counts.borrow_mut().remove(&header);
        self.values.borrow_mut().clear();
    }

    /// Returns `true` if a back-edge-taken count for `header` is cached.
    #[must_use]
    pub fn is_cached(&self, header: NodeId) -> bool {
        self.exit_counts.borrow().contains_key(&header)
    }

    fn fold_sum(
        &self,
        ssa: &SsaFunction,
        loops: &LoopForest,
        constant: i128,
        terms: Vec<(SymExpr, i128)>,
    ) -> SymExpr {
        let flat = SymExpr::from_terms(constant, terms);
        let (constant, terms) = flat.linear_terms();

        let innermost = terms
            .iter()
            .filter_map(|(t, _)| t.as_add_rec().map(|r| r.2))
            .max_by_key(|h| (loops.loop_for_header(*h).map_or(0, |l| l.depth), *h));
        let Some(header) = innermost else {
            return flat;
        };

        let mut starts = vec![(SymExpr::Constant(constant), 1)];
        let mut steps = Vec::new();
        let mut rest = Vec::new();
        let mut merged = 0;
        for (term, k) in terms {
            match term {
                SymExpr::AddRec {
                    start,
                    step,
                    header: h,
                } if h == header => {
                    starts.push((*start, k));
                    steps.push((*step, k));
                    merged += 1;
                }
                other if self.is_loop_invariant(ssa, loops, &other, header) => {
                    starts.push((other, k))
                }
                other => rest.push((other, k)),
            }
        }

        // A single recurrence with nothing to absorb is already canonical.
        if merged == 1 && starts.len() == 1 && constant == 0 {
            return flat;
        }

        let start = self.fold_sum(ssa, loops, 0, starts);
        let step = self.fold_sum(ssa, loops, 0, steps);
        let rec = Self::add_rec(start, step, header);
        if rest.is_empty() {
            return rec;
        }
        rest.push((rec, 1));
        SymExpr::from_terms(0, rest)
    }

    fn compute(
        &self,
        ssa: &SsaFunction,
        loops: &LoopForest,
        var: SsaVarId,
        memo: &mut HashMap<SsaVarId, SymExpr>,
        depth: usize,
    ) -> SymExpr {
        if let Some(e) = memo.get(&var) {
            return e.clone();
        }
        if let Some(e) = self.values.borrow().get(&var) {
            return e.clone();
        }

        let opaque = SymExpr::Value(var);
        let result = if depth > MAX_EXPRESSION_DEPTH {
            opaque
        } else {
            match ssa.def_site(var) {
                DefSite::Phi(block) => self.compute_phi(ssa, loops, var, block, memo, depth),
                DefSite::Instruction(_) => match ssa.def_op(var) {
                    Some(op) => self.compute_op(ssa, loops, var, op, memo, depth),
                    None => opaque,
                },
                DefSite::Param(_) | DefSite::Unplaced => opaque,
            }
        };
        memo.insert(var, result.clone());
        result
    }

    fn compute_op(
        &self,
        ssa: &SsaFunction,
        loops: &LoopForest,
        var: SsaVarId,
        op: &SsaOp,
        memo: &mut HashMap<SsaVarId, SymExpr>,
        depth: usize,
    ) -> SymExpr {
        let opaque = SymExpr::Value(var);
        let depth = depth + 1;
        match op {
            SsaOp::Const { value, .. } => value.as_i128().map_or(opaque, SymExpr::Constant),
            SsaOp::Copy { src, .. } => self.compute(ssa, loops, *src, memo, depth),
            SsaOp::Add { left, right, .. } | SsaOp::PtrAdd {
                base: left,
                offset: right,
                ..
            } => {
                let l = self.compute(ssa, loops, *left, memo, depth);
                let r = self.compute(ssa, loops, *right, memo, depth);
                self.add(ssa, loops, &l, &r)
            }
            SsaOp::Sub { left, right, .. } => {
                let l = self.compute(ssa, loops, *left, memo, depth);
                let r = self.compute(ssa, loops, *right, memo, depth);
                self.sub(ssa, loops, &l, &r)
            }
            SsaOp::Mul { left, right, .. } => {
                let l = self.compute(ssa, loops, *left, memo, depth);
                let r = self.compute(ssa, loops, *right, memo, depth);
                self.mul(ssa, loops, &l, &r)
            }
            SsaOp::Shl { value, amount, .. } => {
                let bits = ssa.var_type(var).bits();
                match ssa.const_int(*amount) {
                    Some(k) if k >= 0 && (k as u32) < bits.min(127) => {
                        let v = self.compute(ssa, loops, *value, memo, depth);
                        v.scale(1i128 << k)
                    }
                    _ => opaque,
                }
            }
            SsaOp::Cast {
                kind: CastKind::PtrToInt | CastKind::IntToPtr,
                operand,
                ..
            } => self.compute(ssa, loops, *operand, memo, depth),
            SsaOp::Cast {
                kind: CastKind::ZExt,
                operand,
                ..
            } => {
                let bits = ssa.var_type(*operand).bits();
                let inner = self.compute(ssa, loops, *operand, memo, depth);
                inner.zext(bits)
            }
            _ => opaque,
        }
    }

    fn compute_phi(
        &self,
        ssa: &SsaFunction,
        loops: &LoopForest,
        var: SsaVarId,
        block: usize,
        memo: &mut HashMap<SsaVarId, SymExpr>,
        depth: usize,
    ) -> SymExpr {
        let opaque = SymExpr::Value(var);
        let header = NodeId::new(block);
        let (Some(info), Some(phi)) = (loops.loop_for_header(header), ssa.phi(block, var)) else {
            return opaque;
        };
        if phi.operand_count() != 2 {
            return opaque;
        }

        let mut init = None;
        let mut backedge = None;
        for operand in phi.operands() {
            if info.contains(NodeId::new(operand.predecessor())) {
                backedge = Some(operand.value());
            } else {
                init = Some(operand.value());
            }
        }
        let (Some(init), Some(backedge)) = (init, backedge) else {
            return opaque;
        };

        // Evaluate the back-edge value with the phi itself held symbolic.
        let mut inner = memo.clone();
        inner.insert(var, opaque.clone());
        let next = self.compute(ssa, loops, backedge, &mut inner, depth + 1);
        let step = self.sub(ssa, loops, &next, &opaque);
        if step.contains_value(var) || !self.is_loop_invariant(ssa, loops, &step, header) {
            return opaque;
        }

        let start = self.compute(ssa, loops, init, memo, depth + 1);
        Self::add_rec(start, step, header)
    }
}

/// Runs a constant recurrence until `value <kind> rhs` fails and returns the iteration.
fn simulate_exit(kind: CmpKind, start: i128, step: i128, rhs: i128, bits: u32) -> Option<i128> {
    let mask = mask_bits(bits);
    let step = (step as u128) & mask;
    let rhs = (rhs as u128) & mask;
    let mut value = (start as u128) & mask;
    for iteration in 0..MAX_SIMULATED_ITERATIONS {
        if !kind.evaluate(value, rhs, bits) {
            return Some(i128::from(iteration));
        }
        value = value.wrapping_add(step) & mask;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{
            cfg::detect_loops,
            ssa::{FunctionBuilder, SsaType},
        },
        utils::graph::algorithms::compute_dominators,
    };

    struct Counted {
        ssa: SsaFunction,
        body: usize,
        n: SsaVarId,
        p: SsaVarId,
        i: SsaVarId,
        next: SsaVarId,
        addr: SsaVarId,
    }

    /// `for (i = 0; i != n; i++) p[i] = 0` in rotated form, with `n` optionally constant.
    fn counted_loop(limit: Option<i128>, bits: u32) -> Counted {
        counted_loop_exiting_on(CmpKind::Eq, limit, bits)
    }

    /// Like [`counted_loop`], leaving the loop once `i + 1 <exit> n` holds.
    fn counted_loop_exiting_on(exit: CmpKind, limit: Option<i128>, bits: u32) -> Counted {
        let ty = SsaType::int(bits).unwrap();
        let mut f = FunctionBuilder::new("f", SsaType::Void);
        let p = f.param(SsaType::Ptr(0), true);
        let param_n = f.param(ty, false);
        let entry = f.block("entry");
        let body = f.block("body");
        let exit_block = f.block("exit");

        f.switch_to(entry);
        let zero = f.const_int(ty, 0);
        let n = match limit {
            Some(c) => f.const_int(ty, c),
            None => param_n,
        };
        f.jump(body);

        f.switch_to(body);
        let i = f.phi(ty);
        let wide = if bits < 64 { f.zext(i, SsaType::I64) } else { i };
        let four = f.const_int(SsaType::I64, 4);
        let offset = f.mul(wide, four);
        let addr = f.ptr_add(p, offset);
        let value = f.const_int(SsaType::I32, 0);
        f.store(addr, value);
        let one = f.const_int(ty, 1);
        let next = f.add(i, one);
        let done = f.cmp(exit, next, n);
        f.branch(done, exit_block, body);
        f.phi_incoming(i, zero, entry);
        f.phi_incoming(i, next, body);

        f.switch_to(exit_block);
        f.ret(None);

        Counted {
            ssa: f.finish().unwrap(),
            body,
            n,
            p,
            i,
            next,
            addr,
        }
    }

    fn analyses(ssa: &SsaFunction) -> (DominatorTree, LoopForest) {
        let dom = compute_dominators(ssa, NodeId::new(ssa.entry_block()));
        let loops = detect_loops(ssa, &dom);
        (dom, loops)
    }

    #[test]
    fn test_induction_variable_is_recurrence() {
        let c = counted_loop(None, 64);
        let (_, loops) = analyses(&c.ssa);
        let se = ScalarEvolution::new();
        let header = NodeId::new(c.body);

        let rec = se.affine_recurrence(&c.ssa, &loops, c.i, header).unwrap();
        assert!(rec.start.is_zero());
        assert_eq!(rec.constant_step(), Some(1));

        let rec = se.affine_recurrence(&c.ssa, &loops, c.next, header).unwrap();
        assert_eq!(rec.start.as_constant(), Some(1));
        assert_eq!(rec.constant_step(), Some(1));
    }

    #[test]
    fn test_address_is_strided_recurrence() {
        let c = counted_loop(None, 64);
        let (_, loops) = analyses(&c.ssa);
        let se = ScalarEvolution::new();

        let rec = se
            .affine_recurrence(&c.ssa, &loops, c.addr, NodeId::new(c.body))
            .unwrap();
        assert_eq!(rec.start, SymExpr::Value(c.p));
        assert_eq!(rec.constant_step(), Some(4));
    }

    #[test]
    fn test_symbolic_backedge_count() {
        let c = counted_loop(None, 64);
        let (dom, loops) = analyses(&c.ssa);
        let se = ScalarEvolution::new();
        let header = NodeId::new(c.body);

        let count = se.backedge_taken_count(&c.ssa, &loops, &dom, header).unwrap();
        assert_eq!(count.bits, 64);
        assert_eq!(count.count, SymExpr::from_terms(-1, vec![(SymExpr::Value(c.n), 1)]));
        assert_eq!(se.trip_count(&c.ssa, &loops, &count), SymExpr::Value(c.n));
    }

    #[test]
    fn test_constant_backedge_count() {
        let c = counted_loop(Some(10), 64);
        let (dom, loops) = analyses(&c.ssa);
        let se = ScalarEvolution::new();

        let count = se
            .backedge_taken_count(&c.ssa, &loops, &dom, NodeId::new(c.body))
            .unwrap();
        assert_eq!(count.count.as_constant(), Some(9));
    }

    #[test]
    fn test_narrow_count_is_zero_extended() {
        let c = counted_loop(None, 32);
        let (dom, loops) = analyses(&c.ssa);
        let se = ScalarEvolution::new();

        let count = se
            .backedge_taken_count(&c.ssa, &loops, &dom, NodeId::new(c.body))
            .unwrap();
        assert_eq!(count.bits, 32);
        assert!(matches!(count.widened(), SymExpr::ZeroExtend { bits: 32, .. }));
    }

    #[test]
    fn test_unsigned_less_than_is_counted_only_for_constant_bounds() {
        let c = counted_loop_exiting_on(CmpKind::Uge, Some(10), 64);
        let (dom, loops) = analyses(&c.ssa);
        let se = ScalarEvolution::new();
        let count = se
            .backedge_taken_count(&c.ssa, &loops, &dom, NodeId::new(c.body))
            .unwrap();
        assert_eq!(count.count.as_constant(), Some(9));

        let c = counted_loop_exiting_on(CmpKind::Uge, None, 64);
        let (dom, loops) = analyses(&c.ssa);
        let se = ScalarEvolution::new();
        assert!(se
            .backedge_taken_count(&c.ssa, &loops, &dom, NodeId::new(c.body))
            .is_none());
    }

    #[test]
    fn test_cache_and_forget() {
        let c = counted_loop(Some(3), 64);
        let (dom, loops) = analyses(&c.ssa);
        let se = ScalarEvolution::new();
        let header = NodeId::new(c.body);

        assert!(!se.is_cached(header));
        se.backedge_taken_count(&c.ssa, &loops, &dom, header);
        assert!(se.is_cached(header));
        se.forget_loop(header);
        assert!(!se.is_cached(header));
    }

    #[test]
    fn test_invariance_and_availability() {
        let c = counted_loop(None, 64);
        let (dom, loops) = analyses(&c.ssa);
        let se = ScalarEvolution::new();
        let header = NodeId::new(c.body);

        let n = SymExpr::Value(c.n);
        assert!(se.is_loop_invariant(&c.ssa, &loops, &n, header));
        assert!(se.is_available_at_loop_entry(&c.ssa, &loops, &dom, &n, header));

        let i = se.expr(&c.ssa, &loops, c.i);
        assert!(!se.is_loop_invariant(&c.ssa, &loops, &i, header));
    }

    #[test]
    fn test_add_folds_invariant_into_start() {
        let c = counted_loop(None, 64);
        let (_, loops) = analyses(&c.ssa);
        let se = ScalarEvolution::new();
        let header = NodeId::new(c.body);

        let i = se.expr(&c.ssa, &loops, c.i);
        let sum = se.add(&c.ssa, &loops, &i, &SymExpr::Value(c.n));
        let (start, step, h) = sum.as_add_rec().unwrap();
        assert_eq!(h, header);
        assert_eq!(*start, SymExpr::Value(c.n));
        assert_eq!(step.as_constant(), Some(1));

        let scaled = se.mul(&c.ssa, &loops, &sum, &SymExpr::Constant(8));
        assert_eq!(scaled.as_add_rec().unwrap().1.as_constant(), Some(8));
    }

    #[test]
    fn test_simulate_exit() {
        assert_eq!(simulate_exit(CmpKind::Ult, 0, 2, 10, 64), Some(5));
        assert_eq!(simulate_exit(CmpKind::Ne, 250, 1, 4, 8), Some(10));
        assert_eq!(simulate_exit(CmpKind::Ne, 1, 2, 4, 64), None);
    }
}
