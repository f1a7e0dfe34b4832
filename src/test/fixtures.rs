//! Small functions shaped like the loops the idiom pass looks for.
//!
//! Loop bodies keep their constants in the entry block, so that the body sizes
//! the size gates see are exactly the operations listed in each doc comment.

use crate::analysis::ssa::{
    BitCountKind, CmpKind, ConstValue, FunctionBuilder, InstId, MemFlags, SsaFunction, SsaOp,
    SsaType, SsaVarId,
};

/// A single-block counted loop.
pub struct CountedLoop {
    pub ssa: SsaFunction,
    pub preheader: usize,
    pub body: usize,
    pub exit: usize,
    /// The store (or fill primitive) of interest in the body.
    pub store: InstId,
}

/// A two-block buffer comparison loop.
pub struct CompareLoop {
    pub ssa: SsaFunction,
    pub header: usize,
    pub latch: usize,
}

/// A buffer comparison loop nested in a counting outer loop.
pub struct NestedCompareLoop {
    pub ssa: SsaFunction,
    pub outer: usize,
    pub header: usize,
}

/// A guarded bit counting loop.
pub struct GuardedLoop {
    pub ssa: SsaFunction,
    pub precondition: usize,
    pub preheader: usize,
    pub body: usize,
    pub exit: usize,
    pub seed: SsaVarId,
}

/// Direction of a shift-until-zero loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    Lshr,
    Ashr,
    Shl,
}

fn find_op(ssa: &SsaFunction, block: usize, pred: impl Fn(&SsaOp) -> bool) -> InstId {
    ssa.block_ops(block)
        .find(|(_, op)| pred(op))
        .map(|(id, _)| id)
        .expect("fixture contains the operation")
}

/// Shared skeleton: `for (i = 0; i != bound; i++) { emit(f, i) }` over `i64`.
///
/// The body holds `phi, <emit>, add, cmp, branch`. `emit` receives the builder
/// positioned in the body, the counter and the leading parameters.
fn counted_loop(
    name: &str,
    limit: Option<i128>,
    params: &[(SsaType, bool)],
    emit: impl FnOnce(&mut FunctionBuilder, SsaVarId, &[SsaVarId]),
    store: impl Fn(&SsaOp) -> bool,
) -> CountedLoop {
    let mut f = FunctionBuilder::new(name, SsaType::Void);
    let args: Vec<SsaVarId> = params.iter().map(|&(ty, noalias)| f.param(ty, noalias)).collect();
    let n = f.param(SsaType::I64, false);
    let entry = f.block("entry");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(SsaType::I64, 0);
    let one = f.const_int(SsaType::I64, 1);
    let bound = match limit {
        Some(k) => f.const_int(SsaType::I64, k),
        None => n,
    };
    f.jump(body);

    f.switch_to(body);
    let i = f.phi(SsaType::I64);
    emit(&mut f, i, &args);
    let next = f.add(i, one);
    let done = f.cmp(CmpKind::Eq, next, bound);
    f.branch(done, exit, body);
    f.phi_incoming(i, zero, entry);
    f.phi_incoming(i, next, body);

    f.switch_to(exit);
    f.ret(None);

    let ssa = f.finish().expect("fixture verifies");
    let store = find_op(&ssa, body, store);
    CountedLoop {
        ssa,
        preheader: entry,
        body,
        exit,
        store,
    }
}

/// Emits `addr = base + i * scale` with the scale constant placed in the entry block.
fn strided_address(f: &mut FunctionBuilder, base: SsaVarId, i: SsaVarId, scale: i128) -> SsaVarId {
    let k = entry_const(f, SsaType::I64, scale);
    let offset = f.mul(i, k);
    f.ptr_add(base, offset)
}

/// Materializes a constant at the end of the entry block, ahead of its terminator.
fn entry_const(f: &mut FunctionBuilder, ty: SsaType, value: i128) -> SsaVarId {
    let ssa = f.function_mut();
    let dest = ssa.new_var(ty);
    ssa.insert_before_terminator(
        0,
        SsaOp::Const {
            dest,
            value: ConstValue::int(ty, value),
        },
    );
    dest
}

/// `for (i = 0; i != n; i++) p[i] = 0` over `i32`.
///
/// Body: `phi, mul, ptr_add, store, add, cmp, branch`.
pub fn zero_fill(limit: Option<i128>) -> CountedLoop {
    zero_fill_named("zero_fill", limit)
}

/// [`zero_fill`] in a function called `name`.
pub fn zero_fill_named(name: &str, limit: Option<i128>) -> CountedLoop {
    counted_loop(
        name,
        limit,
        &[(SsaType::Ptr(0), true)],
        |f, i, args| {
            let zero = entry_const(f, SsaType::I32, 0);
            let addr = strided_address(f, args[0], i, 4);
            f.store(addr, zero);
        },
        |op| matches!(op, SsaOp::Store { .. }),
    )
}

/// `for (i = 0; i != n; i++) p[i] = value` over `ty`.
pub fn constant_fill(ty: SsaType, value: i128) -> CountedLoop {
    let size = ty.store_size() as i128;
    counted_loop(
        "constant_fill",
        None,
        &[(SsaType::Ptr(0), true)],
        |f, i, args| {
            let value = entry_const(f, ty, value);
            let addr = strided_address(f, args[0], i, size);
            f.store(addr, value);
        },
        |op| matches!(op, SsaOp::Store { .. }),
    )
}

/// `for (i = 0; i != n; i++) { p[2i] = 0; p[2i + 1] = 0; }` over `i32`.
pub fn paired_fill() -> CountedLoop {
    counted_loop(
        "paired_fill",
        None,
        &[(SsaType::Ptr(0), true)],
        |f, i, args| {
            let zero = entry_const(f, SsaType::I32, 0);
            let four = entry_const(f, SsaType::I64, 4);
            let low = strided_address(f, args[0], i, 8);
            f.store(low, zero);
            let high = f.ptr_add(low, four);
            f.store(high, zero);
        },
        |op| matches!(op, SsaOp::Store { .. }),
    )
}

/// `for (i = 0; i != n; i++) dst[i] = src[i]` over `ty`, optionally with
/// unordered atomic accesses.
pub fn copy_loop(ty: SsaType, atomic: bool) -> CountedLoop {
    let size = ty.store_size() as i128;
    counted_loop(
        "copy_loop",
        None,
        &[(SsaType::Ptr(0), true), (SsaType::Ptr(0), true)],
        |f, i, args| {
            let (dst, src) = (args[0], args[1]);
            let from = strided_address(f, src, i, size);
            let to = strided_address(f, dst, i, size);
            let align = ty.store_size() as u32;
            if atomic {
                let value = f.load_with(ty, from, MemFlags::UNORDERED, align);
                f.store_with(to, value, MemFlags::UNORDERED, align);
            } else {
                let value = f.load(ty, from);
                f.store(to, value);
            }
        },
        |op| matches!(op, SsaOp::Store { .. }),
    )
}

/// `for (i = 0; i != n; i++) memset(p + i * size, 0, size)`.
pub fn memset_per_iteration(size: i128) -> CountedLoop {
    counted_loop(
        "memset_rows",
        None,
        &[(SsaType::Ptr(0), true)],
        |f, i, args| {
            let zero = entry_const(f, SsaType::I8, 0);
            let len = entry_const(f, SsaType::I64, size);
            let addr = strided_address(f, args[0], i, size);
            f.memset(addr, zero, len, false);
        },
        |op| matches!(op, SsaOp::MemSet { .. }),
    )
}

/// [`zero_fill`] that also reads `p[i]` before overwriting it.
pub fn fill_with_read() -> CountedLoop {
    counted_loop(
        "fill_with_read",
        None,
        &[(SsaType::Ptr(0), true)],
        |f, i, args| {
            let zero = entry_const(f, SsaType::I32, 0);
            let addr = strided_address(f, args[0], i, 4);
            f.load(SsaType::I32, addr);
            f.store(addr, zero);
        },
        |op| matches!(op, SsaOp::Store { .. }),
    )
}

/// A counted loop with no memory accesses and a unique exit.
pub fn empty_counted_loop() -> CountedLoop {
    let mut f = FunctionBuilder::new("spin", SsaType::Void);
    let n = f.param(SsaType::I64, false);
    let entry = f.block("entry");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(SsaType::I64, 0);
    let one = f.const_int(SsaType::I64, 1);
    f.jump(body);

    f.switch_to(body);
    let i = f.phi(SsaType::I64);
    let next = f.add(i, one);
    let done = f.cmp(CmpKind::Eq, next, n);
    f.branch(done, exit, body);
    f.phi_incoming(i, zero, entry);
    f.phi_incoming(i, next, body);

    f.switch_to(exit);
    f.ret(None);

    let ssa = f.finish().expect("fixture verifies");
    let store = find_op(&ssa, body, |op| matches!(op, SsaOp::Add { .. }));
    CountedLoop {
        ssa,
        preheader: entry,
        body,
        exit,
        store,
    }
}

/// A loop whose header is entered from two blocks.
pub fn loop_without_preheader() -> SsaFunction {
    let mut f = FunctionBuilder::new("two_entries", SsaType::Void);
    let p = f.param(SsaType::Ptr(0), true);
    let c = f.param(SsaType::Bool, false);
    let entry = f.block("entry");
    let left = f.block("left");
    let right = f.block("right");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(SsaType::I64, 0);
    let one = f.const_int(SsaType::I64, 1);
    let limit = f.const_int(SsaType::I64, 64);
    let byte = f.const_int(SsaType::I8, 0);
    f.branch(c, left, right);
    f.switch_to(left);
    f.jump(body);
    f.switch_to(right);
    f.jump(body);

    f.switch_to(body);
    let i = f.phi(SsaType::I64);
    let addr = f.ptr_add(p, i);
    f.store(addr, byte);
    let next = f.add(i, one);
    let done = f.cmp(CmpKind::Eq, next, limit);
    f.branch(done, exit, body);
    f.phi_incoming(i, zero, left);
    f.phi_incoming(i, zero, right);
    f.phi_incoming(i, next, body);

    f.switch_to(exit);
    f.ret(None);
    f.finish().expect("fixture verifies")
}

/// Emits the compare loop over `a` and `b` with elements of `ty`:
///
/// ```text
/// header: i = phi; x = a[i]; y = b[i]; br (x == y), latch, unequal
/// latch:  i.next = i + 1; br (i.next == n), equal, header
/// ```
///
/// Returns `(header, latch)`.
#[allow(clippy::too_many_arguments)]
fn emit_compare_loop(
    f: &mut FunctionBuilder,
    ty: SsaType,
    a: SsaVarId,
    b: SsaVarId,
    n: SsaVarId,
    preheader: usize,
    equal: usize,
    unequal: usize,
) -> (usize, usize) {
    let width = ty.store_size() as i128;
    let header = f.block("cmp.header");
    let latch = f.block("cmp.latch");
    let zero = entry_const(f, SsaType::I64, 0);
    let one = entry_const(f, SsaType::I64, 1);
    let scale = entry_const(f, SsaType::I64, width);

    f.switch_to(header);
    let i = f.phi(SsaType::I64);
    let offset = f.mul(i, scale);
    let pa = f.ptr_add(a, offset);
    let pb = f.ptr_add(b, offset);
    let x = f.load(ty, pa);
    let y = f.load(ty, pb);
    let same = f.cmp(CmpKind::Eq, x, y);
    f.branch(same, latch, unequal);

    f.switch_to(latch);
    let next = f.add(i, one);
    let done = f.cmp(CmpKind::Eq, next, n);
    f.branch(done, equal, header);

    f.phi_incoming(i, zero, preheader);
    f.phi_incoming(i, next, latch);
    (header, latch)
}

/// `for (i = 0; ; ) { if (a[i] != b[i]) return 0; if (++i == n) return 1; }`
/// with elements of `ty`.
pub fn byte_compare(ty: SsaType) -> CompareLoop {
    let mut f = FunctionBuilder::new("buffers_equal", SsaType::I32);
    let a = f.param(SsaType::Ptr(0), false);
    let b = f.param(SsaType::Ptr(0), false);
    let n = f.param(SsaType::I64, false);
    let entry = f.block("entry");
    let equal = f.block("equal");
    let unequal = f.block("unequal");

    f.switch_to(entry);
    let yes = f.const_int(SsaType::I32, 1);
    let no = f.const_int(SsaType::I32, 0);
    let (header, latch) = emit_compare_loop(&mut f, ty, a, b, n, entry, equal, unequal);
    f.switch_to(entry);
    f.jump(header);

    f.switch_to(equal);
    f.ret(Some(yes));
    f.switch_to(unequal);
    f.ret(Some(no));

    CompareLoop {
        ssa: f.finish().expect("fixture verifies"),
        header,
        latch,
    }
}

/// Counts, over `m` rounds, how often the first `n` elements of `a` and `b`
/// compare equal. The inner loop is [`byte_compare`]'s.
pub fn byte_compare_nested(ty: SsaType) -> NestedCompareLoop {
    let mut f = FunctionBuilder::new("count_equal_rounds", SsaType::I64);
    let a = f.param(SsaType::Ptr(0), false);
    let b = f.param(SsaType::Ptr(0), false);
    let n = f.param(SsaType::I64, false);
    let m = f.param(SsaType::I64, false);
    let entry = f.block("entry");
    let outer = f.block("outer");
    let equal = f.block("equal");
    let unequal = f.block("unequal");
    let outer_latch = f.block("outer.latch");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(SsaType::I64, 0);
    let one = f.const_int(SsaType::I64, 1);
    f.jump(outer);

    f.switch_to(outer);
    let j = f.phi(SsaType::I64);
    let count = f.phi(SsaType::I64);
    let (header, _) = emit_compare_loop(&mut f, ty, a, b, n, outer, equal, unequal);
    f.switch_to(outer);
    f.jump(header);

    f.switch_to(equal);
    f.jump(outer_latch);
    f.switch_to(unequal);
    f.jump(outer_latch);

    f.switch_to(outer_latch);
    let matched = f.phi(SsaType::I64);
    let total = f.add(count, matched);
    let next = f.add(j, one);
    let done = f.cmp(CmpKind::Eq, next, m);
    f.branch(done, exit, outer);
    f.phi_incoming(matched, one, equal);
    f.phi_incoming(matched, zero, unequal);
    f.phi_incoming(j, zero, entry);
    f.phi_incoming(j, next, outer_latch);
    f.phi_incoming(count, zero, entry);
    f.phi_incoming(count, total, outer_latch);

    f.switch_to(exit);
    f.ret(Some(total));

    NestedCompareLoop {
        ssa: f.finish().expect("fixture verifies"),
        outer,
        header,
    }
}

/// Counts the set bits of `x` by clearing the lowest one per iteration:
///
/// ```text
/// precondition: br (x != 0), preheader, exit
/// preheader:    jump body
/// body:         x1 = phi; cnt = phi [init]; c2 = cnt + 1; x2 = x1 & (x1 - 1)
///               br (x2 != 0), body, exit
/// exit:         ret phi [init, precondition], [c2, body]
/// ```
pub fn popcount(ty: SsaType, init: i128) -> GuardedLoop {
    let mut f = FunctionBuilder::new("count_bits", ty);
    let x = f.param(ty, false);
    let precondition = f.block("entry");
    let preheader = f.block("preheader");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(precondition);
    let zero = f.const_int(ty, 0);
    let one = f.const_int(ty, 1);
    let start = f.const_int(ty, init);
    let nonzero = f.cmp(CmpKind::Ne, x, zero);
    f.branch(nonzero, preheader, exit);

    f.switch_to(preheader);
    f.jump(body);

    f.switch_to(body);
    let x1 = f.phi(ty);
    let cnt = f.phi(ty);
    let c2 = f.add(cnt, one);
    let lower = f.sub(x1, one);
    let x2 = f.and(x1, lower);
    let more = f.cmp(CmpKind::Ne, x2, zero);
    f.branch(more, body, exit);
    f.phi_incoming(x1, x, preheader);
    f.phi_incoming(x1, x2, body);
    f.phi_incoming(cnt, start, preheader);
    f.phi_incoming(cnt, c2, body);

    f.switch_to(exit);
    let result = f.phi(ty);
    f.ret(Some(result));
    f.phi_incoming(result, start, precondition);
    f.phi_incoming(result, c2, body);

    GuardedLoop {
        ssa: f.finish().expect("fixture verifies"),
        precondition,
        preheader,
        body,
        exit,
        seed: x,
    }
}

/// Shifts an `i32` by one until it is zero and counts the iterations:
///
/// ```text
/// entry:     br (x != 0), preheader, exit
/// preheader: jump body
/// body:      x1 = phi; cnt = phi [c0]; x2 = x1 shift 1; c2 = cnt + increment
///            [padded: two unrelated operations]
///            br (x2 != 0), body, exit
/// exit:      ret phi [c0, entry], [c2, body]
/// ```
///
/// `c0` is 0 for an incrementing counter and 100 for a decrementing one.
pub fn shift_until_zero(kind: ShiftKind, increment: i128, padded: bool) -> GuardedLoop {
    let ty = SsaType::I32;
    let mut f = FunctionBuilder::new("significant_bits", ty);
    let x = f.param(ty, false);
    let entry = f.block("entry");
    let preheader = f.block("preheader");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(ty, 0);
    let one = f.const_int(ty, 1);
    let step = f.const_int(ty, increment);
    let start = f.const_int(ty, if increment == 1 { 0 } else { 100 });
    let nonzero = f.cmp(CmpKind::Ne, x, zero);
    f.branch(nonzero, preheader, exit);

    f.switch_to(preheader);
    f.jump(body);

    f.switch_to(body);
    let x1 = f.phi(ty);
    let cnt = f.phi(ty);
    let x2 = match kind {
        ShiftKind::Lshr => f.lshr(x1, one),
        ShiftKind::Ashr => f.ashr(x1, one),
        ShiftKind::Shl => f.shl(x1, one),
    };
    let c2 = f.add(cnt, step);
    if padded {
        let mixed = f.xor(x1, cnt);
        f.mul(mixed, mixed);
    }
    let more = f.cmp(CmpKind::Ne, x2, zero);
    f.branch(more, body, exit);
    f.phi_incoming(x1, x, preheader);
    f.phi_incoming(x1, x2, body);
    f.phi_incoming(cnt, start, preheader);
    f.phi_incoming(cnt, c2, body);

    f.switch_to(exit);
    let result = f.phi(ty);
    f.ret(Some(result));
    f.phi_incoming(result, start, entry);
    f.phi_incoming(result, c2, body);

    GuardedLoop {
        ssa: f.finish().expect("fixture verifies"),
        precondition: entry,
        preheader,
        body,
        exit,
        seed: x,
    }
}

/// An unguarded right-shift loop whose counter phi is read after the loop:
///
/// ```text
/// entry: jump body
/// body:  x1 = phi [x]; cnt = phi [0]; x2 = x1 >> 1; c2 = cnt + 1
///        br (x2 != 0), body, exit
/// exit:  ret cnt
/// ```
pub fn shift_until_zero_phi_out() -> GuardedLoop {
    let ty = SsaType::I32;
    let mut f = FunctionBuilder::new("highest_bit", ty);
    let x = f.param(ty, false);
    let entry = f.block("entry");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(ty, 0);
    let one = f.const_int(ty, 1);
    f.jump(body);

    f.switch_to(body);
    let x1 = f.phi(ty);
    let cnt = f.phi(ty);
    let x2 = f.lshr(x1, one);
    let c2 = f.add(cnt, one);
    let more = f.cmp(CmpKind::Ne, x2, zero);
    f.branch(more, body, exit);
    f.phi_incoming(x1, x, entry);
    f.phi_incoming(x1, x2, body);
    f.phi_incoming(cnt, zero, entry);
    f.phi_incoming(cnt, c2, body);

    f.switch_to(exit);
    f.ret(Some(cnt));

    GuardedLoop {
        ssa: f.finish().expect("fixture verifies"),
        precondition: entry,
        preheader: entry,
        body,
        exit,
        seed: x,
    }
}

/// Uses every bit counting kind once, for interpreter tests.
pub fn bit_counts(ty: SsaType) -> SsaFunction {
    let mut f = FunctionBuilder::new("bit_counts", ty);
    let x = f.param(ty, false);
    let entry = f.block("entry");
    f.switch_to(entry);
    let pop = f.bit_count(BitCountKind::Ctpop, x, false);
    let lead = f.bit_count(BitCountKind::Ctlz, x, false);
    let trail = f.bit_count(BitCountKind::Cttz, x, false);
    let partial = f.add(pop, lead);
    let sum = f.add(partial, trail);
    f.ret(Some(sum));
    f.finish().expect("fixture verifies")
}
