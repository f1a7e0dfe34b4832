//! Loop builders and equivalence helpers shared by the integration tests.
//!
//! Every builder produces a verified function through the public builder API.
//! The `*_equivalent` helpers run a function before and after the pass on the same
//! inputs and compare both the result and the memory each run leaves behind.

#![allow(dead_code)]

use loopidiom::{compiler::FunctionAnalyses, prelude::*};

/// Base address of the first buffer handed to a function.
pub const BUF_A: u64 = 0x1000;
/// Base address of the second buffer handed to a function.
pub const BUF_B: u64 = 0x8000;

/// Runs the loop idiom pass once on `ssa` and verifies the result.
pub fn run_pass(ssa: &mut SsaFunction, target: TargetInfo, config: IdiomConfig) -> CompilerContext {
    let ctx = CompilerContext::new(target, config);
    LoopIdiomPass::new()
        .run_on_function(ssa, &ctx)
        .expect("pass succeeds");
    ssa.verify().expect("rewritten function verifies");
    ctx
}

/// Runs the pass with the default target and configuration.
pub fn run_default(ssa: &mut SsaFunction) -> CompilerContext {
    run_pass(ssa, TargetInfo::default(), IdiomConfig::default())
}

/// Counts the live operations of `ssa` matching `pred`.
pub fn count_ops(ssa: &SsaFunction, pred: impl Fn(&SsaOp) -> bool) -> usize {
    ssa.live_blocks()
        .map(|b| ssa.block_ops(b).filter(|(_, op)| pred(op)).count())
        .sum()
}

/// Number of natural loops left in `ssa`.
pub fn loop_count(ssa: &SsaFunction) -> usize {
    FunctionAnalyses::compute(ssa).loops.len()
}

/// A deterministic byte pattern of length `len`.
pub fn bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Runs `ssa` with the two buffers seeded and returns the result together with
/// the first `window` bytes of both buffers afterwards.
pub fn execute(
    ssa: &SsaFunction,
    a: &[u8],
    b: &[u8],
    args: &[u128],
    window: u64,
) -> (Option<u128>, Vec<u8>, Vec<u8>) {
    let mut interp = Interpreter::new(ssa)
        .with_memory(BUF_A, a)
        .with_memory(BUF_B, b);
    let result = interp.run(args).expect("function runs");
    let mem = interp.memory();
    (
        result,
        mem.read(BUF_A, window).expect("readable"),
        mem.read(BUF_B, window).expect("readable"),
    )
}

/// Asserts that `before` and `after` agree on `args` with the given buffers.
pub fn assert_equivalent(
    before: &SsaFunction,
    after: &SsaFunction,
    a: &[u8],
    b: &[u8],
    args: &[u128],
    window: u64,
) {
    assert_eq!(
        execute(before, a, b, args, window),
        execute(after, a, b, args, window),
        "{} diverges on {:?}",
        before.name(),
        args
    );
}

/// `void fill(T *p, u64 n) { for (i = 0; i != n; i++) p[i] = value; }`
///
/// The loop is guarded by `n != 0` so every `n` is a valid input.
pub fn fill_loop(ty: SsaType, value: i128) -> SsaFunction {
    build_fill_loop(ty, value, None)
}

/// [`fill_loop`] that also stores 7 to `p[k]` on every iteration.
pub fn fill_loop_clobbering(ty: SsaType, value: i128, k: i128) -> SsaFunction {
    build_fill_loop(ty, value, Some(k))
}

fn build_fill_loop(ty: SsaType, value: i128, clobber: Option<i128>) -> SsaFunction {
    let width = ty.store_size() as i128;
    let mut f = FunctionBuilder::new("fill", SsaType::Void);
    let p = f.param(SsaType::Ptr(0), true);
    let n = f.param(SsaType::I64, false);
    let entry = f.block("entry");
    let preheader = f.block("preheader");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(SsaType::I64, 0);
    let one = f.const_int(SsaType::I64, 1);
    let scale = f.const_int(SsaType::I64, width);
    let stored = f.const_int(ty, value);
    let empty = f.cmp(CmpKind::Eq, n, zero);
    f.branch(empty, exit, preheader);

    f.switch_to(preheader);
    f.jump(body);

    f.switch_to(body);
    let i = f.phi(SsaType::I64);
    let offset = f.mul(i, scale);
    let addr = f.ptr_add(p, offset);
    f.store(addr, stored);
    if let Some(k) = clobber {
        let at = f.const_int(SsaType::I64, k * width);
        let seven = f.const_int(ty, 7);
        let slot = f.ptr_add(p, at);
        f.store(slot, seven);
    }
    let next = f.add(i, one);
    let done = f.cmp(CmpKind::Eq, next, n);
    f.branch(done, exit, body);
    f.phi_incoming(i, zero, preheader);
    f.phi_incoming(i, next, body);

    f.switch_to(exit);
    f.ret(None);
    f.finish().expect("fill loop verifies")
}

/// `void fill_rev(T *p, u64 n) { for (i = n; i != 0; i--) p[i - 1] = value; }`
pub fn reverse_fill_loop(ty: SsaType, value: i128) -> SsaFunction {
    let width = ty.store_size() as i128;
    let mut f = FunctionBuilder::new("fill_rev", SsaType::Void);
    let p = f.param(SsaType::Ptr(0), true);
    let n = f.param(SsaType::I64, false);
    let entry = f.block("entry");
    let preheader = f.block("preheader");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(SsaType::I64, 0);
    let one = f.const_int(SsaType::I64, 1);
    let scale = f.const_int(SsaType::I64, width);
    let stored = f.const_int(ty, value);
    let empty = f.cmp(CmpKind::Eq, n, zero);
    f.branch(empty, exit, preheader);

    f.switch_to(preheader);
    f.jump(body);

    f.switch_to(body);
    let i = f.phi(SsaType::I64);
    let prev = f.sub(i, one);
    let offset = f.mul(prev, scale);
    let addr = f.ptr_add(p, offset);
    f.store(addr, stored);
    let done = f.cmp(CmpKind::Eq, prev, zero);
    f.branch(done, exit, body);
    f.phi_incoming(i, n, preheader);
    f.phi_incoming(i, prev, body);

    f.switch_to(exit);
    f.ret(None);
    f.finish().expect("reverse fill loop verifies")
}

/// How a copy loop deviates from a plain element copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyShape {
    /// `dst[i] = src[i]`
    Plain,
    /// `dst[i] = src[i]; dst[k] = 7`
    Clobbering(i128),
    /// `dst[i] = dst[i + 1]`, the source overlapping the destination
    Overlapping,
}

/// `void copy(T *dst, T *src, u64 n) { for (i = 0; i != n; i++) dst[i] = src[i]; }`
pub fn copy_loop(ty: SsaType) -> SsaFunction {
    copy_loop_shaped(ty, CopyShape::Plain)
}

/// [`copy_loop`] with the body changed as `shape` describes.
pub fn copy_loop_shaped(ty: SsaType, shape: CopyShape) -> SsaFunction {
    let width = ty.store_size() as i128;
    let mut f = FunctionBuilder::new("copy", SsaType::Void);
    let dst = f.param(SsaType::Ptr(0), true);
    let src = f.param(SsaType::Ptr(0), true);
    let n = f.param(SsaType::I64, false);
    let entry = f.block("entry");
    let preheader = f.block("preheader");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(SsaType::I64, 0);
    let one = f.const_int(SsaType::I64, 1);
    let scale = f.const_int(SsaType::I64, width);
    let empty = f.cmp(CmpKind::Eq, n, zero);
    f.branch(empty, exit, preheader);

    f.switch_to(preheader);
    f.jump(body);

    f.switch_to(body);
    let i = f.phi(SsaType::I64);
    let offset = f.mul(i, scale);
    let from = if shape == CopyShape::Overlapping {
        let ahead = f.add(offset, scale);
        f.ptr_add(dst, ahead)
    } else {
        f.ptr_add(src, offset)
    };
    let to = f.ptr_add(dst, offset);
    let value = f.load(ty, from);
    f.store(to, value);
    if let CopyShape::Clobbering(k) = shape {
        let at = f.const_int(SsaType::I64, k * width);
        let seven = f.const_int(ty, 7);
        let slot = f.ptr_add(dst, at);
        f.store(slot, seven);
    }
    let next = f.add(i, one);
    let done = f.cmp(CmpKind::Eq, next, n);
    f.branch(done, exit, body);
    f.phi_incoming(i, zero, preheader);
    f.phi_incoming(i, next, body);

    f.switch_to(exit);
    f.ret(None);
    f.finish().expect("copy loop verifies")
}

/// `i32 equal(T *a, T *b, u64 n)`: 1 if the first `n` elements match, else 0.
///
/// `n` must be at least one; the loop body runs before the first exit test.
pub fn compare_loop(ty: SsaType) -> SsaFunction {
    let width = ty.store_size() as i128;
    let mut f = FunctionBuilder::new("equal", SsaType::I32);
    let a = f.param(SsaType::Ptr(0), false);
    let b = f.param(SsaType::Ptr(0), false);
    let n = f.param(SsaType::I64, false);
    let entry = f.block("entry");
    let header = f.block("header");
    let latch = f.block("latch");
    let same = f.block("same");
    let differ = f.block("differ");

    f.switch_to(entry);
    let zero = f.const_int(SsaType::I64, 0);
    let one = f.const_int(SsaType::I64, 1);
    let scale = f.const_int(SsaType::I64, width);
    let yes = f.const_int(SsaType::I32, 1);
    let no = f.const_int(SsaType::I32, 0);
    f.jump(header);

    f.switch_to(header);
    let i = f.phi(SsaType::I64);
    let offset = f.mul(i, scale);
    let pa = f.ptr_add(a, offset);
    let pb = f.ptr_add(b, offset);
    let x = f.load(ty, pa);
    let y = f.load(ty, pb);
    let eq = f.cmp(CmpKind::Eq, x, y);
    f.branch(eq, latch, differ);

    f.switch_to(latch);
    let next = f.add(i, one);
    let done = f.cmp(CmpKind::Eq, next, n);
    f.branch(done, same, header);
    f.phi_incoming(i, zero, entry);
    f.phi_incoming(i, next, latch);

    f.switch_to(same);
    f.ret(Some(yes));
    f.switch_to(differ);
    f.ret(Some(no));
    f.finish().expect("compare loop verifies")
}

/// `i32 equal(T *a, T *b, u64 n)` with a single exit block merging the verdict:
///
/// ```text
/// header: br (a[i] == b[i]), latch, exit
/// latch:  br (++i == n), exit, header
/// exit:   ret phi [0, header], [1, latch]
/// ```
///
/// `n` must be at least one.
pub fn compare_loop_shared_exit(ty: SsaType) -> SsaFunction {
    let width = ty.store_size() as i128;
    let mut f = FunctionBuilder::new("equal_merged", SsaType::I32);
    let a = f.param(SsaType::Ptr(0), false);
    let b = f.param(SsaType::Ptr(0), false);
    let n = f.param(SsaType::I64, false);
    let entry = f.block("entry");
    let header = f.block("header");
    let latch = f.block("latch");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(SsaType::I64, 0);
    let one = f.const_int(SsaType::I64, 1);
    let scale = f.const_int(SsaType::I64, width);
    let yes = f.const_int(SsaType::I32, 1);
    let no = f.const_int(SsaType::I32, 0);
    f.jump(header);

    f.switch_to(header);
    let i = f.phi(SsaType::I64);
    let offset = f.mul(i, scale);
    let pa = f.ptr_add(a, offset);
    let pb = f.ptr_add(b, offset);
    let x = f.load(ty, pa);
    let y = f.load(ty, pb);
    let eq = f.cmp(CmpKind::Eq, x, y);
    f.branch(eq, latch, exit);

    f.switch_to(latch);
    let next = f.add(i, one);
    let done = f.cmp(CmpKind::Eq, next, n);
    f.branch(done, exit, header);
    f.phi_incoming(i, zero, entry);
    f.phi_incoming(i, next, latch);

    f.switch_to(exit);
    let verdict = f.phi(SsaType::I32);
    f.ret(Some(verdict));
    f.phi_incoming(verdict, no, header);
    f.phi_incoming(verdict, yes, latch);
    f.finish().expect("merged compare loop verifies")
}

/// [`compare_loop`] behind an `n == 0` guard, so every `n` is a valid input.
pub fn guarded_compare_loop(ty: SsaType) -> SsaFunction {
    let width = ty.store_size() as i128;
    let mut f = FunctionBuilder::new("equal_guarded", SsaType::I32);
    let a = f.param(SsaType::Ptr(0), false);
    let b = f.param(SsaType::Ptr(0), false);
    let n = f.param(SsaType::I64, false);
    let entry = f.block("entry");
    let empty = f.block("empty");
    let preheader = f.block("preheader");
    let header = f.block("header");
    let latch = f.block("latch");
    let same = f.block("same");
    let differ = f.block("differ");

    f.switch_to(entry);
    let zero = f.const_int(SsaType::I64, 0);
    let one = f.const_int(SsaType::I64, 1);
    let scale = f.const_int(SsaType::I64, width);
    let yes = f.const_int(SsaType::I32, 1);
    let no = f.const_int(SsaType::I32, 0);
    let nothing = f.cmp(CmpKind::Eq, n, zero);
    f.branch(nothing, empty, preheader);

    f.switch_to(empty);
    f.ret(Some(yes));

    f.switch_to(preheader);
    f.jump(header);

    f.switch_to(header);
    let i = f.phi(SsaType::I64);
    let offset = f.mul(i, scale);
    let pa = f.ptr_add(a, offset);
    let pb = f.ptr_add(b, offset);
    let x = f.load(ty, pa);
    let y = f.load(ty, pb);
    let eq = f.cmp(CmpKind::Eq, x, y);
    f.branch(eq, latch, differ);

    f.switch_to(latch);
    let next = f.add(i, one);
    let done = f.cmp(CmpKind::Eq, next, n);
    f.branch(done, same, header);
    f.phi_incoming(i, zero, preheader);
    f.phi_incoming(i, next, latch);

    f.switch_to(same);
    f.ret(Some(yes));
    f.switch_to(differ);
    f.ret(Some(no));
    f.finish().expect("guarded compare loop verifies")
}

/// `T popcount(T x) { T c = 0; if (x) do { c++; x &= x - 1; } while (x); return c; }`
pub fn popcount_loop(ty: SsaType) -> SsaFunction {
    let mut f = FunctionBuilder::new("popcount", ty);
    let x = f.param(ty, false);
    let entry = f.block("entry");
    let preheader = f.block("preheader");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(ty, 0);
    let one = f.const_int(ty, 1);
    let nonzero = f.cmp(CmpKind::Ne, x, zero);
    f.branch(nonzero, preheader, exit);

    f.switch_to(preheader);
    f.jump(body);

    f.switch_to(body);
    let bits = f.phi(ty);
    let count = f.phi(ty);
    let counted = f.add(count, one);
    let lower = f.sub(bits, one);
    let cleared = f.and(bits, lower);
    let more = f.cmp(CmpKind::Ne, cleared, zero);
    f.branch(more, body, exit);
    f.phi_incoming(bits, x, preheader);
    f.phi_incoming(bits, cleared, body);
    f.phi_incoming(count, zero, preheader);
    f.phi_incoming(count, counted, body);

    f.switch_to(exit);
    let result = f.phi(ty);
    f.ret(Some(result));
    f.phi_incoming(result, zero, entry);
    f.phi_incoming(result, counted, body);
    f.finish().expect("popcount loop verifies")
}

/// `T width(T x) { T c = 0; if (x) do { c++; x = x >> 1; } while (x); return c; }`
///
/// With `left` set the value is shifted left instead.
pub fn shift_count_loop(ty: SsaType, left: bool) -> SsaFunction {
    let mut f = FunctionBuilder::new("active_width", ty);
    let x = f.param(ty, false);
    let entry = f.block("entry");
    let preheader = f.block("preheader");
    let body = f.block("body");
    let exit = f.block("exit");

    f.switch_to(entry);
    let zero = f.const_int(ty, 0);
    let one = f.const_int(ty, 1);
    let nonzero = f.cmp(CmpKind::Ne, x, zero);
    f.branch(nonzero, preheader, exit);

    f.switch_to(preheader);
    f.jump(body);

    f.switch_to(body);
    let bits = f.phi(ty);
    let count = f.phi(ty);
    let shifted = if left {
        f.shl(bits, one)
    } else {
        f.lshr(bits, one)
    };
    let counted = f.add(count, one);
    let more = f.cmp(CmpKind::Ne, shifted, zero);
    f.branch(more, body, exit);
    f.phi_incoming(bits, x, preheader);
    f.phi_incoming(bits, shifted, body);
    f.phi_incoming(count, zero, preheader);
    f.phi_incoming(count, counted, body);

    f.switch_to(exit);
    let result = f.phi(ty);
    f.ret(Some(result));
    f.phi_incoming(result, zero, entry);
    f.phi_incoming(result, counted, body);
    f.finish().expect("shift loop verifies")
}
