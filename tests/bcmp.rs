//! Compare formation: a two-block element equality loop becomes one `bcmp` (or
//! `memcmp`) whose zero test picks the loop's original exit.

mod common;

use common::{
    bytes, compare_loop, compare_loop_shared_exit, count_ops, execute, guarded_compare_loop,
    loop_count, run_default, run_pass, BUF_A, BUF_B,
};
use loopidiom::prelude::*;

/// Runs both functions on buffers that agree on their first `common_prefix` bytes.
fn assert_same_verdicts(before: &SsaFunction, after: &SsaFunction, width: u64) {
    let a = bytes(128, 1);
    for common_prefix in [0usize, 1, 5, 16, 64, 128] {
        let mut b = a.clone();
        if let Some(byte) = b.get_mut(common_prefix) {
            *byte ^= 0x80;
        }
        for n in [1u128, 2, 4, 8, 16] {
            if n as u64 * width > 128 {
                continue;
            }
            let args = [0x1000, u128::from(BUF_B), n];
            assert_eq!(
                execute(before, &a, &b, &args, 0).0,
                execute(after, &a, &b, &args, 0).0,
                "prefix {} n {}",
                common_prefix,
                n
            );
        }
    }
}

#[test]
fn test_byte_loop_becomes_bcmp() {
    let original = compare_loop(SsaType::I8);
    let mut ssa = original.clone();
    let ctx = run_default(&mut ssa);

    assert!(ctx.events.has(EventKind::CompareFormed));
    assert!(ctx.events.has(EventKind::LoopDeleted));
    assert_eq!(
        count_ops(&ssa, |op| matches!(
            op,
            SsaOp::MemCmp {
                kind: CompareKind::Bcmp,
                ..
            }
        )),
        1
    );
    assert_eq!(count_ops(&ssa, |op| matches!(op, SsaOp::Load { .. })), 0);
    assert_eq!(loop_count(&ssa), 0);
    assert_same_verdicts(&original, &ssa, 1);
}

/// Checks byte-sized compares of several lengths with a single flipped byte at
/// the first, middle and last position, and with equal buffers.
fn assert_mismatch_verdicts(before: &SsaFunction, after: &SsaFunction) {
    let a = bytes(1000, 7);
    for n in [1usize, 16, 17, 1000] {
        let args = [u128::from(BUF_A), u128::from(BUF_B), n as u128];
        let mut positions = vec![0, n / 2, n - 1];
        positions.dedup();
        for at in positions {
            let mut b = a.clone();
            b[at] = !b[at];
            let expected = execute(before, &a, &b, &args, 0).0;
            assert_eq!(expected, Some(0), "n {} mismatch at {}", n, at);
            assert_eq!(expected, execute(after, &a, &b, &args, 0).0);
        }
        let expected = execute(before, &a, &a, &args, 0).0;
        assert_eq!(expected, Some(1));
        assert_eq!(expected, execute(after, &a, &a, &args, 0).0);

        let same = [u128::from(BUF_A), u128::from(BUF_A), n as u128];
        assert_eq!(execute(after, &a, &[], &same, 0).0, Some(1));
    }
}

#[test]
fn test_mismatch_position_and_length() {
    let original = compare_loop(SsaType::I8);
    let mut ssa = original.clone();
    run_default(&mut ssa);
    assert_mismatch_verdicts(&original, &ssa);
}

#[test]
fn test_shared_exit_block_receives_the_same_verdict() {
    let original = compare_loop_shared_exit(SsaType::I8);
    let mut ssa = original.clone();
    let ctx = run_default(&mut ssa);

    assert!(ctx.events.has(EventKind::CompareFormed));
    assert_eq!(loop_count(&ssa), 0);
    assert_same_verdicts(&original, &ssa, 1);
    assert_mismatch_verdicts(&original, &ssa);
}

#[test]
fn test_guarded_compare_handles_zero_length() {
    let original = guarded_compare_loop(SsaType::I8);
    let mut ssa = original.clone();
    let ctx = run_default(&mut ssa);
    assert!(ctx.events.has(EventKind::CompareFormed));

    let a = bytes(64, 4);
    let mut b = a.clone();
    b[0] ^= 1;
    for (left, right) in [(&a, &a), (&a, &b)] {
        let args = [u128::from(BUF_A), u128::from(BUF_B), 0];
        let expected = execute(&original, left, right, &args, 0).0;
        assert_eq!(expected, Some(1));
        assert_eq!(expected, execute(&ssa, left, right, &args, 0).0);
    }
    assert_mismatch_verdicts_upto(&original, &ssa, &a, 64);
}

/// Compares every length up to `max` against a copy of `a` differing in its last byte.
fn assert_mismatch_verdicts_upto(before: &SsaFunction, after: &SsaFunction, a: &[u8], max: usize) {
    for n in 1..=max {
        let mut b = a.to_vec();
        b[n - 1] ^= 0x40;
        let args = [u128::from(BUF_A), u128::from(BUF_B), n as u128];
        assert_eq!(
            execute(before, a, &b, &args, 0).0,
            execute(after, a, &b, &args, 0).0,
            "n {}",
            n
        );
    }
}

#[test]
fn test_identical_pointers_compare_equal() {
    let original = compare_loop(SsaType::I16);
    let mut ssa = original.clone();
    run_default(&mut ssa);

    let a = bytes(64, 2);
    for n in [1u128, 8, 32] {
        let args = [u128::from(BUF_A), u128::from(BUF_A), n];
        assert_eq!(execute(&ssa, &a, &[], &args, 0).0, Some(1));
        assert_eq!(
            execute(&original, &a, &[], &args, 0).0,
            execute(&ssa, &a, &[], &args, 0).0
        );
    }
}

#[test]
fn test_wide_elements_scale_the_length() {
    for (ty, width) in [(SsaType::I16, 2), (SsaType::I32, 4), (SsaType::I64, 8)] {
        let original = compare_loop(ty);
        let mut ssa = original.clone();
        let ctx = run_default(&mut ssa);
        assert!(ctx.events.has(EventKind::CompareFormed), "{}", ty);
        assert_same_verdicts(&original, &ssa, width);
    }
}

#[test]
fn test_memcmp_is_used_without_bcmp() {
    let original = compare_loop(SsaType::I8);
    let mut ssa = original.clone();
    let mut target = TargetInfo::default();
    target.primitives.remove(Primitives::BCMP);
    let ctx = run_pass(&mut ssa, target, IdiomConfig::default());

    assert!(ctx.events.has(EventKind::CompareFormed));
    assert_eq!(
        count_ops(&ssa, |op| matches!(
            op,
            SsaOp::MemCmp {
                kind: CompareKind::Memcmp,
                ..
            }
        )),
        1
    );
    assert_same_verdicts(&original, &ssa, 1);
}

#[test]
fn test_no_compare_primitive_keeps_loop() {
    let mut ssa = compare_loop(SsaType::I8);
    let mut target = TargetInfo::default();
    target.primitives.remove(Primitives::BCMP | Primitives::MEMCMP);
    let ctx = run_pass(&mut ssa, target, IdiomConfig::default());

    assert!(!ctx.events.has(EventKind::CompareFormed));
    assert_eq!(loop_count(&ssa), 1);
}

#[test]
fn test_disabled_bcmp_keeps_loop() {
    let mut ssa = compare_loop(SsaType::I32);
    let config = IdiomConfig {
        enable_bcmp: false,
        ..IdiomConfig::default()
    };
    let ctx = run_pass(&mut ssa, TargetInfo::default(), config);
    assert!(!ctx.events.has(EventKind::CompareFormed));
}
