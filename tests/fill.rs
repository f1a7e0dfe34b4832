//! Fill formation: strided stores of a byte-uniform value become `memset`, stores
//! of a wider constant become `memset_pattern16`. Each rewritten function must
//! leave exactly the same bytes behind as the loop it replaces.

mod common;

use common::{
    assert_equivalent, bytes, count_ops, fill_loop, fill_loop_clobbering, reverse_fill_loop,
    run_default, run_pass,
};
use loopidiom::prelude::*;

const WINDOW: u64 = 256;

#[test]
fn test_zero_fill_forms_memset_and_matches_loop() {
    let original = fill_loop(SsaType::I32, 0);
    let mut ssa = original.clone();
    let ctx = run_default(&mut ssa);

    assert_eq!(ctx.events.count_kind(EventKind::FillFormed), 1);
    assert_eq!(count_ops(&ssa, |op| matches!(op, SsaOp::MemSet { .. })), 1);
    assert_eq!(count_ops(&ssa, |op| matches!(op, SsaOp::Store { .. })), 0);

    let dirty = vec![0xee; WINDOW as usize];
    for n in [0u128, 1, 2, 7, 40] {
        assert_equivalent(&original, &ssa, &dirty, &[], &[0x1000, n], WINDOW);
    }
}

#[test]
fn test_thousand_element_fill_matches_loop() {
    let original = fill_loop(SsaType::I32, 0);
    let mut ssa = original.clone();
    run_default(&mut ssa);

    let window = 4 * 1000 + 64;
    let dirty = vec![0x5a; window as usize];
    assert_equivalent(&original, &ssa, &dirty, &[], &[0x1000, 1000], window);
}

#[test]
fn test_splat_byte_fill_forms_memset() {
    let original = fill_loop(SsaType::I16, 0x4141);
    let mut ssa = original.clone();
    let ctx = run_default(&mut ssa);

    assert!(ctx.events.has(EventKind::FillFormed));
    assert!(!ctx.events.has(EventKind::PatternFillFormed));
    for n in [1u128, 5, 64] {
        assert_equivalent(&original, &ssa, &bytes(256, 3), &[], &[0x1000, n], WINDOW);
    }
}

#[test]
fn test_constant_fill_forms_pattern_fill() {
    let original = fill_loop(SsaType::I64, 0x0102_0304_0506_0708);
    let mut ssa = original.clone();
    let ctx = run_default(&mut ssa);

    assert!(ctx.events.has(EventKind::PatternFillFormed));
    assert_eq!(
        count_ops(&ssa, |op| matches!(op, SsaOp::MemSetPattern { .. })),
        1
    );
    for n in [1u128, 2, 3, 17] {
        assert_equivalent(&original, &ssa, &bytes(256, 9), &[], &[0x1000, n], WINDOW);
    }
}

#[test]
fn test_pattern_fill_needs_the_primitive() {
    let mut ssa = fill_loop(SsaType::I32, 0x1234_5678);
    let mut target = TargetInfo::default();
    target.primitives.remove(Primitives::MEMSET_PATTERN16);
    let ctx = run_pass(&mut ssa, target, IdiomConfig::default());

    assert!(!ctx.events.has(EventKind::PatternFillFormed));
    assert_eq!(count_ops(&ssa, |op| matches!(op, SsaOp::Store { .. })), 1);
}

#[test]
fn test_big_endian_target_rejects_pattern_fill() {
    let mut ssa = fill_loop(SsaType::I32, 0x1234_5678);
    let mut target = TargetInfo::default();
    target.big_endian = true;
    let ctx = run_pass(&mut ssa, target, IdiomConfig::default());

    assert!(!ctx.events.has(EventKind::PatternFillFormed));
}

#[test]
fn test_descending_fill_matches_loop() {
    let original = reverse_fill_loop(SsaType::I32, 0);
    let mut ssa = original.clone();
    let ctx = run_default(&mut ssa);

    assert!(ctx.events.has(EventKind::FillFormed));
    let dirty = vec![0x77; WINDOW as usize];
    for n in [0u128, 1, 4, 33] {
        assert_equivalent(&original, &ssa, &dirty, &[], &[0x1000, n], WINDOW);
    }
}

#[test]
fn test_other_store_into_the_region_blocks_fill() {
    for k in [0i128, 8, 400] {
        let original = fill_loop_clobbering(SsaType::I32, 0, k);
        let mut ssa = original.clone();
        let ctx = run_default(&mut ssa);

        assert!(!ctx.events.has(EventKind::FillFormed), "k {}", k);
        assert_eq!(count_ops(&ssa, |op| matches!(op, SsaOp::MemSet { .. })), 0);
        let window = 4 * 512;
        let dirty = vec![0x33; window as usize];
        for n in [1u128, 9, 401] {
            assert_equivalent(&original, &ssa, &dirty, &[], &[0x1000, n], window);
        }
    }
}

#[test]
fn test_disabled_memset_leaves_loop() {
    let original = fill_loop(SsaType::I32, 0);
    let mut ssa = original.clone();
    let config = IdiomConfig {
        enable_memset: false,
        ..IdiomConfig::default()
    };
    let ctx = run_pass(&mut ssa, TargetInfo::default(), config);

    assert!(ctx.events.is_empty());
    assert_eq!(ssa.instruction_count(), original.instruction_count());
}

#[test]
fn test_minimal_target_changes_nothing() {
    let mut ssa = fill_loop(SsaType::I8, 0);
    let ctx = run_pass(&mut ssa, TargetInfo::minimal(), IdiomConfig::default());
    assert!(!ctx.events.has(EventKind::FillFormed));
    assert_eq!(count_ops(&ssa, |op| matches!(op, SsaOp::Store { .. })), 1);
}
