//! Value-level facts used by the idiom matchers.
//!
//! These helpers answer small questions about a single SSA value without
//! building any analysis state: whether it repeats one byte, what 16-byte
//! pattern it stores, whether it is known to be non-negative, and which
//! object a pointer is derived from.

use crate::analysis::ssa::{CastKind, ConstValue, SsaFunction, SsaOp, SsaType, SsaVarId};

/// Recursion limit for the structural walks in this module.
const MAX_DEPTH: usize = 6;

/// A value whose every byte is the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteValue {
    /// Every byte is this constant.
    Splat(u8),
    /// An `i8` value that is not a compile-time constant.
    Var(SsaVarId),
    /// Unspecified bytes; any byte can be chosen.
    Undef,
}

/// Returns the byte `var` repeats, if it is byte-uniform.
///
/// Accepts any `i8` value, integer constants whose bytes are all equal, the null
/// pointer and undef.
#[must_use]
pub fn bytewise_value(ssa: &SsaFunction, var: SsaVarId) -> Option<ByteValue> {
    let ty = ssa.var_type(var);
    match ssa.const_value(var) {
        Some(ConstValue::Undef) => Some(ByteValue::Undef),
        Some(constant) => {
            let bytes = constant.bytes()?;
            let first = *bytes.first()?;
            bytes.iter().all(|&b| b == first).then_some(ByteValue::Splat(first))
        }
        None if ty == SsaType::I8 => Some(ByteValue::Var(var)),
        None => None,
    }
}

/// Returns the 16-byte pattern a store of `var` repeats.
///
/// `var` must be an integer or null constant whose size is a power of two no
/// larger than 16 bytes. The bytes are laid out little-endian and replicated to
/// fill 16 bytes.
#[must_use]
pub fn memset_pattern_value(ssa: &SsaFunction, var: SsaVarId) -> Option<[u8; 16]> {
    let size = ssa.var_type(var).store_size() as usize;
    if size == 0 || size > 16 || !size.is_power_of_two() {
        return None;
    }
    let bytes = match ssa.const_value(var)? {
        ConstValue::Undef => return None,
        constant => constant.bytes()?,
    };
    if bytes.len() != size {
        return None;
    }
    let mut pattern = [0u8; 16];
    for (i, slot) in pattern.iter_mut().enumerate() {
        *slot = bytes[i % size];
    }
    Some(pattern)
}

/// Returns `true` if the sign bit of `var` is known to be clear.
#[must_use]
pub fn is_known_non_negative(ssa: &SsaFunction, var: SsaVarId) -> bool {
    non_negative(ssa, var, 0)
}

fn non_negative(ssa: &SsaFunction, var: SsaVarId, depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    if let Some(value) = ssa.const_value(var) {
        return value.as_i128().is_some_and(|v| v >= 0);
    }
    if let Some(phi) = ssa.phi_defining(var) {
        return !phi.is_empty()
            && phi
                .operands()
                .iter()
                .all(|o| o.value() == var || non_negative(ssa, o.value(), depth + 1));
    }
    match ssa.def_op(var) {
        Some(SsaOp::Cast {
            kind: CastKind::ZExt,
            operand,
            ..
        }) => ssa.var_type(*operand).bits() < ssa.var_type(var).bits(),
        Some(SsaOp::Cast {
            kind: CastKind::SExt,
            operand,
            ..
        }) => non_negative(ssa, *operand, depth + 1),
        Some(SsaOp::Shr {
            value,
            amount,
            arithmetic,
            ..
        }) => {
            if *arithmetic {
                non_negative(ssa, *value, depth + 1)
            } else {
                ssa.const_int(*amount).is_some_and(|k| k > 0) || non_negative(ssa, *value, depth + 1)
            }
        }
        Some(SsaOp::And { left, right, .. }) => {
            non_negative(ssa, *left, depth + 1) || non_negative(ssa, *right, depth + 1)
        }
        Some(SsaOp::Or { left, right, .. } | SsaOp::Xor { left, right, .. }) => {
            non_negative(ssa, *left, depth + 1) && non_negative(ssa, *right, depth + 1)
        }
        Some(SsaOp::Copy { src, .. }) => non_negative(ssa, *src, depth + 1),
        Some(SsaOp::BitCount { .. }) => true,
        _ => false,
    }
}

/// Returns the object `ptr` is derived from.
///
/// Walks pointer offsets, copies, and loop phis whose other operands are derived
/// from the phi itself. Returns `ptr` when nothing more can be said.
#[must_use]
pub fn underlying_object(ssa: &SsaFunction, ptr: SsaVarId) -> SsaVarId {
    underlying(ssa, ptr, 0)
}

fn underlying(ssa: &SsaFunction, ptr: SsaVarId, depth: usize) -> SsaVarId {
    if depth > MAX_DEPTH {
        return ptr;
    }
    if let Some(phi) = ssa.phi_defining(ptr) {
        let mut found: Option<SsaVarId> = None;
        for operand in phi.operands() {
            let object = underlying(ssa, operand.value(), depth + 1);
            if object == ptr {
                continue;
            }
            match found {
                None => found = Some(object),
                Some(existing) if existing == object => {}
                Some(_) => return ptr,
            }
        }
        return found.unwrap_or(ptr);
    }
    match ssa.def_op(ptr) {
        Some(SsaOp::PtrAdd { base, .. }) => underlying(ssa, *base, depth + 1),
        Some(SsaOp::Copy { src, .. }) => underlying(ssa, *src, depth + 1),
        _ => ptr,
    }
}

/// Returns `true` for pointers that cannot alias any other identified object:
/// stack allocations and `noalias` parameters.
#[must_use]
pub fn is_identified_object(ssa: &SsaFunction, ptr: SsaVarId) -> bool {
    ssa.is_noalias_param(ptr) || matches!(ssa.def_op(ptr), Some(SsaOp::Alloca { .. }))
}
