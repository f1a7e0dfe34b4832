//! SSA operations.
//!
//! Every instruction of the IR is one [`SsaOp`] in `result = op(operands)` form.
//! Operands are always SSA variables; constants are materialized with
//! [`SsaOp::Const`] first.
//!
//! # Operation Categories
//!
//! - **Constants and copies**: `Const`, `Copy`
//! - **Arithmetic and bitwise**: `Add`, `Sub`, `Mul`, `And`, `Or`, `Xor`, `Shl`, `Shr`
//! - **Comparison and conversion**: `Cmp`, `Cast`
//! - **Addressing**: `PtrAdd`, `Alloca`
//! - **Memory**: `Load`, `Store`
//! - **Block primitives**: `MemSet`, `MemSetPattern`, `MemCpy`, `MemCmp`
//! - **Bit counting**: `BitCount`
//! - **Calls and ordering**: `Call`, `Fence`
//! - **Control flow**: `Jump`, `Branch`, `Return`, `Unreachable`
//!
//! # Field Documentation
//!
//! The struct fields in this module follow a consistent naming convention:
//! - `dest`: The destination SSA variable for the operation result
//! - `left`, `right`: Binary operands
//! - `operand`: Unary operand
//! - `value`: A value being stored or shifted
//! - `addr`: Address of a memory access
//! - `len`: Byte count of a block primitive
//! - `target`, `true_target`, `false_target`: Branch targets (block indices)

#![allow(missing_docs)]

use std::fmt;

use bitflags::bitflags;
use strum::{Display, EnumIter};

use crate::analysis::ssa::{mask_bits, sign_extend, ConstValue, SsaVarId};

/// Integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum CmpKind {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl CmpKind {
    /// Returns the predicate that gives the same result with the operands swapped.
    #[must_use]
    pub const fn swapped(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Ult => Self::Ugt,
            Self::Ule => Self::Uge,
            Self::Ugt => Self::Ult,
            Self::Uge => Self::Ule,
            Self::Slt => Self::Sgt,
            Self::Sle => Self::Sge,
            Self::Sgt => Self::Slt,
            Self::Sge => Self::Sle,
        }
    }

    /// Returns the predicate that gives the opposite result.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Ult => Self::Uge,
            Self::Ule => Self::Ugt,
            Self::Ugt => Self::Ule,
            Self::Uge => Self::Ult,
            Self::Slt => Self::Sge,
            Self::Sle => Self::Sgt,
            Self::Sgt => Self::Sle,
            Self::Sge => Self::Slt,
        }
    }

    /// Returns `true` for `Eq` and `Ne`.
    #[must_use]
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    /// Evaluates the predicate on two bit patterns of width `bits`.
    #[must_use]
    pub fn evaluate(self, a: u128, b: u128, bits: u32) -> bool {
        let mask = mask_bits(bits);
        let (ua, ub) = (a & mask, b & mask);
        let (sa, sb) = (sign_extend(ua, bits), sign_extend(ub, bits));
        match self {
            Self::Eq => ua == ub,
            Self::Ne => ua != ub,
            Self::Ult => ua < ub,
            Self::Ule => ua <= ub,
            Self::Ugt => ua > ub,
            Self::Uge => ua >= ub,
            Self::Slt => sa < sb,
            Self::Sle => sa <= sb,
            Self::Sgt => sa > sb,
            Self::Sge => sa >= sb,
        }
    }
}

/// Conversions between integer widths and between integers and pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CastKind {
    ZExt,
    SExt,
    Trunc,
    PtrToInt,
    IntToPtr,
}

/// Bit counting primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BitCountKind {
    /// Number of set bits.
    Ctpop,
    /// Number of leading zero bits.
    Ctlz,
    /// Number of trailing zero bits.
    Cttz,
}

/// Flavor of a block comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CompareKind {
    /// Zero if the regions are equal, non-zero otherwise.
    Bcmp,
    /// Sign of the first differing byte pair, as unsigned bytes.
    Memcmp,
}

bitflags! {
    /// Ordering and visibility attributes of a load or store.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemFlags: u8 {
        /// Access must not be removed, merged or reordered.
        const VOLATILE = 0x01;
        /// Atomic access without ordering constraints.
        const UNORDERED = 0x02;
        /// Atomic access with acquire/release or stronger ordering.
        const ORDERED = 0x04;
        /// Access is not expected to be reused from cache.
        const NONTEMPORAL = 0x08;
    }
}

impl MemFlags {
    /// Returns `true` for a non-volatile, non-atomic access.
    #[must_use]
    pub const fn is_simple(self) -> bool {
        !self.intersects(Self::VOLATILE.union(Self::UNORDERED).union(Self::ORDERED))
    }

    /// Returns `true` for a non-volatile access that is at most unordered-atomic.
    #[must_use]
    pub const fn is_unordered(self) -> bool {
        !self.intersects(Self::VOLATILE.union(Self::ORDERED))
    }

    /// Returns `true` for an atomic access.
    #[must_use]
    pub const fn is_atomic(self) -> bool {
        self.intersects(Self::UNORDERED.union(Self::ORDERED))
    }
}

bitflags! {
    /// Side effects a call is allowed to have.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CallEffects: u8 {
        /// The callee may read memory.
        const READS = 0x01;
        /// The callee may write memory.
        const WRITES = 0x02;
        /// The callee may unwind instead of returning.
        const MAY_THROW = 0x04;
    }
}

/// An SSA operation.
///
/// # Conventions
///
/// - For operations that produce a result, `dest` is the destination
/// - Memory operations address bytes through a pointer-typed operand
/// - Block primitives (`MemSet`, `MemCpy`, ...) take their length in bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsaOp {
    /// `dest = value`
    Const { dest: SsaVarId, value: ConstValue },

    /// `dest = src`
    Copy { dest: SsaVarId, src: SsaVarId },

    /// Wrapping addition: `dest = left + right`
    Add {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    /// Wrapping subtraction: `dest = left - right`
    Sub {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    /// Wrapping multiplication: `dest = left * right`
    Mul {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    /// `dest = left & right`
    And {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    /// `dest = left | right`
    Or {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    /// `dest = left ^ right`
    Xor {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    /// `dest = value << amount`
    Shl {
        dest: SsaVarId,
        value: SsaVarId,
        amount: SsaVarId,
    },

    /// `dest = value >> amount`, arithmetic or logical.
    Shr {
        dest: SsaVarId,
        value: SsaVarId,
        amount: SsaVarId,
        arithmetic: bool,
    },

    /// `dest = left <kind> right`
    Cmp {
        dest: SsaVarId,
        kind: CmpKind,
        left: SsaVarId,
        right: SsaVarId,
    },

    /// `dest = kind(operand)`; the result type is the type of `dest`.
    Cast {
        dest: SsaVarId,
        kind: CastKind,
        operand: SsaVarId,
    },

    /// Byte offset of a pointer: `dest = base + offset`
    PtrAdd {
        dest: SsaVarId,
        base: SsaVarId,
        offset: SsaVarId,
    },

    /// Fresh stack object of `size` bytes.
    Alloca { dest: SsaVarId, size: u64 },

    /// `dest = *addr`; the loaded type is the type of `dest`.
    Load {
        dest: SsaVarId,
        addr: SsaVarId,
        flags: MemFlags,
        align: u32,
    },

    /// `*addr = value`
    Store {
        addr: SsaVarId,
        value: SsaVarId,
        flags: MemFlags,
        align: u32,
    },

    /// Fill `len` bytes at `addr` with the byte `value`.
    MemSet {
        addr: SsaVarId,
        value: SsaVarId,
        len: SsaVarId,
        align: u32,
        volatile: bool,
    },

    /// Fill `len` bytes at `addr` by repeating a 16-byte pattern.
    MemSetPattern {
        addr: SsaVarId,
        pattern: [u8; 16],
        len: SsaVarId,
        align: u32,
    },

    /// Copy `len` bytes from `src` to `dest`.
    ///
    /// With `element_size` set, the copy is performed as unordered atomic
    /// accesses of that many bytes each.
    MemCpy {
        dest: SsaVarId,
        src: SsaVarId,
        len: SsaVarId,
        align: u32,
        element_size: Option<u32>,
    },

    /// Compare `len` bytes at `left` and `right`.
    MemCmp {
        dest: SsaVarId,
        kind: CompareKind,
        left: SsaVarId,
        right: SsaVarId,
        len: SsaVarId,
    },

    /// Count bits of `operand`. With `zero_is_undef` the result for zero is unspecified.
    BitCount {
        dest: SsaVarId,
        kind: BitCountKind,
        operand: SsaVarId,
        zero_is_undef: bool,
    },

    /// Call to an external function.
    Call {
        dest: Option<SsaVarId>,
        callee: String,
        args: Vec<SsaVarId>,
        effects: CallEffects,
    },

    /// Memory ordering barrier.
    Fence,

    /// Unconditional branch.
    Jump { target: usize },

    /// Two-way conditional branch on a boolean.
    Branch {
        condition: SsaVarId,
        true_target: usize,
        false_target: usize,
    },

    /// Function return.
    Return { value: Option<SsaVarId> },

    /// Control never reaches this point.
    Unreachable,
}

impl SsaOp {
    /// Returns the variable this operation defines, if any.
    #[must_use]
    pub fn dest(&self) -> Option<SsaVarId> {
        match self {
            Self::Const { dest, .. }
            | Self::Copy { dest, .. }
            | Self::Add { dest, .. }
            | Self::Sub { dest, .. }
            | Self::Mul { dest, .. }
            | Self::And { dest, .. }
            | Self::Or { dest, .. }
            | Self::Xor { dest, .. }
            | Self::Shl { dest, .. }
            | Self::Shr { dest, .. }
            | Self::Cmp { dest, .. }
            | Self::Cast { dest, .. }
            | Self::PtrAdd { dest, .. }
            | Self::Alloca { dest, .. }
            | Self::Load { dest, .. }
            | Self::MemCmp { dest, .. }
            | Self::BitCount { dest, .. } => Some(*dest),
            Self::Call { dest, .. } => *dest,
            Self::Store { .. }
            | Self::MemSet { .. }
            | Self::MemSetPattern { .. }
            | Self::MemCpy { .. }
            | Self::Fence
            | Self::Jump { .. }
            | Self::Branch { .. }
            | Self::Return { .. }
            | Self::Unreachable => None,
        }
    }

    /// Returns all variables this operation reads, in operand order.
    #[must_use]
    pub fn uses(&self) -> Vec<SsaVarId> {
        match self {
            Self::Const { .. }
            | Self::Alloca { .. }
            | Self::Fence
            | Self::Jump { .. }
            | Self::Unreachable => vec![],

            Self::Copy { src, .. } => vec![*src],

            Self::Add { left, right, .. }
            | Self::Sub { left, right, .. }
            | Self::Mul { left, right, .. }
            | Self::And { left, right, .. }
            | Self::Or { left, right, .. }
            | Self::Xor { left, right, .. }
            | Self::Cmp { left, right, .. } => vec![*left, *right],

            Self::Shl { value, amount, .. } | Self::Shr { value, amount, .. } => {
                vec![*value, *amount]
            }

            Self::Cast { operand, .. } | Self::BitCount { operand, .. } => vec![*operand],
            Self::PtrAdd { base, offset, .. } => vec![*base, *offset],
            Self::Load { addr, .. } => vec![*addr],
            Self::Store { addr, value, .. } => vec![*addr, *value],
            Self::MemSet {
                addr, value, len, ..
            } => vec![*addr, *value, *len],
            Self::MemSetPattern { addr, len, .. } => vec![*addr, *len],
            Self::MemCpy { dest, src, len, .. } => vec![*dest, *src, *len],
            Self::MemCmp {
                left, right, len, ..
            } => vec![*left, *right, *len],
            Self::Call { args, .. } => args.clone(),
            Self::Branch { condition, .. } => vec![*condition],
            Self::Return { value } => value.iter().copied().collect(),
        }
    }

    /// Replaces every use of `old` with `new`. Returns the number of operands changed.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        let mut count = 0;
        let mut swap = |v: &mut SsaVarId| {
            if *v == old {
                *v = new;
                count += 1;
            }
        };

        match self {
            Self::Const { .. }
            | Self::Alloca { .. }
            | Self::Fence
            | Self::Jump { .. }
            | Self::Unreachable => {}

            Self::Copy { src, .. } => swap(src),

            Self::Add { left, right, .. }
            | Self::Sub { left, right, .. }
            | Self::Mul { left, right, .. }
            | Self::And { left, right, .. }
            | Self::Or { left, right, .. }
            | Self::Xor { left, right, .. }
            | Self::Cmp { left, right, .. } => {
                swap(left);
                swap(right);
            }

            Self::Shl { value, amount, .. } | Self::Shr { value, amount, .. } => {
                swap(value);
                swap(amount);
            }

            Self::Cast { operand, .. } | Self::BitCount { operand, .. } => swap(operand),
            Self::PtrAdd { base, offset, .. } => {
                swap(base);
                swap(offset);
            }
            Self::Load { addr, .. } => swap(addr),
            Self::Store { addr, value, .. } => {
                swap(addr);
                swap(value);
            }
            Self::MemSet {
                addr, value, len, ..
            } => {
                swap(addr);
                swap(value);
                swap(len);
            }
            Self::MemSetPattern { addr, len, .. } => {
                swap(addr);
                swap(len);
            }
            Self::MemCpy { dest, src, len, .. } => {
                swap(dest);
                swap(src);
                swap(len);
            }
            Self::MemCmp {
                left, right, len, ..
            } => {
                swap(left);
                swap(right);
                swap(len);
            }
            Self::Call { args, .. } => args.iter_mut().for_each(&mut swap),
            Self::Branch { condition, .. } => swap(condition),
            Self::Return { value } => {
                if let Some(v) = value {
                    swap(v);
                }
            }
        }

        count
    }

    /// Returns `true` if this operation ends a block.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. } | Self::Branch { .. } | Self::Return { .. } | Self::Unreachable
        )
    }

    /// Returns the successor blocks of a terminator, in branch order.
    ///
    /// A branch whose two targets coincide reports the target twice.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        match self {
            Self::Jump { target } => vec![*target],
            Self::Branch {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            _ => vec![],
        }
    }

    /// Retargets every edge of a terminator from `old` to `new`.
    ///
    /// Returns `true` if any target changed.
    pub fn redirect_target(&mut self, old: usize, new: usize) -> bool {
        let mut changed = false;
        match self {
            Self::Jump { target } => {
                if *target == old {
                    *target = new;
                    changed = true;
                }
            }
            Self::Branch {
                true_target,
                false_target,
                ..
            } => {
                if *true_target == old {
                    *true_target = new;
                    changed = true;
                }
                if *false_target == old {
                    *false_target = new;
                    changed = true;
                }
            }
            _ => {}
        }
        changed
    }

    /// Returns `true` if the operation may read memory.
    #[must_use]
    pub fn may_read_memory(&self) -> bool {
        match self {
            Self::Load { .. } | Self::MemCpy { .. } | Self::MemCmp { .. } | Self::Fence => true,
            Self::Store { flags, .. } => !flags.is_simple(),
            Self::Call { effects, .. } => effects.contains(CallEffects::READS),
            _ => false,
        }
    }

    /// Returns `true` if the operation may write memory.
    #[must_use]
    pub fn may_write_memory(&self) -> bool {
        match self {
            Self::Store { .. }
            | Self::MemSet { .. }
            | Self::MemSetPattern { .. }
            | Self::MemCpy { .. }
            | Self::Fence => true,
            Self::Load { flags, .. } => !flags.is_simple(),
            Self::Call { effects, .. } => effects.contains(CallEffects::WRITES),
            _ => false,
        }
    }

    /// Returns `true` if the operation may unwind.
    #[must_use]
    pub fn may_throw(&self) -> bool {
        matches!(self, Self::Call { effects, .. } if effects.contains(CallEffects::MAY_THROW))
    }

    /// Returns `true` if removing the operation could change observable behavior,
    /// ignoring its result.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        self.may_write_memory() || self.may_throw() || self.is_terminator()
    }

    /// Returns `true` for operations that cost nothing when counting instructions.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self, Self::Const { .. })
    }
}

impl fmt::Display for SsaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const { dest, value } => write!(f, "{} = {}", dest, value),
            Self::Copy { dest, src } => write!(f, "{} = {}", dest, src),
            Self::Add { dest, left, right } => write!(f, "{} = add {}, {}", dest, left, right),
            Self::Sub { dest, left, right } => write!(f, "{} = sub {}, {}", dest, left, right),
            Self::Mul { dest, left, right } => write!(f, "{} = mul {}, {}", dest, left, right),
            Self::And { dest, left, right } => write!(f, "{} = and {}, {}", dest, left, right),
            Self::Or { dest, left, right } => write!(f, "{} = or {}, {}", dest, left, right),
            Self::Xor { dest, left, right } => write!(f, "{} = xor {}, {}", dest, left, right),
            Self::Shl {
                dest,
                value,
                amount,
            } => write!(f, "{} = shl {}, {}", dest, value, amount),
            Self::Shr {
                dest,
                value,
                amount,
                arithmetic,
            } => {
                let op = if *arithmetic { "ashr" } else { "lshr" };
                write!(f, "{} = {} {}, {}", dest, op, value, amount)
            }
            Self::Cmp {
                dest,
                kind,
                left,
                right,
            } => write!(f, "{} = cmp {} {}, {}", dest, kind, left, right),
            Self::Cast {
                dest,
                kind,
                operand,
            } => write!(f, "{} = {} {}", dest, kind, operand),
            Self::PtrAdd { dest, base, offset } => {
                write!(f, "{} = ptradd {}, {}", dest, base, offset)
            }
            Self::Alloca { dest, size } => write!(f, "{} = alloca {}", dest, size),
            Self::Load {
                dest, addr, flags, ..
            } => {
                if flags.is_empty() {
                    write!(f, "{} = load {}", dest, addr)
                } else {
                    write!(f, "{} = load {} {:?}", dest, addr, flags)
                }
            }
            Self::Store {
                addr, value, flags, ..
            } => {
                if flags.is_empty() {
                    write!(f, "store {}, {}", addr, value)
                } else {
                    write!(f, "store {}, {} {:?}", addr, value, flags)
                }
            }
            Self::MemSet {
                addr,
                value,
                len,
                volatile,
                ..
            } => {
                let v = if *volatile { " volatile" } else { "" };
                write!(f, "memset{} {}, {}, {}", v, addr, value, len)
            }
            Self::MemSetPattern {
                addr, pattern, len, ..
            } => write!(f, "memset_pattern16 {}, {:02x?}, {}", addr, pattern, len),
            Self::MemCpy {
                dest,
                src,
                len,
                element_size,
                ..
            } => match element_size {
                Some(size) => write!(f, "memcpy.atomic({}) {}, {}, {}", size, dest, src, len),
                None => write!(f, "memcpy {}, {}, {}", dest, src, len),
            },
            Self::MemCmp {
                dest,
                kind,
                left,
                right,
                len,
            } => write!(f, "{} = {} {}, {}, {}", dest, kind, left, right, len),
            Self::BitCount {
                dest,
                kind,
                operand,
                zero_is_undef,
            } => write!(f, "{} = {} {}, {}", dest, kind, operand, zero_is_undef),
            Self::Call {
                dest, callee, args, ..
            } => {
                if let Some(dest) = dest {
                    write!(f, "{} = ", dest)?;
                }
                write!(f, "call {}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Self::Fence => write!(f, "fence"),
            Self::Jump { target } => write!(f, "jump b{}", target),
            Self::Branch {
                condition,
                true_target,
                false_target,
            } => write!(f, "branch {}, b{}, b{}", condition, true_target, false_target),
            Self::Return { value: Some(v) } => write!(f, "ret {}", v),
            Self::Return { value: None } => write!(f, "ret"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}
