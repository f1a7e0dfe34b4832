//! Type system of the SSA IR.
//!
//! The IR is deliberately small: fixed-width integers, a boolean produced by
//! comparisons, typed pointers carrying an address space, and `Void` for functions
//! without a result. Integers are sign-agnostic; the operation decides how the bits
//! are interpreted.
//!
//! Pointers are 64 bits wide in every address space.

use std::fmt;

/// Width of a pointer in bits.
pub const POINTER_BITS: u32 = 64;

/// Type of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SsaType {
    /// Result of a comparison, stored as one byte.
    Bool,
    /// 8-bit integer.
    I8,
    /// 16-bit integer.
    I16,
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 128-bit integer.
    I128,
    /// Pointer into the given address space.
    Ptr(u32),
    /// No value.
    Void,
}

impl SsaType {
    /// Returns the integer type of the given width, if there is one.
    #[must_use]
    pub const fn int(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Self::Bool),
            8 => Some(Self::I8),
            16 => Some(Self::I16),
            32 => Some(Self::I32),
            64 => Some(Self::I64),
            128 => Some(Self::I128),
            _ => None,
        }
    }

    /// Returns the width of a value of this type in bits.
    ///
    /// `Bool` is 1 bit wide, `Void` has no bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::I8 => 8,
            Self::I16 => 16,
            Self::I32 => 32,
            Self::I64 => 64,
            Self::I128 => 128,
            Self::Ptr(_) => POINTER_BITS,
            Self::Void => 0,
        }
    }

    /// Returns the number of bytes a store of this type writes.
    #[must_use]
    pub const fn store_size(self) -> u64 {
        match self {
            Self::Void => 0,
            Self::Bool => 1,
            other => (other.bits() as u64).div_ceil(8),
        }
    }

    /// Returns `true` for `Bool` and the integer types.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Bool | Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::I128
        )
    }

    /// Returns `true` for pointer types.
    #[must_use]
    pub const fn is_pointer(self) -> bool {
        matches!(self, Self::Ptr(_))
    }

    /// Returns the address space of a pointer type.
    #[must_use]
    pub const fn address_space(self) -> Option<u32> {
        match self {
            Self::Ptr(space) => Some(space),
            _ => None,
        }
    }

    /// Returns a mask with the low `bits()` bits set.
    #[must_use]
    pub const fn mask(self) -> u128 {
        mask_bits(self.bits())
    }
}

/// Returns a mask with the low `bits` bits set.
#[must_use]
pub const fn mask_bits(bits: u32) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

impl fmt::Display for SsaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::I8 => write!(f, "i8"),
            Self::I16 => write!(f, "i16"),
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::I128 => write!(f, "i128"),
            Self::Ptr(0) => write!(f, "ptr"),
            Self::Ptr(space) => write!(f, "ptr({})", space),
            Self::Void => write!(f, "void"),
        }
    }
}
