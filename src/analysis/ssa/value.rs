//! Constant values of the SSA IR.

use std::fmt;

use crate::analysis::ssa::types::{mask_bits, SsaType};

/// A compile-time constant.
///
/// Integer constants store their bit pattern zero-extended into a `u128` and are
/// always masked to their width, so two constants of the same width compare equal
/// exactly when they denote the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    /// Integer (or boolean) constant of the given width.
    Int {
        /// Width in bits.
        bits: u32,
        /// Bit pattern, masked to `bits`.
        value: u128,
    },
    /// The null pointer.
    Null,
    /// A value whose bits are unspecified.
    Undef,
}

impl ConstValue {
    /// Creates an integer constant of type `ty` from a signed value.
    ///
    /// The value is truncated to the width of the type. Pointer types produce
    /// [`ConstValue::Null`] for zero and an integer of pointer width otherwise.
    #[must_use]
    pub fn int(ty: SsaType, value: i128) -> Self {
        if ty.is_pointer() && value == 0 {
            return Self::Null;
        }
        let bits = ty.bits();
        Self::Int {
            bits,
            value: (value as u128) & mask_bits(bits),
        }
    }

    /// Creates an integer constant from an unsigned bit pattern.
    #[must_use]
    pub const fn from_bits(bits: u32, value: u128) -> Self {
        Self::Int {
            bits,
            value: value & mask_bits(bits),
        }
    }

    /// Returns the width of the constant in bits, if it is an integer.
    #[must_use]
    pub const fn bits(&self) -> Option<u32> {
        match self {
            Self::Int { bits, .. } => Some(*bits),
            Self::Null => Some(super::types::POINTER_BITS),
            Self::Undef => None,
        }
    }

    /// Returns the zero-extended bit pattern of an integer or null constant.
    #[must_use]
    pub const fn as_u128(&self) -> Option<u128> {
        match self {
            Self::Int { value, .. } => Some(*value),
            Self::Null => Some(0),
            Self::Undef => None,
        }
    }

    /// Returns the sign-extended value of an integer or null constant.
    #[must_use]
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Int { bits, value } => Some(sign_extend(*value, *bits)),
            Self::Null => Some(0),
            Self::Undef => None,
        }
    }

    /// Returns `true` for integer zero and null.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        matches!(self, Self::Int { value: 0, .. } | Self::Null)
    }

    /// Returns `true` for the integer one.
    #[must_use]
    pub const fn is_one(&self) -> bool {
        matches!(self, Self::Int { value: 1, .. })
    }

    /// Returns `true` if every bit of an integer constant is set.
    #[must_use]
    pub const fn is_all_ones(&self) -> bool {
        match self {
            Self::Int { bits, value } => *value == mask_bits(*bits),
            _ => false,
        }
    }

    /// Returns `true` for [`ConstValue::Undef`].
    #[must_use]
    pub const fn is_undef(&self) -> bool {
        matches!(self, Self::Undef)
    }

    /// Returns the little-endian bytes of an integer or null constant.
    ///
    /// A boolean occupies one byte. Returns `None` for undef.
    #[must_use]
    pub fn bytes(&self) -> Option<Vec<u8>> {
        let (bits, value) = match self {
            Self::Int { bits, value } => (*bits, *value),
            Self::Null => (super::types::POINTER_BITS, 0),
            Self::Undef => return None,
        };
        let len = bits.div_ceil(8).max(1) as usize;
        Some(value.to_le_bytes()[..len].to_vec())
    }
}

/// Sign-extends the low `bits` bits of `value`.
#[must_use]
pub fn sign_extend(value: u128, bits: u32) -> i128 {
    if bits == 0 || bits >= 128 {
        return value as i128;
    }
    let shift = 128 - bits;
    ((value << shift) as i128) >> shift
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int { bits: 1, value } => write!(f, "{}", *value != 0),
            Self::Int { bits, value } => write!(f, "{}:i{}", sign_extend(*value, *bits), bits),
            Self::Null => write!(f, "null"),
            Self::Undef => write!(f, "undef"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_is_masked() {
        let c = ConstValue::int(SsaType::I8, -1);
        assert_eq!(c, ConstValue::Int { bits: 8, value: 0xFF });
        assert!(c.is_all_ones());
        assert_eq!(c.as_i128(), Some(-1));
        assert_eq!(c.as_u128(), Some(0xFF));
    }

    #[test]
    fn test_pointer_zero_is_null() {
        assert_eq!(ConstValue::int(SsaType::Ptr(0), 0), ConstValue::Null);
        assert!(ConstValue::Null.is_zero());
    }

    #[test]
    fn test_bytes_little_endian() {
        let c = ConstValue::int(SsaType::I32, 0x0102_0304);
        assert_eq!(c.bytes(), Some(vec![4, 3, 2, 1]));
        assert_eq!(ConstValue::int(SsaType::Bool, 1).bytes(), Some(vec![1]));
        assert_eq!(ConstValue::Undef.bytes(), None);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0x80, 8), -128);
        assert_eq!(sign_extend(0x7F, 8), 127);
        assert_eq!(sign_extend(u128::MAX, 128), -1);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConstValue::int(SsaType::I32, -5).to_string(), "-5:i32");
        assert_eq!(ConstValue::int(SsaType::Bool, 1).to_string(), "true");
    }
}
