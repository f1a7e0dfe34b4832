//! Description of the target the rewritten code will run on.
//!
//! The idiom rewrites only ever introduce primitives the target says it has. A
//! primitive is either a library routine (`memset`, `memcpy`, ...) or a bit
//! counting instruction; [`TargetInfo`] records which of them are available and
//! what they cost.
//!
//! # Example
//!
//! ```rust
//! use loopidiom::compiler::{Primitive, Primitives, TargetInfo};
//!
//! let mut target = TargetInfo::default();
//! target.primitives.remove(Primitives::BCMP);
//! assert!(!target.has_primitive(Primitive::Bcmp));
//! assert!(target.has_primitive(Primitive::MemCmp));
//! assert_eq!(Primitive::MemSetPattern16.to_string(), "memset_pattern16");
//! ```

use bitflags::bitflags;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Cost of a single cheap instruction.
pub const TCC_BASIC: u32 = 1;

/// Cost of an instruction that is expensive to execute.
pub const TCC_EXPENSIVE: u32 = 4;

/// A primitive the pass may introduce.
///
/// The string form is the symbol name of library primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum Primitive {
    /// Byte fill.
    #[strum(serialize = "memset")]
    MemSet,
    /// 16-byte pattern fill.
    #[strum(serialize = "memset_pattern16")]
    MemSetPattern16,
    /// Block copy.
    #[strum(serialize = "memcpy")]
    MemCpy,
    /// Block copy of unordered atomic elements.
    #[strum(serialize = "memcpy_element_unordered_atomic")]
    MemCpyElementAtomic,
    /// Three-way block compare.
    #[strum(serialize = "memcmp")]
    MemCmp,
    /// Equality-only block compare.
    #[strum(serialize = "bcmp")]
    Bcmp,
    /// Population count.
    #[strum(serialize = "ctpop")]
    Ctpop,
    /// Count leading zeros.
    #[strum(serialize = "ctlz")]
    Ctlz,
    /// Count trailing zeros.
    #[strum(serialize = "cttz")]
    Cttz,
}

impl Primitive {
    /// Returns `true` for primitives implemented as library calls.
    ///
    /// A function named after one of these is never transformed, so the pass
    /// cannot turn an implementation of `memset` into a call to itself.
    #[must_use]
    pub const fn is_library(self) -> bool {
        matches!(
            self,
            Self::MemSet | Self::MemSetPattern16 | Self::MemCpy | Self::MemCmp | Self::Bcmp
        )
    }

    /// Returns the flag for this primitive in a [`Primitives`] set.
    #[must_use]
    pub const fn flag(self) -> Primitives {
        match self {
            Self::MemSet => Primitives::MEMSET,
            Self::MemSetPattern16 => Primitives::MEMSET_PATTERN16,
            Self::MemCpy => Primitives::MEMCPY,
            Self::MemCpyElementAtomic => Primitives::MEMCPY_ELEMENT_ATOMIC,
            Self::MemCmp => Primitives::MEMCMP,
            Self::Bcmp => Primitives::BCMP,
            Self::Ctpop => Primitives::CTPOP,
            Self::Ctlz => Primitives::CTLZ,
            Self::Cttz => Primitives::CTTZ,
        }
    }

    /// Returns `true` if `name` is the symbol of a library primitive.
    #[must_use]
    pub fn is_library_name(name: &str) -> bool {
        Self::iter().any(|p| p.is_library() && p.to_string() == name)
    }
}

bitflags! {
    /// A set of available primitives.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Primitives: u16 {
        /// `memset`
        const MEMSET = 0x0001;
        /// `memset_pattern16`
        const MEMSET_PATTERN16 = 0x0002;
        /// `memcpy`
        const MEMCPY = 0x0004;
        /// Element-wise unordered atomic `memcpy`
        const MEMCPY_ELEMENT_ATOMIC = 0x0008;
        /// `memcmp`
        const MEMCMP = 0x0010;
        /// `bcmp`
        const BCMP = 0x0020;
        /// Population count instruction
        const CTPOP = 0x0040;
        /// Leading zero count instruction
        const CTLZ = 0x0080;
        /// Trailing zero count instruction
        const CTTZ = 0x0100;
        /// Every library routine.
        const LIBRARY = Self::MEMSET.bits()
            | Self::MEMSET_PATTERN16.bits()
            | Self::MEMCPY.bits()
            | Self::MEMCMP.bits()
            | Self::BCMP.bits();
        /// Every bit counting instruction.
        const BIT_COUNTS = Self::CTPOP.bits() | Self::CTLZ.bits() | Self::CTTZ.bits();
    }
}

/// What the target provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    /// Primitives that may be introduced.
    pub primitives: Primitives,
    /// Multi-byte values are stored most significant byte first.
    pub big_endian: bool,
    /// Population count is a fast hardware instruction.
    pub fast_popcount: bool,
    /// Largest element, in bytes, the atomic element copy supports.
    pub max_atomic_element_size: u32,
    /// Address spaces whose pointers have no integral representation.
    pub non_integral_address_spaces: Vec<u32>,
    /// Cost of a leading or trailing zero count.
    pub bit_scan_cost: u32,
}

impl Default for TargetInfo {
    /// A little-endian target with every primitive, fast popcount and cheap bit scans.
    fn default() -> Self {
        Self {
            primitives: Primitives::all(),
            big_endian: false,
            fast_popcount: true,
            max_atomic_element_size: 16,
            non_integral_address_spaces: Vec::new(),
            bit_scan_cost: TCC_BASIC,
        }
    }
}

impl TargetInfo {
    /// A target that provides nothing beyond plain instructions.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            primitives: Primitives::empty(),
            big_endian: false,
            fast_popcount: false,
            max_atomic_element_size: 0,
            non_integral_address_spaces: Vec::new(),
            bit_scan_cost: TCC_EXPENSIVE,
        }
    }

    /// Returns `true` if `primitive` may be introduced.
    #[must_use]
    pub fn has_primitive(&self, primitive: Primitive) -> bool {
        self.primitives.contains(primitive.flag())
    }

    /// Returns `true` if any library routine is available.
    #[must_use]
    pub fn has_any_library_primitive(&self) -> bool {
        self.primitives.intersects(Primitives::LIBRARY)
    }

    /// Returns the cost of executing `primitive` once.
    ///
    /// Unavailable primitives are expensive.
    #[must_use]
    pub fn primitive_cost(&self, primitive: Primitive) -> u32 {
        if !self.has_primitive(primitive) {
            return TCC_EXPENSIVE;
        }
        match primitive {
            Primitive::Ctlz | Primitive::Cttz => self.bit_scan_cost,
            Primitive::Ctpop if self.fast_popcount => TCC_BASIC,
            Primitive::Ctpop => TCC_EXPENSIVE,
            _ => TCC_BASIC,
        }
    }

    /// Returns `true` if pointers in `space` have no integral representation.
    #[must_use]
    pub fn is_non_integral_address_space(&self, space: u32) -> bool {
        self.non_integral_address_spaces.contains(&space)
    }
}
