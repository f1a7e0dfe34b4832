//! Byte-addressed memory for the interpreter.
//!
//! Memory is sparse: only bytes that were seeded or written are stored, and every
//! other address reads as zero. Stack objects created by `alloca` are carved out of
//! a separate region starting at [`STACK_BASE`], aligned to 16 bytes, so they never
//! overlap caller-provided buffers placed at low addresses.

use std::collections::HashMap;

use crate::{Error, Result};

/// First address handed out for stack objects.
pub const STACK_BASE: u64 = 0x7FFF_0000_0000;

/// Upper bound on the total size of stack objects of one run.
pub const DEFAULT_STACK_LIMIT: u64 = 16 * 1024 * 1024;

/// Sparse little-endian memory.
#[derive(Clone, Debug)]
pub struct SparseMemory {
    /// Bytes that have been written, keyed by address.
    bytes: HashMap<u64, u8>,
    /// Next stack address to hand out.
    next_stack: u64,
    /// Maximum number of stack bytes.
    stack_limit: u64,
}

impl Default for SparseMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseMemory {
    /// Creates an empty memory with the default stack limit.
    #[must_use]
    pub fn new() -> Self {
        SparseMemory {
            bytes: HashMap::new(),
            next_stack: STACK_BASE,
            stack_limit: DEFAULT_STACK_LIMIT,
        }
    }

    /// Copies `data` into memory starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] if the range wraps around the address space.
    pub fn write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        let base = checked_range(address, data.len() as u64)?;
        for (offset, byte) in data.iter().enumerate() {
            self.bytes.insert(base + offset as u64, *byte);
        }
        Ok(())
    }

    /// Reads `len` bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] if the range wraps around the address space.
    pub fn read(&self, address: u64, len: u64) -> Result<Vec<u8>> {
        checked_range(address, len)?;
        Ok((0..len)
            .map(|offset| self.bytes.get(&(address + offset)).copied().unwrap_or(0))
            .collect())
    }

    /// Reads a little-endian integer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] for sizes above 16 bytes or wrapping ranges.
    pub fn read_int(&self, address: u64, size: u64) -> Result<u128> {
        if size > 16 {
            return Err(Error::Emulation(format!("{} byte access is too wide", size)));
        }
        let bytes = self.read(address, size)?;
        Ok(bytes
            .iter()
            .rev()
            .fold(0u128, |acc, &b| (acc << 8) | u128::from(b)))
    }

    /// Writes the low `size` bytes of `value` in little-endian order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] for sizes above 16 bytes or wrapping ranges.
    pub fn write_int(&mut self, address: u64, size: u64, value: u128) -> Result<()> {
        if size > 16 {
            return Err(Error::Emulation(format!("{} byte access is too wide", size)));
        }
        let bytes = value.to_le_bytes();
        self.write(address, &bytes[..size as usize])
    }

    /// Fills `len` bytes at `address` with `byte`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] if the range wraps around the address space.
    pub fn fill(&mut self, address: u64, byte: u8, len: u64) -> Result<()> {
        checked_range(address, len)?;
        for offset in 0..len {
            self.bytes.insert(address + offset, byte);
        }
        Ok(())
    }

    /// Fills `len` bytes at `address` by repeating `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] if the range wraps around the address space.
    pub fn fill_pattern(&mut self, address: u64, pattern: &[u8], len: u64) -> Result<()> {
        checked_range(address, len)?;
        if pattern.is_empty() {
            return Ok(());
        }
        for offset in 0..len {
            let byte = pattern[(offset % pattern.len() as u64) as usize];
            self.bytes.insert(address + offset, byte);
        }
        Ok(())
    }

    /// Copies `len` bytes from `src` to `dest`. Overlapping ranges behave like `memmove`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] if either range wraps around the address space.
    pub fn copy(&mut self, dest: u64, src: u64, len: u64) -> Result<()> {
        let data = self.read(src, len)?;
        self.write(dest, &data)
    }

    /// Compares `len` bytes at `left` and `right` as unsigned bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] if either range wraps around the address space.
    pub fn compare(&self, left: u64, right: u64, len: u64) -> Result<std::cmp::Ordering> {
        let a = self.read(left, len)?;
        let b = self.read(right, len)?;
        Ok(a.cmp(&b))
    }

    /// Reserves a fresh, zeroed stack object of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emulation`] once the stack limit is exhausted.
    pub fn alloca(&mut self, size: u64) -> Result<u64> {
        let address = self.next_stack;
        let used = address - STACK_BASE;
        if used.saturating_add(size) > self.stack_limit {
            return Err(Error::Emulation(format!(
                "stack object of {} bytes exceeds the limit of {}",
                size, self.stack_limit
            )));
        }
        self.next_stack = address + size.max(1).next_multiple_of(16);
        Ok(address)
    }
}

fn checked_range(address: u64, len: u64) -> Result<u64> {
    address
        .checked_add(len)
        .map(|_| address)
        .ok_or_else(|| Error::Emulation(format!("access of {} bytes at {:#x} wraps", len, address)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritten_memory_reads_zero() {
        let mem = SparseMemory::new();
        assert_eq!(mem.read_int(0x1000, 8).unwrap(), 0);
    }

    #[test]
    fn test_int_access_is_little_endian() {
        let mut mem = SparseMemory::new();
        mem.write_int(0x10, 4, 0x1122_3344).unwrap();
        assert_eq!(mem.read(0x10, 4).unwrap(), vec![0x44, 0x33, 0x22, 0x11]);
        assert_eq!(mem.read_int(0x11, 2).unwrap(), 0x2233);
    }

    #[test]
    fn test_fill_pattern_repeats() {
        let mut mem = SparseMemory::new();
        mem.fill_pattern(0, &[1, 2, 3], 7).unwrap();
        assert_eq!(mem.read(0, 7).unwrap(), vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn test_compare_orders_unsigned_bytes() {
        let mut mem = SparseMemory::new();
        mem.write(0x100, &[1, 0x80]).unwrap();
        mem.write(0x200, &[1, 0x7f]).unwrap();
        assert_eq!(mem.compare(0x100, 0x200, 2).unwrap(), std::cmp::Ordering::Greater);
        assert_eq!(mem.compare(0x100, 0x200, 1).unwrap(), std::cmp::Ordering::Equal);
    }

    #[test]
    fn test_alloca_is_aligned_and_bounded() {
        let mut mem = SparseMemory::new();
        let a = mem.alloca(3).unwrap();
        let b = mem.alloca(8).unwrap();
        assert_eq!(a, STACK_BASE);
        assert_eq!(b, STACK_BASE + 16);
        assert!(mem.alloca(DEFAULT_STACK_LIMIT).is_err());
    }

    #[test]
    fn test_wrapping_access_fails() {
        let mem = SparseMemory::new();
        assert!(mem.read(u64::MAX, 2).is_err());
    }
}
