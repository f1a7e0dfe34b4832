//! Configuration of the loop idiom pass.

/// Switches and thresholds of the loop idiom pass.
///
/// # Example
///
/// ```rust
/// use loopidiom::compiler::IdiomConfig;
///
/// let config = IdiomConfig {
///     enable_bcmp: false,
///     ..IdiomConfig::default()
/// };
/// assert!(config.enable_memset);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdiomConfig {
    /// Skip multi-block loops in functions optimized for size, unless the loop
    /// is nested or the rewrite replaces a whole-loop fill.
    pub use_code_size_heuristics: bool,
    /// Form `memset` and `memset_pattern16` from strided stores.
    pub enable_memset: bool,
    /// Form `memcpy` from strided store-of-load pairs.
    pub enable_memcpy: bool,
    /// Form `bcmp`/`memcmp` from element-wise equality loops.
    pub enable_bcmp: bool,
    /// Rewrite clear-lowest-bit counting loops around `ctpop`.
    pub enable_popcount: bool,
    /// Rewrite shift-until-zero counting loops around `ctlz`/`cttz`.
    pub enable_ffs: bool,
    /// Popcount loops must have fewer instructions than this, constants excluded.
    pub popcount_max_body_size: usize,
    /// Instruction count of the canonical shift-until-zero loop body.
    pub ffs_canonical_size: usize,
    /// How many stores ahead and behind a store is searched for a contiguous
    /// neighbour. `None` searches the whole block.
    pub max_store_run_search: Option<usize>,
}

impl Default for IdiomConfig {
    fn default() -> Self {
        Self {
            use_code_size_heuristics: true,
            enable_memset: true,
            enable_memcpy: true,
            enable_bcmp: true,
            enable_popcount: true,
            enable_ffs: true,
            popcount_max_body_size: 20,
            ffs_canonical_size: 6,
            max_store_run_search: None,
        }
    }
}

impl IdiomConfig {
    /// A configuration with every rewrite disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_memset: false,
            enable_memcpy: false,
            enable_bcmp: false,
            enable_popcount: false,
            enable_ffs: false,
            ..Self::default()
        }
    }
}
