//! # loopidiom Prelude
//!
//! The types needed to build a function, configure a target and run the loop idiom
//! pass over it. Import this module to get them in one line.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all loopidiom operations
pub use crate::Error;

/// The result type used throughout loopidiom
pub use crate::Result;

// ================================================================================================
// SSA Representation
// ================================================================================================

/// Building and inspecting functions
pub use crate::analysis::ssa::{
    BitCountKind, CastKind, CmpKind, CompareKind, ConstValue, FunctionBuilder, InstId, MemFlags,
    SsaFunction, SsaOp, SsaType, SsaVarId,
};

// ================================================================================================
// Analyses
// ================================================================================================

/// Loop structure
pub use crate::analysis::{detect_loops, LoopForest, LoopInfo};

/// Symbolic expressions and trip counts
pub use crate::analysis::{ScalarEvolution, SymExpr};

/// Memory effect queries
pub use crate::analysis::{AliasOracle, BasicAliasOracle, ModRef};

/// Dominance
pub use crate::utils::graph::algorithms::{DomTreeUpdate, DominatorTree};

// ================================================================================================
// The Pass
// ================================================================================================

/// Target description and idiom configuration
pub use crate::compiler::{IdiomConfig, Primitive, Primitives, TargetInfo};

/// Running the pass
pub use crate::compiler::{
    CompilerContext, LoopIdiomPass, LoopIdiomRecognize, PassScheduler, SsaPass,
};

/// Rewrite reporting
pub use crate::compiler::{Event, EventKind, EventLog};

// ================================================================================================
// Emulation
// ================================================================================================

/// Reference interpreter
pub use crate::emulation::{Interpreter, SparseMemory};
