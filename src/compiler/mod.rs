//! Loop rewriting infrastructure.
//!
//! This module sits on top of [`crate::analysis`]: it owns the passes that
//! rewrite SSA functions and everything they share.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Rewrite Pipeline                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompilerContext              Shared state of one run            │
//! │    ├─ SSA functions           (by name, processed in parallel)   │
//! │    ├─ TargetInfo / IdiomConfig                                   │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler               Fixpoint execution of passes        │
//! │                                                                  │
//! │  SsaPass trait               Interface for all passes            │
//! │    ├─ should_run()            Cheap gate per function            │
//! │    └─ run_on_function()       Per-function transformation        │
//! │                                                                  │
//! │  LoopIdiomPass               Fill, copy, compare, bit counting   │
//! │    ├─ FunctionAnalyses        Dominators, loops, SCEV, aliasing  │
//! │    └─ transforms              CFG surgery keeping them current   │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod analyses;
mod config;
mod context;
mod events;
mod pass;
mod passes;
mod scheduler;
mod target;
pub mod transforms;

pub use analyses::{FunctionAnalyses, LoopPassManager};
pub use config::IdiomConfig;
pub use context::CompilerContext;
pub use events::{DerivedStats, Event, EventKind, EventLog};
pub use pass::SsaPass;
pub use passes::{
    ByteCompareLoop, IdiomMatch, LoopIdiomPass, LoopIdiomRecognize, PopcountLoop,
    ShiftUntilZeroLoop, StridedCopy, StridedFill,
};
pub use scheduler::PassScheduler;
pub use target::{Primitive, Primitives, TargetInfo, TCC_BASIC, TCC_EXPENSIVE};
pub use transforms::{delete_dead_loop, merge_block_into_only_pred};
