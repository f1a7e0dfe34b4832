//! Control flow structure over SSA functions.
//!
//! [`SsaFunction`](crate::analysis::SsaFunction) implements the graph traits of
//! [`crate::utils::graph`] directly, so dominators come from
//! [`compute_dominators`](crate::utils::graph::algorithms::compute_dominators) and
//! this module adds the loop layer on top:
//!
//! - [`detect_loops`] - natural loop discovery from back edges
//! - [`LoopInfo`] - one loop, with on-demand preheader, latch and exit queries
//! - [`LoopForest`] - all loops of a function, updatable as loops are rewritten

mod loops;

pub use loops::{detect_loops, LoopForest, LoopInfo};
