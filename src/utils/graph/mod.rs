//! Graph abstractions used by the control flow analyses.
//!
//! The analyses in this crate never depend on a concrete graph type. They are written
//! against the small trait family in [`traits`], which [`SsaFunction`](crate::analysis::SsaFunction)
//! implements over its basic blocks. This keeps dominator and loop computations usable
//! on hand-made test graphs as well as on real functions.
//!
//! # Key Components
//!
//! - [`NodeId`] - Strongly-typed node identifier (a block index for SSA functions)
//! - [`GraphBase`], [`Successors`], [`Predecessors`], [`RootedGraph`] - traversal traits
//! - [`algorithms`] - dominator trees and batched dominator updates

pub mod algorithms;
mod node;
mod traits;

pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
