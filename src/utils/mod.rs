//! Generic helpers shared by the analyses.
//!
//! - [`graph`] - node identifiers, graph traits and dominator computation

pub mod graph;
