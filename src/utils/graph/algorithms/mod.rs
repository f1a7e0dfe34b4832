//! Graph algorithms used by the loop analyses.
//!
//! # Available Algorithms
//!
//! ## Traversal
//!
//! - [`postorder`] - Postorder traversal
//! - [`reverse_postorder`] - Reverse postorder traversal
//!
//! ## Dominator Analysis
//!
//! - [`compute_dominators`] - Compute the dominator tree using Lengauer-Tarjan
//! - [`DominatorTree`] - Result of dominator computation
//! - [`DomTreeUpdate`] - One edge change in a batch passed to
//!   [`DominatorTree::apply_updates`]
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | Postorder / RPO | O(V + E) | Verification order, loop discovery |
//! | Dominators | O(E α(V)) | Loop detection, preheader legality, verification |

mod dominators;
mod traversal;

pub use dominators::{compute_dominators, DomTreeUpdate, DominatorIterator, DominatorTree, UpdateKind};
pub use traversal::{postorder, reverse_postorder};
