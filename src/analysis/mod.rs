//! Program analyses for the SSA IR.
//!
//! The analysis module is organized into focused sub-modules, leaves first:
//!
//! - [`ssa`] - The IR itself: functions, blocks, instructions, builder and verifier
//! - [`cfg`] - Natural loop detection and the loop forest
//! - [`scev`] - Symbolic expressions, affine recurrences, trip counts, expansion
//! - [`valuetracking`] - Byte splats, sign facts and underlying objects of single values
//! - [`alias`] - Whether a loop may read or write a region of memory
//!
//! Analyses never hold on to the function they describe. Queries take the
//! function (and the loop forest) as arguments, so the same analysis objects can
//! be kept alive while a transform edits the IR, as long as the transform
//! invalidates what it changed.
//!
//! # Usage
//!
//! ```rust
//! use loopidiom::analysis::{cfg::detect_loops, SsaFunction};
//! use loopidiom::analysis::ssa::{CmpKind, FunctionBuilder, SsaType};
//! use loopidiom::utils::graph::{algorithms::compute_dominators, NodeId};
//!
//! let mut f = FunctionBuilder::new("spin", SsaType::Void);
//! let c = f.param(SsaType::Bool, false);
//! let entry = f.block("entry");
//! let body = f.block("body");
//! let exit = f.block("exit");
//! f.switch_to(entry);
//! f.jump(body);
//! f.switch_to(body);
//! f.branch(c, body, exit);
//! f.switch_to(exit);
//! f.ret(None);
//! let ssa: SsaFunction = f.finish()?;
//!
//! let dom = compute_dominators(&ssa, NodeId::new(ssa.entry_block()));
//! let loops = detect_loops(&ssa, &dom);
//! assert_eq!(loops.len(), 1);
//! assert!(loops.loop_for_header(NodeId::new(body)).is_some());
//! # Ok::<(), loopidiom::Error>(())
//! ```

pub mod alias;
pub mod cfg;
pub mod scev;
pub mod ssa;
pub mod valuetracking;

pub use alias::{AliasOracle, AliasQuery, BasicAliasOracle, MemoryLocation, ModRef};
pub use cfg::{detect_loops, LoopForest, LoopInfo};
pub use scev::{AffineRecurrence, ExitCount, Expander, ScalarEvolution, SymExpr};
pub use ssa::{FunctionBuilder, SsaFunction, SsaOp, SsaType, SsaVarId};
