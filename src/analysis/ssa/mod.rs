//! Static Single Assignment (SSA) intermediate representation.
//!
//! This is the program form the loop idiom pass reads and rewrites. Every value is
//! an [`SsaVarId`] assigned exactly once, either by a parameter, an instruction or a
//! phi node at a control flow merge.
//!
//! # Architecture
//!
//! - [`variable`] - variable identifiers and definition sites
//! - [`types`] / [`value`] - the type system and constants
//! - [`ops`] - the operation set
//! - [`phi`] - phi nodes
//! - [`instruction`] - the instruction arena and its generation-checked handles
//! - [`block`] / [`function`] - blocks and functions, including all editing primitives
//! - [`builder`] - construction helper
//! - [`verify`] - the structural verifier
//!
//! # Usage
//!
//! ```rust
//! use loopidiom::analysis::ssa::{FunctionBuilder, SsaType, CmpKind};
//!
//! let mut f = FunctionBuilder::new("max0", SsaType::I32);
//! let x = f.param(SsaType::I32, false);
//! let entry = f.block("entry");
//! let neg = f.block("neg");
//! let done = f.block("done");
//! f.switch_to(entry);
//! let zero = f.const_int(SsaType::I32, 0);
//! let is_neg = f.cmp(CmpKind::Slt, x, zero);
//! f.branch(is_neg, neg, done);
//! f.switch_to(neg);
//! f.jump(done);
//! f.switch_to(done);
//! let r = f.phi(SsaType::I32);
//! f.phi_incoming(r, x, entry);
//! f.phi_incoming(r, zero, neg);
//! f.ret(Some(r));
//! let ssa = f.finish()?;
//! assert_eq!(ssa.block_predecessors(done), vec![entry, neg]);
//! # Ok::<(), loopidiom::Error>(())
//! ```

pub mod block;
pub mod builder;
pub mod function;
pub mod instruction;
pub mod ops;
pub mod phi;
pub mod types;
pub mod value;
pub mod variable;
pub mod verify;

pub use block::SsaBlock;
pub use builder::FunctionBuilder;
pub use function::{Param, SsaFunction, UseSite};
pub use instruction::{InstId, SsaInstruction};
pub use ops::{BitCountKind, CallEffects, CastKind, CmpKind, CompareKind, MemFlags, SsaOp};
pub use phi::{PhiNode, PhiOperand};
pub use types::{mask_bits, SsaType, POINTER_BITS};
pub use value::{sign_extend, ConstValue};
pub use variable::{DefSite, SsaVarId, SsaVariable};
pub use verify::verify;
