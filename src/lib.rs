// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # loopidiom
//!
//! Loop idiom recognition and rewriting for an SSA intermediate representation.
//!
//! `loopidiom` inspects the loops of a function and, when a loop computes one of a
//! fixed set of well-known shapes, replaces the loop (or the relevant part of it)
//! with a single primitive that computes the same result:
//!
//! - **Block fill** - stores of a byte-uniform value over a strided range become `memset`
//! - **Pattern fill** - stores of a constant up to 16 bytes wide become `memset_pattern16`
//! - **Block copy** - a strided store of a strided load becomes `memcpy`
//! - **Byte compare** - an element-by-element equality loop becomes `bcmp` / `memcmp`
//! - **Population count** - the `x &= x - 1` counting loop becomes `ctpop`
//! - **Find first set** - the shift-until-zero counting loop becomes `ctlz` / `cttz`
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ compiler::LoopIdiomPass        SsaPass, innermost loops first     │
//! │   └─ LoopIdiomRecognize        driver: countable / noncountable   │
//! │        ├─ store classifier     fill, pattern fill, copy           │
//! │        ├─ countable rewriter   merge, legality, emit              │
//! │        └─ noncountable         bcmp, find-first-set, popcount     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ analysis::scev                 affine recurrences, trip counts    │
//! │ analysis::alias                may-the-loop-touch-this-region     │
//! │ analysis::cfg                  loop forest                        │
//! │ analysis::ssa                  IR, builder, verifier              │
//! │ utils::graph                   dominators, batched updates        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ emulation                      reference interpreter              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use loopidiom::prelude::*;
//!
//! // void zero(u32 *p, u64 n) { for (u64 i = 0; i != n; i++) p[i] = 0; }
//! let mut f = FunctionBuilder::new("zero", SsaType::Void);
//! let p = f.param(SsaType::Ptr(0), true);
//! let n = f.param(SsaType::I64, false);
//! let entry = f.block("entry");
//! let preheader = f.block("preheader");
//! let body = f.block("body");
//! let exit = f.block("exit");
//!
//! f.switch_to(entry);
//! let zero = f.const_int(SsaType::I64, 0);
//! let guard = f.cmp(CmpKind::Eq, n, zero);
//! f.branch(guard, exit, preheader);
//!
//! f.switch_to(preheader);
//! f.jump(body);
//!
//! f.switch_to(body);
//! let i = f.phi(SsaType::I64);
//! let four = f.const_int(SsaType::I64, 4);
//! let offset = f.mul(i, four);
//! let addr = f.ptr_add(p, offset);
//! let value = f.const_int(SsaType::I32, 0);
//! f.store(addr, value);
//! let one = f.const_int(SsaType::I64, 1);
//! let next = f.add(i, one);
//! let done = f.cmp(CmpKind::Eq, next, n);
//! f.branch(done, exit, body);
//! f.phi_incoming(i, zero, preheader);
//! f.phi_incoming(i, next, body);
//!
//! f.switch_to(exit);
//! f.ret(None);
//!
//! let mut ssa = f.finish()?;
//! let ctx = CompilerContext::new(TargetInfo::default(), IdiomConfig::default());
//! let changed = LoopIdiomPass::new().run_on_function(&mut ssa, &ctx)?;
//! assert!(changed);
//! assert_eq!(ctx.events.count_kind(EventKind::FillFormed), 1);
//! # Ok::<(), loopidiom::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! A loop that does not match an idiom, or whose rewrite would be unsafe, is not an
//! error: the pass reports "no change". [`Error`] is reserved for broken invariants
//! such as a malformed CFG or an inconsistent batch of dominator updates.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use loopidiom::prelude::*;
///
/// let target = TargetInfo::default();
/// assert!(target.has_primitive(Primitive::MemSet));
/// ```
pub mod prelude;

/// Program representation and analyses.
///
/// - [`analysis::ssa`] - the SSA IR the pass rewrites, with a builder and a verifier
/// - [`analysis::cfg`] - natural loop detection and the mutable loop forest
/// - [`analysis::scev`] - symbolic affine expressions, trip counts and code expansion
/// - [`analysis::alias`] - memory effect queries over a whole loop
/// - [`analysis::valuetracking`] - small value-level facts (byte splats, sign, base objects)
pub mod analysis;

/// The loop idiom pass, its configuration and the pass infrastructure around it.
///
/// # Key Types
///
/// - [`compiler::LoopIdiomRecognize`] - runs recognition on one loop
/// - [`compiler::LoopIdiomPass`] - runs recognition on every loop of a function
/// - [`compiler::PassScheduler`] - runs passes over many functions in parallel
/// - [`compiler::EventLog`] - record of every rewrite and missed opportunity
pub mod compiler;

/// Reference interpreter for the SSA IR.
///
/// Used to check that a rewritten function computes the same results and leaves
/// the same memory behind as the original.
pub mod emulation;

/// Generic helpers shared by the analyses.
pub mod utils;

pub use error::{Error, Result};
