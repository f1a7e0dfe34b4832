//! Scalar evolution.
//!
//! Describes integer and pointer values as symbolic expressions, recognizes
//! affine recurrences of loops and computes back-edge-taken counts.
//!
//! # Key Components
//!
//! - [`SymExpr`] - Canonical symbolic expression
//! - [`ScalarEvolution`] - Lazily computed, cached mapping from values to expressions
//! - [`AffineRecurrence`] - `{start,+,step}` over one loop
//! - [`ExitCount`] - Back-edge-taken count with the width it wraps at
//! - [`Expander`] - Emits instructions computing an expression
//!
//! # Usage
//!
//! ```rust
//! use loopidiom::analysis::scev::{ScalarEvolution, SymExpr};
//! use loopidiom::analysis::cfg::LoopForest;
//! use loopidiom::analysis::ssa::{FunctionBuilder, SsaType};
//!
//! let mut f = FunctionBuilder::new("f", SsaType::I64);
//! let n = f.param(SsaType::I64, false);
//! let entry = f.block("entry");
//! f.switch_to(entry);
//! let two = f.const_int(SsaType::I64, 2);
//! let doubled = f.mul(n, two);
//! let sum = f.add(doubled, n);
//! f.ret(Some(sum));
//! let ssa = f.finish()?;
//!
//! let se = ScalarEvolution::new();
//! let expr = se.expr(&ssa, &LoopForest::new(), sum);
//! assert_eq!(expr, SymExpr::from_terms(0, vec![(SymExpr::Value(n), 3)]));
//! # Ok::<(), loopidiom::Error>(())
//! ```

mod evolution;
mod expander;
mod expr;

pub use evolution::{AffineRecurrence, ExitCount, ScalarEvolution};
pub use expander::Expander;
pub use expr::SymExpr;
