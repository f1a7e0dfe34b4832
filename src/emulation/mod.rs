//! Execution of SSA functions on concrete inputs.
//!
//! The interpreter defines what a function means, independently of the passes
//! that rewrite it: running a function before and after a rewrite on the same
//! arguments and memory must give the same result and leave the same bytes behind.
//!
//! # Key Components
//!
//! - [`crate::emulation::Interpreter`] - executes one function with a step budget
//! - [`crate::emulation::SparseMemory`] - byte-addressed memory, zero where never written
//!
//! # Example
//!
//! ```rust
//! use loopidiom::analysis::ssa::{FunctionBuilder, SsaType};
//! use loopidiom::emulation::Interpreter;
//!
//! let mut f = FunctionBuilder::new("store_byte", SsaType::Void);
//! let p = f.param(SsaType::Ptr(0), false);
//! let entry = f.block("entry");
//! f.switch_to(entry);
//! let byte = f.const_int(SsaType::I8, 0x2a);
//! f.store(p, byte);
//! f.ret(None);
//! let ssa = f.finish()?;
//!
//! let mut interp = Interpreter::new(&ssa);
//! interp.run(&[0x40])?;
//! assert_eq!(interp.memory().read(0x40, 1)?, vec![0x2a]);
//! # Ok::<(), loopidiom::Error>(())
//! ```

mod interpreter;
mod memory;

pub use interpreter::{Interpreter, DEFAULT_STEP_LIMIT};
pub use memory::{SparseMemory, DEFAULT_STACK_LIMIT, STACK_BASE};
