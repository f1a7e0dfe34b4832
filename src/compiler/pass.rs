//! The pass trait.
//!
//! Every transformation run by the [`PassScheduler`](crate::compiler::PassScheduler)
//! implements [`SsaPass`]. Passes work on one function at a time and receive the
//! shared [`CompilerContext`] for the target description, the configuration and
//! the event log.

use crate::{analysis::SsaFunction, compiler::CompilerContext, Result};

/// A pass that operates on SSA form.
///
/// All passes must be thread-safe (Send + Sync) to allow parallel execution.
/// Passes receive mutable access to the SSA function and shared access to
/// the compiler context.
pub trait SsaPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run on a specific function?
    ///
    /// Called before `run_on_function`. Override to skip functions that
    /// don't need this pass.
    fn should_run(&self, _name: &str, _ctx: &CompilerContext) -> bool {
        true
    }

    /// Run the pass on a single function.
    ///
    /// Returns `true` if any changes were made, `false` otherwise.
    /// Events should be recorded directly to `ctx.events`.
    ///
    /// # Arguments
    ///
    /// * `ssa` - The SSA function to transform.
    /// * `ctx` - The compiler context (thread-safe, uses shared reference).
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant of the IR or its analyses is broken.
    fn run_on_function(&self, ssa: &mut SsaFunction, ctx: &CompilerContext) -> Result<bool>;

    /// Called once before the pass runs in an iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    fn initialize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Called once after the pass completes in an iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
