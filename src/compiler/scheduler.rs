//! Pass scheduler for orchestrating SSA pass execution.
//!
//! The `PassScheduler` runs a list of passes over every function of a
//! [`CompilerContext`] until no pass reports a change. Functions are independent,
//! so each pass processes them in parallel.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use rayon::prelude::*;

use crate::{
    compiler::{context::CompilerContext, events::EventKind, pass::SsaPass},
    Result,
};

/// Runs passes to fixpoint over all functions of a context.
pub struct PassScheduler {
    /// Maximum iterations for the entire pipeline.
    max_iterations: usize,
    /// Number of stable iterations before stopping.
    stable_iterations: usize,
    /// Passes, run in order on every iteration.
    pub passes: Vec<Box<dyn SsaPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(5, 1)
    }
}

impl PassScheduler {
    /// Creates a new scheduler with the specified iteration limits.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum iterations for the entire pipeline before stopping.
    /// * `stable_iterations` - Stop early if no changes for this many iterations.
    #[must_use]
    pub fn new(max_iterations: usize, stable_iterations: usize) -> Self {
        Self {
            max_iterations,
            stable_iterations: stable_iterations.max(1),
            passes: Vec::new(),
        }
    }

    /// Appends a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn SsaPass>) {
        self.passes.push(pass);
    }

    /// Runs all passes once over all functions.
    ///
    /// Returns `true` if any pass made changes, `false` otherwise.
    ///
    /// Each function is taken out of the context while a pass works on it, so no
    /// lock is held during the transformation. A changed function is verified
    /// before it is put back.
    fn run_passes_once(ctx: &CompilerContext, passes: &mut [Box<dyn SsaPass>]) -> Result<bool> {
        let any_changed = AtomicBool::new(false);

        for pass in passes.iter_mut() {
            pass.initialize(ctx)?;
        }

        let names = ctx.function_names();

        for pass in passes.iter() {
            ctx.events.record(EventKind::PassStarted).pass(pass.name());

            names.par_iter().try_for_each(|name| -> Result<()> {
                if !pass.should_run(name, ctx) {
                    return Ok(());
                }

                let Some(mut ssa) = ctx.take_function(name) else {
                    return Ok(());
                };

                let result = pass
                    .run_on_function(&mut ssa, ctx)
                    .and_then(|changed| {
                        if changed {
                            ssa.verify()?;
                        }
                        Ok(changed)
                    });

                ctx.add_function(ssa);

                match result {
                    Ok(true) => {
                        any_changed.store(true, Ordering::Relaxed);
                        ctx.mark_changed(name);
                        Ok(())
                    }
                    Ok(false) => Ok(()),
                    Err(e) => {
                        warn!("pass {} failed on {}: {}", pass.name(), name, e);
                        ctx.events
                            .record(EventKind::Error)
                            .function(name.clone())
                            .pass(pass.name())
                            .message(e.to_string());
                        Err(e)
                    }
                }
            })?;

            ctx.events.record(EventKind::PassCompleted).pass(pass.name());
        }

        for pass in passes.iter_mut() {
            pass.finalize(ctx)?;
        }

        Ok(any_changed.load(Ordering::Relaxed))
    }

    /// Runs the pipeline until it is stable or the iteration limit is reached.
    ///
    /// # Returns
    ///
    /// The number of iterations completed. Events are accumulated in `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns the first error a pass reported. The function it failed on is
    /// left in the context in whatever state the pass produced.
    pub fn run_pipeline(&mut self, ctx: &CompilerContext) -> Result<usize> {
        let mut stable_count = 0;
        let mut iterations = 0;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            let changed = Self::run_passes_once(ctx, &mut self.passes)?;
            debug!("pipeline iteration {} changed: {}", iterations, changed);

            if changed {
                stable_count = 0;
            } else {
                stable_count += 1;
                if stable_count >= self.stable_iterations {
                    break;
                }
            }
        }

        Ok(iterations)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{
        analysis::{
            ssa::{FunctionBuilder, SsaType},
            SsaFunction,
        },
        compiler::{
            context::CompilerContext, pass::SsaPass, EventKind, IdiomConfig, PassScheduler,
            TargetInfo,
        },
        Error, Result,
    };

    struct TestPass {
        name: &'static str,
        changes_to_make: AtomicUsize,
        fail: bool,
    }

    impl TestPass {
        fn new(name: &'static str, changes: usize) -> Self {
            Self {
                name,
                changes_to_make: AtomicUsize::new(changes),
                fail: false,
            }
        }
    }

    impl SsaPass for TestPass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run_on_function(&self, ssa: &mut SsaFunction, ctx: &CompilerContext) -> Result<bool> {
            if self.fail {
                return Err(Error::Error("boom".into()));
            }
            let remaining = self
                .changes_to_make
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if remaining {
                ctx.events
                    .record(EventKind::InstructionRemoved)
                    .function(ssa.name())
                    .message("test");
            }
            Ok(remaining)
        }
    }

    fn context_with(count: usize) -> CompilerContext {
        let ctx = CompilerContext::new(TargetInfo::default(), IdiomConfig::default());
        for i in 0..count {
            let mut f = FunctionBuilder::new(format!("f{}", i), SsaType::Void);
            let entry = f.block("entry");
            f.switch_to(entry);
            f.ret(None);
            ctx.add_function(f.finish().unwrap());
        }
        ctx
    }

    #[test]
    fn test_scheduler_iteration_limits() {
        let scheduler = PassScheduler::new(10, 3);
        assert_eq!(scheduler.max_iterations, 10);
        assert_eq!(scheduler.stable_iterations, 3);
    }

    #[test]
    fn test_default_scheduler() {
        let scheduler = PassScheduler::default();
        assert_eq!(scheduler.max_iterations, 5);
        assert_eq!(scheduler.stable_iterations, 1);
        assert!(scheduler.passes.is_empty());
    }

    #[test]
    fn test_pass_names() {
        let passes: Vec<Box<dyn SsaPass>> = vec![
            Box::new(TestPass::new("pass1", 0)),
            Box::new(TestPass::new("pass2", 0)),
        ];

        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].name(), "pass1");
        assert_eq!(passes[1].name(), "pass2");
        assert_eq!(passes[0].description(), "No description available");
    }

    #[test]
    fn test_runs_until_stable() {
        let ctx = context_with(2);
        let mut scheduler = PassScheduler::new(10, 1);
        scheduler.add_pass(Box::new(TestPass::new("counting", 3)));

        let iterations = scheduler.run_pipeline(&ctx).unwrap();
        assert_eq!(ctx.events.count_kind(EventKind::InstructionRemoved), 3);
        assert!(iterations >= 3);
        assert!(iterations <= 4);
        assert_eq!(ctx.function_count(), 2);
    }

    #[test]
    fn test_error_is_propagated_and_function_kept() {
        let ctx = context_with(1);
        let mut scheduler = PassScheduler::new(3, 1);
        scheduler.add_pass(Box::new(TestPass {
            name: "failing",
            changes_to_make: AtomicUsize::new(0),
            fail: true,
        }));

        assert!(scheduler.run_pipeline(&ctx).is_err());
        assert!(ctx.has_function("f0"));
        assert_eq!(ctx.events.count_kind(EventKind::Error), 1);
    }
}
