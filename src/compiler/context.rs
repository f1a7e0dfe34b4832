//! Shared state of a compilation.
//!
//! The [`CompilerContext`] owns the functions being optimized together with
//! everything passes consult while rewriting them: the target description, the
//! pass configuration and the event log.

use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};

use crate::{
    analysis::SsaFunction,
    compiler::{config::IdiomConfig, events::EventLog, target::TargetInfo},
};

/// Compiler context for the SSA pipeline.
///
/// All collection fields use thread-safe types (`DashMap`, `DashSet`) so that
/// functions can be processed in parallel.
pub struct CompilerContext {
    /// SSA form of every function, keyed by function name.
    pub functions: DashMap<String, SsaFunction>,

    /// Primitives and costs of the target.
    pub target: TargetInfo,

    /// Switches and thresholds of the idiom pass.
    pub config: IdiomConfig,

    /// Accumulated events from all passes.
    pub events: EventLog,

    /// Functions changed by at least one pass.
    pub changed: DashSet<String>,

    /// When the context was created.
    start_time: Instant,
}

impl CompilerContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new(target: TargetInfo, config: IdiomConfig) -> Self {
        Self {
            functions: DashMap::new(),
            target,
            config,
            events: EventLog::new(),
            changed: DashSet::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the elapsed time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    // ── Function storage ────────────────────────────────────────────────

    /// Adds a function, replacing any function with the same name.
    pub fn add_function(&self, ssa: SsaFunction) {
        self.functions.insert(ssa.name().to_string(), ssa);
    }

    /// Executes a closure with a reference to a function.
    pub fn with_function<R, F>(&self, name: &str, f: F) -> Option<R>
    where
        F: FnOnce(&SsaFunction) -> R,
    {
        self.functions.get(name).map(|r| f(&r))
    }

    /// Executes a closure with a mutable reference to a function.
    pub fn with_function_mut<R, F>(&self, name: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut SsaFunction) -> R,
    {
        self.functions.get_mut(name).map(|mut r| f(r.value_mut()))
    }

    /// Checks if a function with this name exists.
    #[must_use]
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Removes a function and returns it.
    pub fn take_function(&self, name: &str) -> Option<SsaFunction> {
        self.functions.remove(name).map(|(_, ssa)| ssa)
    }

    /// Returns the names of all functions, sorted.
    #[must_use]
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Returns the number of functions.
    #[must_use]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    // ── Change tracking ─────────────────────────────────────────────────

    /// Marks a function as changed.
    pub fn mark_changed(&self, name: &str) {
        self.changed.insert(name.to_string());
    }

    /// Checks if a function was changed by any pass.
    #[must_use]
    pub fn was_changed(&self, name: &str) -> bool {
        self.changed.contains(name)
    }
}
