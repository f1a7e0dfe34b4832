use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Loops that simply do not match an idiom are never reported through this type; the
/// recognizer returns `Ok(false)` for them. Errors describe broken invariants of the IR
/// or of the analyses that are maintained alongside it.
///
/// # Error Categories
///
/// ## Structural Errors
/// - [`Error::Malformed`] - The IR or an analysis is in an inconsistent state
/// - [`Error::Verification`] - The IR verifier rejected a function
/// - [`Error::NotSupported`] - A construct the requested operation cannot handle
///
/// ## Emulation Errors
/// - [`Error::Emulation`] - The interpreter hit a runtime fault
/// - [`Error::StepLimit`] - The interpreter ran out of its instruction budget
///
/// # Examples
///
/// ```rust
/// use loopidiom::{prelude::*, Error};
///
/// let f = FunctionBuilder::new("empty", SsaType::Void);
/// match f.finish() {
///     Ok(_) => println!("built"),
///     Err(Error::Verification(message)) => eprintln!("invalid IR: {}", message),
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The IR or one of its analyses is in an inconsistent state.
    ///
    /// This error indicates that an invariant the transformation relies on was
    /// violated, such as a dominator update batch that disagrees with the CFG.
    /// The error includes the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The IR verifier rejected a function.
    ///
    /// Produced by [`crate::analysis::ssa::verify`] when a block lacks a terminator,
    /// a phi disagrees with its block's predecessors, or a use is not dominated by
    /// its definition.
    #[error("Verification failed: {0}")]
    Verification(String),

    /// The requested operation does not support this construct.
    ///
    /// Raised for example by the expression expander when asked to materialize a
    /// recurrence that has no corresponding phi.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The interpreter hit a runtime fault.
    ///
    /// Covers reads of undefined values, wrapping memory ranges and calls to
    /// functions the interpreter does not model.
    #[error("Emulation failed: {0}")]
    Emulation(String),

    /// The interpreter executed more instructions than its configured limit.
    ///
    /// The associated value is the limit that was exceeded.
    #[error("Emulation exceeded the step limit of {0}")]
    StepLimit(u64),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

/// The generic Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;
