//! SSA passes.
//!
//! Every pass implements [`SsaPass`](crate::compiler::SsaPass) and can be
//! scheduled by the [`PassScheduler`](crate::compiler::PassScheduler).

pub mod idiom;

pub use idiom::{
    ByteCompareLoop, IdiomMatch, LoopIdiomPass, LoopIdiomRecognize, PopcountLoop,
    ShiftUntilZeroLoop, StridedCopy, StridedFill,
};
