//! # Heron VM JIT
//!
//! What natively compiled code calls into: inline fast paths for every
//! operator, the hand-off to the interpreter's slow paths, the call-frame
//! bridge, and the `extern "C"` helpers that expose all of it to Cranelift.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod bridge;
pub mod compiler;
pub mod ops;
pub mod runtime_helpers;
mod slow_path;

#[cfg(test)]
mod test_support;

pub use compiler::{JitCompileArtifact, JitCompiler, JitError};
pub use runtime_helpers::{
    EXCEPTION_BITS, HELPER_COUNT, HelperKind, HelperRefs, RuntimeHelpers, build_runtime_helpers,
};
