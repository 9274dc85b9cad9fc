//! VM error types

use std::fmt;

use thiserror::Error;

use crate::value::Value;

/// Errors reported by the interpreter's slow paths.
///
/// These are language-level exceptions. Operator routines turn them into the
/// error sentinel and park them on the context as the pending exception.
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (e.g. `in` on a primitive)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Reference error (uninitialized binding)
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Range error (e.g. BigInt division by zero)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Internal error inside the interpreter
    #[error("InternalError: {0}")]
    InternalError(String),

    /// A value thrown by script code
    #[error("Uncaught {0:?}")]
    Thrown(Value),
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a reference error
    pub fn reference_error(msg: impl Into<String>) -> Self {
        Self::ReferenceError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}

/// Result type for slow-path operations
pub type VmResult<T> = std::result::Result<T, VmError>;

/// Abort on a broken code-generation contract.
///
/// Reached when a value's tag contradicts a guard the caller should already
/// have checked, or when a frame transition happens out of order. Continuing
/// would read a payload under the wrong interpretation, so this never
/// returns. The release profile builds with `panic = "abort"`.
#[cold]
#[inline(never)]
#[track_caller]
pub fn invariant_violation(args: fmt::Arguments<'_>) -> ! {
    #[cfg(feature = "logging")]
    tracing::error!(location = %std::panic::Location::caller(), "invariant violation: {}", args);
    panic!("invariant violation: {args}")
}
