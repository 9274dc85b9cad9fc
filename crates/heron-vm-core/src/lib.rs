//! # Heron VM Core
//!
//! Shared model between the bytecode interpreter and natively compiled code.
//!
//! ## Design Principles
//!
//! - **NaN-boxing**: every value is 64 bits, tag checked before payload access
//! - **Interpreter-owned semantics**: anything past a fast path goes through
//!   the [`SlowPath`] trait
//! - **Per-instance state**: the frame chain and pending exception live in a
//!   [`VmContext`], never in a global

#![warn(clippy::all)]
#![warn(missing_docs)]
// Unsafe is limited to frame and closure-reference pointers.
// All unsafe code must have SAFETY comments

pub mod bytecode;
pub mod context;
pub mod error;
pub mod frame;
pub mod interp;
pub mod operands;
pub mod value;
pub mod var_ref;

pub use bytecode::{ClosureVar, FunctionBytecode, LineTable};
pub use context::VmContext;
pub use error::{VmError, VmResult, invariant_violation};
pub use frame::{BacktraceEntry, FrameChain, FrameInfo, FrameState, StackFrame};
pub use interp::{ArithOp, LogicOp, ObjectModel, RelOp, Runtime, SlowPath, TypeOfKind, UnaryOp};
pub use operands::{BinaryOperands, Operands, UnaryOperands};
pub use value::{HeapPtr, Tag, Value, ValueKind, tag_of};
pub use var_ref::VarRef;
