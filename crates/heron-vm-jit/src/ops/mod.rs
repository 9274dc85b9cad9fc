//! Operator dispatch
//!
//! One routine per operator. Each checks operand tags, computes the result
//! inline when both operands have a cheap shape, and otherwise hands off to
//! the interpreter's slow path.
//!
//! Every routine returns a [`Value`](heron_vm_core::Value). The error sentinel
//! means an exception is pending on the context (or, for integer modulo by
//! zero, that the operation failed without one) and the caller must stop and
//! propagate it.

mod arith;
mod bitwise;
mod compare;
mod object;
mod unary;

pub use arith::{add, div, mul, pow, rem, sub};
pub use bitwise::{bit_and, bit_or, bit_xor, sar, shl, shr};
pub use compare::{eq, ge, gt, le, lt, ne, strict_eq, strict_ne};
pub use object::{in_op, instance_of};
pub use unary::{bit_not, dec, inc, lnot, neg, plus, to_bool, type_of};
