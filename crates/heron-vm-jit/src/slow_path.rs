//! Hand-off to the interpreter's generic operators.
//!
//! Operands are packed into an [`Operands`](heron_vm_core::Operands) buffer on
//! this function's stack, the slow entry runs, and the result is read back
//! from slot 0. A failed entry parks its error on the context and the caller
//! gets the error sentinel.
//!
//! The entry borrows the context for the whole call, so nested operators and
//! frame transitions it performs reborrow from it.

use heron_vm_core::{BinaryOperands, Runtime, UnaryOperands, Value, VmContext, VmResult};

#[inline(always)]
fn trace_fallback(_op: &'static str, _operands: &[Value]) {
    #[cfg(feature = "logging")]
    tracing::trace!(op = _op, operands = ?_operands, "slow path");
}

/// Run a binary slow entry on `[lhs, rhs]`.
#[inline(never)]
pub(crate) fn binary<R: Runtime>(
    ctx: &mut VmContext<R>,
    op: &'static str,
    lhs: Value,
    rhs: Value,
    entry: impl FnOnce(&mut VmContext<R>, &mut BinaryOperands) -> VmResult<()>,
) -> Value {
    let mut ops = BinaryOperands::pair(lhs, rhs);
    trace_fallback(op, ops.slots());
    match entry(ctx, &mut ops) {
        Ok(()) => ops.result(),
        Err(err) => ctx.raise(err),
    }
}

/// Run a unary slow entry on `[operand]`.
#[inline(never)]
pub(crate) fn unary<R: Runtime>(
    ctx: &mut VmContext<R>,
    op: &'static str,
    operand: Value,
    entry: impl FnOnce(&mut VmContext<R>, &mut UnaryOperands) -> VmResult<()>,
) -> Value {
    let mut ops = UnaryOperands::single(operand);
    trace_fallback(op, ops.slots());
    match entry(ctx, &mut ops) {
        Ok(()) => ops.result(),
        Err(err) => ctx.raise(err),
    }
}
