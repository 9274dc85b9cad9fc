//! `& | ^ << >> >>>`
//!
//! Shift counts are reduced modulo 32.

use heron_vm_core::{LogicOp, Runtime, Value, VmContext};

use crate::slow_path;

const SHIFT_MASK: i32 = 0x1f;

/// `x & y`
pub fn bit_and<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        return Value::int(a & b);
    }
    logic_slow(ctx, "and", x, y, LogicOp::And)
}

/// `x | y`
pub fn bit_or<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        return Value::int(a | b);
    }
    logic_slow(ctx, "or", x, y, LogicOp::Or)
}

/// `x ^ y`
pub fn bit_xor<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        return Value::int(a ^ b);
    }
    logic_slow(ctx, "xor", x, y, LogicOp::Xor)
}

/// `x << y`
pub fn shl<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        return Value::int(a.wrapping_shl((b & SHIFT_MASK) as u32));
    }
    logic_slow(ctx, "shl", x, y, LogicOp::Shl)
}

/// `x >> y`, sign-propagating.
pub fn sar<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        return Value::int(a >> (b & SHIFT_MASK));
    }
    logic_slow(ctx, "sar", x, y, LogicOp::Sar)
}

/// `x >>> y`, zero-filling. The left operand is read as unsigned, so the
/// result may not fit an `Int`; it is then a double.
pub fn shr<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        let r = (a as u32) >> (b & SHIFT_MASK);
        return match i32::try_from(r) {
            Ok(r) => Value::int(r),
            Err(_) => Value::float64(f64::from(r)),
        };
    }
    slow_path::binary(ctx, "shr", x, y, R::shr_slow)
}

fn logic_slow<R: Runtime>(
    ctx: &mut VmContext<R>,
    name: &'static str,
    x: Value,
    y: Value,
    op: LogicOp,
) -> Value {
    slow_path::binary(ctx, name, x, y, |cx, ops| R::binary_logic_slow(cx, ops, op))
}
