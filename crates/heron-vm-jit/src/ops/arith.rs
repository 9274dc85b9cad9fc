//! `+ - * / % **`

use heron_vm_core::{ArithOp, Runtime, Value, VmContext};

use crate::slow_path;

/// `x + y`
pub fn add<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        return match a.checked_add(b) {
            Some(r) => Value::int(r),
            None => Value::float64(f64::from(a) + f64::from(b)),
        };
    }
    if let Some((a, b)) = Value::both_float(x, y) {
        return Value::float64(a + b);
    }
    slow_path::binary(ctx, "add", x, y, R::add_slow)
}

/// `x - y`
pub fn sub<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        return match a.checked_sub(b) {
            Some(r) => Value::int(r),
            None => Value::float64(f64::from(a) - f64::from(b)),
        };
    }
    if let Some((a, b)) = Value::both_float(x, y) {
        return Value::float64(a - b);
    }
    arith_slow(ctx, "sub", x, y, ArithOp::Sub)
}

/// `x * y`
pub fn mul<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        let product = i64::from(a) * i64::from(b);
        if product == 0 && (a < 0 || b < 0) {
            return Value::float64(-0.0);
        }
        return match i32::try_from(product) {
            Ok(r) => Value::int(r),
            // |product| <= 2^62: one rounding, same as multiplying doubles
            Err(_) => Value::float64(product as f64),
        };
    }
    if let Some((a, b)) = Value::both_float(x, y) {
        return Value::float64(a * b);
    }
    arith_slow(ctx, "mul", x, y, ArithOp::Mul)
}

/// `x / y`. Never produces an integer.
pub fn div<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        return Value::float64(f64::from(a) / f64::from(b));
    }
    if let Some((a, b)) = Value::both_float(x, y) {
        return Value::float64(a / b);
    }
    arith_slow(ctx, "div", x, y, ArithOp::Div)
}

/// `x % y`
///
/// Integer modulo by zero returns the error sentinel straight away, without
/// consulting the interpreter and without a pending exception.
pub fn rem<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    if let Some((a, b)) = Value::both_int(x, y) {
        if b == 0 {
            return Value::EXCEPTION;
        }
        // i32::MIN % -1 is 0, not a trap
        let r = a.wrapping_rem(b);
        if r == 0 && a < 0 {
            return Value::float64(-0.0);
        }
        return Value::int(r);
    }
    if let Some((a, b)) = Value::both_float(x, y) {
        return Value::float64(a % b);
    }
    arith_slow(ctx, "mod", x, y, ArithOp::Mod)
}

/// `x ** y`. Always delegated.
pub fn pow<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    arith_slow(ctx, "pow", x, y, ArithOp::Pow)
}

fn arith_slow<R: Runtime>(
    ctx: &mut VmContext<R>,
    name: &'static str,
    x: Value,
    y: Value,
    op: ArithOp,
) -> Value {
    slow_path::binary(ctx, name, x, y, |cx, ops| R::binary_arith_slow(cx, ops, op))
}
