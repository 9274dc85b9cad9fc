//! Unary operators and truthiness.
//!
//! Each unary slow entry gets its operand in slot 0 and leaves the result
//! in slot 0.

use heron_vm_core::{Runtime, UnaryOp, Value, VmContext};

use crate::slow_path;

/// `-x`
pub fn neg<R: Runtime>(ctx: &mut VmContext<R>, x: Value) -> Value {
    if let Some(n) = x.as_int() {
        return match n {
            0 => Value::float64(-0.0),
            i32::MIN => Value::float64(-f64::from(i32::MIN)),
            n => Value::int(-n),
        };
    }
    if let Some(d) = x.as_float() {
        return Value::float64(-d);
    }
    unary_slow(ctx, "neg", x, UnaryOp::Neg)
}

/// `+x`: identity on numbers, coercion otherwise.
pub fn plus<R: Runtime>(ctx: &mut VmContext<R>, x: Value) -> Value {
    if x.as_int().is_some() || x.as_float().is_some() {
        return x;
    }
    unary_slow(ctx, "plus", x, UnaryOp::Plus)
}

/// `~x`
pub fn bit_not<R: Runtime>(ctx: &mut VmContext<R>, x: Value) -> Value {
    if let Some(n) = x.as_int() {
        return Value::int(!n);
    }
    unary_slow(ctx, "bit_not", x, UnaryOp::BitNot)
}

/// `x + 1` as computed by `++`.
pub fn inc<R: Runtime>(ctx: &mut VmContext<R>, x: Value) -> Value {
    if let Some(n) = x.as_int() {
        return match n.checked_add(1) {
            Some(r) => Value::int(r),
            None => Value::float64(f64::from(n) + 1.0),
        };
    }
    if let Some(d) = x.as_float() {
        return Value::float64(d + 1.0);
    }
    unary_slow(ctx, "inc", x, UnaryOp::Inc)
}

/// `x - 1` as computed by `--`.
pub fn dec<R: Runtime>(ctx: &mut VmContext<R>, x: Value) -> Value {
    if let Some(n) = x.as_int() {
        return match n.checked_sub(1) {
            Some(r) => Value::int(r),
            None => Value::float64(f64::from(n) - 1.0),
        };
    }
    if let Some(d) = x.as_float() {
        return Value::float64(d - 1.0);
    }
    unary_slow(ctx, "dec", x, UnaryOp::Dec)
}

/// `!x`
pub fn lnot<R: Runtime>(ctx: &mut VmContext<R>, x: Value) -> Value {
    if let Some(b) = x.as_bool() {
        return Value::bool(!b);
    }
    Value::bool(!to_bool(ctx, x))
}

/// Truthiness of `x`.
///
/// `Int`, `Bool`, `null` and `undefined` answer from their payload. Any
/// other value is handed to the interpreter's coercion, which consumes it.
pub fn to_bool<R: Runtime>(ctx: &mut VmContext<R>, x: Value) -> bool {
    match x.small_payload() {
        Some(payload) => payload != 0,
        None => ctx.runtime_mut().to_bool_free(x),
    }
}

/// `typeof x`. Consumes `x`: it is freed exactly once, after its category
/// has been read.
pub fn type_of<R: Runtime>(ctx: &mut VmContext<R>, x: Value) -> Value {
    let rt = ctx.runtime_mut();
    let kind = rt.typeof_kind(x);
    rt.free_value(x);
    rt.atom_to_string(kind)
}

fn unary_slow<R: Runtime>(
    ctx: &mut VmContext<R>,
    name: &'static str,
    x: Value,
    op: UnaryOp,
) -> Value {
    slow_path::unary(ctx, name, x, |cx, ops| R::unary_arith_slow(cx, ops, op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Recorder, ctx};

    #[test]
    fn test_neg() {
        let mut ctx = ctx();
        assert_eq!(neg(&mut ctx, Value::int(5)), Value::int(-5));
        assert_eq!(neg(&mut ctx, Value::int(0)), Value::float64(-0.0));
        assert_eq!(neg(&mut ctx, Value::int(i32::MIN)), Value::float64(2147483648.0));
        assert_eq!(neg(&mut ctx, Value::float64(-0.0)), Value::float64(0.0));
        assert_eq!(neg(&mut ctx, Value::NULL), Recorder::MARKER);
        assert_eq!(ctx.runtime().calls, vec!["unary_arith_slow(Neg)"]);
    }

    #[test]
    fn test_plus_is_identity_on_numbers() {
        let mut ctx = ctx();
        assert_eq!(plus(&mut ctx, Value::int(3)), Value::int(3));
        assert_eq!(plus(&mut ctx, Value::float64(0.25)), Value::float64(0.25));
        plus(&mut ctx, Value::TRUE);
        assert_eq!(ctx.runtime().calls, vec!["unary_arith_slow(Plus)"]);
    }

    #[test]
    fn test_inc_dec() {
        let mut ctx = ctx();
        assert_eq!(inc(&mut ctx, Value::int(41)), Value::int(42));
        assert_eq!(inc(&mut ctx, Value::int(i32::MAX)), Value::float64(2147483648.0));
        assert_eq!(dec(&mut ctx, Value::int(i32::MIN)), Value::float64(-2147483649.0));
        assert_eq!(dec(&mut ctx, Value::float64(0.5)), Value::float64(-0.5));
        assert!(ctx.runtime().calls.is_empty());
    }

    #[test]
    fn test_bit_not() {
        let mut ctx = ctx();
        assert_eq!(bit_not(&mut ctx, Value::int(0)), Value::int(-1));
        assert_eq!(bit_not(&mut ctx, Value::int(-6)), Value::int(5));
    }

    #[test]
    fn test_small_tags_answer_truthiness_inline() {
        let mut ctx = ctx();
        assert!(!to_bool(&mut ctx, Value::FALSE));
        assert!(!to_bool(&mut ctx, Value::NULL));
        assert!(!to_bool(&mut ctx, Value::UNDEFINED));
        assert!(!to_bool(&mut ctx, Value::int(0)));
        assert!(to_bool(&mut ctx, Value::TRUE));
        assert!(to_bool(&mut ctx, Value::int(-3)));
        assert_eq!(lnot(&mut ctx, Value::TRUE), Value::FALSE);
        assert_eq!(lnot(&mut ctx, Value::int(0)), Value::TRUE);
        assert!(ctx.runtime().calls.is_empty());
    }

    #[test]
    fn test_other_tags_use_coercion() {
        let mut ctx = ctx();
        to_bool(&mut ctx, Value::float64(0.0));
        lnot(&mut ctx, Value::float64(2.0));
        assert_eq!(ctx.runtime().calls, vec!["to_bool_free", "to_bool_free"]);
    }

    #[test]
    fn test_typeof_frees_after_classifying() {
        let mut ctx = ctx();
        type_of(&mut ctx, Value::float64(1.5));
        assert_eq!(
            ctx.runtime().calls,
            vec!["typeof_kind", "free_value", "atom_to_string(Number)"]
        );
    }
}
