//! `< <= > >= == != === !==`
//!
//! Only integer pairs are compared inline. Doubles go to the interpreter too,
//! since NaN ordering and `-0` are its business.

use heron_vm_core::{RelOp, Runtime, Value, VmContext};

use crate::slow_path;

macro_rules! int_compare {
    ($(#[$doc:meta])* $name:ident, $cmp:tt, $slow:ident($arg:expr)) => {
        $(#[$doc])*
        pub fn $name<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
            if let Some((a, b)) = Value::both_int(x, y) {
                return Value::bool(a $cmp b);
            }
            slow_path::binary(ctx, stringify!($name), x, y, |cx, ops| R::$slow(cx, ops, $arg))
        }
    };
}

int_compare!(
    /// `x < y`
    lt, <, relational_slow(RelOp::Lt)
);
int_compare!(
    /// `x <= y`
    le, <=, relational_slow(RelOp::Le)
);
int_compare!(
    /// `x > y`
    gt, >, relational_slow(RelOp::Gt)
);
int_compare!(
    /// `x >= y`
    ge, >=, relational_slow(RelOp::Ge)
);
int_compare!(
    /// `x == y`
    eq, ==, eq_slow(false)
);
int_compare!(
    /// `x != y`
    ne, !=, eq_slow(true)
);
int_compare!(
    /// `x === y`
    strict_eq, ==, strict_eq_slow(false)
);
int_compare!(
    /// `x !== y`
    strict_ne, !=, strict_eq_slow(true)
);
