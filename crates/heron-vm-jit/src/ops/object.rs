//! `instanceof` and `in`. Both need the object model, so both always defer.

use heron_vm_core::{Runtime, Value, VmContext};

use crate::slow_path;

/// `x instanceof y`
pub fn instance_of<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    slow_path::binary(ctx, "instanceof", x, y, R::instanceof_slow)
}

/// `x in y`
pub fn in_op<R: Runtime>(ctx: &mut VmContext<R>, x: Value, y: Value) -> Value {
    slow_path::binary(ctx, "in", x, y, R::in_slow)
}
