//! Recording interpreter stand-in for unit tests.

use heron_vm_core::{
    ArithOp, BinaryOperands, FunctionBytecode, HeapPtr, LogicOp, ObjectModel, RelOp, SlowPath,
    TypeOfKind, UnaryOp, UnaryOperands, Value, VarRef, VmContext, VmResult,
};

/// Logs every slow-path entry and answers with [`Recorder::MARKER`].
#[derive(Debug, Default)]
pub struct Recorder {
    pub calls: Vec<String>,
}

impl Recorder {
    /// Result written by every slow entry.
    pub const MARKER: Value = Value::UNINITIALIZED;

    fn answer<const N: usize>(
        cx: &mut VmContext<Self>,
        call: String,
        ops: &mut heron_vm_core::Operands<N>,
    ) -> VmResult<()> {
        cx.runtime_mut().calls.push(call);
        ops.set_result(Self::MARKER);
        Ok(())
    }
}

pub fn ctx() -> VmContext<Recorder> {
    VmContext::new(Recorder::default())
}

impl SlowPath for Recorder {
    fn add_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()> {
        Self::answer(cx, "add_slow".into(), ops)
    }

    fn binary_arith_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        op: ArithOp,
    ) -> VmResult<()> {
        Self::answer(cx, format!("binary_arith_slow({op:?})"), ops)
    }

    fn binary_logic_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        op: LogicOp,
    ) -> VmResult<()> {
        Self::answer(cx, format!("binary_logic_slow({op:?})"), ops)
    }

    fn shr_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()> {
        Self::answer(cx, "shr_slow".into(), ops)
    }

    fn unary_arith_slow(
        cx: &mut VmContext<Self>,
        ops: &mut UnaryOperands,
        op: UnaryOp,
    ) -> VmResult<()> {
        Self::answer(cx, format!("unary_arith_slow({op:?})"), ops)
    }

    fn relational_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        op: RelOp,
    ) -> VmResult<()> {
        Self::answer(cx, format!("relational_slow({op:?})"), ops)
    }

    fn eq_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        negate: bool,
    ) -> VmResult<()> {
        Self::answer(cx, format!("eq_slow({negate})"), ops)
    }

    fn strict_eq_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        negate: bool,
    ) -> VmResult<()> {
        Self::answer(cx, format!("strict_eq_slow({negate})"), ops)
    }

    fn instanceof_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()> {
        Self::answer(cx, "instanceof_slow".into(), ops)
    }

    fn in_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()> {
        Self::answer(cx, "in_slow".into(), ops)
    }

    fn to_bool_free(&mut self, _value: Value) -> bool {
        self.calls.push("to_bool_free".into());
        true
    }

    fn typeof_kind(&mut self, value: Value) -> TypeOfKind {
        self.calls.push("typeof_kind".into());
        if value.as_number().is_some() {
            TypeOfKind::Number
        } else {
            TypeOfKind::Object
        }
    }

    fn atom_to_string(&mut self, kind: TypeOfKind) -> Value {
        self.calls.push(format!("atom_to_string({kind:?})"));
        Self::MARKER
    }

    fn free_value(&mut self, _value: Value) {
        self.calls.push("free_value".into());
    }
}

impl ObjectModel for Recorder {
    fn function_bytecode(&self, _func: HeapPtr) -> Option<&FunctionBytecode> {
        None
    }

    fn closure_var_refs(&self, _func: HeapPtr) -> Option<&[VarRef]> {
        None
    }

    fn dup_value(&mut self, value: Value) -> Value {
        value
    }
}
