//! A small interpreter stand-in for integration tests.
//!
//! Implements just enough of the language to check that every operator
//! reaches the right slow path with the right operands, that frame
//! bridge calls see real function objects, and that a slow path can call
//! back into compiled code.

#![allow(dead_code)]

use std::collections::HashMap;

use heron_vm_core::{
    ArithOp, BinaryOperands, ClosureVar, FunctionBytecode, HeapPtr, LogicOp, ObjectModel, RelOp,
    SlowPath, StackFrame, Tag, TypeOfKind, UnaryOp, UnaryOperands, Value, ValueKind, VarRef,
    VmContext, VmError, VmResult,
};
use heron_vm_jit::{bridge, ops};

/// Objects owned by [`TestRuntime`].
#[derive(Debug)]
pub enum HeapObject {
    Str(String),
    Object {
        keys: Vec<String>,
        constructor: Option<Value>,
    },
    Function {
        bytecode: FunctionBytecode,
        var_refs: Vec<VarRef>,
    },
}

#[derive(Debug, Default)]
pub struct TestRuntime {
    /// Boxed so addresses stay put while the arena grows
    heap: Vec<Box<HeapObject>>,
    atoms: HashMap<TypeOfKind, Value>,
    /// Slow entries in call order
    pub calls: Vec<&'static str>,
    /// Values released through `free_value` / `to_bool_free`
    pub freed: Vec<Value>,
    /// Values duplicated through `dup_value`
    pub dups: Vec<Value>,
    /// Error the next slow entry fails with
    pub fail_next: Option<VmError>,
    /// Backtraces taken inside function calls made by slow paths
    pub traces: Vec<Vec<String>>,
}

pub fn new_ctx() -> VmContext<TestRuntime> {
    VmContext::new(TestRuntime::default())
}

/// Closure variable captured from local `idx` of the enclosing function.
pub fn captured_local(name: &str, idx: u16) -> ClosureVar {
    ClosureVar {
        name: Some(name.to_string()),
        is_local: true,
        is_arg: false,
        var_idx: idx,
    }
}

impl TestRuntime {
    fn alloc(&mut self, tag: Tag, obj: HeapObject) -> Value {
        let mut boxed = Box::new(obj);
        let ptr = HeapPtr::new(&mut *boxed as *mut HeapObject).expect("box is non-null");
        self.heap.push(boxed);
        Value::heap(tag, ptr)
    }

    pub fn string(&mut self, s: &str) -> Value {
        self.alloc(Tag::String, HeapObject::Str(s.to_string()))
    }

    pub fn symbol(&mut self) -> Value {
        self.alloc(Tag::Symbol, HeapObject::Str("Symbol()".to_string()))
    }

    pub fn object(&mut self, keys: &[&str], constructor: Option<Value>) -> Value {
        let keys = keys.iter().map(|k| k.to_string()).collect();
        self.alloc(Tag::Object, HeapObject::Object { keys, constructor })
    }

    pub fn function(&mut self, bytecode: FunctionBytecode, var_refs: Vec<VarRef>) -> Value {
        self.alloc(Tag::Object, HeapObject::Function { bytecode, var_refs })
    }

    pub fn lookup(&self, ptr: HeapPtr) -> Option<&HeapObject> {
        let target = ptr.as_ptr::<HeapObject>();
        self.heap
            .iter()
            .map(|b| &**b)
            .find(|obj| std::ptr::eq(*obj, target))
    }

    pub fn str_of(&self, v: Value) -> Option<&str> {
        match self.lookup(v.as_heap(Tag::String)?)? {
            HeapObject::Str(s) => Some(s),
            _ => None,
        }
    }

    fn enter(&mut self, name: &'static str) -> VmResult<()> {
        self.calls.push(name);
        match self.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn to_number(&self, v: Value) -> VmResult<f64> {
        Ok(match v.kind() {
            ValueKind::Int(n) => f64::from(n),
            ValueKind::Float64(d) => d,
            ValueKind::Bool(b) => f64::from(u8::from(b)),
            ValueKind::Null => 0.0,
            ValueKind::Heap(Tag::String, _) => {
                let s = self.str_of(v).unwrap_or_default().trim();
                if s.is_empty() {
                    0.0
                } else {
                    s.parse().unwrap_or(f64::NAN)
                }
            }
            ValueKind::Heap(Tag::Symbol, _) => {
                return Err(VmError::type_error("cannot convert a Symbol to a number"));
            }
            _ => f64::NAN,
        })
    }

    fn to_int32(&self, v: Value) -> VmResult<i32> {
        let d = self.to_number(v)?;
        if !d.is_finite() {
            return Ok(0);
        }
        Ok(d.trunc().rem_euclid(4294967296.0) as u32 as i32)
    }

    fn to_display(&self, v: Value) -> String {
        match v.kind() {
            ValueKind::Int(n) => n.to_string(),
            ValueKind::Float64(d) => d.to_string(),
            ValueKind::Bool(b) => b.to_string(),
            ValueKind::Null => "null".into(),
            ValueKind::Undefined => "undefined".into(),
            ValueKind::Heap(Tag::String, _) => self.str_of(v).unwrap_or_default().to_string(),
            _ => "[object Object]".into(),
        }
    }

    fn is_string(v: Value) -> bool {
        v.tag() == Tag::String
    }

    fn strict_equals(&self, a: Value, b: Value) -> bool {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return x == y;
        }
        if let (Some(x), Some(y)) = (self.str_of(a), self.str_of(b)) {
            return x == y;
        }
        a == b
    }

    fn loose_equals(&self, a: Value, b: Value) -> VmResult<bool> {
        let nullish = |v: Value| matches!(v.kind(), ValueKind::Null | ValueKind::Undefined);
        if nullish(a) || nullish(b) {
            return Ok(nullish(a) && nullish(b));
        }
        if a.tag() == b.tag() || (a.as_number().is_some() && b.as_number().is_some()) {
            return Ok(self.strict_equals(a, b));
        }
        if a.tag() == Tag::Object || b.tag() == Tag::Object {
            return Ok(false);
        }
        Ok(self.to_number(a)? == self.to_number(b)?)
    }

    fn truthy(&self, v: Value) -> bool {
        match v.kind() {
            ValueKind::Int(n) => n != 0,
            ValueKind::Bool(b) => b,
            ValueKind::Float64(d) => d != 0.0 && !d.is_nan(),
            ValueKind::Null | ValueKind::Undefined => false,
            ValueKind::Heap(Tag::String, _) => !self.str_of(v).unwrap_or_default().is_empty(),
            _ => true,
        }
    }
}

impl SlowPath for TestRuntime {
    fn add_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()> {
        cx.runtime_mut().enter("add_slow")?;
        let a = call_value_of(cx, ops.lhs())?;
        let b = call_value_of(cx, ops.rhs())?;
        let rt = cx.runtime_mut();
        let result = if Self::is_string(a) || Self::is_string(b) {
            let joined = format!("{}{}", rt.to_display(a), rt.to_display(b));
            rt.string(&joined)
        } else {
            Value::number(rt.to_number(a)? + rt.to_number(b)?)
        };
        ops.set_result(result);
        Ok(())
    }

    fn binary_arith_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        op: ArithOp,
    ) -> VmResult<()> {
        let rt = cx.runtime_mut();
        rt.enter("binary_arith_slow")?;
        let a = rt.to_number(ops.lhs())?;
        let b = rt.to_number(ops.rhs())?;
        let r = match op {
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a % b,
            ArithOp::Pow => a.powf(b),
        };
        ops.set_result(Value::number(r));
        Ok(())
    }

    fn binary_logic_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        op: LogicOp,
    ) -> VmResult<()> {
        let rt = cx.runtime_mut();
        rt.enter("binary_logic_slow")?;
        let a = rt.to_int32(ops.lhs())?;
        let b = rt.to_int32(ops.rhs())?;
        let r = match op {
            LogicOp::And => a & b,
            LogicOp::Or => a | b,
            LogicOp::Xor => a ^ b,
            LogicOp::Shl => a.wrapping_shl(b as u32 & 0x1f),
            LogicOp::Sar => a >> (b as u32 & 0x1f),
        };
        ops.set_result(Value::int(r));
        Ok(())
    }

    fn shr_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()> {
        let rt = cx.runtime_mut();
        rt.enter("shr_slow")?;
        let a = rt.to_int32(ops.lhs())? as u32;
        let b = rt.to_int32(ops.rhs())? as u32;
        ops.set_result(Value::number(f64::from(a >> (b & 0x1f))));
        Ok(())
    }

    fn unary_arith_slow(
        cx: &mut VmContext<Self>,
        ops: &mut UnaryOperands,
        op: UnaryOp,
    ) -> VmResult<()> {
        let rt = cx.runtime_mut();
        rt.enter("unary_arith_slow")?;
        let x = ops.operand();
        let result = match op {
            UnaryOp::BitNot => Value::int(!rt.to_int32(x)?),
            UnaryOp::Neg => Value::number(-rt.to_number(x)?),
            UnaryOp::Plus => Value::number(rt.to_number(x)?),
            UnaryOp::Inc => Value::number(rt.to_number(x)? + 1.0),
            UnaryOp::Dec => Value::number(rt.to_number(x)? - 1.0),
        };
        ops.set_result(result);
        Ok(())
    }

    fn relational_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        op: RelOp,
    ) -> VmResult<()> {
        let rt = cx.runtime_mut();
        rt.enter("relational_slow")?;
        let (a, b) = (ops.lhs(), ops.rhs());
        let ord = match (rt.str_of(a), rt.str_of(b)) {
            (Some(x), Some(y)) => Some(x.cmp(y)),
            _ => rt.to_number(a)?.partial_cmp(&rt.to_number(b)?),
        };
        let r = ord.is_some_and(|o| match op {
            RelOp::Lt => o.is_lt(),
            RelOp::Le => o.is_le(),
            RelOp::Gt => o.is_gt(),
            RelOp::Ge => o.is_ge(),
        });
        ops.set_result(Value::bool(r));
        Ok(())
    }

    fn eq_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands, negate: bool) -> VmResult<()> {
        let rt = cx.runtime_mut();
        rt.enter("eq_slow")?;
        let r = rt.loose_equals(ops.lhs(), ops.rhs())?;
        ops.set_result(Value::bool(r != negate));
        Ok(())
    }

    fn strict_eq_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        negate: bool,
    ) -> VmResult<()> {
        let rt = cx.runtime_mut();
        rt.enter("strict_eq_slow")?;
        let r = rt.strict_equals(ops.lhs(), ops.rhs());
        ops.set_result(Value::bool(r != negate));
        Ok(())
    }

    fn instanceof_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()> {
        let rt = cx.runtime_mut();
        rt.enter("instanceof_slow")?;
        let (obj, ctor) = (ops.lhs(), ops.rhs());
        let callable = ctor
            .as_heap(Tag::Object)
            .and_then(|p| rt.lookup(p))
            .is_some_and(|o| matches!(o, HeapObject::Function { .. }));
        if !callable {
            return Err(VmError::type_error(
                "right-hand side of 'instanceof' is not callable",
            ));
        }
        let r = match obj.as_heap(Tag::Object).and_then(|p| rt.lookup(p)) {
            Some(HeapObject::Object { constructor, .. }) => *constructor == Some(ctor),
            _ => false,
        };
        ops.set_result(Value::bool(r));
        Ok(())
    }

    fn in_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()> {
        let rt = cx.runtime_mut();
        rt.enter("in_slow")?;
        let key = rt.to_display(ops.lhs());
        let r = match ops.rhs().as_heap(Tag::Object).and_then(|p| rt.lookup(p)) {
            Some(HeapObject::Object { keys, .. }) => keys.contains(&key),
            Some(HeapObject::Function { .. }) => false,
            _ => {
                return Err(VmError::type_error(
                    "cannot use 'in' operator to search for a key in a primitive",
                ));
            }
        };
        ops.set_result(Value::bool(r));
        Ok(())
    }

    fn to_bool_free(&mut self, value: Value) -> bool {
        self.calls.push("to_bool_free");
        let r = self.truthy(value);
        self.freed.push(value);
        r
    }

    fn typeof_kind(&mut self, value: Value) -> TypeOfKind {
        self.calls.push("typeof_kind");
        match value.kind() {
            ValueKind::Int(_) | ValueKind::Float64(_) => TypeOfKind::Number,
            ValueKind::Bool(_) => TypeOfKind::Boolean,
            ValueKind::Undefined => TypeOfKind::Undefined,
            ValueKind::Heap(Tag::String, _) => TypeOfKind::String,
            ValueKind::Heap(Tag::Symbol, _) => TypeOfKind::Symbol,
            ValueKind::Heap(Tag::BigInt, _) => TypeOfKind::BigInt,
            ValueKind::Heap(Tag::Object, p) => match self.lookup(p) {
                Some(HeapObject::Function { .. }) => TypeOfKind::Function,
                _ => TypeOfKind::Object,
            },
            _ => TypeOfKind::Object,
        }
    }

    fn atom_to_string(&mut self, kind: TypeOfKind) -> Value {
        if let Some(atom) = self.atoms.get(&kind) {
            return *atom;
        }
        let atom = self.string(kind.as_str());
        self.atoms.insert(kind, atom);
        atom
    }

    fn free_value(&mut self, value: Value) {
        self.freed.push(value);
    }
}

/// `+` converts a function operand by calling it. The call runs the way a
/// compiled body would: link a frame, record the pc, evaluate
/// `cpool[0] + cpool[1]` through the operator fast path, snapshot the stack
/// into [`TestRuntime::traces`], unlink.
fn call_value_of(cx: &mut VmContext<TestRuntime>, v: Value) -> VmResult<Value> {
    let is_function = v
        .as_heap(Tag::Object)
        .and_then(|p| cx.runtime().lookup(p))
        .is_some_and(|o| matches!(o, HeapObject::Function { .. }));
    if !is_function {
        return Ok(v);
    }
    let mut frame = StackFrame::new();
    let fp: *mut StackFrame = &mut frame;
    // SAFETY: `frame` outlives the activation, which exits below.
    unsafe {
        bridge::stack_frame_init(cx, fp, v, std::ptr::null_mut(), 0);
        bridge::stack_frame_set_pc(cx, fp, 0);
    }
    let a = bridge::function_cpool(cx, v, 0);
    let b = bridge::function_cpool(cx, v, 1);
    let r = ops::add(cx, a, b);
    let trace = bridge::backtrace(cx).iter().map(ToString::to_string).collect();
    cx.runtime_mut().traces.push(trace);
    // SAFETY: `fp` is the current frame.
    unsafe { bridge::stack_frame_exit(cx, fp) };
    if r.is_exception() {
        return Err(cx
            .take_exception()
            .unwrap_or_else(|| VmError::type_error("exception sentinel without an error")));
    }
    Ok(r)
}

impl ObjectModel for TestRuntime {
    fn function_bytecode(&self, func: HeapPtr) -> Option<&FunctionBytecode> {
        match self.lookup(func)? {
            HeapObject::Function { bytecode, .. } => Some(bytecode),
            _ => None,
        }
    }

    fn closure_var_refs(&self, func: HeapPtr) -> Option<&[VarRef]> {
        match self.lookup(func)? {
            HeapObject::Function { var_refs, .. } => Some(var_refs),
            _ => None,
        }
    }

    fn dup_value(&mut self, value: Value) -> Value {
        self.dups.push(value);
        value
    }
}
