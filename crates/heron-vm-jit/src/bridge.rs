//! Call-frame bridge
//!
//! Lets a natively compiled function body take part in the interpreter's
//! call stack: frame transitions on the context's [`FrameChain`], plus read
//! access to the function's constant pool and closure variables.
//!
//! Passing a value that is not a bytecode function where one is required is
//! a code-generation bug and aborts.
//!
//! [`FrameChain`]: heron_vm_core::FrameChain

use heron_vm_core::{
    BacktraceEntry, FunctionBytecode, ObjectModel, Runtime, StackFrame, Tag, Value, VmContext,
    invariant_violation,
};

/// Bytecode of the function object `func`.
#[track_caller]
pub fn get_function_bytecode<M: ObjectModel + ?Sized>(model: &M, func: Value) -> &FunctionBytecode {
    let Some(ptr) = func.as_heap(Tag::Object) else {
        invariant_violation(format_args!(
            "get_function_bytecode: expected object, got {:?}",
            func.tag()
        ));
    };
    match model.function_bytecode(ptr) {
        Some(bc) => bc,
        None => invariant_violation(format_args!(
            "get_function_bytecode: {func:?} is not a bytecode function"
        )),
    }
}

/// Constant `idx` of `func`'s pool. The value is borrowed from the pool,
/// not duplicated.
#[track_caller]
pub fn function_cpool<R: Runtime>(ctx: &VmContext<R>, func: Value, idx: usize) -> Value {
    get_function_bytecode(ctx.runtime(), func).cpool_checked(idx)
}

/// Current value of closure variable `idx` of `func`, duplicated for the
/// caller.
///
/// `idx` indexes the function's declared closure layout; the function object
/// must hold one reference per declared variable.
#[track_caller]
pub fn get_function_var_ref<R: Runtime>(ctx: &mut VmContext<R>, func: Value, idx: usize) -> Value {
    let Some(ptr) = func.as_heap(Tag::Object) else {
        invariant_violation(format_args!(
            "get_function_var_ref: expected object, got {:?}",
            func.tag()
        ));
    };
    let bc = get_function_bytecode(ctx.runtime(), func);
    if idx >= bc.closure_vars.len() {
        invariant_violation(format_args!(
            "closure variable {idx} out of range for {} ({} declared)",
            bc.display_name(),
            bc.closure_vars.len()
        ));
    }
    let refs = match ctx.runtime().closure_var_refs(ptr) {
        Some(refs) => refs,
        None => invariant_violation(format_args!(
            "get_function_var_ref: {func:?} is not a closure"
        )),
    };
    if refs.len() != bc.closure_vars.len() {
        invariant_violation(format_args!(
            "{} captures {} variables but declares {}",
            bc.display_name(),
            refs.len(),
            bc.closure_vars.len()
        ));
    }
    let value = refs[idx].get();
    ctx.runtime_mut().dup_value(value)
}

/// Bytecode of `func` when it is a bytecode function. Frames may also be
/// linked for native callees, which have none.
fn frame_bytecode<R: Runtime>(ctx: &VmContext<R>, func: Value) -> Option<&FunctionBytecode> {
    func.as_heap(Tag::Object)
        .and_then(|p| ctx.runtime().function_bytecode(p))
}

/// Link `frame` as the current frame for a call of `func`.
///
/// For a bytecode function the argument buffer must cover its declared
/// arguments (callers pad missing ones with `undefined`).
///
/// # Safety
///
/// See [`FrameChain::init`](heron_vm_core::FrameChain::init).
pub unsafe fn stack_frame_init<R: Runtime>(
    ctx: &VmContext<R>,
    frame: *mut StackFrame,
    func: Value,
    args: *mut Value,
    arg_count: usize,
) {
    if let Some(bc) = frame_bytecode(ctx, func)
        && arg_count < usize::from(bc.arg_count)
    {
        invariant_violation(format_args!(
            "{} declares {} arguments, frame has {arg_count}",
            bc.display_name(),
            bc.arg_count
        ));
    }
    // SAFETY: forwarded contract.
    unsafe { ctx.frames().init(frame, func, args, arg_count) }
}

/// Attach the locals buffer of `frame`. For a bytecode function `count`
/// must match its declared variable count.
///
/// # Safety
///
/// See [`FrameChain::attach_locals`](heron_vm_core::FrameChain::attach_locals).
pub unsafe fn stack_frame_attach_locals<R: Runtime>(
    ctx: &VmContext<R>,
    frame: *mut StackFrame,
    locals: *mut Value,
    count: usize,
) {
    // SAFETY: forwarded contract.
    let func = match unsafe { frame.as_ref() } {
        Some(sf) => sf.function(),
        None => invariant_violation(format_args!("attach_locals on a null frame")),
    };
    if let Some(bc) = frame_bytecode(ctx, func)
        && count != usize::from(bc.var_count)
    {
        invariant_violation(format_args!(
            "{} declares {} locals, got {count}",
            bc.display_name(),
            bc.var_count
        ));
    }
    // SAFETY: forwarded contract.
    unsafe { ctx.frames().attach_locals(frame, locals, count) }
}

/// Record that `frame` is at byte offset `pc` of its function.
///
/// # Safety
///
/// `frame` must be a live frame of `ctx`.
pub unsafe fn stack_frame_set_pc<R: Runtime>(ctx: &VmContext<R>, frame: *mut StackFrame, pc: u32) {
    // SAFETY: forwarded contract.
    let func = match unsafe { frame.as_ref() } {
        Some(sf) => sf.function(),
        None => invariant_violation(format_args!("set_pc on a null frame")),
    };
    let bc = get_function_bytecode(ctx.runtime(), func);
    // SAFETY: forwarded contract.
    unsafe { ctx.frames().set_pc(frame, bc, pc) }
}

/// Unlink `frame`. Must run on every path out of the activation.
///
/// # Safety
///
/// See [`FrameChain::exit`](heron_vm_core::FrameChain::exit).
pub unsafe fn stack_frame_exit<R: Runtime>(ctx: &VmContext<R>, frame: *mut StackFrame) {
    // SAFETY: forwarded contract.
    unsafe { ctx.frames().exit(frame) }
}

/// Stack trace of the context's live frames, innermost first.
pub fn backtrace<R: Runtime>(ctx: &VmContext<R>) -> Vec<BacktraceEntry> {
    ctx.frames().backtrace(ctx.runtime())
}
