//! Runtime helper ABI for generated code.
//!
//! Generated code cannot call generic Rust functions, so every operator and
//! frame operation is exported as an `extern "C"` helper and linked into the
//! JIT module by symbol name.
//!
//! # ABI
//!
//! Every helper takes the context pointer (a `*mut VmContext<R>` cast to
//! `i64`) first, followed by i64 operands, and returns one i64:
//! - operators return the result Value's bits, the error sentinel included
//!   ([`EXCEPTION_BITS`])
//! - `ToBool` returns 0 or 1
//! - frame transitions return 0
//!
//! A helper that hits an invariant violation panics, which aborts the
//! process at the `extern "C"` boundary.

use cranelift_codegen::ir::{self, AbiParam, InstBuilder, types};
use cranelift_codegen::isa::CallConv;
use cranelift_frontend::FunctionBuilder;
use cranelift_jit::JITBuilder;
use cranelift_module::{FuncId, Linkage, Module};
use heron_vm_core::{Runtime, StackFrame, Value, VmContext, invariant_violation};

use crate::JitError;
use crate::{bridge, ops};

/// Bits of the error sentinel, as helpers return it.
pub const EXCEPTION_BITS: i64 = Value::EXCEPTION.bits() as i64;

/// Identifies a runtime helper function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HelperKind {
    /// `(ctx, lhs, rhs) -> value`: `+`
    Add = 0,
    /// `(ctx, lhs, rhs) -> value`: `-`
    Sub,
    /// `(ctx, lhs, rhs) -> value`: `*`
    Mul,
    /// `(ctx, lhs, rhs) -> value`: `/`
    Div,
    /// `(ctx, lhs, rhs) -> value`: `%`
    Mod,
    /// `(ctx, lhs, rhs) -> value`: `**`
    Pow,
    /// `(ctx, lhs, rhs) -> value`: `&`
    BitAnd,
    /// `(ctx, lhs, rhs) -> value`: `|`
    BitOr,
    /// `(ctx, lhs, rhs) -> value`: `^`
    BitXor,
    /// `(ctx, lhs, rhs) -> value`: `<<`
    Shl,
    /// `(ctx, lhs, rhs) -> value`: `>>`
    Sar,
    /// `(ctx, lhs, rhs) -> value`: `>>>`
    Shr,
    /// `(ctx, lhs, rhs) -> value`: `<`
    Lt,
    /// `(ctx, lhs, rhs) -> value`: `<=`
    Le,
    /// `(ctx, lhs, rhs) -> value`: `>`
    Gt,
    /// `(ctx, lhs, rhs) -> value`: `>=`
    Ge,
    /// `(ctx, lhs, rhs) -> value`: `==`
    Eq,
    /// `(ctx, lhs, rhs) -> value`: `!=`
    Ne,
    /// `(ctx, lhs, rhs) -> value`: `===`
    StrictEq,
    /// `(ctx, lhs, rhs) -> value`: `!==`
    StrictNe,
    /// `(ctx, lhs, rhs) -> value`: `instanceof`
    InstanceOf,
    /// `(ctx, lhs, rhs) -> value`: `in`
    In,
    /// `(ctx, val) -> value`: unary `-`
    Neg,
    /// `(ctx, val) -> value`: unary `+`
    Plus,
    /// `(ctx, val) -> value`: `~`
    BitNot,
    /// `(ctx, val) -> value`: `++`
    Inc,
    /// `(ctx, val) -> value`: `--`
    Dec,
    /// `(ctx, val) -> value`: `!`
    LNot,
    /// `(ctx, val) -> 0 | 1`: truthiness, consumes `val`
    ToBool,
    /// `(ctx, val) -> value`: `typeof`, consumes `val`
    TypeOf,
    /// `(ctx, frame, func, argc, argv) -> 0`
    FrameInit,
    /// `(ctx, frame, locals, count) -> 0`
    FrameAttachLocals,
    /// `(ctx, frame, pc) -> 0`
    FrameSetPc,
    /// `(ctx, frame) -> 0`
    FrameExit,
    /// `(ctx, func, idx) -> value`: constant pool entry, not duplicated
    FunctionCpool,
    /// `(ctx, func, idx) -> value`: closure variable, duplicated
    FunctionVarRef,
}

/// Total number of helper kinds.
pub const HELPER_COUNT: usize = 36;

impl HelperKind {
    /// Every helper, in discriminant order.
    pub const ALL: [HelperKind; HELPER_COUNT] = [
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Mod,
        Self::Pow,
        Self::BitAnd,
        Self::BitOr,
        Self::BitXor,
        Self::Shl,
        Self::Sar,
        Self::Shr,
        Self::Lt,
        Self::Le,
        Self::Gt,
        Self::Ge,
        Self::Eq,
        Self::Ne,
        Self::StrictEq,
        Self::StrictNe,
        Self::InstanceOf,
        Self::In,
        Self::Neg,
        Self::Plus,
        Self::BitNot,
        Self::Inc,
        Self::Dec,
        Self::LNot,
        Self::ToBool,
        Self::TypeOf,
        Self::FrameInit,
        Self::FrameAttachLocals,
        Self::FrameSetPc,
        Self::FrameExit,
        Self::FunctionCpool,
        Self::FunctionVarRef,
    ];

    /// Symbol name used for Cranelift import resolution.
    pub fn symbol_name(self) -> &'static str {
        match self {
            Self::Add => "heron_rt_add",
            Self::Sub => "heron_rt_sub",
            Self::Mul => "heron_rt_mul",
            Self::Div => "heron_rt_div",
            Self::Mod => "heron_rt_mod",
            Self::Pow => "heron_rt_pow",
            Self::BitAnd => "heron_rt_bit_and",
            Self::BitOr => "heron_rt_bit_or",
            Self::BitXor => "heron_rt_bit_xor",
            Self::Shl => "heron_rt_shl",
            Self::Sar => "heron_rt_sar",
            Self::Shr => "heron_rt_shr",
            Self::Lt => "heron_rt_lt",
            Self::Le => "heron_rt_le",
            Self::Gt => "heron_rt_gt",
            Self::Ge => "heron_rt_ge",
            Self::Eq => "heron_rt_eq",
            Self::Ne => "heron_rt_ne",
            Self::StrictEq => "heron_rt_strict_eq",
            Self::StrictNe => "heron_rt_strict_ne",
            Self::InstanceOf => "heron_rt_instanceof",
            Self::In => "heron_rt_in",
            Self::Neg => "heron_rt_neg",
            Self::Plus => "heron_rt_plus",
            Self::BitNot => "heron_rt_bit_not",
            Self::Inc => "heron_rt_inc",
            Self::Dec => "heron_rt_dec",
            Self::LNot => "heron_rt_lnot",
            Self::ToBool => "heron_rt_to_bool",
            Self::TypeOf => "heron_rt_typeof",
            Self::FrameInit => "heron_rt_frame_init",
            Self::FrameAttachLocals => "heron_rt_frame_attach_locals",
            Self::FrameSetPc => "heron_rt_frame_set_pc",
            Self::FrameExit => "heron_rt_frame_exit",
            Self::FunctionCpool => "heron_rt_function_cpool",
            Self::FunctionVarRef => "heron_rt_function_var_ref",
        }
    }

    /// Number of parameters (INCLUDING the ctx pointer).
    pub fn param_count(self) -> usize {
        match self {
            Self::Neg
            | Self::Plus
            | Self::BitNot
            | Self::Inc
            | Self::Dec
            | Self::LNot
            | Self::ToBool
            | Self::TypeOf
            | Self::FrameExit => 2,
            Self::FrameSetPc | Self::FunctionCpool | Self::FunctionVarRef => 3,
            Self::FrameAttachLocals => 4,
            Self::FrameInit => 5,
            _ => 3,
        }
    }

    /// Number of return values (always 1, an i64).
    pub fn return_count(self) -> usize {
        1
    }

    /// Build the Cranelift IR signature for this helper.
    pub fn make_signature(self, call_conv: CallConv) -> ir::Signature {
        let mut sig = ir::Signature::new(call_conv);
        for _ in 0..self.param_count() {
            sig.params.push(AbiParam::new(types::I64));
        }
        for _ in 0..self.return_count() {
            sig.returns.push(AbiParam::new(types::I64));
        }
        sig
    }
}

// ---------------------------------------------------------------------------
// RuntimeHelpers: function pointer table
// ---------------------------------------------------------------------------

/// Table of runtime helper function pointers.
///
/// A `None` slot means generated code cannot call that helper; asking for
/// it while compiling fails with [`JitError::MissingHelper`].
#[derive(Clone)]
pub struct RuntimeHelpers {
    ptrs: [Option<*const u8>; HELPER_COUNT],
}

// SAFETY: function pointers are `Send + Sync` by nature.
unsafe impl Send for RuntimeHelpers {}
unsafe impl Sync for RuntimeHelpers {}

impl Default for RuntimeHelpers {
    fn default() -> Self {
        Self {
            ptrs: [None; HELPER_COUNT],
        }
    }
}

impl RuntimeHelpers {
    /// Create an empty helper table (all helpers unset).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a helper function pointer.
    ///
    /// # Safety
    ///
    /// The function pointer must have the `extern "C"` signature described
    /// by `kind`.
    pub unsafe fn set(&mut self, kind: HelperKind, ptr: *const u8) {
        self.ptrs[kind as usize] = Some(ptr);
    }

    /// Get a helper function pointer.
    pub fn get(&self, kind: HelperKind) -> Option<*const u8> {
        self.ptrs[kind as usize]
    }

    /// Is every helper set?
    pub fn is_complete(&self) -> bool {
        self.ptrs.iter().all(Option::is_some)
    }

    /// Set helpers with their pointers.
    pub fn iter(&self) -> impl Iterator<Item = (HelperKind, *const u8)> + '_ {
        HelperKind::ALL
            .iter()
            .filter_map(|&kind| self.get(kind).map(|ptr| (kind, ptr)))
    }

    /// Register all set helpers as symbols on the JIT builder.
    pub fn register_symbols(&self, builder: &mut JITBuilder) {
        for (kind, ptr) in self.iter() {
            builder.symbol(kind.symbol_name(), ptr);
        }
    }
}

// ---------------------------------------------------------------------------
// HelperFuncIds: module-level imports
// ---------------------------------------------------------------------------

/// Module-level function IDs for declared helper imports.
/// Created once per [`crate::JitCompiler`].
pub(crate) struct HelperFuncIds {
    ids: [Option<FuncId>; HELPER_COUNT],
}

impl HelperFuncIds {
    /// Declare all available helpers as imported functions on the module.
    pub fn declare<M: Module>(helpers: &RuntimeHelpers, module: &mut M) -> Result<Self, JitError> {
        let call_conv = module.isa().default_call_conv();
        let mut ids = [None; HELPER_COUNT];
        for (kind, _) in helpers.iter() {
            let sig = kind.make_signature(call_conv);
            let func_id = module.declare_function(kind.symbol_name(), Linkage::Import, &sig)?;
            ids[kind as usize] = Some(func_id);
        }
        Ok(Self { ids })
    }
}

// ---------------------------------------------------------------------------
// HelperRefs: per-function references
// ---------------------------------------------------------------------------

/// Helpers callable from the function being compiled.
pub struct HelperRefs {
    refs: [Option<ir::FuncRef>; HELPER_COUNT],
}

impl HelperRefs {
    /// Declare all available helpers into a function's IR.
    pub(crate) fn declare<M: Module>(
        func_ids: &HelperFuncIds,
        module: &mut M,
        func: &mut ir::Function,
    ) -> Self {
        let mut refs = [None; HELPER_COUNT];
        for (slot, id) in refs.iter_mut().zip(func_ids.ids.iter()) {
            if let Some(func_id) = id {
                *slot = Some(module.declare_func_in_func(*func_id, func));
            }
        }
        Self { refs }
    }

    /// Get the FuncRef for a helper kind (None if not available).
    pub fn get(&self, kind: HelperKind) -> Option<ir::FuncRef> {
        self.refs[kind as usize]
    }

    /// Get the FuncRef, or fail with [`JitError::MissingHelper`].
    pub fn require(&self, kind: HelperKind) -> Result<ir::FuncRef, JitError> {
        self.get(kind).ok_or(JitError::MissingHelper {
            helper: kind.symbol_name(),
        })
    }

    /// Emit a call to `kind` and return its result.
    ///
    /// `args` includes the context pointer.
    pub fn call(
        &self,
        builder: &mut FunctionBuilder<'_>,
        kind: HelperKind,
        args: &[ir::Value],
    ) -> Result<ir::Value, JitError> {
        if args.len() != kind.param_count() {
            return Err(JitError::ArityMismatch {
                helper: kind.symbol_name(),
                expected: kind.param_count(),
                got: args.len(),
            });
        }
        let func_ref = self.require(kind)?;
        let inst = builder.ins().call(func_ref, args);
        Ok(builder.inst_results(inst)[0])
    }
}

// ---------------------------------------------------------------------------
// Helper implementations
// ---------------------------------------------------------------------------

/// # Safety
///
/// `ctx_raw` must be the `*mut VmContext<R>` generated code was entered with.
#[inline(always)]
unsafe fn context<'a, R: Runtime>(ctx_raw: i64) -> &'a mut VmContext<R> {
    // SAFETY: per this function's contract.
    unsafe { &mut *(ctx_raw as *mut VmContext<R>) }
}

#[inline(always)]
fn value(raw: i64) -> Value {
    Value::from_bits(raw as u64)
}

#[inline(always)]
fn bits(v: Value) -> i64 {
    v.bits() as i64
}

#[track_caller]
fn length(raw: i64, what: &str) -> usize {
    match usize::try_from(raw) {
        Ok(n) => n,
        Err(_) => invariant_violation(format_args!("{what} {raw} is negative")),
    }
}

#[track_caller]
fn pc_offset(raw: i64) -> u32 {
    match u32::try_from(raw) {
        Ok(pc) => pc,
        Err(_) => invariant_violation(format_args!("pc {raw} is not a bytecode offset")),
    }
}

macro_rules! binary_helpers {
    ($($name:ident => $op:path),* $(,)?) => {$(
        /// Signature: `(ctx: i64, lhs: i64, rhs: i64) -> i64`
        #[allow(unsafe_code)]
        extern "C" fn $name<R: Runtime>(ctx_raw: i64, lhs: i64, rhs: i64) -> i64 {
            // SAFETY: generated code passes the context it was entered with.
            let ctx = unsafe { context::<R>(ctx_raw) };
            bits($op(ctx, value(lhs), value(rhs)))
        }
    )*};
}

macro_rules! unary_helpers {
    ($($name:ident => $op:path),* $(,)?) => {$(
        /// Signature: `(ctx: i64, val: i64) -> i64`
        #[allow(unsafe_code)]
        extern "C" fn $name<R: Runtime>(ctx_raw: i64, val: i64) -> i64 {
            // SAFETY: generated code passes the context it was entered with.
            let ctx = unsafe { context::<R>(ctx_raw) };
            bits($op(ctx, value(val)))
        }
    )*};
}

binary_helpers! {
    heron_rt_add => ops::add,
    heron_rt_sub => ops::sub,
    heron_rt_mul => ops::mul,
    heron_rt_div => ops::div,
    heron_rt_mod => ops::rem,
    heron_rt_pow => ops::pow,
    heron_rt_bit_and => ops::bit_and,
    heron_rt_bit_or => ops::bit_or,
    heron_rt_bit_xor => ops::bit_xor,
    heron_rt_shl => ops::shl,
    heron_rt_sar => ops::sar,
    heron_rt_shr => ops::shr,
    heron_rt_lt => ops::lt,
    heron_rt_le => ops::le,
    heron_rt_gt => ops::gt,
    heron_rt_ge => ops::ge,
    heron_rt_eq => ops::eq,
    heron_rt_ne => ops::ne,
    heron_rt_strict_eq => ops::strict_eq,
    heron_rt_strict_ne => ops::strict_ne,
    heron_rt_instanceof => ops::instance_of,
    heron_rt_in => ops::in_op,
}

unary_helpers! {
    heron_rt_neg => ops::neg,
    heron_rt_plus => ops::plus,
    heron_rt_bit_not => ops::bit_not,
    heron_rt_inc => ops::inc,
    heron_rt_dec => ops::dec,
    heron_rt_lnot => ops::lnot,
    heron_rt_typeof => ops::type_of,
}

/// Signature: `(ctx: i64, val: i64) -> i64`, returns 0 or 1
#[allow(unsafe_code)]
extern "C" fn heron_rt_to_bool<R: Runtime>(ctx_raw: i64, val: i64) -> i64 {
    // SAFETY: generated code passes the context it was entered with.
    let ctx = unsafe { context::<R>(ctx_raw) };
    i64::from(ops::to_bool(ctx, value(val)))
}

/// Signature: `(ctx: i64, frame: i64, func: i64, argc: i64, argv: i64) -> i64`
#[allow(unsafe_code)]
extern "C" fn heron_rt_frame_init<R: Runtime>(
    ctx_raw: i64,
    frame: i64,
    func: i64,
    argc: i64,
    argv: i64,
) -> i64 {
    let argc = length(argc, "argument count");
    // SAFETY: generated code passes the context it was entered with, a
    // frame slot in its own stack frame and its argument buffer.
    unsafe {
        let ctx = context::<R>(ctx_raw);
        bridge::stack_frame_init(
            ctx,
            frame as *mut StackFrame,
            value(func),
            argv as *mut Value,
            argc,
        );
    }
    0
}

/// Signature: `(ctx: i64, frame: i64, locals: i64, count: i64) -> i64`
#[allow(unsafe_code)]
extern "C" fn heron_rt_frame_attach_locals<R: Runtime>(
    ctx_raw: i64,
    frame: i64,
    locals: i64,
    count: i64,
) -> i64 {
    let count = length(count, "local count");
    // SAFETY: as in `heron_rt_frame_init`.
    unsafe {
        let ctx = context::<R>(ctx_raw);
        bridge::stack_frame_attach_locals(
            ctx,
            frame as *mut StackFrame,
            locals as *mut Value,
            count,
        );
    }
    0
}

/// Signature: `(ctx: i64, frame: i64, pc: i64) -> i64`
#[allow(unsafe_code)]
extern "C" fn heron_rt_frame_set_pc<R: Runtime>(ctx_raw: i64, frame: i64, pc: i64) -> i64 {
    let pc = pc_offset(pc);
    // SAFETY: as in `heron_rt_frame_init`.
    unsafe {
        let ctx = context::<R>(ctx_raw);
        bridge::stack_frame_set_pc(ctx, frame as *mut StackFrame, pc);
    }
    0
}

/// Signature: `(ctx: i64, frame: i64) -> i64`
#[allow(unsafe_code)]
extern "C" fn heron_rt_frame_exit<R: Runtime>(ctx_raw: i64, frame: i64) -> i64 {
    // SAFETY: as in `heron_rt_frame_init`.
    unsafe {
        let ctx = context::<R>(ctx_raw);
        bridge::stack_frame_exit(ctx, frame as *mut StackFrame);
    }
    0
}

/// Signature: `(ctx: i64, func: i64, idx: i64) -> i64`
#[allow(unsafe_code)]
extern "C" fn heron_rt_function_cpool<R: Runtime>(ctx_raw: i64, func: i64, idx: i64) -> i64 {
    // SAFETY: generated code passes the context it was entered with.
    let ctx = unsafe { context::<R>(ctx_raw) };
    bits(bridge::function_cpool(ctx, value(func), length(idx, "constant index")))
}

/// Signature: `(ctx: i64, func: i64, idx: i64) -> i64`
#[allow(unsafe_code)]
extern "C" fn heron_rt_function_var_ref<R: Runtime>(ctx_raw: i64, func: i64, idx: i64) -> i64 {
    // SAFETY: generated code passes the context it was entered with.
    let ctx = unsafe { context::<R>(ctx_raw) };
    bits(bridge::get_function_var_ref(
        ctx,
        value(func),
        length(idx, "closure variable index"),
    ))
}

/// Build the helper table for interpreter type `R`.
pub fn build_runtime_helpers<R: Runtime>() -> RuntimeHelpers {
    let mut helpers = RuntimeHelpers::new();
    // SAFETY: Function signatures match HelperKind conventions.
    unsafe {
        helpers.set(HelperKind::Add, heron_rt_add::<R> as *const u8);
        helpers.set(HelperKind::Sub, heron_rt_sub::<R> as *const u8);
        helpers.set(HelperKind::Mul, heron_rt_mul::<R> as *const u8);
        helpers.set(HelperKind::Div, heron_rt_div::<R> as *const u8);
        helpers.set(HelperKind::Mod, heron_rt_mod::<R> as *const u8);
        helpers.set(HelperKind::Pow, heron_rt_pow::<R> as *const u8);
        helpers.set(HelperKind::BitAnd, heron_rt_bit_and::<R> as *const u8);
        helpers.set(HelperKind::BitOr, heron_rt_bit_or::<R> as *const u8);
        helpers.set(HelperKind::BitXor, heron_rt_bit_xor::<R> as *const u8);
        helpers.set(HelperKind::Shl, heron_rt_shl::<R> as *const u8);
        helpers.set(HelperKind::Sar, heron_rt_sar::<R> as *const u8);
        helpers.set(HelperKind::Shr, heron_rt_shr::<R> as *const u8);
        helpers.set(HelperKind::Lt, heron_rt_lt::<R> as *const u8);
        helpers.set(HelperKind::Le, heron_rt_le::<R> as *const u8);
        helpers.set(HelperKind::Gt, heron_rt_gt::<R> as *const u8);
        helpers.set(HelperKind::Ge, heron_rt_ge::<R> as *const u8);
        helpers.set(HelperKind::Eq, heron_rt_eq::<R> as *const u8);
        helpers.set(HelperKind::Ne, heron_rt_ne::<R> as *const u8);
        helpers.set(HelperKind::StrictEq, heron_rt_strict_eq::<R> as *const u8);
        helpers.set(HelperKind::StrictNe, heron_rt_strict_ne::<R> as *const u8);
        helpers.set(HelperKind::InstanceOf, heron_rt_instanceof::<R> as *const u8);
        helpers.set(HelperKind::In, heron_rt_in::<R> as *const u8);
        helpers.set(HelperKind::Neg, heron_rt_neg::<R> as *const u8);
        helpers.set(HelperKind::Plus, heron_rt_plus::<R> as *const u8);
        helpers.set(HelperKind::BitNot, heron_rt_bit_not::<R> as *const u8);
        helpers.set(HelperKind::Inc, heron_rt_inc::<R> as *const u8);
        helpers.set(HelperKind::Dec, heron_rt_dec::<R> as *const u8);
        helpers.set(HelperKind::LNot, heron_rt_lnot::<R> as *const u8);
        helpers.set(HelperKind::ToBool, heron_rt_to_bool::<R> as *const u8);
        helpers.set(HelperKind::TypeOf, heron_rt_typeof::<R> as *const u8);
        helpers.set(HelperKind::FrameInit, heron_rt_frame_init::<R> as *const u8);
        helpers.set(
            HelperKind::FrameAttachLocals,
            heron_rt_frame_attach_locals::<R> as *const u8,
        );
        helpers.set(HelperKind::FrameSetPc, heron_rt_frame_set_pc::<R> as *const u8);
        helpers.set(HelperKind::FrameExit, heron_rt_frame_exit::<R> as *const u8);
        helpers.set(
            HelperKind::FunctionCpool,
            heron_rt_function_cpool::<R> as *const u8,
        );
        helpers.set(
            HelperKind::FunctionVarRef,
            heron_rt_function_var_ref::<R> as *const u8,
        );
    }
    helpers
}
