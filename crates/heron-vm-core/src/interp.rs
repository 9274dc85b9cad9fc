//! The interpreter contract.
//!
//! The JIT bridge never reimplements language semantics. Anything beyond the
//! inline fast paths is delegated to the interpreter through these traits:
//! [`SlowPath`] for the generic operator implementations and [`ObjectModel`]
//! for the few object-model facts the frame bridge needs.

use crate::bytecode::FunctionBytecode;
use crate::context::VmContext;
use crate::error::VmResult;
use crate::operands::{BinaryOperands, UnaryOperands};
use crate::value::{HeapPtr, Value};
use crate::var_ref::VarRef;

/// Arithmetic operators sharing the generic arithmetic slow path.
///
/// `+` is not here: it has its own slow path because of string
/// concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

/// Bitwise operators sharing the generic logic slow path.
///
/// `>>>` is not here: it has its own slow path because its result is
/// unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<`
    Shl,
    /// `>>`
    Sar,
}

/// Unary operators sharing the generic unary slow path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Plus,
    /// `~x`
    BitNot,
    /// `x + 1` for `++`
    Inc,
    /// `x - 1` for `--`
    Dec,
}

/// Relational operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Result categories of `typeof`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeOfKind {
    /// `"undefined"`
    Undefined,
    /// `"object"` (including `null`)
    Object,
    /// `"boolean"`
    Boolean,
    /// `"number"`
    Number,
    /// `"string"`
    String,
    /// `"symbol"`
    Symbol,
    /// `"bigint"`
    BigInt,
    /// `"function"`
    Function,
}

impl TypeOfKind {
    /// The category name `typeof` evaluates to.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Object => "object",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::BigInt => "bigint",
            Self::Function => "function",
        }
    }
}

/// Generic operator implementations owned by the interpreter.
///
/// Every binary entry point reads `[lhs, rhs]` from its [`BinaryOperands`]
/// and every unary one reads `[operand]` from its [`UnaryOperands`]. On
/// success the result is written to slot 0 with
/// [`set_result`](crate::operands::Operands::set_result); on failure the
/// error is returned and slot 0 is left unspecified.
///
/// Operands are handed over: the slow path takes ownership of any
/// reference they hold, as the interpreter's own evaluation stack would.
///
/// Operator entries may run user code (`valueOf`, getters, `Symbol.hasInstance`),
/// so they get the whole context rather than the interpreter alone. Through it
/// they can walk the frame chain, link frames for nested calls, and re-enter
/// compiled code or the operator fast paths. Compiled code reached from here
/// must be given a context pointer derived from `cx`.
pub trait SlowPath: Sized {
    /// `lhs + rhs` with full coercion (string concatenation included).
    fn add_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()>;

    /// `-`, `*`, `/`, `%`, `**` with full coercion.
    fn binary_arith_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        op: ArithOp,
    ) -> VmResult<()>;

    /// `&`, `|`, `^`, `<<`, `>>` with full coercion.
    fn binary_logic_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        op: LogicOp,
    ) -> VmResult<()>;

    /// `>>>` with full coercion.
    fn shr_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()>;

    /// Unary `-`, `+`, `~`, increment and decrement with full coercion.
    fn unary_arith_slow(
        cx: &mut VmContext<Self>,
        ops: &mut UnaryOperands,
        op: UnaryOp,
    ) -> VmResult<()>;

    /// `<`, `<=`, `>`, `>=` including NaN ordering and string comparison.
    fn relational_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        op: RelOp,
    ) -> VmResult<()>;

    /// Abstract equality; `negate` selects `!=`.
    fn eq_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands, negate: bool) -> VmResult<()>;

    /// Strict equality; `negate` selects `!==`.
    fn strict_eq_slow(
        cx: &mut VmContext<Self>,
        ops: &mut BinaryOperands,
        negate: bool,
    ) -> VmResult<()>;

    /// `lhs instanceof rhs`
    fn instanceof_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()>;

    /// `lhs in rhs`
    fn in_slow(cx: &mut VmContext<Self>, ops: &mut BinaryOperands) -> VmResult<()>;

    /// Truthiness coercion. Consumes (frees) `value`. Never runs user code.
    fn to_bool_free(&mut self, value: Value) -> bool;

    /// `typeof` category of `value`. Does not free it.
    fn typeof_kind(&mut self, value: Value) -> TypeOfKind;

    /// Interned string value for a `typeof` category.
    fn atom_to_string(&mut self, kind: TypeOfKind) -> Value;

    /// Release one reference held by `value`. No-op for immediates.
    fn free_value(&mut self, value: Value);
}

/// Object-model facts the frame bridge consumes.
pub trait ObjectModel {
    /// Bytecode of a function object, or `None` when the object is not a
    /// bytecode function.
    fn function_bytecode(&self, func: HeapPtr) -> Option<&FunctionBytecode>;

    /// Closure variable references of a function object.
    fn closure_var_refs(&self, func: HeapPtr) -> Option<&[VarRef]>;

    /// Take a new reference to `value`. Identity for immediates.
    fn dup_value(&mut self, value: Value) -> Value;
}

/// Everything the JIT bridge needs from an interpreter instance.
pub trait Runtime: SlowPath + ObjectModel {}

impl<T: SlowPath + ObjectModel> Runtime for T {}
