//! Tagged values with NaN-boxing
//!
//! Every value is a `{tag, payload}` pair packed into 64 bits. Doubles are
//! stored as-is; everything else lives in the quiet-NaN space with the box
//! tag in the upper 16 bits and the payload in the lower 48.
//!
//! ## Encoding Scheme
//!
//! ```text
//! Float64:          any non-NaN double, stored directly
//! NaN:              0x7FF8_0000_0000_0000 (canonical, every NaN folds here)
//! Int:              0x7FF9_0000_XXXX_XXXX (32-bit signed in the low bits)
//! Bool:             0x7FFA_0000_0000_000X
//! Null:             0x7FFB_0000_0000_0000
//! Undefined:        0x7FFC_0000_0000_0000
//! Uninitialized:    0x7FFD_0000_0000_0000
//! CatchOffset:      0x7FFE_0000_XXXX_XXXX
//! Exception:        0x7FFF_0000_0000_0000
//! Object:           0xFFF9_PPPP_PPPP_PPPP (48-bit pointer)
//! FunctionBytecode: 0xFFFA_PPPP_PPPP_PPPP
//! String:           0xFFFB_PPPP_PPPP_PPPP
//! Symbol:           0xFFFC_PPPP_PPPP_PPPP
//! BigInt:           0xFFFD_PPPP_PPPP_PPPP
//! ```
//!
//! The small tags (`Int`, `Bool`, `Null`, `Undefined`) keep their truth value
//! in the low 32 payload bits, which is what the truthiness fast path reads.

use std::fmt;
use std::ptr::NonNull;

use crate::error::invariant_violation;

const BOX_SHIFT: u32 = 48;
const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;
const LOW32_MASK: u64 = 0x0000_0000_FFFF_FFFF;

const BOX_INT: u64 = 0x7FF9;
const BOX_BOOL: u64 = 0x7FFA;
const BOX_NULL: u64 = 0x7FFB;
const BOX_UNDEFINED: u64 = 0x7FFC;
const BOX_UNINITIALIZED: u64 = 0x7FFD;
const BOX_CATCH_OFFSET: u64 = 0x7FFE;
const BOX_EXCEPTION: u64 = 0x7FFF;
const BOX_OBJECT: u64 = 0xFFF9;
const BOX_FUNCTION_BYTECODE: u64 = 0xFFFA;
const BOX_STRING: u64 = 0xFFFB;
const BOX_SYMBOL: u64 = 0xFFFC;
const BOX_BIG_INT: u64 = 0xFFFD;

/// Canonical NaN bit pattern.
pub const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;

/// Value tags, numbered as the interpreter numbers them.
///
/// Negative tags carry a heap pointer. Tags `Int..=Undefined` are the
/// "small" tags whose payload doubles as a truth value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Tag {
    /// Arbitrary precision integer (heap)
    BigInt = -10,
    /// Symbol (heap)
    Symbol = -8,
    /// String (heap)
    String = -7,
    /// Raw function bytecode record (heap)
    FunctionBytecode = -2,
    /// Object, including function objects (heap)
    Object = -1,
    /// 32-bit signed integer
    Int = 0,
    /// Boolean
    Bool = 1,
    /// `null`
    Null = 2,
    /// `undefined`
    Undefined = 3,
    /// Uninitialized lexical binding (TDZ marker)
    Uninitialized = 4,
    /// Exception handler offset pushed by `try`
    CatchOffset = 5,
    /// Error sentinel: an exception is pending
    Exception = 6,
    /// IEEE-754 double
    Float64 = 7,
}

impl Tag {
    /// Decode an interpreter tag number.
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            -10 => Self::BigInt,
            -8 => Self::Symbol,
            -7 => Self::String,
            -2 => Self::FunctionBytecode,
            -1 => Self::Object,
            0 => Self::Int,
            1 => Self::Bool,
            2 => Self::Null,
            3 => Self::Undefined,
            4 => Self::Uninitialized,
            5 => Self::CatchOffset,
            6 => Self::Exception,
            7 => Self::Float64,
            _ => return None,
        })
    }

    /// Interpreter tag number.
    #[inline]
    pub const fn raw(self) -> i32 {
        self as i32
    }

    /// Does this tag carry a heap pointer?
    #[inline]
    pub const fn is_heap(self) -> bool {
        (self as i32) < 0
    }

    /// `Int`, `Bool`, `Null` or `Undefined`: the payload is a native truth value.
    #[inline]
    pub const fn is_small(self) -> bool {
        (self as i32 as u32) <= Tag::Undefined as u32
    }

    fn box_bits(self) -> u64 {
        match self {
            Self::BigInt => BOX_BIG_INT,
            Self::Symbol => BOX_SYMBOL,
            Self::String => BOX_STRING,
            Self::FunctionBytecode => BOX_FUNCTION_BYTECODE,
            Self::Object => BOX_OBJECT,
            Self::Int => BOX_INT,
            Self::Bool => BOX_BOOL,
            Self::Null => BOX_NULL,
            Self::Undefined => BOX_UNDEFINED,
            Self::Uninitialized => BOX_UNINITIALIZED,
            Self::CatchOffset => BOX_CATCH_OFFSET,
            Self::Exception => BOX_EXCEPTION,
            Self::Float64 => invariant_violation(format_args!(
                "Float64 has no box tag; build doubles with Value::float64"
            )),
        }
    }
}

/// Opaque pointer to an interpreter-owned heap cell.
///
/// This layer never dereferences or frees it; it only forwards it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct HeapPtr(NonNull<u8>);

impl HeapPtr {
    /// Wrap a raw pointer. Returns `None` for null.
    ///
    /// The address must fit in 48 bits, which holds for user-space
    /// pointers on every target the JIT supports.
    pub fn new<T>(ptr: *mut T) -> Option<Self> {
        let ptr = NonNull::new(ptr.cast::<u8>())?;
        if (ptr.as_ptr() as u64) & !PAYLOAD_MASK != 0 {
            invariant_violation(format_args!(
                "heap pointer {:p} does not fit in a 48-bit payload",
                ptr.as_ptr()
            ));
        }
        Some(Self(ptr))
    }

    /// The raw address, cast to the caller's type.
    #[inline]
    pub fn as_ptr<T>(self) -> *mut T {
        self.0.as_ptr().cast()
    }

    #[inline]
    fn addr(self) -> u64 {
        self.0.as_ptr() as u64
    }
}

impl fmt::Debug for HeapPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.0.as_ptr())
    }
}

/// Decoded view of a [`Value`]. Match on this before touching a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueKind {
    /// 32-bit integer
    Int(i32),
    /// Boolean
    Bool(bool),
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// TDZ marker
    Uninitialized,
    /// Catch handler offset
    CatchOffset(i32),
    /// Error sentinel
    Exception,
    /// Double
    Float64(f64),
    /// Heap reference with its tag
    Heap(Tag, HeapPtr),
}

/// A NaN-boxed tagged value.
///
/// Values are plain bits: copying one never touches a reference count.
/// `PartialEq` compares bits (identity), not language equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

impl Value {
    /// `undefined`
    pub const UNDEFINED: Value = Value(BOX_UNDEFINED << BOX_SHIFT);
    /// `null`
    pub const NULL: Value = Value(BOX_NULL << BOX_SHIFT);
    /// `true`
    pub const TRUE: Value = Value((BOX_BOOL << BOX_SHIFT) | 1);
    /// `false`
    pub const FALSE: Value = Value(BOX_BOOL << BOX_SHIFT);
    /// The error sentinel returned by every operator routine on failure.
    pub const EXCEPTION: Value = Value(BOX_EXCEPTION << BOX_SHIFT);
    /// TDZ marker
    pub const UNINITIALIZED: Value = Value(BOX_UNINITIALIZED << BOX_SHIFT);
    /// Canonical NaN
    pub const NAN: Value = Value(CANONICAL_NAN);

    /// `undefined`
    #[inline]
    pub const fn undefined() -> Self {
        Self::UNDEFINED
    }

    /// `null`
    #[inline]
    pub const fn null() -> Self {
        Self::NULL
    }

    /// The error sentinel.
    #[inline]
    pub const fn exception() -> Self {
        Self::EXCEPTION
    }

    /// Boolean value
    #[inline]
    pub const fn bool(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    /// 32-bit integer value
    #[inline]
    pub const fn int(n: i32) -> Self {
        Self((BOX_INT << BOX_SHIFT) | (n as u32 as u64))
    }

    /// Double value, kept as a double even when it is integral.
    #[inline]
    pub fn float64(d: f64) -> Self {
        if d.is_nan() {
            return Self::NAN;
        }
        Self(d.to_bits())
    }

    /// Numeric value, normalized to `Int` when the double is an integer
    /// in range (and not `-0`).
    pub fn number(d: f64) -> Self {
        if d.fract() == 0.0
            && d >= i32::MIN as f64
            && d <= i32::MAX as f64
            && (d != 0.0 || d.is_sign_positive())
        {
            return Self::int(d as i32);
        }
        Self::float64(d)
    }

    /// Catch handler offset.
    #[inline]
    pub const fn catch_offset(offset: i32) -> Self {
        Self((BOX_CATCH_OFFSET << BOX_SHIFT) | (offset as u32 as u64))
    }

    /// Heap reference with a pointer tag.
    pub fn heap(tag: Tag, ptr: HeapPtr) -> Self {
        if !tag.is_heap() {
            invariant_violation(format_args!("{tag:?} is not a pointer tag"));
        }
        Self((tag.box_bits() << BOX_SHIFT) | ptr.addr())
    }

    /// Rebuild a value from a tag and its raw payload.
    ///
    /// For `Float64` the payload is the double's bit pattern; for every
    /// other tag it is the low 48 bits of the box. A null payload under
    /// a pointer tag is an invariant violation.
    pub fn from_tag_payload(tag: Tag, payload: u64) -> Self {
        match tag {
            Tag::Float64 => Self::float64(f64::from_bits(payload)),
            Tag::Int => Self::int(payload as u32 as i32),
            Tag::Bool => Self::bool(payload & LOW32_MASK != 0),
            Tag::CatchOffset => Self::catch_offset(payload as u32 as i32),
            Tag::Null | Tag::Undefined | Tag::Uninitialized | Tag::Exception => {
                Self(tag.box_bits() << BOX_SHIFT)
            }
            _ => match HeapPtr::new((payload & PAYLOAD_MASK) as *mut u8) {
                Some(ptr) => Self::heap(tag, ptr),
                None => invariant_violation(format_args!("null payload for {tag:?}")),
            },
        }
    }

    /// Reinterpret raw bits coming from generated code.
    ///
    /// Every bit pattern decodes to some tag, so this never fails.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits for generated code.
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    const fn box_tag(self) -> u64 {
        self.0 >> BOX_SHIFT
    }

    /// The value's tag.
    #[inline]
    pub fn tag(self) -> Tag {
        match self.box_tag() {
            BOX_INT => Tag::Int,
            BOX_BOOL => Tag::Bool,
            BOX_NULL => Tag::Null,
            BOX_UNDEFINED => Tag::Undefined,
            BOX_UNINITIALIZED => Tag::Uninitialized,
            BOX_CATCH_OFFSET => Tag::CatchOffset,
            BOX_EXCEPTION => Tag::Exception,
            BOX_OBJECT => Tag::Object,
            BOX_FUNCTION_BYTECODE => Tag::FunctionBytecode,
            BOX_STRING => Tag::String,
            BOX_SYMBOL => Tag::Symbol,
            BOX_BIG_INT => Tag::BigInt,
            _ => Tag::Float64,
        }
    }

    /// Decoded view for pattern matching.
    pub fn kind(self) -> ValueKind {
        match self.tag() {
            Tag::Int => ValueKind::Int(self.0 as u32 as i32),
            Tag::Bool => ValueKind::Bool(self.0 & LOW32_MASK != 0),
            Tag::Null => ValueKind::Null,
            Tag::Undefined => ValueKind::Undefined,
            Tag::Uninitialized => ValueKind::Uninitialized,
            Tag::CatchOffset => ValueKind::CatchOffset(self.0 as u32 as i32),
            Tag::Exception => ValueKind::Exception,
            Tag::Float64 => ValueKind::Float64(f64::from_bits(self.0)),
            tag => match HeapPtr::new((self.0 & PAYLOAD_MASK) as *mut u8) {
                Some(ptr) => ValueKind::Heap(tag, ptr),
                None => invariant_violation(format_args!("null pointer under {tag:?} tag")),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Tag-checked payload access. A mismatch means generated code skipped a
    // guard, which is fatal.
    // -----------------------------------------------------------------------

    /// Integer payload. The caller must have confirmed `Tag::Int`.
    #[inline]
    #[track_caller]
    pub fn payload_as_int(self) -> i32 {
        match self.as_int() {
            Some(n) => n,
            None => self.tag_mismatch(Tag::Int),
        }
    }

    /// Boolean payload. The caller must have confirmed `Tag::Bool`.
    #[inline]
    #[track_caller]
    pub fn payload_as_bool(self) -> bool {
        match self.as_bool() {
            Some(b) => b,
            None => self.tag_mismatch(Tag::Bool),
        }
    }

    /// Double payload. The caller must have confirmed `Tag::Float64`.
    #[inline]
    #[track_caller]
    pub fn payload_as_float(self) -> f64 {
        match self.as_float() {
            Some(d) => d,
            None => self.tag_mismatch(Tag::Float64),
        }
    }

    /// Pointer payload. The caller must have confirmed a heap tag.
    #[inline]
    #[track_caller]
    pub fn payload_as_pointer(self) -> HeapPtr {
        match self.kind() {
            ValueKind::Heap(_, ptr) => ptr,
            _ => self.tag_mismatch(Tag::Object),
        }
    }

    #[cold]
    #[track_caller]
    fn tag_mismatch(self, expected: Tag) -> ! {
        invariant_violation(format_args!(
            "payload read as {expected:?} from a {:?} value",
            self.tag()
        ))
    }

    /// Integer payload if tagged `Int`.
    #[inline]
    pub fn as_int(self) -> Option<i32> {
        (self.box_tag() == BOX_INT).then_some(self.0 as u32 as i32)
    }

    /// Boolean payload if tagged `Bool`.
    #[inline]
    pub fn as_bool(self) -> Option<bool> {
        (self.box_tag() == BOX_BOOL).then_some(self.0 & LOW32_MASK != 0)
    }

    /// Double payload if tagged `Float64`.
    #[inline]
    pub fn as_float(self) -> Option<f64> {
        (self.tag() == Tag::Float64).then(|| f64::from_bits(self.0))
    }

    /// Numeric value of an `Int` or `Float64`.
    #[inline]
    pub fn as_number(self) -> Option<f64> {
        match self.kind() {
            ValueKind::Int(n) => Some(n as f64),
            ValueKind::Float64(d) => Some(d),
            _ => None,
        }
    }

    /// Heap pointer if tagged with `tag`.
    #[inline]
    pub fn as_heap(self, tag: Tag) -> Option<HeapPtr> {
        match self.kind() {
            ValueKind::Heap(t, ptr) if t == tag => Some(ptr),
            _ => None,
        }
    }

    /// Native truth value of a small tag (`Int`, `Bool`, `Null`, `Undefined`).
    #[inline]
    pub fn small_payload(self) -> Option<i32> {
        self.tag().is_small().then_some(self.0 as u32 as i32)
    }

    /// Is this the error sentinel?
    #[inline]
    pub const fn is_exception(self) -> bool {
        self.0 == Self::EXCEPTION.0
    }

    /// Does this value carry a heap pointer?
    #[inline]
    pub fn is_heap(self) -> bool {
        self.tag().is_heap()
    }

    /// Both operands are integers.
    #[inline]
    pub fn both_int(a: Value, b: Value) -> Option<(i32, i32)> {
        Some((a.as_int()?, b.as_int()?))
    }

    /// Both operands are doubles.
    #[inline]
    pub fn both_float(a: Value, b: Value) -> Option<(f64, f64)> {
        Some((a.as_float()?, b.as_float()?))
    }
}

/// Tag of a value.
#[inline]
pub fn tag_of(v: Value) -> Tag {
    v.tag()
}

impl Default for Value {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ValueKind::Int(n) => write!(f, "Int({n})"),
            ValueKind::Bool(b) => write!(f, "Bool({b})"),
            ValueKind::Null => f.write_str("Null"),
            ValueKind::Undefined => f.write_str("Undefined"),
            ValueKind::Uninitialized => f.write_str("Uninitialized"),
            ValueKind::CatchOffset(o) => write!(f, "CatchOffset({o})"),
            ValueKind::Exception => f.write_str("Exception"),
            ValueKind::Float64(d) => write!(f, "Float64({d:?})"),
            ValueKind::Heap(tag, ptr) => write!(f, "{tag:?}({ptr:?})"),
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::bool(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::float64(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_roundtrip_keeps_sign() {
        for n in [0, 1, -1, i32::MAX, i32::MIN, 123_456] {
            let v = Value::int(n);
            assert_eq!(v.tag(), Tag::Int);
            assert_eq!(v.payload_as_int(), n);
        }
    }

    #[test]
    fn test_nan_is_canonical_and_stays_a_float() {
        let odd_nan = f64::from_bits(0x7FF8_0000_0000_1234);
        let v = Value::float64(odd_nan);
        assert_eq!(v.bits(), CANONICAL_NAN);
        assert_eq!(v.tag(), Tag::Float64);
        assert!(v.payload_as_float().is_nan());

        let negative_nan = Value::float64(-f64::NAN);
        assert_eq!(negative_nan.tag(), Tag::Float64);
    }

    #[test]
    fn test_infinities_and_negative_zero_are_floats() {
        assert_eq!(Value::float64(f64::INFINITY).tag(), Tag::Float64);
        assert_eq!(Value::float64(f64::NEG_INFINITY).tag(), Tag::Float64);
        let nz = Value::float64(-0.0);
        assert_eq!(nz.tag(), Tag::Float64);
        assert!(nz.payload_as_float().is_sign_negative());
    }

    #[test]
    fn test_number_normalizes_integral_doubles() {
        assert_eq!(Value::number(42.0).tag(), Tag::Int);
        assert_eq!(Value::number(-0.0).tag(), Tag::Float64);
        assert_eq!(Value::number(2147483648.0).tag(), Tag::Float64);
        assert_eq!(Value::number(1.5).tag(), Tag::Float64);
        assert_eq!(Value::float64(42.0).tag(), Tag::Float64);
    }

    #[test]
    fn test_small_tags_expose_truth_payload() {
        assert_eq!(Value::FALSE.small_payload(), Some(0));
        assert_eq!(Value::TRUE.small_payload(), Some(1));
        assert_eq!(Value::NULL.small_payload(), Some(0));
        assert_eq!(Value::UNDEFINED.small_payload(), Some(0));
        assert_eq!(Value::int(-5).small_payload(), Some(-5));
        assert_eq!(Value::float64(1.0).small_payload(), None);
        assert_eq!(Value::EXCEPTION.small_payload(), None);
    }

    #[test]
    fn test_tag_numbers_match_interpreter_abi() {
        assert_eq!(Tag::Int.raw(), 0);
        assert_eq!(Tag::Undefined.raw(), 3);
        assert_eq!(Tag::Exception.raw(), 6);
        assert_eq!(Tag::Float64.raw(), 7);
        assert_eq!(Tag::Object.raw(), -1);
        assert_eq!(Tag::from_raw(-7), Some(Tag::String));
        assert_eq!(Tag::from_raw(42), None);
        assert!(Tag::Undefined.is_small());
        assert!(!Tag::Uninitialized.is_small());
        assert!(!Tag::Object.is_small());
    }

    #[test]
    fn test_heap_pointer_roundtrip_through_tag_payload() {
        let mut cell = 0u64;
        let ptr = HeapPtr::new(&mut cell as *mut u64).unwrap();
        let v = Value::heap(Tag::String, ptr);
        assert_eq!(v.tag(), Tag::String);
        assert_eq!(v.payload_as_pointer(), ptr);

        let rebuilt = Value::from_tag_payload(Tag::String, ptr.as_ptr::<u8>() as u64);
        assert_eq!(rebuilt, v);
        assert_eq!(rebuilt.as_heap(Tag::String), Some(ptr));
        assert_eq!(rebuilt.as_heap(Tag::Object), None);
    }

    #[test]
    fn test_both_predicates() {
        assert_eq!(Value::both_int(Value::int(1), Value::int(2)), Some((1, 2)));
        assert_eq!(Value::both_int(Value::int(1), Value::float64(2.5)), None);
        assert_eq!(
            Value::both_float(Value::float64(1.5), Value::float64(2.5)),
            Some((1.5, 2.5))
        );
        assert_eq!(Value::both_float(Value::int(1), Value::float64(2.5)), None);
    }

    #[test]
    #[should_panic(expected = "payload read as Int")]
    fn test_mismatched_payload_read_is_fatal() {
        Value::TRUE.payload_as_int();
    }

    #[test]
    fn test_from_tag_payload_rebuilds_immediates() {
        assert_eq!(Value::from_tag_payload(Tag::Int, (-3i32) as u32 as u64), Value::int(-3));
        assert_eq!(Value::from_tag_payload(Tag::Bool, 1), Value::TRUE);
        assert_eq!(Value::from_tag_payload(Tag::Null, 0), Value::NULL);
        assert_eq!(
            Value::from_tag_payload(Tag::Float64, 2.5f64.to_bits()),
            Value::float64(2.5)
        );
    }
}
