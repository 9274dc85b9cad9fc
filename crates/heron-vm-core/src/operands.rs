//! Operand slots for slow-path calls.
//!
//! The interpreter's generic operators read their operands from a run of
//! evaluation-stack slots and leave the result where the first operand was.
//! [`Operands`] reproduces that contract as a typed, fixed-size buffer that
//! lives on the caller's stack for exactly one operator evaluation.

use crate::value::Value;

/// Operands of one operator invocation. Slot 0 receives the result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operands<const N: usize> {
    slots: [Value; N],
}

/// Operand buffer for binary operators: `[lhs, rhs]`.
pub type BinaryOperands = Operands<2>;

/// Operand buffer for unary operators: `[operand]`.
pub type UnaryOperands = Operands<1>;

impl<const N: usize> Operands<N> {
    /// Wrap operands in slot order.
    #[inline]
    pub const fn new(slots: [Value; N]) -> Self {
        Self { slots }
    }

    /// Operand at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Value {
        self.slots[index]
    }

    /// All slots, in order.
    #[inline]
    pub fn slots(&self) -> &[Value; N] {
        &self.slots
    }

    /// Write the operator's result. It overwrites slot 0.
    #[inline]
    pub fn set_result(&mut self, result: Value) {
        self.slots[0] = result;
    }

    /// The result slot.
    #[inline]
    pub fn result(&self) -> Value {
        self.slots[0]
    }
}

impl Operands<2> {
    /// `[lhs, rhs]`
    #[inline]
    pub const fn pair(lhs: Value, rhs: Value) -> Self {
        Self::new([lhs, rhs])
    }

    /// Left operand
    #[inline]
    pub fn lhs(&self) -> Value {
        self.slots[0]
    }

    /// Right operand
    #[inline]
    pub fn rhs(&self) -> Value {
        self.slots[1]
    }
}

impl Operands<1> {
    /// `[operand]`
    #[inline]
    pub const fn single(operand: Value) -> Self {
        Self::new([operand])
    }

    /// The operand
    #[inline]
    pub fn operand(&self) -> Value {
        self.slots[0]
    }
}
