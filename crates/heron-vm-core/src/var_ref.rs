//! Closure variable references
//!
//! While the owning frame is live a reference is *open*: it points straight
//! at the frame's argument or local slot, so writes through either side are
//! seen by both. When the frame exits the reference is *closed*: the current
//! value is copied into the reference, which keeps it alive from then on.
//!
//! ```javascript
//! function counter() {
//!     let count = 0;          // open while counter() runs
//!     return () => ++count;   // closed once counter() returns
//! }
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

#[derive(Clone, Copy)]
enum VarRefState {
    /// Slot inside a live frame's buffer
    Open { slot: *mut Value, idx: u16, is_arg: bool },
    /// Owned copy after the frame exited
    Closed(Value),
}

/// Shared handle to a captured variable.
#[derive(Clone)]
pub struct VarRef(Rc<Cell<VarRefState>>);

impl VarRef {
    /// A reference that owns its value from the start.
    pub fn closed(value: Value) -> Self {
        Self(Rc::new(Cell::new(VarRefState::Closed(value))))
    }

    /// A reference into a frame slot.
    ///
    /// # Safety
    ///
    /// `slot` must stay valid until [`VarRef::close`] is called, which the
    /// owning frame does on exit.
    pub(crate) unsafe fn open(slot: *mut Value, idx: u16, is_arg: bool) -> Self {
        Self(Rc::new(Cell::new(VarRefState::Open { slot, idx, is_arg })))
    }

    /// Current value
    pub fn get(&self) -> Value {
        match self.0.get() {
            // SAFETY: open slots are valid until the owning frame closes them.
            VarRefState::Open { slot, .. } => unsafe { *slot },
            VarRefState::Closed(v) => v,
        }
    }

    /// Store a new value
    pub fn set(&self, value: Value) {
        match self.0.get() {
            // SAFETY: as in `get`.
            VarRefState::Open { slot, .. } => unsafe { *slot = value },
            VarRefState::Closed(_) => self.0.set(VarRefState::Closed(value)),
        }
    }

    /// Still pointing into a live frame?
    pub fn is_open(&self) -> bool {
        matches!(self.0.get(), VarRefState::Open { .. })
    }

    /// `(idx, is_arg)` of the frame slot, while open.
    pub(crate) fn open_slot(&self) -> Option<(u16, bool)> {
        match self.0.get() {
            VarRefState::Open { idx, is_arg, .. } => Some((idx, is_arg)),
            VarRefState::Closed(_) => None,
        }
    }

    /// Detach from the frame, keeping the slot's current value.
    pub(crate) fn close(&self) {
        let value = self.get();
        self.0.set(VarRefState::Closed(value));
    }

    /// Do both handles refer to the same variable?
    pub fn ptr_eq(&self, other: &VarRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_open() { "open" } else { "closed" };
        write!(f, "VarRef({state}, {:?})", self.get())
    }
}
