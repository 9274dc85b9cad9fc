//! Call frames for natively compiled functions
//!
//! Compiled code keeps its arguments and locals in buffers it owns, but it
//! still has to appear on the interpreter's call stack so stack walking,
//! closure capture and exception unwinding see it. Each activation links a
//! [`StackFrame`] into its context's [`FrameChain`] on entry and unlinks it on
//! exit.
//!
//! A frame goes through `init -> attach_locals? -> set_pc* -> exit`. Any other
//! order breaks the chain and is fatal. [`FrameChain::with_frame`] drives the
//! sequence for Rust callers and runs `exit` on every path out of the body.

use std::cell::Cell;
use std::fmt;
use std::ptr;

use smallvec::SmallVec;

use crate::bytecode::FunctionBytecode;
use crate::error::invariant_violation;
use crate::interp::ObjectModel;
use crate::value::{Tag, Value};
use crate::var_ref::VarRef;

/// Where a frame is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Never linked, ready for `init`
    Unlinked,
    /// Linked into a chain
    Active,
    /// Unlinked by `exit`; may be reused by another `init`
    Exited,
}

/// One function activation.
#[derive(Debug)]
pub struct StackFrame {
    prev_frame: *mut StackFrame,
    cur_func: Value,
    arg_buf: *mut Value,
    arg_count: usize,
    var_buf: *mut Value,
    var_count: usize,
    cur_pc: Option<u32>,
    /// Open references into `arg_buf` / `var_buf`
    var_refs: SmallVec<[VarRef; 4]>,
    state: FrameState,
}

impl StackFrame {
    /// An unlinked frame.
    pub fn new() -> Self {
        Self {
            prev_frame: ptr::null_mut(),
            cur_func: Value::UNDEFINED,
            arg_buf: ptr::null_mut(),
            arg_count: 0,
            var_buf: ptr::null_mut(),
            var_count: 0,
            cur_pc: None,
            var_refs: SmallVec::new(),
            state: FrameState::Unlinked,
        }
    }

    /// Lifecycle state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Function being executed
    pub fn function(&self) -> Value {
        self.cur_func
    }

    /// Last recorded pc offset
    pub fn pc(&self) -> Option<u32> {
        self.cur_pc
    }

    /// Number of arguments
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    /// Number of attached locals
    pub fn var_count(&self) -> usize {
        self.var_count
    }

    /// Frame below this one, null for the outermost frame.
    pub fn prev(&self) -> *mut StackFrame {
        self.prev_frame
    }

    fn slot(&self, idx: u16, is_arg: bool) -> *mut Value {
        let (buf, len, what) = if is_arg {
            (self.arg_buf, self.arg_count, "argument")
        } else {
            (self.var_buf, self.var_count, "local")
        };
        if usize::from(idx) >= len {
            invariant_violation(format_args!(
                "{what} {idx} out of range (frame has {len})"
            ));
        }
        // SAFETY: in bounds of a buffer the caller of `init`/`attach_locals`
        // keeps alive while the frame is active.
        unsafe { buf.add(usize::from(idx)) }
    }

    fn var_ref(&mut self, idx: u16, is_arg: bool) -> VarRef {
        if let Some(existing) = self
            .var_refs
            .iter()
            .find(|r| r.open_slot() == Some((idx, is_arg)))
        {
            return existing.clone();
        }
        let slot = self.slot(idx, is_arg);
        // SAFETY: `exit` closes every reference in `var_refs` before the
        // buffers can go away.
        let r = unsafe { VarRef::open(slot, idx, is_arg) };
        self.var_refs.push(r.clone());
        r
    }

    fn info(&self) -> FrameInfo {
        FrameInfo {
            function: self.cur_func,
            pc: self.cur_pc,
            arg_count: self.arg_count,
            var_count: self.var_count,
            open_var_refs: self.var_refs.len(),
        }
    }
}

impl Default for StackFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of a linked frame, as seen by [`FrameChain::walk`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Function being executed
    pub function: Value,
    /// Last recorded pc offset
    pub pc: Option<u32>,
    /// Number of arguments
    pub arg_count: usize,
    /// Number of attached locals
    pub var_count: usize,
    /// Closure references still pointing into the frame
    pub open_var_refs: usize,
}

/// One line of a stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceEntry {
    /// Function name, `<native>` when the function has no bytecode
    pub name: String,
    /// pc offset, if recorded
    pub pc: Option<u32>,
    /// Source line, if the function has a line table
    pub line: Option<u32>,
    /// Source column
    pub column: Option<u32>,
}

impl fmt::Display for BacktraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(f, "at {} ({line}:{col})", self.name),
            _ => write!(f, "at {}", self.name),
        }
    }
}

/// The chain of live frames of one interpreter instance.
///
/// Frames are linked through raw pointers: the caller of [`FrameChain::init`]
/// owns the frame storage and its buffers and keeps them alive until the
/// matching [`FrameChain::exit`].
pub struct FrameChain {
    current: Cell<*mut StackFrame>,
    depth: Cell<usize>,
}

impl FrameChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self {
            current: Cell::new(ptr::null_mut()),
            depth: Cell::new(0),
        }
    }

    /// Innermost frame, null when empty.
    #[inline]
    pub fn current_ptr(&self) -> *mut StackFrame {
        self.current.get()
    }

    /// Number of linked frames.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// No frames linked?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current.get().is_null()
    }

    /// Link `frame` as the current frame, executing `func` with `arg_count`
    /// arguments at `args`.
    ///
    /// # Safety
    ///
    /// `frame` must point to a valid [`StackFrame`] that does not move until
    /// the matching [`exit`](Self::exit). `args` must be valid for
    /// `arg_count` reads and writes for the same span.
    pub unsafe fn init(
        &self,
        frame: *mut StackFrame,
        func: Value,
        args: *mut Value,
        arg_count: usize,
    ) {
        // SAFETY: per this function's contract.
        let sf = match unsafe { frame.as_mut() } {
            Some(sf) => sf,
            None => invariant_violation(format_args!("init of a null frame")),
        };
        if sf.state == FrameState::Active {
            invariant_violation(format_args!("frame initialized twice"));
        }
        sf.prev_frame = self.current.get();
        sf.cur_func = func;
        sf.arg_buf = args;
        sf.arg_count = arg_count;
        sf.var_buf = ptr::null_mut();
        sf.var_count = 0;
        sf.cur_pc = None;
        sf.var_refs.clear();
        sf.state = FrameState::Active;
        self.current.set(frame);
        self.depth.set(self.depth.get() + 1);

        #[cfg(feature = "logging")]
        tracing::trace!(depth = self.depth.get(), ?func, "frame enter");
    }

    /// Attach the local-variable buffer of an active frame.
    ///
    /// # Safety
    ///
    /// `frame` must be a live frame. `locals` must be valid for `count` reads
    /// and writes until the frame exits.
    pub unsafe fn attach_locals(&self, frame: *mut StackFrame, locals: *mut Value, count: usize) {
        // SAFETY: per this function's contract.
        let sf = unsafe { Self::active(frame, "attach_locals") };
        sf.var_buf = locals;
        sf.var_count = count;
    }

    /// Record the pc offset of an active frame executing `bc`.
    ///
    /// # Safety
    ///
    /// `frame` must be a live frame.
    pub unsafe fn set_pc(&self, frame: *mut StackFrame, bc: &FunctionBytecode, pc: u32) {
        // SAFETY: per this function's contract.
        let sf = unsafe { Self::active(frame, "set_pc") };
        if !bc.contains_pc(pc) {
            invariant_violation(format_args!(
                "pc {pc} outside {} ({} bytes)",
                bc.display_name(),
                bc.code_len()
            ));
        }
        sf.cur_pc = Some(pc);
    }

    /// Closure reference to an argument or local of an active frame.
    ///
    /// Asking twice for the same slot returns the same reference.
    ///
    /// # Safety
    ///
    /// `frame` must be a live frame.
    pub unsafe fn create_var_ref(&self, frame: *mut StackFrame, idx: u16, is_arg: bool) -> VarRef {
        // SAFETY: per this function's contract.
        let sf = unsafe { Self::active(frame, "create_var_ref") };
        sf.var_ref(idx, is_arg)
    }

    /// Unlink `frame`, which must be the current frame. Open closure
    /// references are closed over the values they point at.
    ///
    /// # Safety
    ///
    /// `frame` must be a valid [`StackFrame`].
    pub unsafe fn exit(&self, frame: *mut StackFrame) {
        // SAFETY: per this function's contract.
        let sf = match unsafe { frame.as_mut() } {
            Some(sf) => sf,
            None => invariant_violation(format_args!("exit of a null frame")),
        };
        if sf.state != FrameState::Active {
            invariant_violation(format_args!("exit of a frame that is {:?}", sf.state));
        }
        if self.current.get() != frame {
            invariant_violation(format_args!(
                "frame exit out of order (depth {})",
                self.depth.get()
            ));
        }
        for r in sf.var_refs.drain(..) {
            r.close();
        }
        self.current.set(sf.prev_frame);
        self.depth.set(self.depth.get() - 1);
        sf.prev_frame = ptr::null_mut();
        sf.state = FrameState::Exited;

        #[cfg(feature = "logging")]
        tracing::trace!(depth = self.depth.get(), "frame exit");
    }

    /// # Safety
    ///
    /// `frame` must be null or point to a valid [`StackFrame`].
    unsafe fn active<'a>(frame: *mut StackFrame, op: &str) -> &'a mut StackFrame {
        // SAFETY: per this function's contract.
        match unsafe { frame.as_mut() } {
            Some(sf) if sf.state == FrameState::Active => sf,
            Some(sf) => invariant_violation(format_args!("{op} on a frame that is {:?}", sf.state)),
            None => invariant_violation(format_args!("{op} on a null frame")),
        }
    }

    fn with_current<T>(&self, op: &str, f: impl FnOnce(&mut StackFrame) -> T) -> T {
        // SAFETY: linked frames stay valid until they exit (`init` contract).
        f(unsafe { Self::active(self.current.get(), op) })
    }

    /// Run `f` inside a new frame for `func`.
    ///
    /// The frame is linked before `f` runs and unlinked after it returns or
    /// unwinds. Inside `f`, use the `current_*` accessors of the chain to
    /// reach the frame.
    ///
    /// Frames `f` links itself must be exited before it returns or unwinds.
    /// If one is still linked the process aborts.
    pub fn with_frame<T>(
        &self,
        func: Value,
        args: &mut [Value],
        locals: &mut [Value],
        f: impl FnOnce(&FrameChain) -> T,
    ) -> T {
        struct ExitGuard<'a> {
            chain: &'a FrameChain,
            frame: *mut StackFrame,
        }

        impl Drop for ExitGuard<'_> {
            fn drop(&mut self) {
                if self.chain.current.get() != self.frame {
                    // The frames above ours belong to storage that is already
                    // gone, so the chain can be neither walked nor unlinked.
                    let depth = self.chain.depth.get();
                    #[cfg(feature = "logging")]
                    tracing::error!(depth, "frame left linked above a scoped frame");
                    eprintln!("heron: frame left linked above a scoped frame (depth {depth})");
                    std::process::abort();
                }
                // SAFETY: `frame` lives in `with_frame`'s stack frame, which
                // outlives this guard.
                unsafe { self.chain.exit(self.frame) };
            }
        }

        let mut frame = StackFrame::new();
        let frame_ptr: *mut StackFrame = &mut frame;
        // SAFETY: `frame`, `args` and `locals` all outlive the guard, which
        // exits the frame before they go away.
        unsafe {
            self.init(frame_ptr, func, args.as_mut_ptr(), args.len());
            self.attach_locals(frame_ptr, locals.as_mut_ptr(), locals.len());
        }
        let guard = ExitGuard {
            chain: self,
            frame: frame_ptr,
        };
        let out = f(self);
        drop(guard);
        out
    }

    /// Record the pc of the current frame.
    pub fn set_current_pc(&self, bc: &FunctionBytecode, pc: u32) {
        let frame = self.current.get();
        // SAFETY: linked frames stay valid until they exit.
        unsafe { self.set_pc(frame, bc, pc) }
    }

    /// Closure reference into the current frame.
    pub fn current_var_ref(&self, idx: u16, is_arg: bool) -> VarRef {
        self.with_current("current_var_ref", |sf| sf.var_ref(idx, is_arg))
    }

    /// Argument `idx` of the current frame.
    pub fn current_arg(&self, idx: u16) -> Value {
        let slot = self.with_current("current_arg", |sf| sf.slot(idx, true));
        // SAFETY: `slot` checked the bounds.
        unsafe { *slot }
    }

    /// Local `idx` of the current frame.
    pub fn current_local(&self, idx: u16) -> Value {
        let slot = self.with_current("current_local", |sf| sf.slot(idx, false));
        // SAFETY: `slot` checked the bounds.
        unsafe { *slot }
    }

    /// Overwrite local `idx` of the current frame.
    pub fn set_current_local(&self, idx: u16, value: Value) {
        let slot = self.with_current("set_current_local", |sf| sf.slot(idx, false));
        // SAFETY: `slot` checked the bounds.
        unsafe { *slot = value }
    }

    /// Linked frames, innermost first.
    pub fn walk(&self) -> FrameWalk<'_> {
        FrameWalk {
            next: self.current.get(),
            _chain: self,
        }
    }

    /// Stack trace of the linked frames, innermost first.
    pub fn backtrace<M: ObjectModel + ?Sized>(&self, model: &M) -> Vec<BacktraceEntry> {
        self.walk()
            .map(|info| {
                let bc = info
                    .function
                    .as_heap(Tag::Object)
                    .and_then(|p| model.function_bytecode(p));
                let pos = match (bc, info.pc) {
                    (Some(bc), Some(pc)) => bc.find_line_col(pc),
                    _ => None,
                };
                BacktraceEntry {
                    name: bc.map_or("<native>", |bc| bc.display_name()).to_string(),
                    pc: info.pc,
                    line: pos.map(|(line, _)| line),
                    column: pos.map(|(_, col)| col),
                }
            })
            .collect()
    }
}

impl Default for FrameChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameChain")
            .field("depth", &self.depth.get())
            .finish()
    }
}

/// Iterator over linked frames. See [`FrameChain::walk`].
pub struct FrameWalk<'a> {
    next: *mut StackFrame,
    _chain: &'a FrameChain,
}

impl Iterator for FrameWalk<'_> {
    type Item = FrameInfo;

    fn next(&mut self) -> Option<FrameInfo> {
        // SAFETY: linked frames stay valid until they exit.
        let sf = unsafe { self.next.as_ref() }?;
        self.next = sf.prev_frame;
        Some(sf.info())
    }
}
