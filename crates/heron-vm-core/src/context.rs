//! Per-instance execution context
//!
//! Generated code gets a pointer to a [`VmContext`] as the first argument of
//! every helper call. It bundles the interpreter, the frame chain and the
//! pending exception slot, so two interpreter instances never share state.

use crate::error::VmError;
use crate::frame::FrameChain;
use crate::value::Value;

/// Execution context of one interpreter instance.
pub struct VmContext<R> {
    runtime: R,
    frames: FrameChain,
    pending: Option<VmError>,
}

impl<R> VmContext<R> {
    /// Create a context around an interpreter.
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            frames: FrameChain::new(),
            pending: None,
        }
    }

    /// The interpreter
    #[inline]
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// The interpreter, mutably
    #[inline]
    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    /// The call-frame chain
    #[inline]
    pub fn frames(&self) -> &FrameChain {
        &self.frames
    }

    /// Park `err` as the pending exception and return the error sentinel.
    ///
    /// A newer error replaces an older one that was never taken.
    pub fn raise(&mut self, err: VmError) -> Value {
        #[cfg(feature = "logging")]
        tracing::debug!(error = %err, "exception raised");
        self.pending = Some(err);
        Value::EXCEPTION
    }

    /// Is an exception pending?
    #[inline]
    pub fn has_exception(&self) -> bool {
        self.pending.is_some()
    }

    /// Pending exception, if any
    pub fn exception(&self) -> Option<&VmError> {
        self.pending.as_ref()
    }

    /// Take the pending exception, clearing it.
    pub fn take_exception(&mut self) -> Option<VmError> {
        self.pending.take()
    }

    /// Tear down the context and return the interpreter.
    ///
    /// Frames must all have exited.
    pub fn into_runtime(self) -> R {
        if !self.frames.is_empty() {
            crate::error::invariant_violation(format_args!(
                "context dropped with {} live frames",
                self.frames.depth()
            ));
        }
        self.runtime
    }
}

impl<R: std::fmt::Debug> std::fmt::Debug for VmContext<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmContext")
            .field("runtime", &self.runtime)
            .field("frames", &self.frames)
            .field("pending", &self.pending)
            .finish()
    }
}
