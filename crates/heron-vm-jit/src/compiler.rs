//! Cranelift JIT module with the runtime helpers linked in.
//!
//! The compiler owns no translator: callers build each function body with a
//! [`FunctionBuilder`] and call helpers through [`HelperRefs`]. Compiled
//! functions have the shape `extern "C" fn(ctx: i64, args: i64...) -> i64`.

use cranelift_codegen::ir::{self, AbiParam, InstBuilder, UserFuncName, types};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module, ModuleError, default_libcall_names};

use crate::runtime_helpers::{HelperFuncIds, HelperRefs, RuntimeHelpers};

/// Most value arguments a compiled function can take through
/// [`JitCompiler::invoke`].
pub const MAX_INVOKE_ARGS: usize = 4;

/// A compiled function.
#[derive(Debug, Clone, Copy)]
pub struct JitCompileArtifact {
    /// Entry pointer for compiled native code.
    pub code_ptr: *const u8,
    /// Number of value parameters after the context pointer.
    pub param_count: usize,
}

/// Errors produced by the JIT compiler.
#[derive(Debug, thiserror::Error)]
pub enum JitError {
    /// Cranelift module-level error.
    #[error("cranelift module error: {0}")]
    Module(Box<ModuleError>),

    /// Failed to create the JIT builder.
    #[error("jit builder initialization failed: {0}")]
    Builder(String),

    /// The function body called a helper that is not in the table.
    #[error("runtime helper {helper} is not registered")]
    MissingHelper {
        /// Helper symbol
        helper: &'static str,
    },

    /// A helper call or invocation passed the wrong number of arguments.
    #[error("{helper} takes {expected} arguments, got {got}")]
    ArityMismatch {
        /// Helper symbol or function name
        helper: &'static str,
        /// Declared parameter count
        expected: usize,
        /// Arguments supplied
        got: usize,
    },
}

impl From<ModuleError> for JitError {
    fn from(value: ModuleError) -> Self {
        Self::Module(Box::new(value))
    }
}

/// Cranelift-backed JIT compiler.
pub struct JitCompiler {
    module: JITModule,
    function_builder_ctx: FunctionBuilderContext,
    context: cranelift_codegen::Context,
    next_function_id: u64,
    helper_func_ids: HelperFuncIds,
}

impl JitCompiler {
    /// Create a compiler for the host ISA with `helpers` linked in.
    pub fn new(helpers: RuntimeHelpers) -> Result<Self, JitError> {
        let mut flag_builder = settings::builder();
        for (name, value) in [
            ("use_colocated_libcalls", "false"),
            ("is_pic", "false"),
            ("opt_level", "speed"),
        ] {
            flag_builder
                .set(name, value)
                .map_err(|e| JitError::Builder(e.to_string()))?;
        }
        let isa = cranelift_native::builder()
            .map_err(|msg| JitError::Builder(msg.to_string()))?
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| JitError::Builder(e.to_string()))?;

        let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
        helpers.register_symbols(&mut builder);
        let mut module = JITModule::new(builder);
        let helper_func_ids = HelperFuncIds::declare(&helpers, &mut module)?;
        Ok(Self {
            module,
            function_builder_ctx: FunctionBuilderContext::new(),
            context: cranelift_codegen::Context::new(),
            next_function_id: 0,
            helper_func_ids,
        })
    }

    /// Compile a function taking the context pointer and `param_count`
    /// values, at most [`MAX_INVOKE_ARGS`].
    ///
    /// `body` receives the builder positioned in the entry block, the helper
    /// references and the entry parameters (context pointer first). It
    /// returns the value to return; the compiler emits the `return` in
    /// whichever block the builder is left in, which must not be filled.
    pub fn compile<F>(
        &mut self,
        name: &str,
        param_count: usize,
        body: F,
    ) -> Result<JitCompileArtifact, JitError>
    where
        F: FnOnce(&mut FunctionBuilder<'_>, &HelperRefs, &[ir::Value]) -> Result<ir::Value, JitError>,
    {
        if param_count > MAX_INVOKE_ARGS {
            return Err(JitError::ArityMismatch {
                helper: "compiled function",
                expected: MAX_INVOKE_ARGS,
                got: param_count,
            });
        }
        let mut signature = self.module.make_signature();
        for _ in 0..=param_count {
            signature.params.push(AbiParam::new(types::I64));
        }
        signature.returns.push(AbiParam::new(types::I64));

        let symbol = format!("heron_jit_{}_{}", name, self.next_function_id);
        self.next_function_id = self.next_function_id.saturating_add(1);

        let func_id = self
            .module
            .declare_function(&symbol, Linkage::Local, &signature)?;

        self.context.func =
            ir::Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), signature);

        let helper_refs =
            HelperRefs::declare(&self.helper_func_ids, &mut self.module, &mut self.context.func);

        let built = {
            let mut builder =
                FunctionBuilder::new(&mut self.context.func, &mut self.function_builder_ctx);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            let params = builder.block_params(entry).to_vec();
            let result = body(&mut builder, &helper_refs, &params);
            if let Ok(ret) = result {
                builder.ins().return_(&[ret]);
                builder.seal_all_blocks();
                builder.finalize();
            }
            result
        };
        if let Err(err) = built {
            // An unfinished body leaves the builder context dirty.
            self.function_builder_ctx = FunctionBuilderContext::new();
            self.module.clear_context(&mut self.context);
            return Err(err);
        }

        self.module.define_function(func_id, &mut self.context)?;
        self.module.clear_context(&mut self.context);
        self.module.finalize_definitions()?;

        let code_ptr = self.module.get_finalized_function(func_id);
        Ok(JitCompileArtifact {
            code_ptr,
            param_count,
        })
    }

    /// Call a compiled function.
    ///
    /// # Safety
    ///
    /// `artifact` must come from this compiler, and `ctx` must be what its
    /// body expects (a `*mut VmContext<R>` when it calls helpers built for
    /// `R`).
    pub unsafe fn invoke(
        &self,
        artifact: JitCompileArtifact,
        ctx: *mut u8,
        args: &[i64],
    ) -> Result<i64, JitError> {
        if args.len() != artifact.param_count || args.len() > MAX_INVOKE_ARGS {
            return Err(JitError::ArityMismatch {
                helper: "compiled function",
                expected: artifact.param_count,
                got: args.len(),
            });
        }
        let ctx = ctx as i64;
        let code = artifact.code_ptr;
        // SAFETY: the artifact was compiled with exactly `args.len()` i64
        // parameters after the context, and an i64 return.
        let result = unsafe {
            match *args {
                [] => std::mem::transmute::<*const u8, extern "C" fn(i64) -> i64>(code)(ctx),
                [a] => std::mem::transmute::<*const u8, extern "C" fn(i64, i64) -> i64>(code)(ctx, a),
                [a, b] => std::mem::transmute::<*const u8, extern "C" fn(i64, i64, i64) -> i64>(
                    code,
                )(ctx, a, b),
                [a, b, c] => std::mem::transmute::<
                    *const u8,
                    extern "C" fn(i64, i64, i64, i64) -> i64,
                >(code)(ctx, a, b, c),
                [a, b, c, d] => std::mem::transmute::<
                    *const u8,
                    extern "C" fn(i64, i64, i64, i64, i64) -> i64,
                >(code)(ctx, a, b, c, d),
                _ => unreachable!("arity checked above"),
            }
        };
        Ok(result)
    }
}
