//! Function bytecode metadata
//!
//! The interpreter owns these records; the JIT bridge only reads them: the
//! constant pool, the instruction buffer (to validate pc offsets) and the
//! closure-variable layout.

use crate::error::invariant_violation;
use crate::value::Value;

/// Where a closure variable is captured from in the enclosing function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureVar {
    /// Variable name (for debugging)
    pub name: Option<String>,
    /// Captured from the parent's own frame rather than its closure
    pub is_local: bool,
    /// Captured slot is an argument rather than a local variable
    pub is_arg: bool,
    /// Slot index in the parent's argument/variable buffer or closure list
    pub var_idx: u16,
}

/// A compiled function
#[derive(Debug, Clone)]
pub struct FunctionBytecode {
    /// Function name (empty for anonymous)
    pub name: Option<String>,
    /// Number of declared arguments
    pub arg_count: u16,
    /// Number of local variables
    pub var_count: u16,
    /// Instruction buffer
    pub byte_code: Box<[u8]>,
    /// Constant pool, immutable after compilation
    pub cpool: Box<[Value]>,
    /// Closure variable layout
    pub closure_vars: Vec<ClosureVar>,
    /// pc -> source position table (absent when stripped)
    pub line_table: Option<LineTable>,
}

impl FunctionBytecode {
    /// Create a new function builder
    pub fn builder() -> FunctionBytecodeBuilder {
        FunctionBytecodeBuilder::new()
    }

    /// Get the function name or `<anonymous>`
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Constant at `idx`, if in range.
    #[inline]
    pub fn cpool(&self, idx: usize) -> Option<Value> {
        self.cpool.get(idx).copied()
    }

    /// Constant at `idx`. Generated code only emits indices the compiler
    /// produced, so an out-of-range index is fatal.
    #[inline]
    #[track_caller]
    pub fn cpool_checked(&self, idx: usize) -> Value {
        match self.cpool.get(idx) {
            Some(v) => *v,
            None => invariant_violation(format_args!(
                "constant {idx} out of range for {} (pool size {})",
                self.display_name(),
                self.cpool.len()
            )),
        }
    }

    /// Length of the instruction buffer in bytes.
    #[inline]
    pub fn code_len(&self) -> usize {
        self.byte_code.len()
    }

    /// Is `pc` a valid offset into the instruction buffer?
    ///
    /// `code_len()` itself is accepted: it marks the end of the function.
    #[inline]
    pub fn contains_pc(&self, pc: u32) -> bool {
        (pc as usize) <= self.byte_code.len()
    }

    /// Source line for `pc`, if the function carries debug info.
    pub fn find_line_num(&self, pc: u32) -> Option<u32> {
        self.find_line_col(pc).map(|(line, _)| line)
    }

    /// Source column for `pc`, if the function carries debug info.
    pub fn find_column_num(&self, pc: u32) -> Option<u32> {
        self.find_line_col(pc).map(|(_, col)| col)
    }

    /// Source `(line, column)` for `pc`.
    pub fn find_line_col(&self, pc: u32) -> Option<(u32, u32)> {
        let entry = self.line_table.as_ref()?.find(pc)?;
        Some((entry.line, entry.column))
    }
}

/// Builder for creating functions
#[derive(Debug, Default)]
pub struct FunctionBytecodeBuilder {
    name: Option<String>,
    arg_count: u16,
    var_count: u16,
    byte_code: Vec<u8>,
    cpool: Vec<Value>,
    closure_vars: Vec<ClosureVar>,
    line_table: Option<LineTable>,
}

impl FunctionBytecodeBuilder {
    /// Create a new function builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set function name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set argument count
    pub fn arg_count(mut self, count: u16) -> Self {
        self.arg_count = count;
        self
    }

    /// Set local variable count
    pub fn var_count(mut self, count: u16) -> Self {
        self.var_count = count;
        self
    }

    /// Set the instruction buffer
    pub fn byte_code(mut self, code: impl Into<Vec<u8>>) -> Self {
        self.byte_code = code.into();
        self
    }

    /// Append a constant
    pub fn constant(mut self, value: Value) -> Self {
        self.cpool.push(value);
        self
    }

    /// Add a closure variable
    pub fn closure_var(mut self, var: ClosureVar) -> Self {
        self.closure_vars.push(var);
        self
    }

    /// Set the pc -> source table
    pub fn line_table(mut self, table: LineTable) -> Self {
        self.line_table = Some(table);
        self
    }

    /// Build the function
    pub fn build(self) -> FunctionBytecode {
        FunctionBytecode {
            name: self.name,
            arg_count: self.arg_count,
            var_count: self.var_count,
            byte_code: self.byte_code.into_boxed_slice(),
            cpool: self.cpool.into_boxed_slice(),
            closure_vars: self.closure_vars,
            line_table: self.line_table,
        }
    }
}

/// pc offset -> source position mapping
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    entries: Vec<LineEntry>,
}

/// A single line table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    /// First byte offset covered by this entry
    pub pc: u32,
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
}

impl LineTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping entry. Entries must be added in pc order.
    pub fn add(&mut self, pc: u32, line: u32, column: u32) {
        debug_assert!(self.entries.last().is_none_or(|e| e.pc <= pc));
        self.entries.push(LineEntry { pc, line, column });
    }

    /// Entry covering `pc`: the last one starting at or before it.
    pub fn find(&self, pc: u32) -> Option<&LineEntry> {
        let idx = self.entries.binary_search_by_key(&pc, |e| e.pc);
        match idx {
            Ok(i) => Some(&self.entries[i]),
            Err(i) if i > 0 => Some(&self.entries[i - 1]),
            _ => None,
        }
    }
}
