//! Compile-and-run driver
//!
//! Ties the frontend, the code generator, and the interpreter into a
//! single engine: source text plus one integer argument in, printed
//! output plus an exit status out.

use crate::vm::{Execution, Vm, VmError, DEFAULT_STACK_WORDS};
use log::debug;
use mcc_codegen::CompiledProgram;
use mcc_common::{CompilerError, Word, COMPILE_FAILURE_STATUS, RUNTIME_FAILURE_STATUS};
use mcc_frontend::Frontend;
use thiserror::Error;

/// Anything that can go wrong between source text and a finished run
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Compile(#[from] CompilerError),

    #[error("runtime fault: {0}")]
    Runtime(#[from] VmError),
}

impl EngineError {
    /// The process exit status this failure maps to
    pub fn exit_status(&self) -> i32 {
        match self {
            EngineError::Compile(_) => COMPILE_FAILURE_STATUS,
            EngineError::Runtime(_) => RUNTIME_FAILURE_STATUS,
        }
    }
}

/// How the entry function's return value becomes a process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitMode {
    /// Truncate to the low byte, the way a process status behaves
    #[default]
    Wrapped,
    /// Pass the value through untruncated
    Raw,
}

impl ExitMode {
    pub fn status(self, value: Word) -> i32 {
        match self {
            ExitMode::Wrapped => (value & 0xff) as i32,
            ExitMode::Raw => value as i32,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Runtime stack size in words
    pub stack_words: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            stack_words: DEFAULT_STACK_WORDS,
        }
    }
}

/// The MicroC engine: compile once, run with an argument
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: EngineOptions,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    /// Compile source text down to stack-machine code
    pub fn compile(&self, source: &str) -> Result<CompiledProgram, CompilerError> {
        let (program, _symbols) = Frontend::analyze_source(source)?;
        let compiled = mcc_codegen::compile(&program)?;
        debug!(
            "compiled {} instructions for entry '{}'",
            compiled.code.len(),
            compiled
                .function(compiled.entry)
                .map(|f| f.name.as_str())
                .unwrap_or("?")
        );
        Ok(compiled)
    }

    /// Execute an already-compiled program
    pub fn execute(&self, program: &CompiledProgram, arg: Word) -> Result<Execution, VmError> {
        Vm::new(program, arg, self.options.stack_words).run()
    }

    /// Compile and run in one step
    pub fn run_source(&self, source: &str, arg: Word) -> Result<Execution, EngineError> {
        let program = self.compile(source)?;
        Ok(self.execute(&program, arg)?)
    }
}
