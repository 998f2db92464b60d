//! MicroC Code Generator
//!
//! Lowers the typed, resolved AST produced by the frontend to
//! stack-machine code executable by the engine crate. Also validates
//! the program entry point: a `main` function taking no parameter or
//! a single int, returning int or void.

pub mod instr;
pub mod lower;

pub use instr::{CompiledFunction, CompiledProgram, Instr};
pub use lower::CodeGenerator;

use mcc_common::CompilerError;
use mcc_frontend::Program;

/// Compile a typed, resolved program to stack-machine code
pub fn compile(program: &Program) -> Result<CompiledProgram, CompilerError> {
    CodeGenerator::new().generate(program)
}
