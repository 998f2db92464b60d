//! Stack-machine instruction set
//!
//! The compilation target is a word-oriented stack machine. All values
//! are `Word`s: integers, addresses (word indices into the runtime
//! stack), and function-pointer handles (indices into the program's
//! function table). Jump targets are instruction indices, patched in
//! by the emitter before the program is handed to the execution
//! engine.

use mcc_common::{FunctionId, Word};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single stack-machine instruction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    /// Push a constant
    Const(Word),

    // Arithmetic, operands popped right-then-left
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison, result 0 or 1
    Eq,
    Lt,
    /// Logical negation of the top of stack
    Not,

    /// Discard the top of stack
    Pop,
    /// Exchange the two topmost words
    Swap,

    /// Pop an address, push the word stored there
    Load,
    /// Pop a value then an address, store the value, push it back
    Store,

    /// Push the current frame base address
    GetBp,

    /// Unconditional jump
    Goto(usize),
    /// Pop, jump if zero
    IfZero(usize),
    /// Pop, jump if nonzero
    IfNotZero(usize),

    /// Call a known function with `argc` arguments on the stack
    Call { argc: usize, func: FunctionId },
    /// Pop a function handle, then call it with `argc` arguments
    CallIndirect { argc: usize },
    /// Reserve stack words for the current frame's locals
    Enter { locals: usize },
    /// Pop the result, tear down the frame, push the result for the
    /// caller
    Ret,

    /// Push the program argument supplied at run time
    LoadArg,

    /// Pop a value and print it in decimal followed by a space
    PrintInt,
    /// Print a newline
    PrintLn,

    /// Stop execution; the top of stack is the program status
    Halt,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Const(value) => write!(f, "CONST {}", value),
            Instr::Add => write!(f, "ADD"),
            Instr::Sub => write!(f, "SUB"),
            Instr::Mul => write!(f, "MUL"),
            Instr::Div => write!(f, "DIV"),
            Instr::Mod => write!(f, "MOD"),
            Instr::Eq => write!(f, "EQ"),
            Instr::Lt => write!(f, "LT"),
            Instr::Not => write!(f, "NOT"),
            Instr::Pop => write!(f, "POP"),
            Instr::Swap => write!(f, "SWAP"),
            Instr::Load => write!(f, "LOAD"),
            Instr::Store => write!(f, "STORE"),
            Instr::GetBp => write!(f, "GETBP"),
            Instr::Goto(target) => write!(f, "GOTO {}", target),
            Instr::IfZero(target) => write!(f, "IFZERO {}", target),
            Instr::IfNotZero(target) => write!(f, "IFNZRO {}", target),
            Instr::Call { argc, func } => write!(f, "CALL {} f{}", argc, func.index()),
            Instr::CallIndirect { argc } => write!(f, "CALLI {}", argc),
            Instr::Enter { locals } => write!(f, "ENTER {}", locals),
            Instr::Ret => write!(f, "RET"),
            Instr::LoadArg => write!(f, "LDARG"),
            Instr::PrintInt => write!(f, "PRINTI"),
            Instr::PrintLn => write!(f, "PRINTLN"),
            Instr::Halt => write!(f, "HALT"),
        }
    }
}

/// A compiled function's entry in the program function table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub name: String,
    /// Instruction index of the function's `Enter`
    pub entry: usize,
    /// Total frame words: parameters plus locals
    pub frame_size: usize,
    pub param_count: usize,
}

/// A complete compiled program
///
/// Execution starts at instruction 0 with a startup sequence that runs
/// global initializers, pushes the program argument if the entry
/// function takes one, calls it, and halts with its return value on
/// the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledProgram {
    pub code: Vec<Instr>,
    pub functions: Vec<CompiledFunction>,
    /// Words reserved at the bottom of the runtime stack for globals
    pub globals_size: usize,
    /// Function table index of the entry function
    pub entry: FunctionId,
}

impl CompiledProgram {
    pub fn function(&self, id: FunctionId) -> Option<&CompiledFunction> {
        self.functions.get(id.index())
    }

    /// Render a disassembly listing
    pub fn disassemble(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        for (pc, instr) in self.code.iter().enumerate() {
            for func in &self.functions {
                if func.entry == pc {
                    let _ = writeln!(out, "{}:", func.name);
                }
            }
            let _ = writeln!(out, "  {:4}  {}", pc, instr);
        }
        out
    }
}
