//! Stack-machine interpreter
//!
//! Executes a [`CompiledProgram`] over a single flat word stack.
//! Globals occupy the low addresses, call frames grow above them, and
//! every pointer in the running program is an absolute word index into
//! this stack. The interpreter is memory-safe: wild addresses and bad
//! function handles stop execution with a runtime fault rather than
//! touching host memory.

use log::{debug, trace};
use mcc_codegen::{CompiledProgram, Instr};
use mcc_common::Word;
use thiserror::Error;

/// Default runtime stack size in words (8 MiB)
pub const DEFAULT_STACK_WORDS: usize = 1 << 20;

/// Runtime faults. These are fatal; the machine state is not
/// recoverable once one is raised.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    #[error("stack overflow at pc {pc}: capacity {capacity} words")]
    StackOverflow { pc: usize, capacity: usize },

    #[error("stack underflow at pc {pc}")]
    StackUnderflow { pc: usize },

    #[error("address {address} out of range at pc {pc}")]
    AddressOutOfRange { address: Word, pc: usize },

    #[error("division by zero at pc {pc}")]
    DivisionByZero { pc: usize },

    #[error("invalid function handle {handle} at pc {pc}")]
    InvalidHandle { handle: Word, pc: usize },

    #[error("program counter {pc} out of range")]
    PcOutOfRange { pc: usize },
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Everything the program printed
    pub output: String,
    /// The entry function's return value
    pub status: Word,
}

/// The virtual machine
pub struct Vm<'a> {
    program: &'a CompiledProgram,
    stack: Vec<Word>,
    pc: usize,
    sp: usize,
    bp: usize,
    arg: Word,
    output: String,
}

impl<'a> Vm<'a> {
    /// Create a machine for one run of `program` with the given
    /// runtime argument
    pub fn new(program: &'a CompiledProgram, arg: Word, stack_words: usize) -> Self {
        Self {
            program,
            stack: vec![0; stack_words],
            pc: 0,
            sp: program.globals_size,
            bp: program.globals_size,
            arg,
            output: String::new(),
        }
    }

    /// Run to completion
    pub fn run(mut self) -> Result<Execution, VmError> {
        let mut steps: u64 = 0;
        loop {
            steps += 1;
            let instr = *self
                .program
                .code
                .get(self.pc)
                .ok_or(VmError::PcOutOfRange { pc: self.pc })?;
            trace!("pc {:4} sp {:4} bp {:4}  {}", self.pc, self.sp, self.bp, instr);
            let at = self.pc;
            self.pc += 1;

            match instr {
                Instr::Const(value) => self.push(value)?,

                Instr::Add => self.binary(|a, b| Ok(a.wrapping_add(b)))?,
                Instr::Sub => self.binary(|a, b| Ok(a.wrapping_sub(b)))?,
                Instr::Mul => self.binary(|a, b| Ok(a.wrapping_mul(b)))?,
                Instr::Div => self.binary(|a, b| {
                    if b == 0 {
                        Err(VmError::DivisionByZero { pc: at })
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                Instr::Mod => self.binary(|a, b| {
                    if b == 0 {
                        Err(VmError::DivisionByZero { pc: at })
                    } else {
                        Ok(a.wrapping_rem(b))
                    }
                })?,

                Instr::Eq => self.binary(|a, b| Ok((a == b) as Word))?,
                Instr::Lt => self.binary(|a, b| Ok((a < b) as Word))?,
                Instr::Not => {
                    let value = self.pop()?;
                    self.push((value == 0) as Word)?;
                }

                Instr::Pop => {
                    self.pop()?;
                }
                Instr::Swap => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(b)?;
                    self.push(a)?;
                }

                Instr::Load => {
                    let address = self.pop()?;
                    let value = self.read(address, at)?;
                    self.push(value)?;
                }
                Instr::Store => {
                    let value = self.pop()?;
                    let address = self.pop()?;
                    self.write(address, value, at)?;
                    self.push(value)?;
                }

                Instr::GetBp => self.push(self.bp as Word)?,

                Instr::Goto(target) => self.pc = target,
                Instr::IfZero(target) => {
                    if self.pop()? == 0 {
                        self.pc = target;
                    }
                }
                Instr::IfNotZero(target) => {
                    if self.pop()? != 0 {
                        self.pc = target;
                    }
                }

                Instr::Call { argc, func } => {
                    let entry = self
                        .program
                        .function(func)
                        .ok_or(VmError::InvalidHandle {
                            handle: func.index() as Word,
                            pc: at,
                        })?
                        .entry;
                    self.enter_frame(argc, entry, at)?;
                }
                Instr::CallIndirect { argc } => {
                    let handle = self.pop()?;
                    let index = usize::try_from(handle)
                        .ok()
                        .filter(|index| *index < self.program.functions.len())
                        .ok_or(VmError::InvalidHandle { handle, pc: at })?;
                    let entry = self.program.functions[index].entry;
                    self.enter_frame(argc, entry, at)?;
                }

                Instr::Enter { locals } => {
                    if self.sp + locals > self.stack.len() {
                        return Err(VmError::StackOverflow {
                            pc: at,
                            capacity: self.stack.len(),
                        });
                    }
                    self.sp += locals;
                }

                Instr::Ret => {
                    let result = self.pop()?;
                    if self.bp < 2 {
                        return Err(VmError::StackUnderflow { pc: at });
                    }
                    let return_pc = self.stack[self.bp - 2];
                    let old_bp = self.stack[self.bp - 1];
                    self.sp = self.bp - 1;
                    self.stack[self.sp - 1] = result;
                    self.pc = usize::try_from(return_pc)
                        .map_err(|_| VmError::PcOutOfRange { pc: at })?;
                    self.bp = usize::try_from(old_bp)
                        .map_err(|_| VmError::StackUnderflow { pc: at })?;
                }

                Instr::LoadArg => self.push(self.arg)?,

                Instr::PrintInt => {
                    let value = self.pop()?;
                    self.output.push_str(&value.to_string());
                    self.output.push(' ');
                }
                Instr::PrintLn => self.output.push('\n'),

                Instr::Halt => {
                    let status = if self.sp > 0 { self.stack[self.sp - 1] } else { 0 };
                    debug!("halted after {} instructions, status {}", steps, status);
                    return Ok(Execution {
                        output: self.output,
                        status,
                    });
                }
            }
        }
    }

    /// Build a call frame: shift the arguments up two slots, store the
    /// return address and old frame base beneath them, and jump.
    fn enter_frame(&mut self, argc: usize, entry: usize, at: usize) -> Result<(), VmError> {
        if argc > self.sp {
            return Err(VmError::StackUnderflow { pc: at });
        }
        if self.sp + 2 > self.stack.len() {
            return Err(VmError::StackOverflow {
                pc: at,
                capacity: self.stack.len(),
            });
        }

        for i in 0..argc {
            self.stack[self.sp + 1 - i] = self.stack[self.sp - 1 - i];
        }
        self.stack[self.sp - argc] = self.pc as Word;
        self.stack[self.sp - argc + 1] = self.bp as Word;
        self.bp = self.sp - argc + 2;
        self.sp += 2;
        self.pc = entry;
        Ok(())
    }

    fn push(&mut self, value: Word) -> Result<(), VmError> {
        if self.sp == self.stack.len() {
            return Err(VmError::StackOverflow {
                pc: self.pc,
                capacity: self.stack.len(),
            });
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Word, VmError> {
        if self.sp == 0 {
            return Err(VmError::StackUnderflow { pc: self.pc });
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }

    fn binary(
        &mut self,
        op: impl FnOnce(Word, Word) -> Result<Word, VmError>,
    ) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(op(a, b)?)
    }

    fn read(&self, address: Word, at: usize) -> Result<Word, VmError> {
        let index = usize::try_from(address)
            .ok()
            .filter(|index| *index < self.stack.len())
            .ok_or(VmError::AddressOutOfRange { address, pc: at })?;
        Ok(self.stack[index])
    }

    fn write(&mut self, address: Word, value: Word, at: usize) -> Result<(), VmError> {
        let index = usize::try_from(address)
            .ok()
            .filter(|index| *index < self.stack.len())
            .ok_or(VmError::AddressOutOfRange { address, pc: at })?;
        self.stack[index] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcc_codegen::CompiledFunction;
    use mcc_common::FunctionId;

    fn run_code(code: Vec<Instr>, functions: Vec<CompiledFunction>) -> Result<Execution, VmError> {
        let program = CompiledProgram {
            code,
            functions,
            globals_size: 0,
            entry: FunctionId(0),
        };
        Vm::new(&program, 0, 1024).run()
    }

    #[test]
    fn test_arithmetic_and_halt() {
        let result = run_code(
            vec![
                Instr::Const(6),
                Instr::Const(7),
                Instr::Mul,
                Instr::Halt,
            ],
            vec![],
        )
        .unwrap();
        assert_eq!(result.status, 42);
        assert_eq!(result.output, "");
    }

    #[test]
    fn test_print_format() {
        let result = run_code(
            vec![
                Instr::Const(10),
                Instr::PrintInt,
                Instr::Const(-3),
                Instr::PrintInt,
                Instr::PrintLn,
                Instr::Const(0),
                Instr::Halt,
            ],
            vec![],
        )
        .unwrap();
        assert_eq!(result.output, "10 -3 \n");
    }

    #[test]
    fn test_call_and_return() {
        // Stub calls a function that doubles its argument
        let functions = vec![CompiledFunction {
            name: "double".to_string(),
            entry: 3,
            frame_size: 1,
            param_count: 1,
        }];
        let code = vec![
            Instr::Const(21),
            Instr::Call {
                argc: 1,
                func: FunctionId(0),
            },
            Instr::Halt,
            // double:
            Instr::Enter { locals: 0 },
            Instr::GetBp,
            Instr::Load,
            Instr::Const(2),
            Instr::Mul,
            Instr::Ret,
        ];
        let result = run_code(code, functions).unwrap();
        assert_eq!(result.status, 42);
    }

    #[test]
    fn test_division_by_zero_faults() {
        let result = run_code(
            vec![Instr::Const(1), Instr::Const(0), Instr::Div, Instr::Halt],
            vec![],
        );
        assert_eq!(result, Err(VmError::DivisionByZero { pc: 2 }));
    }

    #[test]
    fn test_wild_address_faults() {
        let result = run_code(
            vec![Instr::Const(-5), Instr::Load, Instr::Halt],
            vec![],
        );
        assert!(matches!(result, Err(VmError::AddressOutOfRange { .. })));
    }

    #[test]
    fn test_bad_function_handle_faults() {
        let result = run_code(
            vec![Instr::Const(99), Instr::CallIndirect { argc: 0 }, Instr::Halt],
            vec![],
        );
        assert!(matches!(result, Err(VmError::InvalidHandle { handle: 99, .. })));
    }

    #[test]
    fn test_deep_recursion_overflows_cleanly() {
        // A function that calls itself forever
        let functions = vec![CompiledFunction {
            name: "spin".to_string(),
            entry: 2,
            frame_size: 0,
            param_count: 0,
        }];
        let code = vec![
            Instr::Call {
                argc: 0,
                func: FunctionId(0),
            },
            Instr::Halt,
            // spin:
            Instr::Enter { locals: 0 },
            Instr::Call {
                argc: 0,
                func: FunctionId(0),
            },
            Instr::Ret,
        ];
        let result = run_code(code, functions);
        assert!(matches!(result, Err(VmError::StackOverflow { .. })));
    }

    #[test]
    fn test_wrapping_arithmetic() {
        let result = run_code(
            vec![
                Instr::Const(Word::MAX),
                Instr::Const(1),
                Instr::Add,
                Instr::Halt,
            ],
            vec![],
        )
        .unwrap();
        assert_eq!(result.status, Word::MIN);
    }

    #[test]
    fn test_store_leaves_value() {
        let result = run_code(
            vec![
                Instr::Const(5), // address (within the 1024-word stack)
                Instr::Const(9),
                Instr::Store,
                Instr::Halt,
            ],
            vec![],
        )
        .unwrap();
        assert_eq!(result.status, 9);
    }
}
