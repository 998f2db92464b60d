//! MicroC Execution Engine
//!
//! Stack-machine interpreter for compiled MicroC programs, plus the
//! [`Engine`] driver that runs the full source-to-output pipeline.

pub mod engine;
pub mod vm;

pub use engine::{Engine, EngineError, EngineOptions, ExitMode};
pub use vm::{Execution, Vm, VmError, DEFAULT_STACK_WORDS};
