//! MicroC JIT - Common Types and Utilities
//!
//! This crate contains shared types, error definitions, and utilities
//! used across all components of the MicroC compile-and-execute engine.

pub mod error;
pub mod source_loc;
pub mod types;

pub use error::{CompilerError, COMPILE_FAILURE_STATUS, RUNTIME_FAILURE_STATUS};
pub use source_loc::{SourceLocation, SourceSpan};
pub use types::*;
