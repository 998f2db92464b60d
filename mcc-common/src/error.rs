//! Error handling for the MicroC engine
//!
//! This module defines the compile-time error taxonomy shared by all
//! phases. Every variant carries a source position; all of them abort
//! the current invocation before any program code runs.

use crate::source_loc::SourceLocation;
use thiserror::Error;

/// Process exit status reserved for compiler failures
pub const COMPILE_FAILURE_STATUS: i32 = 101;

/// Process exit status for fatal runtime traps (resource exhaustion etc.)
pub const RUNTIME_FAILURE_STATUS: i32 = 102;

/// Main compiler error type that encompasses all phases of compilation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilerError {
    #[error("Lexical error at {location}: {message}")]
    LexError {
        location: SourceLocation,
        message: String,
    },

    #[error("Parse error at {location}: {message}")]
    ParseError {
        location: SourceLocation,
        message: String,
    },

    #[error("Redeclaration error at {location}: {message}")]
    RedeclarationError {
        location: SourceLocation,
        message: String,
    },

    #[error("Undefined symbol at {location}: {message}")]
    UndefinedSymbolError {
        location: SourceLocation,
        message: String,
    },

    #[error("Type error at {location}: {message}")]
    TypeError {
        location: SourceLocation,
        message: String,
    },

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("Internal compiler error: {message}")]
    InternalError { message: String },
}

impl CompilerError {
    /// Create a lexer error
    pub fn lex_error(message: String, location: SourceLocation) -> Self {
        CompilerError::LexError { location, message }
    }

    /// Create a parse error
    pub fn parse_error(message: String, location: SourceLocation) -> Self {
        CompilerError::ParseError { location, message }
    }

    /// Create a redeclaration error
    pub fn redeclaration_error(message: String, location: SourceLocation) -> Self {
        CompilerError::RedeclarationError { location, message }
    }

    /// Create an undefined-symbol error
    pub fn undefined_symbol(message: String, location: SourceLocation) -> Self {
        CompilerError::UndefinedSymbolError { location, message }
    }

    /// Create a type error
    pub fn type_error(message: String, location: SourceLocation) -> Self {
        CompilerError::TypeError { location, message }
    }

    /// Create an internal compiler error
    pub fn internal(message: String) -> Self {
        CompilerError::InternalError { message }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for CompilerError {
    fn from(err: std::io::Error) -> Self {
        CompilerError::IoError {
            message: err.to_string(),
        }
    }
}
