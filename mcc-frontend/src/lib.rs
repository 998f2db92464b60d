//! MicroC Compiler Frontend
//!
//! Lexical analysis, parsing, symbol resolution, and type checking for
//! MicroC source code. The output of [`Frontend::analyze_source`] is a
//! fully resolved and typed AST, ready for code generation.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod type_checker;

pub use ast::{
    BinaryOp, Declaration, Expression, ExpressionKind, Function, Item, Parameter, Program,
    Statement, StatementKind, Type, UnaryOp,
};
pub use lexer::{Lexer, Token, TokenType};
pub use parser::Parser;
pub use semantic::{Resolver, Symbol, SymbolKind, SymbolTable};
pub use type_checker::TypeChecker;

use log::debug;
use mcc_common::CompilerError;

/// Frontend pipeline facade
pub struct Frontend;

impl Frontend {
    /// Tokenize source code
    pub fn tokenize_source(source: &str) -> Result<Vec<Token>, CompilerError> {
        Lexer::new(source).tokenize()
    }

    /// Tokenize and parse source code
    pub fn parse_source(source: &str) -> Result<Program, CompilerError> {
        let tokens = Self::tokenize_source(source)?;
        Parser::new(tokens).parse_program()
    }

    /// Run the full frontend: lex, parse, resolve, and type check
    pub fn analyze_source(source: &str) -> Result<(Program, SymbolTable), CompilerError> {
        let mut program = Self::parse_source(source)?;
        let table = Resolver::new().resolve(&mut program)?;
        TypeChecker::new(&table).check(&mut program)?;
        debug!(
            "analyzed {} top-level items, {} symbols",
            program.items.len(),
            table.iter().count()
        );
        Ok((program, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_pipeline() {
        let source = "
int r;

int fac(int n) {
    if (n == 0)
        return 1;
    else
        return n * fac(n - 1);
}

void main(int n) {
    int i;
    i = 0;
    while (i < n) {
        r = fac(i);
        print r;
        i = i + 1;
    }
}";
        let (program, table) = Frontend::analyze_source(source).unwrap();
        assert_eq!(program.items.len(), 3);
        assert_eq!(table.iter().count(), 6); // r, fac, fac.n, main, main.n, i
    }

    #[test]
    fn test_errors_carry_positions() {
        let err = Frontend::analyze_source("int main(int n) {\n  return missing;\n}")
            .unwrap_err();
        match err {
            CompilerError::UndefinedSymbolError { location, .. } => {
                assert_eq!(location.line, 2);
            }
            other => panic!("Expected undefined symbol error, got {:?}", other),
        }
    }

    #[test]
    fn test_phases_stop_at_first_failure() {
        // A lex error surfaces even though the rest would not parse
        let err = Frontend::analyze_source("int main(int n) { $ }").unwrap_err();
        assert!(matches!(err, CompilerError::LexError { .. }));
    }
}
