//! Abstract Syntax Tree definitions for MicroC
//!
//! This module defines the AST nodes that represent MicroC language
//! constructs. The AST is built by the parser, annotated with symbol
//! bindings by the resolver and with types by the type checker, and
//! finally consumed by code generation.

use mcc_common::{SourceSpan, SymbolId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for AST nodes (useful for debugging and analysis)
pub type NodeId = u32;

/// MicroC type system: one integer width, pointers, sized arrays and
/// function types. A function pointer is `Pointer(Function { .. })`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    /// The native machine word
    Int,

    /// Void (function returns only)
    Void,

    /// Pointer to another type
    Pointer(Box<Type>),

    /// Array type with a fixed size
    Array {
        element_type: Box<Type>,
        size: u64,
    },

    /// Function type
    Function {
        return_type: Box<Type>,
        parameters: Vec<Type>,
    },
}

impl Type {
    /// Get the storage size of this type in machine words
    pub fn size_in_words(&self) -> u64 {
        match self {
            Type::Int | Type::Pointer(_) => 1,
            Type::Array { element_type, size } => element_type.size_in_words() * size,
            // Functions have no storage; a handle to one is a single word
            Type::Void | Type::Function { .. } => 0,
        }
    }

    /// Check if values of this type fit in a single word
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Int | Type::Pointer(_))
    }

    /// Check if type is pointer-like (pointer, or array that decays to one)
    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_) | Type::Array { .. })
    }

    /// Get pointer target / array element type
    pub fn pointer_target(&self) -> Option<&Type> {
        match self {
            Type::Pointer(target) => Some(target),
            Type::Array { element_type, .. } => Some(element_type),
            _ => None,
        }
    }

    /// The type this expression takes on when used as a value: arrays
    /// decay to a pointer to their first element, function designators
    /// decay to function pointers, everything else is unchanged.
    pub fn decayed(&self) -> Type {
        match self {
            Type::Array { element_type, .. } => Type::Pointer(element_type.clone()),
            Type::Function { .. } => Type::Pointer(Box::new(self.clone())),
            other => other.clone(),
        }
    }

    /// Check if a value of type `other` can be assigned to storage of
    /// this type (or passed for a parameter of this type)
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        *self == other.decayed()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Void => write!(f, "void"),
            Type::Pointer(target) => write!(f, "{}*", target),
            Type::Array { element_type, size } => write!(f, "{}[{}]", element_type, size),
            Type::Function { return_type, parameters } => {
                write!(f, "{} (", return_type)?;
                for (i, param) in parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod,

    // Comparison
    Equal, NotEqual, Less, LessEqual, Greater, GreaterEqual,

    // Logical (short-circuit)
    LogicalAnd, LogicalOr,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        };
        write!(f, "{}", op_str)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    Dereference,
    AddressOf,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            UnaryOp::Negate => "-",
            UnaryOp::LogicalNot => "!",
            UnaryOp::Dereference => "*",
            UnaryOp::AddressOf => "&",
        };
        write!(f, "{}", op_str)
    }
}

/// AST Expression nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub node_id: NodeId,
    pub kind: ExpressionKind,
    pub span: SourceSpan,
    pub expr_type: Option<Type>, // Filled during type checking
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpressionKind {
    /// Integer literal
    IntLiteral(i64),

    /// Identifier reference
    Identifier {
        name: String,
        symbol_id: Option<SymbolId>, // Filled during resolution
    },

    /// Unary operation
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// Binary operation
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// Array indexing: `base[index]`, equivalent to `*(base + index)`
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },

    /// Function call, direct or through a function-pointer value
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },

    /// Assignment; itself value-producing (the assigned value)
    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
    },
}

/// AST Statement nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub node_id: NodeId,
    pub kind: StatementKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementKind {
    /// Expression statement
    Expression(Expression),

    /// Compound statement (block); owns a lexical scope
    Compound(Vec<Statement>),

    /// Variable declarations (one statement may declare several)
    Declaration {
        declarations: Vec<Declaration>,
    },

    /// If statement
    If {
        condition: Expression,
        then_stmt: Box<Statement>,
        else_stmt: Option<Box<Statement>>,
    },

    /// While loop
    While {
        condition: Expression,
        body: Box<Statement>,
    },

    /// For loop; the header opens its own scope
    For {
        init: Option<Box<Statement>>, // Declaration or expression
        condition: Option<Expression>,
        step: Option<Expression>,
        body: Box<Statement>,
    },

    /// Return statement
    Return(Option<Expression>),

    /// `print e;` - the output primitive
    Print(Expression),

    /// `println;` - newline through the output primitive
    PrintLn,

    /// Empty statement (just a semicolon)
    Empty,
}

/// Variable declaration (local or global)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub node_id: NodeId,
    pub name: String,
    pub decl_type: Type,
    pub initializer: Option<Expression>,
    pub span: SourceSpan,
    pub symbol_id: Option<SymbolId>, // Filled during resolution
}

/// Function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub node_id: NodeId,
    pub name: String,
    pub return_type: Type,
    pub parameters: Vec<Parameter>,
    pub body: Statement,
    pub span: SourceSpan,
    pub symbol_id: Option<SymbolId>, // Filled during resolution
}

impl Function {
    /// The function type of this definition (parameter arrays decayed)
    pub fn function_type(&self) -> Type {
        Type::Function {
            return_type: Box::new(self.return_type.clone()),
            parameters: self
                .parameters
                .iter()
                .map(|p| p.param_type.decayed())
                .collect(),
        }
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub node_id: NodeId,
    pub name: String,
    pub param_type: Type,
    pub span: SourceSpan,
    pub symbol_id: Option<SymbolId>, // Filled during resolution
}

/// Top-level program: functions and globals in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub node_id: NodeId,
    pub items: Vec<Item>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    /// Function definition
    Function(Function),

    /// Global variable declaration
    Global(Declaration),
}

impl Program {
    /// Iterate over the function definitions in declaration order
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(func) => Some(func),
            Item::Global(_) => None,
        })
    }
}

/// Node ID generator for AST nodes
#[derive(Debug, Clone, Default)]
pub struct NodeIdGenerator {
    next_id: NodeId,
}

impl NodeIdGenerator {
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    pub fn next(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
