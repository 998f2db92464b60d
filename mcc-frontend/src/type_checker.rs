//! MicroC Type Checker
//!
//! Checks types across the resolved AST and annotates every expression
//! with its static type. Works on the word-sized MicroC type lattice:
//! int, pointers, arrays (which decay to pointers in value position),
//! and function types reached through calls and function pointers.

use crate::ast::*;
use crate::semantic::{SymbolKind, SymbolTable};
use mcc_common::{CompilerError, SourceLocation};

/// Type errors produced by this pass
#[derive(Debug, Clone)]
pub enum TypeCheckError {
    Mismatch {
        expected: String,
        found: Type,
        location: SourceLocation,
    },
    InvalidOperand {
        operation: String,
        operand_type: Type,
        location: SourceLocation,
    },
    NotCallable {
        found: Type,
        location: SourceLocation,
    },
    ArgumentCount {
        expected: usize,
        found: usize,
        location: SourceLocation,
    },
    InvalidLvalue {
        location: SourceLocation,
    },
    InvalidDeclaration {
        message: String,
        location: SourceLocation,
    },
}

impl From<TypeCheckError> for CompilerError {
    fn from(err: TypeCheckError) -> Self {
        match err {
            TypeCheckError::Mismatch {
                expected,
                found,
                location,
            } => CompilerError::type_error(
                format!("Expected {}, found {}", expected, found),
                location,
            ),
            TypeCheckError::InvalidOperand {
                operation,
                operand_type,
                location,
            } => CompilerError::type_error(
                format!("Invalid operand of type {} to {}", operand_type, operation),
                location,
            ),
            TypeCheckError::NotCallable { found, location } => {
                CompilerError::type_error(format!("Cannot call value of type {}", found), location)
            }
            TypeCheckError::ArgumentCount {
                expected,
                found,
                location,
            } => CompilerError::type_error(
                format!("Expected {} arguments, found {}", expected, found),
                location,
            ),
            TypeCheckError::InvalidLvalue { location } => {
                CompilerError::type_error("Expression is not assignable".to_string(), location)
            }
            TypeCheckError::InvalidDeclaration { message, location } => {
                CompilerError::type_error(message, location)
            }
        }
    }
}

/// Type checker over a resolved program
pub struct TypeChecker<'a> {
    symbols: &'a SymbolTable,
    current_return_type: Option<Type>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            current_return_type: None,
        }
    }

    /// Check a whole program, annotating every expression
    pub fn check(&mut self, program: &mut Program) -> Result<(), CompilerError> {
        for item in &mut program.items {
            match item {
                Item::Global(decl) => self.check_declaration(decl)?,
                Item::Function(func) => self.check_function(func)?,
            }
        }
        Ok(())
    }

    fn check_function(&mut self, func: &mut Function) -> Result<(), CompilerError> {
        for param in &func.parameters {
            let adjusted = param.param_type.decayed();
            if !adjusted.is_scalar() {
                return Err(TypeCheckError::InvalidDeclaration {
                    message: format!(
                        "Parameter '{}' has invalid type {}",
                        param.name, param.param_type
                    ),
                    location: param.span.start.clone(),
                }
                .into());
            }
        }

        self.current_return_type = Some(func.return_type.clone());
        let result = self.check_statement(&mut func.body);
        self.current_return_type = None;
        result
    }

    fn check_statement(&mut self, stmt: &mut Statement) -> Result<(), CompilerError> {
        match &mut stmt.kind {
            StatementKind::Expression(expr) => {
                self.check_expression(expr)?;
                Ok(())
            }

            StatementKind::Compound(statements) => {
                for statement in statements {
                    self.check_statement(statement)?;
                }
                Ok(())
            }

            StatementKind::Declaration { declarations } => {
                for decl in declarations {
                    self.check_declaration(decl)?;
                }
                Ok(())
            }

            StatementKind::If {
                condition,
                then_stmt,
                else_stmt,
            } => {
                self.check_condition(condition)?;
                self.check_statement(then_stmt)?;
                if let Some(else_stmt) = else_stmt {
                    self.check_statement(else_stmt)?;
                }
                Ok(())
            }

            StatementKind::While { condition, body } => {
                self.check_condition(condition)?;
                self.check_statement(body)
            }

            StatementKind::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.check_statement(init)?;
                }
                if let Some(condition) = condition {
                    self.check_condition(condition)?;
                }
                if let Some(step) = step {
                    self.check_expression(step)?;
                }
                self.check_statement(body)
            }

            StatementKind::Return(value) => {
                let return_type = self
                    .current_return_type
                    .clone()
                    .unwrap_or(Type::Void);

                match value {
                    Some(expr) => {
                        let value_type = self.check_expression(expr)?;
                        if return_type == Type::Void {
                            return Err(TypeCheckError::Mismatch {
                                expected: "no return value in void function".to_string(),
                                found: value_type,
                                location: expr.span.start.clone(),
                            }
                            .into());
                        }
                        if !return_type.is_assignable_from(&value_type) {
                            return Err(TypeCheckError::Mismatch {
                                expected: format!("return value of type {}", return_type),
                                found: value_type,
                                location: expr.span.start.clone(),
                            }
                            .into());
                        }
                        Ok(())
                    }
                    None => Ok(()),
                }
            }

            StatementKind::Print(expr) => {
                let ty = self.check_expression(expr)?;
                if !ty.decayed().is_scalar() {
                    return Err(TypeCheckError::InvalidOperand {
                        operation: "print".to_string(),
                        operand_type: ty,
                        location: expr.span.start.clone(),
                    }
                    .into());
                }
                Ok(())
            }

            StatementKind::PrintLn | StatementKind::Empty => Ok(()),
        }
    }

    fn check_declaration(&mut self, decl: &mut Declaration) -> Result<(), CompilerError> {
        if !Self::is_declarable(&decl.decl_type) {
            return Err(TypeCheckError::InvalidDeclaration {
                message: format!(
                    "Variable '{}' has invalid type {}",
                    decl.name, decl.decl_type
                ),
                location: decl.span.start.clone(),
            }
            .into());
        }

        if let Some(init) = &mut decl.initializer {
            let init_type = self.check_expression(init)?;
            if !decl.decl_type.is_assignable_from(&init_type) {
                return Err(TypeCheckError::Mismatch {
                    expected: format!("initializer of type {}", decl.decl_type),
                    found: init_type,
                    location: init.span.start.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Variables hold ints, pointers, or arrays of declarable types
    fn is_declarable(ty: &Type) -> bool {
        match ty {
            Type::Int | Type::Pointer(_) => true,
            Type::Array { element_type, .. } => Self::is_declarable(element_type),
            Type::Void | Type::Function { .. } => false,
        }
    }

    fn check_condition(&mut self, expr: &mut Expression) -> Result<(), CompilerError> {
        let ty = self.check_expression(expr)?;
        if !ty.decayed().is_scalar() {
            return Err(TypeCheckError::Mismatch {
                expected: "scalar condition".to_string(),
                found: ty,
                location: expr.span.start.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Check an expression, record and return its type.
    ///
    /// Array-typed expressions keep their array type here. Consumers
    /// that need the value decay it to the element pointer.
    fn check_expression(&mut self, expr: &mut Expression) -> Result<Type, CompilerError> {
        let span_start = expr.span.start.clone();

        let ty = match &mut expr.kind {
            ExpressionKind::IntLiteral(_) => Type::Int,

            ExpressionKind::Identifier { name, symbol_id } => {
                let id = symbol_id.ok_or_else(|| CompilerError::internal(
                    format!("unresolved identifier '{}' reached type checking", name),
                ))?;
                match self.symbols.type_of(id) {
                    Some(ty) => ty.clone(),
                    None => {
                        return Err(CompilerError::internal(format!(
                            "symbol {} missing from symbol table",
                            id
                        )));
                    }
                }
            }

            ExpressionKind::Unary { op, operand } => {
                let operand_type = self.check_expression(operand)?;
                self.check_unary(*op, &operand_type, operand, &span_start)?
            }

            ExpressionKind::Binary { op, left, right } => {
                let left_type = self.check_expression(left)?;
                let right_type = self.check_expression(right)?;
                self.check_binary(*op, &left_type, &right_type, &span_start)?
            }

            ExpressionKind::Index { base, index } => {
                let base_type = self.check_expression(base)?.decayed();
                let index_type = self.check_expression(index)?;

                if index_type != Type::Int {
                    return Err(TypeCheckError::Mismatch {
                        expected: "int index".to_string(),
                        found: index_type,
                        location: index.span.start.clone(),
                    }
                    .into());
                }

                match base_type {
                    Type::Pointer(target) => *target,
                    other => {
                        return Err(TypeCheckError::InvalidOperand {
                            operation: "indexing".to_string(),
                            operand_type: other,
                            location: base.span.start.clone(),
                        }
                        .into());
                    }
                }
            }

            ExpressionKind::Call { callee, arguments } => {
                let callee_type = self.check_expression(callee)?;

                // A call goes through a function type directly or
                // through a function pointer.
                let (return_type, parameters) = match callee_type.clone() {
                    Type::Function {
                        return_type,
                        parameters,
                    } => (*return_type, parameters),
                    Type::Pointer(target) => match *target {
                        Type::Function {
                            return_type,
                            parameters,
                        } => (*return_type, parameters),
                        _ => {
                            return Err(TypeCheckError::NotCallable {
                                found: callee_type,
                                location: callee.span.start.clone(),
                            }
                            .into());
                        }
                    },
                    _ => {
                        return Err(TypeCheckError::NotCallable {
                            found: callee_type,
                            location: callee.span.start.clone(),
                        }
                        .into());
                    }
                };

                if arguments.len() != parameters.len() {
                    return Err(TypeCheckError::ArgumentCount {
                        expected: parameters.len(),
                        found: arguments.len(),
                        location: span_start,
                    }
                    .into());
                }

                for (argument, parameter) in arguments.iter_mut().zip(parameters.iter()) {
                    let argument_type = self.check_expression(argument)?;
                    let parameter_type = parameter.decayed();
                    if !parameter_type.is_assignable_from(&argument_type) {
                        return Err(TypeCheckError::Mismatch {
                            expected: format!("argument of type {}", parameter_type),
                            found: argument_type,
                            location: argument.span.start.clone(),
                        }
                        .into());
                    }
                }

                return_type
            }

            ExpressionKind::Assign { target, value } => {
                let target_type = self.check_expression(target)?;
                let value_type = self.check_expression(value)?;

                if !self.is_lvalue(target) || matches!(target_type, Type::Array { .. }) {
                    return Err(TypeCheckError::InvalidLvalue {
                        location: target.span.start.clone(),
                    }
                    .into());
                }

                if !target_type.is_assignable_from(&value_type) {
                    return Err(TypeCheckError::Mismatch {
                        expected: format!("value of type {}", target_type),
                        found: value_type,
                        location: value.span.start.clone(),
                    }
                    .into());
                }

                target_type
            }
        };

        expr.expr_type = Some(ty.clone());
        Ok(ty)
    }

    fn check_unary(
        &self,
        op: UnaryOp,
        operand_type: &Type,
        operand: &Expression,
        location: &SourceLocation,
    ) -> Result<Type, CompilerError> {
        match op {
            UnaryOp::Negate => {
                if *operand_type != Type::Int {
                    return Err(TypeCheckError::InvalidOperand {
                        operation: "unary minus".to_string(),
                        operand_type: operand_type.clone(),
                        location: location.clone(),
                    }
                    .into());
                }
                Ok(Type::Int)
            }

            UnaryOp::LogicalNot => {
                if !operand_type.decayed().is_scalar() {
                    return Err(TypeCheckError::InvalidOperand {
                        operation: "logical not".to_string(),
                        operand_type: operand_type.clone(),
                        location: location.clone(),
                    }
                    .into());
                }
                Ok(Type::Int)
            }

            UnaryOp::Dereference => match operand_type.decayed() {
                Type::Pointer(target) => Ok(*target),
                other => Err(TypeCheckError::InvalidOperand {
                    operation: "dereference".to_string(),
                    operand_type: other,
                    location: location.clone(),
                }
                .into()),
            },

            UnaryOp::AddressOf => {
                // Function designators may be taken by address too
                let is_function = matches!(operand_type, Type::Function { .. });
                if !self.is_lvalue(operand) && !is_function {
                    return Err(TypeCheckError::InvalidLvalue {
                        location: location.clone(),
                    }
                    .into());
                }
                Ok(Type::Pointer(Box::new(operand_type.clone())))
            }
        }
    }

    fn check_binary(
        &self,
        op: BinaryOp,
        left_type: &Type,
        right_type: &Type,
        location: &SourceLocation,
    ) -> Result<Type, CompilerError> {
        let left = left_type.decayed();
        let right = right_type.decayed();

        let invalid = |side_type: &Type| -> CompilerError {
            TypeCheckError::InvalidOperand {
                operation: format!("operator {}", op),
                operand_type: side_type.clone(),
                location: location.clone(),
            }
            .into()
        };

        match op {
            BinaryOp::Add => match (&left, &right) {
                (Type::Int, Type::Int) => Ok(Type::Int),
                (Type::Pointer(_), Type::Int) => Ok(left),
                (Type::Int, Type::Pointer(_)) => Ok(right),
                _ => Err(invalid(left_type)),
            },

            BinaryOp::Sub => match (&left, &right) {
                (Type::Int, Type::Int) => Ok(Type::Int),
                (Type::Pointer(_), Type::Int) => Ok(left),
                (Type::Pointer(a), Type::Pointer(b)) if a == b => Ok(Type::Int),
                _ => Err(invalid(left_type)),
            },

            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                if left == Type::Int && right == Type::Int {
                    Ok(Type::Int)
                } else if left == Type::Int {
                    Err(invalid(right_type))
                } else {
                    Err(invalid(left_type))
                }
            }

            BinaryOp::Equal | BinaryOp::NotEqual => {
                // Pointers compare against pointers of the same type
                // or against plain ints (null tests).
                let comparable = left == right
                    || (left.is_pointer() && right == Type::Int)
                    || (left == Type::Int && right.is_pointer());
                if comparable && left.is_scalar() && right.is_scalar() {
                    Ok(Type::Int)
                } else {
                    Err(invalid(left_type))
                }
            }

            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                let comparable =
                    (left == Type::Int && right == Type::Int) || (left.is_pointer() && left == right);
                if comparable {
                    Ok(Type::Int)
                } else {
                    Err(invalid(left_type))
                }
            }

            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                if left.is_scalar() && right.is_scalar() {
                    Ok(Type::Int)
                } else if left.is_scalar() {
                    Err(invalid(right_type))
                } else {
                    Err(invalid(left_type))
                }
            }
        }
    }

    /// An lvalue names a storage location
    fn is_lvalue(&self, expr: &Expression) -> bool {
        match &expr.kind {
            ExpressionKind::Identifier { symbol_id, .. } => symbol_id
                .and_then(|id| self.symbols.get(id))
                .map(|symbol| symbol.kind != SymbolKind::Function)
                .unwrap_or(false),
            ExpressionKind::Unary {
                op: UnaryOp::Dereference,
                ..
            } => true,
            ExpressionKind::Index { .. } => true,
            _ => false,
        }
    }
}
