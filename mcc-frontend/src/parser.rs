//! MicroC Recursive Descent Parser
//!
//! Parses MicroC tokens into an Abstract Syntax Tree (AST).
//! One method per grammar production, with expression methods
//! stratified by precedence level.

use crate::ast::*;
use crate::lexer::{Token, TokenType};
use mcc_common::{CompilerError, SourceLocation, SourceSpan};
use std::collections::VecDeque;

/// Parse error types specific to the parser
#[derive(Debug, Clone)]
pub enum ParseError {
    UnexpectedToken {
        expected: String,
        found: Token,
    },
    UnexpectedEndOfFile {
        expected: String,
        location: SourceLocation,
    },
    InvalidExpression {
        message: String,
        location: SourceLocation,
    },
    InvalidType {
        message: String,
        location: SourceLocation,
    },
}

impl From<ParseError> for CompilerError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::UnexpectedToken { expected, found } => CompilerError::parse_error(
                format!("Expected {}, found {}", expected, found.token_type),
                found.span.start,
            ),
            ParseError::UnexpectedEndOfFile { expected, location } => CompilerError::parse_error(
                format!("Unexpected end of file, expected {}", expected),
                location,
            ),
            ParseError::InvalidExpression { message, location } => {
                CompilerError::parse_error(message, location)
            }
            ParseError::InvalidType { message, location } => {
                CompilerError::parse_error(message, location)
            }
        }
    }
}

/// A declarator suffix, recorded in source order and applied
/// outermost-first
enum DeclaratorSuffix {
    Array(u64),
    Function(Vec<Type>),
}

/// MicroC Parser
pub struct Parser {
    tokens: VecDeque<Token>,
    node_id_gen: NodeIdGenerator,
    // Parameter names collected while parsing a function declarator
    last_function_params: Option<Vec<(String, Type, SourceSpan)>>,
}

impl Parser {
    /// Create a new parser
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
            node_id_gen: NodeIdGenerator::new(),
            last_function_params: None,
        }
    }

    /// Peek at current token without consuming
    fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    /// Peek ahead n tokens
    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(offset)
    }

    /// Get current token and advance
    fn advance(&mut self) -> Option<Token> {
        self.tokens.pop_front()
    }

    /// Check if current token matches expected type
    fn check(&self, token_type: &TokenType) -> bool {
        if let Some(token) = self.peek() {
            std::mem::discriminant(&token.token_type) == std::mem::discriminant(token_type)
        } else {
            matches!(token_type, TokenType::EndOfFile)
        }
    }

    /// Consume token if it matches expected type
    fn match_token(&mut self, token_type: &TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect and consume a specific token type
    fn expect(&mut self, token_type: TokenType, context: &str) -> Result<Token, ParseError> {
        if let Some(token) = self.advance() {
            if std::mem::discriminant(&token.token_type) == std::mem::discriminant(&token_type) {
                Ok(token)
            } else {
                Err(ParseError::UnexpectedToken {
                    expected: format!("{} in {}", token_type, context),
                    found: token,
                })
            }
        } else {
            Err(ParseError::UnexpectedEndOfFile {
                expected: format!("{} in {}", token_type, context),
                location: SourceLocation::new_simple(0, 0),
            })
        }
    }

    /// Get current location for error reporting
    fn current_location(&self) -> SourceLocation {
        if let Some(token) = self.peek() {
            token.span.start.clone()
        } else {
            SourceLocation::new_simple(0, 0)
        }
    }

    /// Parse a complete program
    pub fn parse_program(&mut self) -> Result<Program, CompilerError> {
        let start_location = self.current_location();
        let mut items = Vec::new();

        while !self.check(&TokenType::EndOfFile) {
            items.push(self.parse_top_level_item()?);
        }

        let end_location = self.current_location();

        Ok(Program {
            node_id: self.node_id_gen.next(),
            items,
            span: SourceSpan::new(start_location, end_location),
        })
    }

    /// Parse a top-level item (function definition or global declaration)
    fn parse_top_level_item(&mut self) -> Result<Item, CompilerError> {
        let start_location = self.current_location();
        let base_type = self.parse_type_specifier()?;
        let (name, full_type) = self.parse_declarator(base_type)?;

        if name.is_empty() {
            return Err(ParseError::InvalidType {
                message: "Expected name in declaration".to_string(),
                location: start_location,
            }
            .into());
        }

        // A function declarator followed by a body is a definition
        if let Type::Function { .. } = full_type {
            if self.check(&TokenType::LeftBrace) {
                return Ok(Item::Function(self.parse_function_definition(
                    name,
                    full_type,
                    start_location,
                )?));
            }
        }

        let declaration = self.parse_global_declaration(name, full_type, start_location)?;
        Ok(Item::Global(declaration))
    }

    /// Parse type specifier (int or void)
    fn parse_type_specifier(&mut self) -> Result<Type, CompilerError> {
        let location = self.current_location();

        match self.peek().map(|t| &t.token_type) {
            Some(TokenType::Int) => {
                self.advance();
                Ok(Type::Int)
            }
            Some(TokenType::Void) => {
                self.advance();
                Ok(Type::Void)
            }
            Some(other) => Err(ParseError::InvalidType {
                message: format!("Expected type specifier, found {}", other),
                location,
            }
            .into()),
            None => Err(ParseError::UnexpectedEndOfFile {
                expected: "type specifier".to_string(),
                location,
            }
            .into()),
        }
    }

    /// Parse a declarator: pointer prefix followed by direct declarator
    fn parse_declarator(&mut self, base_type: Type) -> Result<(String, Type), CompilerError> {
        let mut current_type = base_type;
        while self.match_token(&TokenType::Star) {
            current_type = Type::Pointer(Box::new(current_type));
        }

        self.parse_direct_declarator(current_type)
    }

    /// Parse direct declarator: identifier or parenthesized pointer
    /// declarator, followed by array/function suffixes.
    ///
    /// The parenthesized form binds the pointer after the suffixes, so
    /// `int (*p)[10]` is a pointer to an array and `int (*f)(int)` is a
    /// pointer to a function. The name may be omitted, as in an unnamed
    /// parameter type; callers that require one reject the empty name.
    fn parse_direct_declarator(&mut self, base_type: Type) -> Result<(String, Type), CompilerError> {
        let (name, paren_stars) = if self.check(&TokenType::LeftParen) {
            self.advance();
            let mut stars = 0;
            while self.match_token(&TokenType::Star) {
                stars += 1;
            }
            if stars == 0 {
                return Err(ParseError::InvalidType {
                    message: "Expected '*' in parenthesized declarator".to_string(),
                    location: self.current_location(),
                }
                .into());
            }
            let name = if let Some(Token { token_type: TokenType::Identifier(name), .. }) = self.advance() {
                name
            } else {
                return Err(ParseError::InvalidType {
                    message: "Expected identifier in parenthesized declarator".to_string(),
                    location: self.current_location(),
                }.into());
            };
            self.expect(TokenType::RightParen, "parenthesized declarator")?;
            (name, stars)
        } else if matches!(
            self.peek().map(|t| &t.token_type),
            Some(TokenType::Identifier(_))
        ) {
            if let Some(Token { token_type: TokenType::Identifier(name), .. }) = self.advance() {
                (name, 0)
            } else {
                (String::new(), 0)
            }
        } else {
            (String::new(), 0)
        };

        let mut suffixes = Vec::new();

        loop {
            if self.match_token(&TokenType::LeftBracket) {
                let size_token = self.expect(TokenType::IntLiteral(0), "array declarator")?;
                let size = match size_token.token_type {
                    TokenType::IntLiteral(size) if size > 0 => size as u64,
                    _ => {
                        return Err(ParseError::InvalidType {
                            message: "Array size must be positive".to_string(),
                            location: size_token.span.start,
                        }
                        .into());
                    }
                };
                self.expect(TokenType::RightBracket, "array declarator")?;

                suffixes.push(DeclaratorSuffix::Array(size));
            } else if self.match_token(&TokenType::LeftParen) {
                let mut parameter_types = Vec::new();
                let mut parameter_info = Vec::new();

                if !self.check(&TokenType::RightParen) {
                    loop {
                        // A lone void parameter list means no parameters
                        if parameter_types.is_empty()
                            && self.check(&TokenType::Void)
                            && matches!(
                                self.peek_at(1).map(|t| &t.token_type),
                                Some(TokenType::RightParen)
                            )
                        {
                            self.advance();
                            break;
                        }

                        let param_start = self.current_location();
                        let param_base = self.parse_type_specifier()?;
                        let (param_name, param_type) = self.parse_declarator(param_base)?;
                        let param_end = self.current_location();

                        parameter_types.push(param_type.clone());
                        parameter_info.push((
                            param_name,
                            param_type,
                            SourceSpan::new(param_start, param_end),
                        ));

                        if !self.match_token(&TokenType::Comma) {
                            break;
                        }
                    }
                }

                self.expect(TokenType::RightParen, "function declarator")?;

                self.last_function_params = Some(parameter_info);

                suffixes.push(DeclaratorSuffix::Function(parameter_types));
            } else {
                break;
            }
        }

        // The first suffix binds outermost: int m[3][4] is an array of
        // 3 arrays of 4 ints, so the suffixes fold right to left.
        let mut current_type = base_type;
        for suffix in suffixes.into_iter().rev() {
            current_type = match suffix {
                DeclaratorSuffix::Array(size) => Type::Array {
                    element_type: Box::new(current_type),
                    size,
                },
                DeclaratorSuffix::Function(parameters) => Type::Function {
                    return_type: Box::new(current_type),
                    parameters,
                },
            };
        }

        // Stars inside the parentheses apply outside the suffixes
        for _ in 0..paren_stars {
            current_type = Type::Pointer(Box::new(current_type));
        }

        Ok((name, current_type))
    }

    /// Parse function definition body and assemble the definition
    fn parse_function_definition(
        &mut self,
        name: String,
        func_type: Type,
        start_location: SourceLocation,
    ) -> Result<Function, CompilerError> {
        let return_type = match func_type {
            Type::Function { return_type, .. } => *return_type,
            _ => {
                return Err(ParseError::InvalidType {
                    message: "Expected function type".to_string(),
                    location: start_location,
                }
                .into());
            }
        };

        if let Type::Function { .. } = return_type {
            return Err(ParseError::InvalidType {
                message: format!("Function '{}' cannot return a function", name),
                location: start_location,
            }
            .into());
        }

        let parameters = if let Some(param_info) = self.last_function_params.take() {
            param_info
                .into_iter()
                .map(|(name, param_type, span)| Parameter {
                    node_id: self.node_id_gen.next(),
                    name,
                    param_type,
                    span,
                    symbol_id: None,
                })
                .collect()
        } else {
            Vec::new()
        };

        // Parameter types may be unnamed, definitions may not
        if let Some(unnamed) = parameters.iter().find(|param| param.name.is_empty()) {
            return Err(ParseError::InvalidType {
                message: format!("Parameter name omitted in definition of '{}'", name),
                location: unnamed.span.start.clone(),
            }
            .into());
        }

        let body = self.parse_compound_statement()?;
        let end_location = self.current_location();

        Ok(Function {
            node_id: self.node_id_gen.next(),
            name,
            return_type,
            parameters,
            body,
            span: SourceSpan::new(start_location, end_location),
            symbol_id: None,
        })
    }

    /// Parse a global declaration (first declarator already consumed)
    fn parse_global_declaration(
        &mut self,
        name: String,
        decl_type: Type,
        start_location: SourceLocation,
    ) -> Result<Declaration, CompilerError> {
        let initializer = if self.match_token(&TokenType::Equal) {
            Some(self.parse_assignment_expression()?)
        } else {
            None
        };

        self.expect(TokenType::Semicolon, "global declaration")?;
        let end_location = self.current_location();

        Ok(Declaration {
            node_id: self.node_id_gen.next(),
            name,
            decl_type,
            initializer,
            span: SourceSpan::new(start_location, end_location),
            symbol_id: None,
        })
    }

    // ========== Statements ==========

    /// Parse a statement
    pub fn parse_statement(&mut self) -> Result<Statement, CompilerError> {
        let start_location = self.current_location();

        match self.peek().map(|t| &t.token_type) {
            Some(TokenType::LeftBrace) => self.parse_compound_statement(),
            Some(TokenType::If) => self.parse_if_statement(),
            Some(TokenType::While) => self.parse_while_statement(),
            Some(TokenType::For) => self.parse_for_statement(),
            Some(TokenType::Return) => self.parse_return_statement(),
            Some(TokenType::Print) => self.parse_print_statement(),
            Some(TokenType::Println) => {
                self.advance();
                self.expect(TokenType::Semicolon, "println statement")?;
                let end_location = self.current_location();
                Ok(Statement {
                    node_id: self.node_id_gen.next(),
                    kind: StatementKind::PrintLn,
                    span: SourceSpan::new(start_location, end_location),
                })
            }
            Some(TokenType::Int) | Some(TokenType::Void) => self.parse_declaration_statement(),
            Some(TokenType::Semicolon) => {
                self.advance();
                let end_location = self.current_location();
                Ok(Statement {
                    node_id: self.node_id_gen.next(),
                    kind: StatementKind::Empty,
                    span: SourceSpan::new(start_location, end_location),
                })
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// Parse compound statement (block)
    fn parse_compound_statement(&mut self) -> Result<Statement, CompilerError> {
        let start_location = self.current_location();
        self.expect(TokenType::LeftBrace, "compound statement")?;

        let mut statements = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.check(&TokenType::EndOfFile) {
            statements.push(self.parse_statement()?);
        }

        self.expect(TokenType::RightBrace, "compound statement")?;
        let end_location = self.current_location();

        Ok(Statement {
            node_id: self.node_id_gen.next(),
            kind: StatementKind::Compound(statements),
            span: SourceSpan::new(start_location, end_location),
        })
    }

    /// Parse a local declaration statement (one or more declarators)
    fn parse_declaration_statement(&mut self) -> Result<Statement, CompilerError> {
        let start_location = self.current_location();
        let base_type = self.parse_type_specifier()?;

        let mut declarations = Vec::new();
        loop {
            let decl_start = self.current_location();
            let (name, decl_type) = self.parse_declarator(base_type.clone())?;

            if name.is_empty() {
                return Err(ParseError::InvalidType {
                    message: "Expected name in declaration".to_string(),
                    location: decl_start,
                }
                .into());
            }

            let initializer = if self.match_token(&TokenType::Equal) {
                Some(self.parse_assignment_expression()?)
            } else {
                None
            };

            let decl_end = self.current_location();
            declarations.push(Declaration {
                node_id: self.node_id_gen.next(),
                name,
                decl_type,
                initializer,
                span: SourceSpan::new(decl_start, decl_end),
                symbol_id: None,
            });

            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }

        self.expect(TokenType::Semicolon, "declaration")?;
        let end_location = self.current_location();

        Ok(Statement {
            node_id: self.node_id_gen.next(),
            kind: StatementKind::Declaration { declarations },
            span: SourceSpan::new(start_location, end_location),
        })
    }

    /// Parse if statement
    fn parse_if_statement(&mut self) -> Result<Statement, CompilerError> {
        let start_location = self.current_location();
        self.expect(TokenType::If, "if statement")?;
        self.expect(TokenType::LeftParen, "if statement")?;
        let condition = self.parse_expression()?;
        self.expect(TokenType::RightParen, "if statement")?;

        let then_stmt = Box::new(self.parse_statement()?);
        let else_stmt = if self.match_token(&TokenType::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        let end_location = self.current_location();
        Ok(Statement {
            node_id: self.node_id_gen.next(),
            kind: StatementKind::If {
                condition,
                then_stmt,
                else_stmt,
            },
            span: SourceSpan::new(start_location, end_location),
        })
    }

    /// Parse while statement
    fn parse_while_statement(&mut self) -> Result<Statement, CompilerError> {
        let start_location = self.current_location();
        self.expect(TokenType::While, "while statement")?;
        self.expect(TokenType::LeftParen, "while statement")?;
        let condition = self.parse_expression()?;
        self.expect(TokenType::RightParen, "while statement")?;
        let body = Box::new(self.parse_statement()?);

        let end_location = self.current_location();
        Ok(Statement {
            node_id: self.node_id_gen.next(),
            kind: StatementKind::While { condition, body },
            span: SourceSpan::new(start_location, end_location),
        })
    }

    /// Parse for statement
    fn parse_for_statement(&mut self) -> Result<Statement, CompilerError> {
        let start_location = self.current_location();
        self.expect(TokenType::For, "for statement")?;
        self.expect(TokenType::LeftParen, "for statement")?;

        // Init clause: declaration, expression statement, or empty
        let init = match self.peek().map(|t| &t.token_type) {
            Some(TokenType::Semicolon) => {
                self.advance();
                None
            }
            Some(TokenType::Int) | Some(TokenType::Void) => {
                Some(Box::new(self.parse_declaration_statement()?))
            }
            _ => Some(Box::new(self.parse_expression_statement()?)),
        };

        let condition = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenType::Semicolon, "for statement")?;

        let step = if self.check(&TokenType::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenType::RightParen, "for statement")?;

        let body = Box::new(self.parse_statement()?);
        let end_location = self.current_location();

        Ok(Statement {
            node_id: self.node_id_gen.next(),
            kind: StatementKind::For {
                init,
                condition,
                step,
                body,
            },
            span: SourceSpan::new(start_location, end_location),
        })
    }

    /// Parse return statement
    fn parse_return_statement(&mut self) -> Result<Statement, CompilerError> {
        let start_location = self.current_location();
        self.expect(TokenType::Return, "return statement")?;

        let value = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        self.expect(TokenType::Semicolon, "return statement")?;
        let end_location = self.current_location();

        Ok(Statement {
            node_id: self.node_id_gen.next(),
            kind: StatementKind::Return(value),
            span: SourceSpan::new(start_location, end_location),
        })
    }

    /// Parse print statement
    fn parse_print_statement(&mut self) -> Result<Statement, CompilerError> {
        let start_location = self.current_location();
        self.expect(TokenType::Print, "print statement")?;
        let value = self.parse_expression()?;
        self.expect(TokenType::Semicolon, "print statement")?;
        let end_location = self.current_location();

        Ok(Statement {
            node_id: self.node_id_gen.next(),
            kind: StatementKind::Print(value),
            span: SourceSpan::new(start_location, end_location),
        })
    }

    /// Parse expression statement
    fn parse_expression_statement(&mut self) -> Result<Statement, CompilerError> {
        let start_location = self.current_location();
        let expression = self.parse_expression()?;
        self.expect(TokenType::Semicolon, "expression statement")?;
        let end_location = self.current_location();

        Ok(Statement {
            node_id: self.node_id_gen.next(),
            kind: StatementKind::Expression(expression),
            span: SourceSpan::new(start_location, end_location),
        })
    }

    // ========== Expressions ==========

    /// Parse a full expression
    pub fn parse_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_assignment_expression()
    }

    /// Parse assignment expression (right-associative)
    fn parse_assignment_expression(&mut self) -> Result<Expression, CompilerError> {
        let left = self.parse_logical_or_expression()?;

        if self.match_token(&TokenType::Equal) {
            let value = self.parse_assignment_expression()?;
            let span = SourceSpan::new(left.span.start.clone(), value.span.end.clone());

            return Ok(Expression {
                node_id: self.node_id_gen.next(),
                kind: ExpressionKind::Assign {
                    target: Box::new(left),
                    value: Box::new(value),
                },
                span,
                expr_type: None,
            });
        }

        Ok(left)
    }

    /// Parse logical OR expression
    fn parse_logical_or_expression(&mut self) -> Result<Expression, CompilerError> {
        let mut left = self.parse_logical_and_expression()?;

        while self.match_token(&TokenType::PipePipe) {
            let right = self.parse_logical_and_expression()?;
            left = self.make_binary(BinaryOp::LogicalOr, left, right);
        }

        Ok(left)
    }

    /// Parse logical AND expression
    fn parse_logical_and_expression(&mut self) -> Result<Expression, CompilerError> {
        let mut left = self.parse_equality_expression()?;

        while self.match_token(&TokenType::AmpersandAmpersand) {
            let right = self.parse_equality_expression()?;
            left = self.make_binary(BinaryOp::LogicalAnd, left, right);
        }

        Ok(left)
    }

    /// Parse equality expression
    fn parse_equality_expression(&mut self) -> Result<Expression, CompilerError> {
        let mut left = self.parse_relational_expression()?;

        loop {
            let op = match self.peek().map(|t| &t.token_type) {
                Some(TokenType::EqualEqual) => BinaryOp::Equal,
                Some(TokenType::BangEqual) => BinaryOp::NotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational_expression()?;
            left = self.make_binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse relational expression
    fn parse_relational_expression(&mut self) -> Result<Expression, CompilerError> {
        let mut left = self.parse_additive_expression()?;

        loop {
            let op = match self.peek().map(|t| &t.token_type) {
                Some(TokenType::Less) => BinaryOp::Less,
                Some(TokenType::LessEqual) => BinaryOp::LessEqual,
                Some(TokenType::Greater) => BinaryOp::Greater,
                Some(TokenType::GreaterEqual) => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive_expression()?;
            left = self.make_binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse additive expression
    fn parse_additive_expression(&mut self) -> Result<Expression, CompilerError> {
        let mut left = self.parse_multiplicative_expression()?;

        loop {
            let op = match self.peek().map(|t| &t.token_type) {
                Some(TokenType::Plus) => BinaryOp::Add,
                Some(TokenType::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative_expression()?;
            left = self.make_binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse multiplicative expression
    fn parse_multiplicative_expression(&mut self) -> Result<Expression, CompilerError> {
        let mut left = self.parse_unary_expression()?;

        loop {
            let op = match self.peek().map(|t| &t.token_type) {
                Some(TokenType::Star) => BinaryOp::Mul,
                Some(TokenType::Slash) => BinaryOp::Div,
                Some(TokenType::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary_expression()?;
            left = self.make_binary(op, left, right);
        }

        Ok(left)
    }

    /// Parse unary expression
    fn parse_unary_expression(&mut self) -> Result<Expression, CompilerError> {
        let start_location = self.current_location();

        let op = match self.peek().map(|t| &t.token_type) {
            Some(TokenType::Minus) => Some(UnaryOp::Negate),
            Some(TokenType::Bang) => Some(UnaryOp::LogicalNot),
            Some(TokenType::Star) => Some(UnaryOp::Dereference),
            Some(TokenType::Ampersand) => Some(UnaryOp::AddressOf),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary_expression()?;
            let span = SourceSpan::new(start_location, operand.span.end.clone());

            return Ok(Expression {
                node_id: self.node_id_gen.next(),
                kind: ExpressionKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
                expr_type: None,
            });
        }

        self.parse_postfix_expression()
    }

    /// Parse postfix expression (calls and array indexing)
    fn parse_postfix_expression(&mut self) -> Result<Expression, CompilerError> {
        let mut expr = self.parse_primary_expression()?;

        loop {
            if self.match_token(&TokenType::LeftParen) {
                let mut arguments = Vec::new();
                if !self.check(&TokenType::RightParen) {
                    loop {
                        arguments.push(self.parse_assignment_expression()?);
                        if !self.match_token(&TokenType::Comma) {
                            break;
                        }
                    }
                }
                let close = self.expect(TokenType::RightParen, "call expression")?;
                let span = SourceSpan::new(expr.span.start.clone(), close.span.end);

                expr = Expression {
                    node_id: self.node_id_gen.next(),
                    kind: ExpressionKind::Call {
                        callee: Box::new(expr),
                        arguments,
                    },
                    span,
                    expr_type: None,
                };
            } else if self.match_token(&TokenType::LeftBracket) {
                let index = self.parse_expression()?;
                let close = self.expect(TokenType::RightBracket, "index expression")?;
                let span = SourceSpan::new(expr.span.start.clone(), close.span.end);

                expr = Expression {
                    node_id: self.node_id_gen.next(),
                    kind: ExpressionKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                    expr_type: None,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Parse primary expression
    fn parse_primary_expression(&mut self) -> Result<Expression, CompilerError> {
        let location = self.current_location();

        match self.advance() {
            Some(Token {
                token_type: TokenType::IntLiteral(value),
                span,
            }) => Ok(Expression {
                node_id: self.node_id_gen.next(),
                kind: ExpressionKind::IntLiteral(value),
                span,
                expr_type: None,
            }),

            Some(Token {
                token_type: TokenType::Identifier(name),
                span,
            }) => Ok(Expression {
                node_id: self.node_id_gen.next(),
                kind: ExpressionKind::Identifier {
                    name,
                    symbol_id: None,
                },
                span,
                expr_type: None,
            }),

            Some(Token {
                token_type: TokenType::LeftParen,
                ..
            }) => {
                let expr = self.parse_expression()?;
                self.expect(TokenType::RightParen, "parenthesized expression")?;
                Ok(expr)
            }

            Some(token) => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: token,
            }
            .into()),

            None => Err(ParseError::UnexpectedEndOfFile {
                expected: "expression".to_string(),
                location,
            }
            .into()),
        }
    }

    /// Build a binary expression node
    fn make_binary(&mut self, op: BinaryOp, left: Expression, right: Expression) -> Expression {
        let span = SourceSpan::new(left.span.start.clone(), right.span.end.clone());
        Expression {
            node_id: self.node_id_gen.next(),
            kind: ExpressionKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
            expr_type: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> Result<Program, CompilerError> {
        let tokens = Lexer::new(input).tokenize()?;
        Parser::new(tokens).parse_program()
    }

    fn parse_expr(input: &str) -> Expression {
        let tokens = Lexer::new(input).tokenize().unwrap();
        Parser::new(tokens).parse_expression().unwrap()
    }

    #[test]
    fn test_simple_function() {
        let program = parse("int main(int n) { return n; }").unwrap();
        assert_eq!(program.items.len(), 1);

        match &program.items[0] {
            Item::Function(func) => {
                assert_eq!(func.name, "main");
                assert_eq!(func.return_type, Type::Int);
                assert_eq!(func.parameters.len(), 1);
                assert_eq!(func.parameters[0].name, "n");
                assert_eq!(func.parameters[0].param_type, Type::Int);
            }
            _ => panic!("Expected function"),
        }
    }

    #[test]
    fn test_void_function_no_params() {
        let program = parse("void main(void) { }").unwrap();
        match &program.items[0] {
            Item::Function(func) => {
                assert_eq!(func.return_type, Type::Void);
                assert!(func.parameters.is_empty());
            }
            _ => panic!("Expected function"),
        }
    }

    #[test]
    fn test_global_declaration() {
        let program = parse("int r; int main(int n) { return r; }").unwrap();
        assert_eq!(program.items.len(), 2);
        match &program.items[0] {
            Item::Global(decl) => {
                assert_eq!(decl.name, "r");
                assert_eq!(decl.decl_type, Type::Int);
                assert!(decl.initializer.is_none());
            }
            _ => panic!("Expected global"),
        }
    }

    #[test]
    fn test_pointer_and_array_declarators() {
        let program =
            parse("void main(int n) { int *p; int ia[10]; int *ipa[10]; int (*iap)[10]; }")
                .unwrap();

        let func = match &program.items[0] {
            Item::Function(func) => func,
            _ => panic!("Expected function"),
        };
        let statements = match &func.body.kind {
            StatementKind::Compound(statements) => statements,
            _ => panic!("Expected compound body"),
        };

        let decl_type = |i: usize| -> &Type {
            match &statements[i].kind {
                StatementKind::Declaration { declarations } => &declarations[0].decl_type,
                _ => panic!("Expected declaration"),
            }
        };

        assert_eq!(*decl_type(0), Type::Pointer(Box::new(Type::Int)));
        assert_eq!(
            *decl_type(1),
            Type::Array {
                element_type: Box::new(Type::Int),
                size: 10
            }
        );
        assert_eq!(
            *decl_type(2),
            Type::Array {
                element_type: Box::new(Type::Pointer(Box::new(Type::Int))),
                size: 10
            }
        );
        assert_eq!(
            *decl_type(3),
            Type::Pointer(Box::new(Type::Array {
                element_type: Box::new(Type::Int),
                size: 10
            }))
        );
    }

    #[test]
    fn test_function_pointer_declarator() {
        let program = parse("void main(int n) { int (*f)(int); }").unwrap();
        let func = match &program.items[0] {
            Item::Function(func) => func,
            _ => panic!("Expected function"),
        };
        let statements = match &func.body.kind {
            StatementKind::Compound(statements) => statements,
            _ => panic!("Expected compound body"),
        };
        match &statements[0].kind {
            StatementKind::Declaration { declarations } => {
                assert_eq!(
                    declarations[0].decl_type,
                    Type::Pointer(Box::new(Type::Function {
                        return_type: Box::new(Type::Int),
                        parameters: vec![Type::Int],
                    }))
                );
            }
            _ => panic!("Expected declaration"),
        }
    }

    #[test]
    fn test_unnamed_parameter_types() {
        // Parameter types inside a function-pointer declarator carry
        // no names
        let program = parse("int apply(int (*f)(int, int), int x) { return f(x, x); }").unwrap();
        let func = match &program.items[0] {
            Item::Function(func) => func,
            _ => panic!("Expected function"),
        };
        assert_eq!(
            func.parameters[0].param_type,
            Type::Pointer(Box::new(Type::Function {
                return_type: Box::new(Type::Int),
                parameters: vec![Type::Int, Type::Int],
            }))
        );
    }

    #[test]
    fn test_multi_dimensional_array_declarator() {
        // The first suffix is the outermost dimension
        let program = parse("void main(int n) { int m[3][4]; }").unwrap();
        let func = match &program.items[0] {
            Item::Function(func) => func,
            _ => panic!("Expected function"),
        };
        let statements = match &func.body.kind {
            StatementKind::Compound(statements) => statements,
            _ => panic!("Expected compound body"),
        };
        match &statements[0].kind {
            StatementKind::Declaration { declarations } => {
                assert_eq!(
                    declarations[0].decl_type,
                    Type::Array {
                        element_type: Box::new(Type::Array {
                            element_type: Box::new(Type::Int),
                            size: 4,
                        }),
                        size: 3,
                    }
                );
            }
            _ => panic!("Expected declaration"),
        }
    }

    #[test]
    fn test_missing_names_rejected_outside_parameter_types() {
        assert!(parse("void main(int n) { int; }").is_err());
        assert!(parse("int; int main(int n) { return 0; }").is_err());
        // A definition needs its parameters named
        assert!(parse("int f(int) { return 0; } int main(int n) { return f(n); }").is_err());
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse_expr("1 + 2 * 3");
        match expr.kind {
            ExpressionKind::Binary { op, right, .. } => {
                assert_eq!(op, BinaryOp::Add);
                match right.kind {
                    ExpressionKind::Binary { op, .. } => assert_eq!(op, BinaryOp::Mul),
                    _ => panic!("Expected multiplication on the right"),
                }
            }
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let expr = parse_expr("a = b = 1");
        match expr.kind {
            ExpressionKind::Assign { value, .. } => {
                assert!(matches!(value.kind, ExpressionKind::Assign { .. }));
            }
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_unary_chain() {
        // **p and &*p parse as nested unaries
        let expr = parse_expr("**p");
        match expr.kind {
            ExpressionKind::Unary { op, operand } => {
                assert_eq!(op, UnaryOp::Dereference);
                assert!(matches!(
                    operand.kind,
                    ExpressionKind::Unary {
                        op: UnaryOp::Dereference,
                        ..
                    }
                ));
            }
            _ => panic!("Expected unary expression"),
        }
    }

    #[test]
    fn test_call_and_index_postfix() {
        let expr = parse_expr("f(1, 2)[3]");
        match expr.kind {
            ExpressionKind::Index { base, .. } => match base.kind {
                ExpressionKind::Call { arguments, .. } => assert_eq!(arguments.len(), 2),
                _ => panic!("Expected call as index base"),
            },
            _ => panic!("Expected index expression"),
        }
    }

    #[test]
    fn test_print_statements() {
        let program = parse("void main(int n) { print n + 1; println; }").unwrap();
        let func = match &program.items[0] {
            Item::Function(func) => func,
            _ => panic!("Expected function"),
        };
        let statements = match &func.body.kind {
            StatementKind::Compound(statements) => statements,
            _ => panic!("Expected compound body"),
        };
        assert!(matches!(statements[0].kind, StatementKind::Print(_)));
        assert!(matches!(statements[1].kind, StatementKind::PrintLn));
    }

    #[test]
    fn test_for_statement() {
        let program = parse("void main(int n) { for (i = 0; i < n; i = i + 1) print i; }");
        let program = program.unwrap();
        let func = match &program.items[0] {
            Item::Function(func) => func,
            _ => panic!("Expected function"),
        };
        let statements = match &func.body.kind {
            StatementKind::Compound(statements) => statements,
            _ => panic!("Expected compound body"),
        };
        match &statements[0].kind {
            StatementKind::For {
                init,
                condition,
                step,
                ..
            } => {
                assert!(init.is_some());
                assert!(condition.is_some());
                assert!(step.is_some());
            }
            _ => panic!("Expected for statement"),
        }
    }

    #[test]
    fn test_if_else_binding() {
        // else binds to the nearest if
        let program =
            parse("void main(int n) { if (n) if (n < 2) print 1; else print 2; }").unwrap();
        let func = match &program.items[0] {
            Item::Function(func) => func,
            _ => panic!("Expected function"),
        };
        let statements = match &func.body.kind {
            StatementKind::Compound(statements) => statements,
            _ => panic!("Expected compound body"),
        };
        match &statements[0].kind {
            StatementKind::If {
                then_stmt,
                else_stmt,
                ..
            } => {
                assert!(else_stmt.is_none());
                match &then_stmt.kind {
                    StatementKind::If { else_stmt, .. } => assert!(else_stmt.is_some()),
                    _ => panic!("Expected nested if"),
                }
            }
            _ => panic!("Expected if statement"),
        }
    }

    #[test]
    fn test_missing_semicolon_is_parse_error() {
        let result = parse("int main(int n) { return n }");
        assert!(matches!(result, Err(CompilerError::ParseError { .. })));
    }

    #[test]
    fn test_bad_top_level_item() {
        let result = parse("42;");
        assert!(matches!(result, Err(CompilerError::ParseError { .. })));
    }
}
