//! Symbol and Scope Resolution
//!
//! Resolves every identifier in the AST to a unique symbol, enforcing
//! MicroC scoping rules: a block-structured scope stack where inner
//! declarations shadow outer ones and redeclaration within a single
//! scope is an error. Annotates the AST with `SymbolId`s and produces
//! a symbol table consumed by the type checker and code generator.

use crate::ast::*;
use mcc_common::{CompilerError, SourceLocation, SymbolId};
use std::collections::HashMap;

/// Resolution error types specific to this pass
#[derive(Debug, Clone)]
pub enum ResolveError {
    UndefinedSymbol {
        name: String,
        location: SourceLocation,
    },
    Redeclaration {
        name: String,
        location: SourceLocation,
    },
}

impl From<ResolveError> for CompilerError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UndefinedSymbol { name, location } => {
                CompilerError::undefined_symbol(format!("'{}' is not declared", name), location)
            }
            ResolveError::Redeclaration { name, location } => CompilerError::redeclaration_error(
                format!("'{}' is already declared in this scope", name),
                location,
            ),
        }
    }
}

/// What a symbol names, for later passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Global,
    Local,
    Parameter,
    Function,
}

/// A resolved symbol
#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub ty: Type,
    pub kind: SymbolKind,
}

/// Symbol table produced by resolution, keyed by `SymbolId`
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<SymbolId, Symbol>,
}

impl SymbolTable {
    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    /// Look up a symbol that resolution is known to have recorded
    pub fn type_of(&self, id: SymbolId) -> Option<&Type> {
        self.symbols.get(&id).map(|s| &s.ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    fn insert(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.id, symbol);
    }
}

/// Block-structured scope stack mapping names to symbols
struct ScopeStack {
    scopes: Vec<HashMap<String, SymbolId>>,
}

impl ScopeStack {
    fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Look up a name, innermost scope first
    fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn exists_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|scope| scope.contains_key(name))
            .unwrap_or(false)
    }

    fn declare(&mut self, name: String, id: SymbolId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, id);
        }
    }
}

/// Symbol resolver
pub struct Resolver {
    scopes: ScopeStack,
    table: SymbolTable,
    next_symbol_id: SymbolId,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: ScopeStack::new(),
            table: SymbolTable::default(),
            next_symbol_id: 0,
        }
    }

    /// Resolve a whole program, annotating the AST in place and
    /// returning the symbol table.
    pub fn resolve(mut self, program: &mut Program) -> Result<SymbolTable, CompilerError> {
        // First pass: declare all globals and functions so definition
        // order does not matter for lookups inside function bodies.
        for item in &mut program.items {
            match item {
                Item::Function(func) => self.declare_function(func)?,
                Item::Global(decl) => self.declare_global(decl)?,
            }
        }

        // Second pass: resolve global initializers and function bodies
        for item in &mut program.items {
            match item {
                Item::Function(func) => self.resolve_function(func)?,
                Item::Global(decl) => {
                    if let Some(init) = &mut decl.initializer {
                        self.resolve_expression(init)?;
                    }
                }
            }
        }

        Ok(self.table)
    }

    fn fresh_id(&mut self) -> SymbolId {
        let id = self.next_symbol_id;
        self.next_symbol_id += 1;
        id
    }

    fn declare_function(&mut self, func: &mut Function) -> Result<(), CompilerError> {
        if self.scopes.exists_in_current_scope(&func.name) {
            return Err(ResolveError::Redeclaration {
                name: func.name.clone(),
                location: func.span.start.clone(),
            }
            .into());
        }

        let id = self.fresh_id();
        func.symbol_id = Some(id);
        self.scopes.declare(func.name.clone(), id);
        self.table.insert(Symbol {
            id,
            name: func.name.clone(),
            ty: func.function_type(),
            kind: SymbolKind::Function,
        });
        Ok(())
    }

    fn declare_global(&mut self, decl: &mut Declaration) -> Result<(), CompilerError> {
        if self.scopes.exists_in_current_scope(&decl.name) {
            return Err(ResolveError::Redeclaration {
                name: decl.name.clone(),
                location: decl.span.start.clone(),
            }
            .into());
        }

        let id = self.fresh_id();
        decl.symbol_id = Some(id);
        self.scopes.declare(decl.name.clone(), id);
        self.table.insert(Symbol {
            id,
            name: decl.name.clone(),
            ty: decl.decl_type.clone(),
            kind: SymbolKind::Global,
        });
        Ok(())
    }

    fn resolve_function(&mut self, func: &mut Function) -> Result<(), CompilerError> {
        self.scopes.push();

        for param in &mut func.parameters {
            if self.scopes.exists_in_current_scope(&param.name) {
                self.scopes.pop();
                return Err(ResolveError::Redeclaration {
                    name: param.name.clone(),
                    location: param.span.start.clone(),
                }
                .into());
            }

            let id = self.fresh_id();
            param.symbol_id = Some(id);
            self.scopes.declare(param.name.clone(), id);
            // Array and function parameters adjust to pointers
            self.table.insert(Symbol {
                id,
                name: param.name.clone(),
                ty: param.param_type.decayed(),
                kind: SymbolKind::Parameter,
            });
        }

        let result = self.resolve_statement(&mut func.body);
        self.scopes.pop();
        result
    }

    fn resolve_statement(&mut self, stmt: &mut Statement) -> Result<(), CompilerError> {
        match &mut stmt.kind {
            StatementKind::Expression(expr) => self.resolve_expression(expr),

            StatementKind::Compound(statements) => {
                self.scopes.push();
                let mut result = Ok(());
                for statement in statements {
                    result = self.resolve_statement(statement);
                    if result.is_err() {
                        break;
                    }
                }
                self.scopes.pop();
                result
            }

            StatementKind::Declaration { declarations } => {
                for decl in declarations {
                    self.resolve_local_declaration(decl)?;
                }
                Ok(())
            }

            StatementKind::If {
                condition,
                then_stmt,
                else_stmt,
            } => {
                self.resolve_expression(condition)?;
                self.resolve_statement(then_stmt)?;
                if let Some(else_stmt) = else_stmt {
                    self.resolve_statement(else_stmt)?;
                }
                Ok(())
            }

            StatementKind::While { condition, body } => {
                self.resolve_expression(condition)?;
                self.resolve_statement(body)
            }

            StatementKind::For {
                init,
                condition,
                step,
                body,
            } => {
                // A declaration in the init clause scopes over the loop
                self.scopes.push();
                let result = (|| {
                    if let Some(init) = init {
                        self.resolve_statement(init)?;
                    }
                    if let Some(condition) = condition {
                        self.resolve_expression(condition)?;
                    }
                    if let Some(step) = step {
                        self.resolve_expression(step)?;
                    }
                    self.resolve_statement(body)
                })();
                self.scopes.pop();
                result
            }

            StatementKind::Return(value) => {
                if let Some(value) = value {
                    self.resolve_expression(value)?;
                }
                Ok(())
            }

            StatementKind::Print(expr) => self.resolve_expression(expr),

            StatementKind::PrintLn | StatementKind::Empty => Ok(()),
        }
    }

    fn resolve_local_declaration(&mut self, decl: &mut Declaration) -> Result<(), CompilerError> {
        if self.scopes.exists_in_current_scope(&decl.name) {
            return Err(ResolveError::Redeclaration {
                name: decl.name.clone(),
                location: decl.span.start.clone(),
            }
            .into());
        }

        // The name is in scope in its own initializer, as in C
        let id = self.fresh_id();
        decl.symbol_id = Some(id);
        self.scopes.declare(decl.name.clone(), id);
        self.table.insert(Symbol {
            id,
            name: decl.name.clone(),
            ty: decl.decl_type.clone(),
            kind: SymbolKind::Local,
        });

        if let Some(init) = &mut decl.initializer {
            self.resolve_expression(init)?;
        }
        Ok(())
    }

    fn resolve_expression(&mut self, expr: &mut Expression) -> Result<(), CompilerError> {
        match &mut expr.kind {
            ExpressionKind::IntLiteral(_) => Ok(()),

            ExpressionKind::Identifier { name, symbol_id } => {
                match self.scopes.lookup(name) {
                    Some(id) => {
                        *symbol_id = Some(id);
                        Ok(())
                    }
                    None => Err(ResolveError::UndefinedSymbol {
                        name: name.clone(),
                        location: expr.span.start.clone(),
                    }
                    .into()),
                }
            }

            ExpressionKind::Unary { operand, .. } => self.resolve_expression(operand),

            ExpressionKind::Binary { left, right, .. } => {
                self.resolve_expression(left)?;
                self.resolve_expression(right)
            }

            ExpressionKind::Index { base, index } => {
                self.resolve_expression(base)?;
                self.resolve_expression(index)
            }

            ExpressionKind::Call { callee, arguments } => {
                self.resolve_expression(callee)?;
                for argument in arguments {
                    self.resolve_expression(argument)?;
                }
                Ok(())
            }

            ExpressionKind::Assign { target, value } => {
                self.resolve_expression(target)?;
                self.resolve_expression(value)
            }
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn resolve(input: &str) -> Result<(Program, SymbolTable), CompilerError> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut program = Parser::new(tokens).parse_program()?;
        let table = Resolver::new().resolve(&mut program)?;
        Ok((program, table))
    }

    #[test]
    fn test_resolves_parameter_reference() {
        let (program, table) = resolve("int main(int n) { return n; }").unwrap();

        let func = match &program.items[0] {
            Item::Function(func) => func,
            _ => panic!("Expected function"),
        };
        let param_id = func.parameters[0].symbol_id.unwrap();
        assert_eq!(table.get(param_id).unwrap().kind, SymbolKind::Parameter);

        let statements = match &func.body.kind {
            StatementKind::Compound(statements) => statements,
            _ => panic!("Expected compound body"),
        };
        match &statements[0].kind {
            StatementKind::Return(Some(expr)) => match &expr.kind {
                ExpressionKind::Identifier { symbol_id, .. } => {
                    assert_eq!(*symbol_id, Some(param_id));
                }
                _ => panic!("Expected identifier"),
            },
            _ => panic!("Expected return"),
        }
    }

    #[test]
    fn test_undefined_symbol() {
        let result = resolve("int main(int n) { return missing; }");
        assert!(matches!(
            result,
            Err(CompilerError::UndefinedSymbolError { .. })
        ));
    }

    #[test]
    fn test_redeclaration_in_same_scope() {
        let result = resolve("int main(int n) { int x; int x; return 0; }");
        assert!(matches!(
            result,
            Err(CompilerError::RedeclarationError { .. })
        ));
    }

    #[test]
    fn test_shadowing_in_nested_scope() {
        let input = "int main(int n) { int x; { int x; x = 1; } x = 2; return x; }";
        let (program, _table) = resolve(input).unwrap();

        let func = match &program.items[0] {
            Item::Function(func) => func,
            _ => panic!("Expected function"),
        };
        let statements = match &func.body.kind {
            StatementKind::Compound(statements) => statements,
            _ => panic!("Expected compound body"),
        };

        let outer_id = match &statements[0].kind {
            StatementKind::Declaration { declarations } => declarations[0].symbol_id.unwrap(),
            _ => panic!("Expected declaration"),
        };
        let (inner_id, inner_use) = match &statements[1].kind {
            StatementKind::Compound(inner) => {
                let id = match &inner[0].kind {
                    StatementKind::Declaration { declarations } => {
                        declarations[0].symbol_id.unwrap()
                    }
                    _ => panic!("Expected declaration"),
                };
                let used = match &inner[1].kind {
                    StatementKind::Expression(expr) => match &expr.kind {
                        ExpressionKind::Assign { target, .. } => match &target.kind {
                            ExpressionKind::Identifier { symbol_id, .. } => symbol_id.unwrap(),
                            _ => panic!("Expected identifier"),
                        },
                        _ => panic!("Expected assignment"),
                    },
                    _ => panic!("Expected expression statement"),
                };
                (id, used)
            }
            _ => panic!("Expected nested compound"),
        };

        assert_ne!(outer_id, inner_id);
        assert_eq!(inner_use, inner_id);

        // The use after the block resolves to the outer symbol again
        match &statements[2].kind {
            StatementKind::Expression(expr) => match &expr.kind {
                ExpressionKind::Assign { target, .. } => match &target.kind {
                    ExpressionKind::Identifier { symbol_id, .. } => {
                        assert_eq!(*symbol_id, Some(outer_id));
                    }
                    _ => panic!("Expected identifier"),
                },
                _ => panic!("Expected assignment"),
            },
            _ => panic!("Expected expression statement"),
        }
    }

    #[test]
    fn test_sibling_blocks_do_not_leak() {
        let result = resolve("int main(int n) { { int x; x = 1; } return x; }");
        assert!(matches!(
            result,
            Err(CompilerError::UndefinedSymbolError { .. })
        ));
    }

    #[test]
    fn test_forward_function_reference() {
        let input = "int main(int n) { return helper(n); } int helper(int x) { return x + 1; }";
        assert!(resolve(input).is_ok());
    }

    #[test]
    fn test_duplicate_global() {
        let result = resolve("int r; int r; int main(int n) { return 0; }");
        assert!(matches!(
            result,
            Err(CompilerError::RedeclarationError { .. })
        ));
    }

    #[test]
    fn test_duplicate_parameter() {
        let result = resolve("int add(int a, int a) { return a; }");
        assert!(matches!(
            result,
            Err(CompilerError::RedeclarationError { .. })
        ));
    }

    #[test]
    fn test_function_and_global_share_namespace() {
        let result = resolve("int f; int f(int x) { return x; }");
        assert!(matches!(
            result,
            Err(CompilerError::RedeclarationError { .. })
        ));
    }

    #[test]
    fn test_array_parameter_decays_in_table() {
        let (program, table) = resolve("int first(int a[10]) { return a[0]; }").unwrap();
        let func = match &program.items[0] {
            Item::Function(func) => func,
            _ => panic!("Expected function"),
        };
        let param_id = func.parameters[0].symbol_id.unwrap();
        assert_eq!(
            *table.type_of(param_id).unwrap(),
            Type::Pointer(Box::new(Type::Int))
        );
    }

    #[test]
    fn test_for_init_declaration_scoped_to_loop() {
        let result = resolve(
            "int main(int n) { for (int i = 0; i < n; i = i + 1) print i; return i; }",
        );
        assert!(matches!(
            result,
            Err(CompilerError::UndefinedSymbolError { .. })
        ));
    }
}
