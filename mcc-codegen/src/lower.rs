//! AST-to-stack-machine lowering
//!
//! Lowers the typed, resolved AST to the instruction set in
//! [`crate::instr`]. The runtime model is a single flat word stack:
//! globals occupy the low addresses, call frames grow above them, and
//! every address is an absolute word index. Expressions are lowered
//! through an lvalue/rvalue pair of emitters; array-typed expressions
//! evaluate to their address, so decay falls out of the scheme.

use crate::instr::{CompiledFunction, CompiledProgram, Instr};
use log::debug;
use mcc_common::{
    CompilerError, FunctionId, LabelGenerator, LabelId, SymbolId, Word,
};
use mcc_frontend::ast::*;
use std::collections::HashMap;

/// Where a resolved symbol lives at run time
#[derive(Debug, Clone, Copy, PartialEq)]
enum Storage {
    /// Absolute word index at the bottom of the stack
    Global(usize),
    /// Word offset from the frame base
    Local(usize),
    /// Entry in the program function table
    Func(FunctionId),
}

/// Instruction emitter with label fixup
struct Emitter {
    code: Vec<Instr>,
    labels: HashMap<LabelId, usize>,
    fixups: Vec<(usize, LabelId)>,
    label_gen: LabelGenerator,
}

impl Emitter {
    fn new() -> Self {
        Self {
            code: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            label_gen: LabelGenerator::new(),
        }
    }

    fn emit(&mut self, instr: Instr) {
        self.code.push(instr);
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    fn new_label(&mut self) -> LabelId {
        self.label_gen.new_label()
    }

    fn bind(&mut self, label: LabelId) {
        self.labels.insert(label, self.code.len());
    }

    fn emit_goto(&mut self, label: LabelId) {
        self.fixups.push((self.code.len(), label));
        self.code.push(Instr::Goto(usize::MAX));
    }

    fn emit_if_zero(&mut self, label: LabelId) {
        self.fixups.push((self.code.len(), label));
        self.code.push(Instr::IfZero(usize::MAX));
    }

    fn emit_if_not_zero(&mut self, label: LabelId) {
        self.fixups.push((self.code.len(), label));
        self.code.push(Instr::IfNotZero(usize::MAX));
    }

    /// Resolve every recorded jump to its bound label
    fn link(mut self) -> Result<Vec<Instr>, CompilerError> {
        for (index, label) in self.fixups {
            let target = *self.labels.get(&label).ok_or_else(|| {
                CompilerError::internal(format!("unbound label {}", label))
            })?;
            match &mut self.code[index] {
                Instr::Goto(slot) | Instr::IfZero(slot) | Instr::IfNotZero(slot) => {
                    *slot = target;
                }
                other => {
                    return Err(CompilerError::internal(format!(
                        "fixup at {} points at non-jump {}",
                        index, other
                    )));
                }
            }
        }
        Ok(self.code)
    }
}

/// Frame slot allocator with block-level reuse
///
/// Slots handed out inside a block are released when the block ends,
/// so sibling blocks overlay each other. The high-water mark becomes
/// the function's fixed frame size.
struct FrameAllocator {
    next: usize,
    max: usize,
}

impl FrameAllocator {
    fn new(param_count: usize) -> Self {
        Self {
            next: param_count,
            max: param_count,
        }
    }

    fn alloc(&mut self, words: usize) -> usize {
        let offset = self.next;
        self.next += words;
        if self.next > self.max {
            self.max = self.next;
        }
        offset
    }

    fn mark(&self) -> usize {
        self.next
    }

    fn release(&mut self, mark: usize) {
        self.next = mark;
    }

    fn frame_size(&self) -> usize {
        self.max
    }
}

/// Code generator over a typed, resolved program
pub struct CodeGenerator {
    emitter: Emitter,
    storage: HashMap<SymbolId, Storage>,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            emitter: Emitter::new(),
            storage: HashMap::new(),
        }
    }

    /// Lower a whole program to executable stack-machine code
    pub fn generate(mut self, program: &Program) -> Result<CompiledProgram, CompilerError> {
        // Lay out globals and number functions before lowering any
        // code, so forward references resolve.
        let mut globals_size = 0usize;
        let mut function_items = Vec::new();

        for item in &program.items {
            match item {
                Item::Global(decl) => {
                    let id = self.symbol_of(decl.symbol_id, &decl.name)?;
                    let size = decl.decl_type.size_in_words() as usize;
                    self.storage.insert(id, Storage::Global(globals_size));
                    globals_size += size;
                }
                Item::Function(func) => {
                    let id = self.symbol_of(func.symbol_id, &func.name)?;
                    let func_id = FunctionId(function_items.len() as u32);
                    self.storage.insert(id, Storage::Func(func_id));
                    function_items.push(func);
                }
            }
        }

        let entry = self.validate_entry(program, &function_items)?;
        let entry_func = function_items[entry.index()];

        // Startup stub: run global initializers in declaration order,
        // push the runtime argument if the entry function takes one,
        // then call it and halt with its result.
        let mut stub_frame = FrameAllocator::new(0);
        for item in &program.items {
            if let Item::Global(decl) = item {
                if let Some(init) = &decl.initializer {
                    let id = self.symbol_of(decl.symbol_id, &decl.name)?;
                    let addr = match self.storage_of(id, &decl.name)? {
                        Storage::Global(addr) => addr,
                        _ => {
                            return Err(CompilerError::internal(format!(
                                "global '{}' without global storage",
                                decl.name
                            )));
                        }
                    };
                    self.emitter.emit(Instr::Const(addr as Word));
                    self.rvalue(init, &mut stub_frame)?;
                    self.emitter.emit(Instr::Store);
                    self.emitter.emit(Instr::Pop);
                }
            }
        }

        let argc = entry_func.parameters.len();
        if argc == 1 {
            self.emitter.emit(Instr::LoadArg);
        }
        self.emitter.emit(Instr::Call { argc, func: entry });
        self.emitter.emit(Instr::Halt);

        // Lower each function body
        let mut functions = Vec::with_capacity(function_items.len());
        for func in &function_items {
            functions.push(self.lower_function(func)?);
        }

        let code = self.emitter.link()?;
        debug!(
            "generated {} instructions, {} functions, {} global words",
            code.len(),
            functions.len(),
            globals_size
        );

        Ok(CompiledProgram {
            code,
            functions,
            globals_size,
            entry,
        })
    }

    /// The entry function must be `main`, taking no parameter or one
    /// int, and returning int or void.
    fn validate_entry(
        &self,
        program: &Program,
        functions: &[&Function],
    ) -> Result<FunctionId, CompilerError> {
        let (index, func) = functions
            .iter()
            .enumerate()
            .find(|(_, func)| func.name == "main")
            .ok_or_else(|| {
                CompilerError::undefined_symbol(
                    "entry function 'main' is not defined".to_string(),
                    program.span.start.clone(),
                )
            })?;

        match func.parameters.len() {
            0 => {}
            1 => {
                if func.parameters[0].param_type.decayed() != Type::Int {
                    return Err(CompilerError::type_error(
                        format!(
                            "parameter of 'main' must be int, found {}",
                            func.parameters[0].param_type
                        ),
                        func.parameters[0].span.start.clone(),
                    ));
                }
            }
            n => {
                return Err(CompilerError::type_error(
                    format!("'main' takes at most one parameter, found {}", n),
                    func.span.start.clone(),
                ));
            }
        }

        if func.return_type != Type::Int && func.return_type != Type::Void {
            return Err(CompilerError::type_error(
                format!("'main' must return int or void, found {}", func.return_type),
                func.span.start.clone(),
            ));
        }

        Ok(FunctionId(index as u32))
    }

    fn lower_function(&mut self, func: &Function) -> Result<CompiledFunction, CompilerError> {
        let entry = self.emitter.here();
        let enter_index = entry;
        self.emitter.emit(Instr::Enter { locals: 0 });

        let param_count = func.parameters.len();
        let mut frame = FrameAllocator::new(param_count);
        for (index, param) in func.parameters.iter().enumerate() {
            let id = self.symbol_of(param.symbol_id, &param.name)?;
            self.storage.insert(id, Storage::Local(index));
        }

        self.lower_statement(&func.body, &mut frame)?;

        // Falling off the end returns 0 (and gives void functions a
        // result word for the caller to discard).
        self.emitter.emit(Instr::Const(0));
        self.emitter.emit(Instr::Ret);

        let locals = frame.frame_size() - param_count;
        self.emitter.code[enter_index] = Instr::Enter { locals };

        debug!(
            "function '{}': entry {}, {} params, {} local words",
            func.name, entry, param_count, locals
        );

        Ok(CompiledFunction {
            name: func.name.clone(),
            entry,
            frame_size: frame.frame_size(),
            param_count,
        })
    }

    fn lower_statement(
        &mut self,
        stmt: &Statement,
        frame: &mut FrameAllocator,
    ) -> Result<(), CompilerError> {
        match &stmt.kind {
            StatementKind::Expression(expr) => {
                self.rvalue(expr, frame)?;
                self.emitter.emit(Instr::Pop);
                Ok(())
            }

            StatementKind::Compound(statements) => {
                let mark = frame.mark();
                for statement in statements {
                    self.lower_statement(statement, frame)?;
                }
                frame.release(mark);
                Ok(())
            }

            StatementKind::Declaration { declarations } => {
                for decl in declarations {
                    self.lower_local_declaration(decl, frame)?;
                }
                Ok(())
            }

            StatementKind::If {
                condition,
                then_stmt,
                else_stmt,
            } => {
                match else_stmt {
                    Some(else_stmt) => {
                        let else_label = self.emitter.new_label();
                        let end_label = self.emitter.new_label();
                        self.rvalue(condition, frame)?;
                        self.emitter.emit_if_zero(else_label);
                        self.lower_statement(then_stmt, frame)?;
                        self.emitter.emit_goto(end_label);
                        self.emitter.bind(else_label);
                        self.lower_statement(else_stmt, frame)?;
                        self.emitter.bind(end_label);
                    }
                    None => {
                        let end_label = self.emitter.new_label();
                        self.rvalue(condition, frame)?;
                        self.emitter.emit_if_zero(end_label);
                        self.lower_statement(then_stmt, frame)?;
                        self.emitter.bind(end_label);
                    }
                }
                Ok(())
            }

            StatementKind::While { condition, body } => {
                let body_label = self.emitter.new_label();
                let test_label = self.emitter.new_label();

                self.emitter.emit_goto(test_label);
                self.emitter.bind(body_label);
                self.lower_statement(body, frame)?;
                self.emitter.bind(test_label);
                self.rvalue(condition, frame)?;
                self.emitter.emit_if_not_zero(body_label);
                Ok(())
            }

            StatementKind::For {
                init,
                condition,
                step,
                body,
            } => {
                let mark = frame.mark();
                let body_label = self.emitter.new_label();
                let test_label = self.emitter.new_label();

                if let Some(init) = init {
                    self.lower_statement(init, frame)?;
                }
                self.emitter.emit_goto(test_label);
                self.emitter.bind(body_label);
                self.lower_statement(body, frame)?;
                if let Some(step) = step {
                    self.rvalue(step, frame)?;
                    self.emitter.emit(Instr::Pop);
                }
                self.emitter.bind(test_label);
                match condition {
                    Some(condition) => self.rvalue(condition, frame)?,
                    // No condition means loop forever
                    None => self.emitter.emit(Instr::Const(1)),
                }
                self.emitter.emit_if_not_zero(body_label);

                frame.release(mark);
                Ok(())
            }

            StatementKind::Return(value) => {
                match value {
                    Some(expr) => self.rvalue(expr, frame)?,
                    None => self.emitter.emit(Instr::Const(0)),
                }
                self.emitter.emit(Instr::Ret);
                Ok(())
            }

            StatementKind::Print(expr) => {
                self.rvalue(expr, frame)?;
                self.emitter.emit(Instr::PrintInt);
                Ok(())
            }

            StatementKind::PrintLn => {
                self.emitter.emit(Instr::PrintLn);
                Ok(())
            }

            StatementKind::Empty => Ok(()),
        }
    }

    fn lower_local_declaration(
        &mut self,
        decl: &Declaration,
        frame: &mut FrameAllocator,
    ) -> Result<(), CompilerError> {
        let id = self.symbol_of(decl.symbol_id, &decl.name)?;
        let size = decl.decl_type.size_in_words() as usize;
        let offset = frame.alloc(size);
        self.storage.insert(id, Storage::Local(offset));

        if let Some(init) = &decl.initializer {
            self.emitter.emit(Instr::GetBp);
            self.emitter.emit(Instr::Const(offset as Word));
            self.emitter.emit(Instr::Add);
            self.rvalue(init, frame)?;
            self.emitter.emit(Instr::Store);
            self.emitter.emit(Instr::Pop);
        }
        Ok(())
    }

    /// Emit code leaving the value of `expr` on the stack.
    ///
    /// For array-typed expressions the value is the array's address;
    /// for function designators it is the function handle.
    fn rvalue(
        &mut self,
        expr: &Expression,
        frame: &mut FrameAllocator,
    ) -> Result<(), CompilerError> {
        match &expr.kind {
            ExpressionKind::IntLiteral(value) => {
                self.emitter.emit(Instr::Const(*value));
                Ok(())
            }

            ExpressionKind::Identifier { name, symbol_id } => {
                let id = self.symbol_of(*symbol_id, name)?;
                match self.storage_of(id, name)? {
                    Storage::Func(func) => {
                        self.emitter.emit(Instr::Const(func.index() as Word));
                    }
                    storage => {
                        self.push_address(storage)?;
                        // Arrays evaluate to their address
                        if !matches!(self.expr_type(expr)?, Type::Array { .. }) {
                            self.emitter.emit(Instr::Load);
                        }
                    }
                }
                Ok(())
            }

            ExpressionKind::Unary { op, operand } => match op {
                UnaryOp::Negate => {
                    self.emitter.emit(Instr::Const(0));
                    self.rvalue(operand, frame)?;
                    self.emitter.emit(Instr::Sub);
                    Ok(())
                }
                UnaryOp::LogicalNot => {
                    self.rvalue(operand, frame)?;
                    self.emitter.emit(Instr::Not);
                    Ok(())
                }
                UnaryOp::Dereference => {
                    self.rvalue(operand, frame)?;
                    // Dereferencing a pointer to an array (or to a
                    // function) yields the address itself.
                    if self.expr_type(expr)?.is_scalar() {
                        self.emitter.emit(Instr::Load);
                    }
                    Ok(())
                }
                UnaryOp::AddressOf => self.lvalue(operand, frame),
            },

            ExpressionKind::Binary { op, left, right } => {
                self.lower_binary(*op, left, right, frame)
            }

            ExpressionKind::Index { base, index } => {
                self.index_address(base, index, frame)?;
                if self.expr_type(expr)?.is_scalar() {
                    self.emitter.emit(Instr::Load);
                }
                Ok(())
            }

            ExpressionKind::Call { callee, arguments } => {
                // A call through a name bound to a function compiles
                // to a direct call; anything else goes through a
                // function-pointer handle.
                let direct = match &callee.kind {
                    ExpressionKind::Identifier { symbol_id, name } => {
                        let id = self.symbol_of(*symbol_id, name)?;
                        match self.storage_of(id, name)? {
                            Storage::Func(func) => Some(func),
                            _ => None,
                        }
                    }
                    _ => None,
                };

                for argument in arguments {
                    self.rvalue(argument, frame)?;
                }

                let argc = arguments.len();
                match direct {
                    Some(func) => self.emitter.emit(Instr::Call { argc, func }),
                    None => {
                        self.rvalue(callee, frame)?;
                        self.emitter.emit(Instr::CallIndirect { argc });
                    }
                }
                Ok(())
            }

            ExpressionKind::Assign { target, value } => {
                self.lvalue(target, frame)?;
                self.rvalue(value, frame)?;
                // Store leaves the value behind as the expression
                // result
                self.emitter.emit(Instr::Store);
                Ok(())
            }
        }
    }

    /// Emit code leaving the address of `expr` on the stack
    fn lvalue(
        &mut self,
        expr: &Expression,
        frame: &mut FrameAllocator,
    ) -> Result<(), CompilerError> {
        match &expr.kind {
            ExpressionKind::Identifier { name, symbol_id } => {
                let id = self.symbol_of(*symbol_id, name)?;
                match self.storage_of(id, name)? {
                    Storage::Func(func) => {
                        // &f is the same handle as f
                        self.emitter.emit(Instr::Const(func.index() as Word));
                    }
                    storage => self.push_address(storage)?,
                }
                Ok(())
            }

            ExpressionKind::Unary {
                op: UnaryOp::Dereference,
                operand,
            } => self.rvalue(operand, frame),

            ExpressionKind::Index { base, index } => self.index_address(base, index, frame),

            _ => Err(CompilerError::internal(
                "non-lvalue reached address lowering".to_string(),
            )),
        }
    }

    /// Push the address of indexed element `base[index]`
    fn index_address(
        &mut self,
        base: &Expression,
        index: &Expression,
        frame: &mut FrameAllocator,
    ) -> Result<(), CompilerError> {
        let element_size = match self.expr_type(base)?.decayed().pointer_target() {
            Some(element) => element.size_in_words(),
            None => {
                return Err(CompilerError::internal(
                    "indexed expression is not pointer-like".to_string(),
                ));
            }
        };

        self.rvalue(base, frame)?;
        self.rvalue(index, frame)?;
        self.scale_by(element_size);
        self.emitter.emit(Instr::Add);
        Ok(())
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        frame: &mut FrameAllocator,
    ) -> Result<(), CompilerError> {
        match op {
            BinaryOp::Add => {
                let left_type = self.expr_type(left)?.decayed();
                let right_type = self.expr_type(right)?.decayed();

                self.rvalue(left, frame)?;
                if left_type.is_pointer() {
                    // pointer + int: scale the integer side
                    self.rvalue(right, frame)?;
                    self.scale_by(self.pointee_size(&left_type)?);
                } else if right_type.is_pointer() {
                    // int + pointer
                    self.scale_by(self.pointee_size(&right_type)?);
                    self.rvalue(right, frame)?;
                } else {
                    self.rvalue(right, frame)?;
                }
                self.emitter.emit(Instr::Add);
                Ok(())
            }

            BinaryOp::Sub => {
                let left_type = self.expr_type(left)?.decayed();
                let right_type = self.expr_type(right)?.decayed();

                self.rvalue(left, frame)?;
                self.rvalue(right, frame)?;
                if left_type.is_pointer() && right_type.is_pointer() {
                    // pointer - pointer: element count
                    self.emitter.emit(Instr::Sub);
                    let size = self.pointee_size(&left_type)?;
                    if size > 1 {
                        self.emitter.emit(Instr::Const(size as Word));
                        self.emitter.emit(Instr::Div);
                    }
                } else if left_type.is_pointer() {
                    self.scale_by(self.pointee_size(&left_type)?);
                    self.emitter.emit(Instr::Sub);
                } else {
                    self.emitter.emit(Instr::Sub);
                }
                Ok(())
            }

            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                self.rvalue(left, frame)?;
                self.rvalue(right, frame)?;
                self.emitter.emit(match op {
                    BinaryOp::Mul => Instr::Mul,
                    BinaryOp::Div => Instr::Div,
                    _ => Instr::Mod,
                });
                Ok(())
            }

            BinaryOp::Equal => {
                self.rvalue(left, frame)?;
                self.rvalue(right, frame)?;
                self.emitter.emit(Instr::Eq);
                Ok(())
            }

            BinaryOp::NotEqual => {
                self.rvalue(left, frame)?;
                self.rvalue(right, frame)?;
                self.emitter.emit(Instr::Eq);
                self.emitter.emit(Instr::Not);
                Ok(())
            }

            BinaryOp::Less => {
                self.rvalue(left, frame)?;
                self.rvalue(right, frame)?;
                self.emitter.emit(Instr::Lt);
                Ok(())
            }

            BinaryOp::Greater => {
                self.rvalue(left, frame)?;
                self.rvalue(right, frame)?;
                self.emitter.emit(Instr::Swap);
                self.emitter.emit(Instr::Lt);
                Ok(())
            }

            BinaryOp::LessEqual => {
                // a <= b is !(b < a)
                self.rvalue(left, frame)?;
                self.rvalue(right, frame)?;
                self.emitter.emit(Instr::Swap);
                self.emitter.emit(Instr::Lt);
                self.emitter.emit(Instr::Not);
                Ok(())
            }

            BinaryOp::GreaterEqual => {
                self.rvalue(left, frame)?;
                self.rvalue(right, frame)?;
                self.emitter.emit(Instr::Lt);
                self.emitter.emit(Instr::Not);
                Ok(())
            }

            BinaryOp::LogicalAnd => {
                let false_label = self.emitter.new_label();
                let end_label = self.emitter.new_label();

                self.rvalue(left, frame)?;
                self.emitter.emit_if_zero(false_label);
                self.rvalue(right, frame)?;
                self.emitter.emit_if_zero(false_label);
                self.emitter.emit(Instr::Const(1));
                self.emitter.emit_goto(end_label);
                self.emitter.bind(false_label);
                self.emitter.emit(Instr::Const(0));
                self.emitter.bind(end_label);
                Ok(())
            }

            BinaryOp::LogicalOr => {
                let true_label = self.emitter.new_label();
                let end_label = self.emitter.new_label();

                self.rvalue(left, frame)?;
                self.emitter.emit_if_not_zero(true_label);
                self.rvalue(right, frame)?;
                self.emitter.emit_if_not_zero(true_label);
                self.emitter.emit(Instr::Const(0));
                self.emitter.emit_goto(end_label);
                self.emitter.bind(true_label);
                self.emitter.emit(Instr::Const(1));
                self.emitter.bind(end_label);
                Ok(())
            }
        }
    }

    /// Multiply the top of stack by a size factor, skipping the
    /// no-op scale by one
    fn scale_by(&mut self, size: u64) {
        if size > 1 {
            self.emitter.emit(Instr::Const(size as Word));
            self.emitter.emit(Instr::Mul);
        }
    }

    fn push_address(&mut self, storage: Storage) -> Result<(), CompilerError> {
        match storage {
            Storage::Global(addr) => {
                self.emitter.emit(Instr::Const(addr as Word));
            }
            Storage::Local(offset) => {
                self.emitter.emit(Instr::GetBp);
                if offset > 0 {
                    self.emitter.emit(Instr::Const(offset as Word));
                    self.emitter.emit(Instr::Add);
                }
            }
            Storage::Func(_) => {
                return Err(CompilerError::internal(
                    "function storage has no data address".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn pointee_size(&self, pointer_type: &Type) -> Result<u64, CompilerError> {
        pointer_type
            .pointer_target()
            .map(|target| target.size_in_words())
            .ok_or_else(|| {
                CompilerError::internal("pointer arithmetic on non-pointer".to_string())
            })
    }

    fn expr_type<'e>(&self, expr: &'e Expression) -> Result<&'e Type, CompilerError> {
        expr.expr_type.as_ref().ok_or_else(|| {
            CompilerError::internal("expression reached code generation without a type".to_string())
        })
    }

    fn symbol_of(&self, id: Option<SymbolId>, name: &str) -> Result<SymbolId, CompilerError> {
        id.ok_or_else(|| {
            CompilerError::internal(format!("'{}' reached code generation unresolved", name))
        })
    }

    fn storage_of(&self, id: SymbolId, name: &str) -> Result<Storage, CompilerError> {
        self.storage.get(&id).copied().ok_or_else(|| {
            CompilerError::internal(format!("'{}' has no storage assigned", name))
        })
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
