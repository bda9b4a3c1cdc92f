//! Single-pass bytecode compiler: folds the AST into a flat instruction
//! stream plus a constant pool.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{BinaryOp, Block, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::bytecode::instruction::{make, Instructions, OpCode};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::error::CompileError;
use crate::interpreter::builtins;
use crate::interpreter::value::{CompiledFunction, Value};

pub type CompileResult<T> = Result<T, CompileError>;

/// Placeholder operand for jumps that get patched once the target is known.
const PLACEHOLDER: usize = 9999;

/// The output of compilation: the top-level instruction stream and the
/// constant pool it references.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// The opcode and position of an already-emitted instruction, kept for
/// peephole patching.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

/// Pending jump positions for the innermost loop being compiled.
#[derive(Debug, Default)]
struct LoopContext {
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
}

/// Per-function instruction buffer and bookkeeping. Scope 0 is the
/// top-level program; one more is pushed for each function literal.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
    loops: Vec<LoopContext>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: Rc<RefCell<SymbolTable>>,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Compiler {
    /// Create a compiler with a fresh symbol table, with the builtin
    /// registry pre-defined on it.
    pub fn new() -> Self {
        let symbol_table = Rc::new(RefCell::new(SymbolTable::new()));
        for (index, builtin) in builtins::BUILTINS.iter().enumerate() {
            symbol_table.borrow_mut().define_builtin(index, builtin.name);
        }
        Self::with_state(symbol_table, Vec::new())
    }

    /// Create a compiler that continues from existing state. The REPL
    /// uses this to keep the symbol table and constant pool alive
    /// across inputs.
    pub fn with_state(symbol_table: Rc<RefCell<SymbolTable>>, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Compile a program into the current scope.
    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// Consume the compiler, yielding the top-level instructions and
    /// the constant pool.
    pub fn bytecode(mut self) -> Bytecode {
        let main_scope = std::mem::take(&mut self.scopes[0]);
        Bytecode {
            instructions: main_scope.instructions,
            constants: self.constants,
        }
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
            }

            StmtKind::Let { name, value } => {
                self.compile_expression(value)?;

                // Re-binding a name already defined in this scope reuses
                // its slot; a loop's cycle step depends on this.
                let existing = self.symbol_table.borrow().resolve_current(name);
                let symbol = match existing {
                    Some(symbol) if symbol.scope != SymbolScope::Builtin => symbol,
                    _ => self.symbol_table.borrow_mut().define(name),
                };
                match symbol.scope {
                    SymbolScope::Global => self.emit(OpCode::SetGlobal, &[symbol.index]),
                    _ => self.emit(OpCode::SetLocal, &[symbol.index]),
                };
            }

            StmtKind::Return(value) => {
                self.compile_expression(value)?;
                self.emit(OpCode::ReturnValue, &[]);
            }

            StmtKind::Break => {
                if self.scopes[self.scope_index].loops.is_empty() {
                    return Err(CompileError::BreakOutsideLoop(stmt.span));
                }
                let pos = self.emit(OpCode::Jump, &[PLACEHOLDER]);
                if let Some(ctx) = self.scopes[self.scope_index].loops.last_mut() {
                    ctx.break_jumps.push(pos);
                }
            }

            StmtKind::Continue => {
                if self.scopes[self.scope_index].loops.is_empty() {
                    return Err(CompileError::ContinueOutsideLoop(stmt.span));
                }
                let pos = self.emit(OpCode::Jump, &[PLACEHOLDER]);
                if let Some(ctx) = self.scopes[self.scope_index].loops.last_mut() {
                    ctx.continue_jumps.push(pos);
                }
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> CompileResult<()> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::IntLiteral(n) => {
                let index = self.add_constant(Value::Int(*n));
                self.emit(OpCode::Constant, &[index]);
            }

            ExprKind::StringLiteral(s) => {
                let index = self.add_constant(Value::String(Rc::new(s.clone())));
                self.emit(OpCode::Constant, &[index]);
            }

            ExprKind::BoolLiteral(true) => {
                self.emit(OpCode::True, &[]);
            }
            ExprKind::BoolLiteral(false) => {
                self.emit(OpCode::False, &[]);
            }

            ExprKind::Null => {
                self.emit(OpCode::Null, &[]);
            }

            ExprKind::Prefix { operator, operand } => {
                self.compile_expression(operand)?;
                match operator {
                    UnaryOp::Bang => self.emit(OpCode::Bang, &[]),
                    UnaryOp::Minus => self.emit(OpCode::Minus, &[]),
                };
            }

            ExprKind::Infix {
                left,
                operator,
                right,
            } => {
                // `<` is strictly-reversed `>`: compile the operands in
                // swapped order and reuse OpGreaterThan.
                if *operator == BinaryOp::Less {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(OpCode::GreaterThan, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;

                match operator {
                    BinaryOp::Add => self.emit(OpCode::Add, &[]),
                    BinaryOp::Subtract => self.emit(OpCode::Sub, &[]),
                    BinaryOp::Multiply => self.emit(OpCode::Mul, &[]),
                    BinaryOp::Divide => self.emit(OpCode::Div, &[]),
                    BinaryOp::Greater => self.emit(OpCode::GreaterThan, &[]),
                    BinaryOp::Equal => self.emit(OpCode::Equal, &[]),
                    BinaryOp::NotEqual => self.emit(OpCode::NotEqual, &[]),
                    other => {
                        return Err(CompileError::UnknownOperator(other.to_string(), expr.span))
                    }
                };
            }

            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;

                let jump_not_truthy = self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }

                let jump = self.emit(OpCode::Jump, &[PLACEHOLDER]);

                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_not_truthy, after_consequence);

                match alternative {
                    None => {
                        self.emit(OpCode::Null, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(OpCode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_instructions().len();
                self.change_operand(jump, after_alternative);
            }

            ExprKind::While { condition, body } => {
                let loop_start = self.current_instructions().len();
                self.compile_expression(condition)?;
                let exit_jump = self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER]);

                self.scopes[self.scope_index].loops.push(LoopContext::default());
                self.compile_block(body)?;
                let ctx = self.scopes[self.scope_index]
                    .loops
                    .pop()
                    .unwrap_or_default();

                self.emit(OpCode::Jump, &[loop_start]);

                let after_loop = self.current_instructions().len();
                self.change_operand(exit_jump, after_loop);
                for pos in ctx.break_jumps {
                    self.change_operand(pos, after_loop);
                }
                for pos in ctx.continue_jumps {
                    self.change_operand(pos, loop_start);
                }

                // A loop expression evaluates to null.
                self.emit(OpCode::Null, &[]);
            }

            ExprKind::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.compile_statement(init)?;
                }

                let loop_start = self.current_instructions().len();
                self.compile_expression(condition)?;
                let exit_jump = self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER]);

                self.scopes[self.scope_index].loops.push(LoopContext::default());
                self.compile_block(body)?;
                let ctx = self.scopes[self.scope_index]
                    .loops
                    .pop()
                    .unwrap_or_default();

                // Continue targets the step, not the condition.
                let step_start = self.current_instructions().len();
                self.compile_statement(step)?;
                self.emit(OpCode::Jump, &[loop_start]);

                let after_loop = self.current_instructions().len();
                self.change_operand(exit_jump, after_loop);
                for pos in ctx.break_jumps {
                    self.change_operand(pos, after_loop);
                }
                for pos in ctx.continue_jumps {
                    self.change_operand(pos, step_start);
                }

                self.emit(OpCode::Null, &[]);
            }

            ExprKind::Identifier(name) => {
                let symbol = self.symbol_table.borrow().resolve(name);
                match symbol {
                    Some(symbol) => self.load_symbol(&symbol),
                    None => {
                        return Err(CompileError::UndefinedVariable(name.clone(), expr.span))
                    }
                }
            }

            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
            }

            ExprKind::Hash(pairs) => {
                // Emission order must not depend on source order of the
                // keys: sort by their textual form.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|pair| pair.0.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::Hash, &[pairs.len() * 2]);
            }

            ExprKind::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::Index, &[]);
            }

            ExprKind::Function { parameters, body } => {
                self.enter_scope();

                for parameter in parameters {
                    self.symbol_table.borrow_mut().define(parameter);
                }

                self.compile_block(body)?;

                if self.last_instruction_is(OpCode::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(OpCode::ReturnValue) {
                    self.emit(OpCode::Return, &[]);
                }

                let num_locals = self.symbol_table.borrow().num_definitions();
                let instructions = self.leave_scope();

                let function = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len(),
                };
                let index = self.add_constant(Value::CompiledFunction(Rc::new(function)));
                self.emit(OpCode::Constant, &[index]);
            }

            ExprKind::Call { callee, arguments } => {
                self.compile_expression(callee)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index]),
        };
    }

    /// Append a value to the constant pool and return its index.
    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        assert!(self.constants.len() <= u16::MAX as usize + 1, "too many constants");
        self.constants.len() - 1
    }

    /// Encode and append an instruction, recording it for peephole
    /// patching. Returns its starting position.
    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let pos = self.add_instruction(&instruction);
        self.set_last_instruction(op, pos);
        pos
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = &mut self.scopes[self.scope_index];
        let pos = scope.instructions.len();
        scope.instructions.extend_from_slice(instruction);
        pos
    }

    fn set_last_instruction(&mut self, opcode: OpCode, position: usize) {
        let scope = &mut self.scopes[self.scope_index];
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        matches!(
            self.scopes[self.scope_index].last_instruction,
            Some(last) if last.opcode == op
        )
    }

    /// Truncate the buffer back over the trailing OpPop and promote the
    /// previous instruction to last.
    fn remove_last_pop(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_instruction(&mut self, pos: usize, new_instruction: &[u8]) {
        let instructions = &mut self.scopes[self.scope_index].instructions;
        instructions[pos..pos + new_instruction.len()].copy_from_slice(new_instruction);
    }

    /// Re-encode the instruction at `pos` with a new operand. Only valid
    /// for opcodes whose encoded width does not change.
    fn change_operand(&mut self, pos: usize, operand: usize) {
        if let Some(op) = OpCode::from_u8(self.current_instructions()[pos]) {
            let new_instruction = make(op, &[operand]);
            self.replace_instruction(pos, &new_instruction);
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.scopes[self.scope_index].last_instruction {
            let new_instruction = make(OpCode::ReturnValue, &[]);
            self.replace_instruction(last.position, &new_instruction);
        }
        if let Some(ref mut last) = self.scopes[self.scope_index].last_instruction {
            last.opcode = OpCode::ReturnValue;
        }
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scope_index].instructions
    }

    /// Open a fresh instruction buffer and an enclosed symbol table for
    /// a function literal.
    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;

        let enclosed = SymbolTable::new_enclosed(Rc::clone(&self.symbol_table));
        self.symbol_table = Rc::new(RefCell::new(enclosed));
    }

    /// Close the innermost compilation scope, returning its instructions
    /// and restoring the enclosing symbol table.
    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().unwrap_or_default();
        self.scope_index -= 1;

        let outer = self.symbol_table.borrow().outer();
        if let Some(outer) = outer {
            self.symbol_table = outer;
        }

        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instruction::disassemble;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn compile_source(source: &str) -> Bytecode {
        try_compile(source).expect("compile error")
    }

    fn try_compile(source: &str) -> CompileResult<Bytecode> {
        let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        let mut compiler = Compiler::new();
        compiler.compile(&program)?;
        Ok(compiler.bytecode())
    }

    fn concat(parts: &[Vec<u8>]) -> Vec<u8> {
        parts.iter().flatten().copied().collect()
    }

    fn assert_instructions(source: &str, expected: &[Vec<u8>]) {
        let bytecode = compile_source(source);
        let expected = concat(expected);
        assert_eq!(
            bytecode.instructions,
            expected,
            "\nsource: {}\ngot:\n{}\nwant:\n{}",
            source,
            disassemble(&bytecode.instructions),
            disassemble(&expected),
        );
    }

    fn constant_ints(bytecode: &Bytecode) -> Vec<i64> {
        bytecode
            .constants
            .iter()
            .filter_map(|c| match c {
                Value::Int(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    fn function_constant(bytecode: &Bytecode, index: usize) -> Rc<CompiledFunction> {
        match &bytecode.constants[index] {
            Value::CompiledFunction(func) => Rc::clone(func),
            other => panic!("constant {} is not a function: {:?}", index, other),
        }
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_instructions(
            "1 + 2",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Add, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1; 2",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Pop, &[]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1 - 2",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Sub, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1 * 2",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Mul, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "2 / 1",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Div, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "-1",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Minus, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_boolean_expressions() {
        assert_instructions(
            "true",
            &[make(OpCode::True, &[]), make(OpCode::Pop, &[])],
        );
        assert_instructions(
            "1 > 2",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::GreaterThan, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1 == 2",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Equal, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1 != 2",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::NotEqual, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "!true",
            &[
                make(OpCode::True, &[]),
                make(OpCode::Bang, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_less_than_compiles_reversed() {
        // `1 < 2` emits the operands swapped and reuses OpGreaterThan.
        let bytecode = compile_source("1 < 2");
        assert_eq!(constant_ints(&bytecode), vec![2, 1]);
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::GreaterThan, &[]),
                make(OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_conditionals() {
        assert_instructions(
            "if (true) { 10 }; 3333;",
            &[
                // 0000
                make(OpCode::True, &[]),
                // 0001
                make(OpCode::JumpNotTruthy, &[10]),
                // 0004
                make(OpCode::Constant, &[0]),
                // 0007
                make(OpCode::Jump, &[11]),
                // 0010
                make(OpCode::Null, &[]),
                // 0011
                make(OpCode::Pop, &[]),
                // 0012
                make(OpCode::Constant, &[1]),
                // 0015
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "if (true) { 10 } else { 20 }; 3333;",
            &[
                make(OpCode::True, &[]),
                make(OpCode::JumpNotTruthy, &[10]),
                make(OpCode::Constant, &[0]),
                make(OpCode::Jump, &[13]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Pop, &[]),
                make(OpCode::Constant, &[2]),
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_global_let_statements() {
        assert_instructions(
            "let one = 1; let two = 2;",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::SetGlobal, &[1]),
            ],
        );
        assert_instructions(
            "let one = 1; one;",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_let_rebinding_reuses_slot() {
        assert_instructions(
            "let x = 1; let x = 2;",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::SetGlobal, &[0]),
            ],
        );
    }

    #[test]
    fn test_string_expressions() {
        let bytecode = compile_source(r#""quill" + "lang""#);
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Add, &[]),
                make(OpCode::Pop, &[]),
            ])
        );
        assert_eq!(bytecode.constants.len(), 2);
    }

    #[test]
    fn test_array_literals() {
        assert_instructions(
            "[]",
            &[make(OpCode::Array, &[0]), make(OpCode::Pop, &[])],
        );
        assert_instructions(
            "[1, 2, 3]",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Constant, &[2]),
                make(OpCode::Array, &[3]),
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_hash_literals() {
        assert_instructions(
            "{}",
            &[make(OpCode::Hash, &[0]), make(OpCode::Pop, &[])],
        );
        assert_instructions(
            "{1: 2, 3: 4, 5: 6}",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Constant, &[2]),
                make(OpCode::Constant, &[3]),
                make(OpCode::Constant, &[4]),
                make(OpCode::Constant, &[5]),
                make(OpCode::Hash, &[6]),
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_hash_emission_is_sorted_by_key_text() {
        let forward = compile_source(r#"{"a": 1, "b": 2}"#);
        let reversed = compile_source(r#"{"b": 2, "a": 1}"#);

        assert_eq!(forward.instructions, reversed.instructions);

        let display = |bytecode: &Bytecode| -> Vec<String> {
            bytecode.constants.iter().map(|c| c.to_string()).collect()
        };
        assert_eq!(display(&forward), display(&reversed));
    }

    #[test]
    fn test_index_expressions() {
        assert_instructions(
            "[1, 2][1]",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Array, &[2]),
                make(OpCode::Constant, &[2]),
                make(OpCode::Index, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "{1: 2}[1]",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Hash, &[2]),
                make(OpCode::Constant, &[2]),
                make(OpCode::Index, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_functions() {
        let bytecode = compile_source("fn() { return 5 + 10 }");
        let func = function_constant(&bytecode, 2);
        assert_eq!(
            func.instructions,
            concat(&[
                make(OpCode::Constant, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Add, &[]),
                make(OpCode::ReturnValue, &[]),
            ])
        );

        // An implicit return compiles identically.
        let implicit = compile_source("fn() { 5 + 10 }");
        let implicit_func = function_constant(&implicit, 2);
        assert_eq!(implicit_func.instructions, func.instructions);
    }

    #[test]
    fn test_function_with_multiple_statements() {
        let bytecode = compile_source("fn() { 1; 2 }");
        let func = function_constant(&bytecode, 2);
        assert_eq!(
            func.instructions,
            concat(&[
                make(OpCode::Constant, &[0]),
                make(OpCode::Pop, &[]),
                make(OpCode::Constant, &[1]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn test_empty_function_returns_null() {
        let bytecode = compile_source("fn() { }");
        let func = function_constant(&bytecode, 0);
        assert_eq!(func.instructions, make(OpCode::Return, &[]));
        assert_eq!(func.num_locals, 0);
        assert_eq!(func.num_parameters, 0);
    }

    #[test]
    fn test_function_calls() {
        assert_instructions(
            "fn() { 24 }();",
            &[
                make(OpCode::Constant, &[1]),
                make(OpCode::Call, &[0]),
                make(OpCode::Pop, &[]),
            ],
        );
        assert_instructions(
            "let noArg = fn() { 24 }; noArg();",
            &[
                make(OpCode::Constant, &[1]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::Call, &[0]),
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_function_parameters_become_locals() {
        let bytecode = compile_source("let oneArg = fn(a) { a }; oneArg(24);");
        let func = function_constant(&bytecode, 0);
        assert_eq!(
            func.instructions,
            concat(&[
                make(OpCode::GetLocal, &[0]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!(func.num_parameters, 1);
        assert_eq!(func.num_locals, 1);

        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(OpCode::Constant, &[0]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::Call, &[1]),
                make(OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_let_statement_scopes() {
        // A global referenced from a function body.
        let bytecode = compile_source("let num = 55; fn() { num }");
        let func = function_constant(&bytecode, 1);
        assert_eq!(
            func.instructions,
            concat(&[
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::ReturnValue, &[]),
            ])
        );

        // A local defined and read in the same function.
        let bytecode = compile_source("fn() { let num = 55; num }");
        let func = function_constant(&bytecode, 1);
        assert_eq!(
            func.instructions,
            concat(&[
                make(OpCode::Constant, &[0]),
                make(OpCode::SetLocal, &[0]),
                make(OpCode::GetLocal, &[0]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!(func.num_locals, 1);

        let bytecode = compile_source("fn() { let a = 55; let b = 77; a + b }");
        let func = function_constant(&bytecode, 2);
        assert_eq!(
            func.instructions,
            concat(&[
                make(OpCode::Constant, &[0]),
                make(OpCode::SetLocal, &[0]),
                make(OpCode::Constant, &[1]),
                make(OpCode::SetLocal, &[1]),
                make(OpCode::GetLocal, &[0]),
                make(OpCode::GetLocal, &[1]),
                make(OpCode::Add, &[]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!(func.num_locals, 2);
    }

    #[test]
    fn test_builtins_compile_to_registry_indices() {
        assert_instructions(
            "len([]); push([], 1);",
            &[
                make(OpCode::GetBuiltin, &[2]),
                make(OpCode::Array, &[0]),
                make(OpCode::Call, &[1]),
                make(OpCode::Pop, &[]),
                make(OpCode::GetBuiltin, &[1]),
                make(OpCode::Array, &[0]),
                make(OpCode::Constant, &[0]),
                make(OpCode::Call, &[2]),
                make(OpCode::Pop, &[]),
            ],
        );

        // Builtins resolve from inside function scopes too.
        let bytecode = compile_source("fn() { len([]) }");
        let func = function_constant(&bytecode, 0);
        assert_eq!(
            func.instructions,
            concat(&[
                make(OpCode::GetBuiltin, &[2]),
                make(OpCode::Array, &[0]),
                make(OpCode::Call, &[1]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn test_while_loops() {
        assert_instructions(
            "while (1 > 0) { 1; }",
            &[
                // 0000
                make(OpCode::Constant, &[0]),
                // 0003
                make(OpCode::Constant, &[1]),
                // 0006
                make(OpCode::GreaterThan, &[]),
                // 0007
                make(OpCode::JumpNotTruthy, &[17]),
                // 0010
                make(OpCode::Constant, &[2]),
                // 0013
                make(OpCode::Pop, &[]),
                // 0014
                make(OpCode::Jump, &[0]),
                // 0017
                make(OpCode::Null, &[]),
                // 0018
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_break_jumps_out_of_loop() {
        assert_instructions(
            "while (true) { break; }",
            &[
                // 0000
                make(OpCode::True, &[]),
                // 0001
                make(OpCode::JumpNotTruthy, &[10]),
                // 0004 break
                make(OpCode::Jump, &[10]),
                // 0007
                make(OpCode::Jump, &[0]),
                // 0010
                make(OpCode::Null, &[]),
                // 0011
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_continue_jumps_to_condition() {
        assert_instructions(
            "while (true) { continue; }",
            &[
                make(OpCode::True, &[]),
                make(OpCode::JumpNotTruthy, &[10]),
                make(OpCode::Jump, &[0]),
                make(OpCode::Jump, &[0]),
                make(OpCode::Null, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_for_loops() {
        assert_instructions(
            "for let i = 0 : i < 3 : let i = i + 1 { }",
            &[
                // init
                make(OpCode::Constant, &[0]),
                make(OpCode::SetGlobal, &[0]),
                // condition (i < 3 is reversed: 3 first, then i)
                make(OpCode::Constant, &[1]),
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::GreaterThan, &[]),
                make(OpCode::JumpNotTruthy, &[29]),
                // step
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::Constant, &[2]),
                make(OpCode::Add, &[]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::Jump, &[6]),
                // exit
                make(OpCode::Null, &[]),
                make(OpCode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_undefined_variable() {
        assert!(matches!(
            try_compile("foobar"),
            Err(CompileError::UndefinedVariable(name, _)) if name == "foobar"
        ));
    }

    #[test]
    fn test_operators_outside_the_instruction_set() {
        assert!(matches!(
            try_compile("1 <= 2"),
            Err(CompileError::UnknownOperator(op, _)) if op == "<="
        ));
        assert!(matches!(
            try_compile("true && false"),
            Err(CompileError::UnknownOperator(op, _)) if op == "&&"
        ));
    }

    #[test]
    fn test_break_outside_loop_is_an_error() {
        assert!(matches!(
            try_compile("break;"),
            Err(CompileError::BreakOutsideLoop(_))
        ));
        assert!(matches!(
            try_compile("continue;"),
            Err(CompileError::ContinueOutsideLoop(_))
        ));
    }

    // There is no free-variable capture: a nested function that reads an
    // enclosing function's local emits a plain OpGetLocal against its own
    // frame. Only global and builtin references cross function bodies.
    #[test]
    fn test_nested_functions_do_not_capture_locals() {
        let bytecode = compile_source("fn() { let a = 1; fn() { a } }");
        let inner = function_constant(&bytecode, 1);
        assert_eq!(
            inner.instructions,
            concat(&[
                make(OpCode::GetLocal, &[0]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn test_compilation_scopes_restore_symbol_table() {
        // A global defined before a function literal is still resolvable
        // after the function body has been compiled.
        assert_instructions(
            "let g = 1; fn() { 2 }; g;",
            &[
                make(OpCode::Constant, &[0]),
                make(OpCode::SetGlobal, &[0]),
                make(OpCode::Constant, &[2]),
                make(OpCode::Pop, &[]),
                make(OpCode::GetGlobal, &[0]),
                make(OpCode::Pop, &[]),
            ],
        );
    }
}
