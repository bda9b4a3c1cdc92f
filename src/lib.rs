//! Quill: a small dynamically-typed scripting language.
//!
//! # Execution Modes
//!
//! Quill programs run on one of two backends:
//! - **Tree-walk interpreter**: direct AST evaluation
//! - **Bytecode VM**: compilation to bytecode executed on a stack machine

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod span;

use error::QuillError;
use interpreter::value::Value;

/// Execution mode for running Quill programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Tree-walking interpreter
    TreeWalk,
    /// Bytecode virtual machine
    #[default]
    Bytecode,
}

/// Run a Quill program with the default execution mode.
pub fn run(source: &str) -> Result<Value, QuillError> {
    run_with_options(source, ExecutionMode::default(), false)
}

/// Run a Quill program with full control over execution options.
pub fn run_with_options(
    source: &str,
    mode: ExecutionMode,
    disassemble: bool,
) -> Result<Value, QuillError> {
    let program = parse(source)?;

    match mode {
        ExecutionMode::TreeWalk => {
            let mut interpreter = interpreter::Interpreter::new();
            Ok(interpreter.interpret(&program)?)
        }
        ExecutionMode::Bytecode => {
            let mut compiler = bytecode::Compiler::new();
            compiler.compile(&program)?;
            let compiled = compiler.bytecode();

            if disassemble {
                bytecode::print_disassembly(&compiled);
                println!("---");
            }

            let mut vm = bytecode::Vm::new(compiled);
            vm.run()?;
            Ok(vm.last_popped().clone())
        }
    }
}

/// Parse source code into an AST without executing.
pub fn parse(source: &str) -> Result<ast::Program, QuillError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code to bytecode without executing.
pub fn compile(source: &str) -> Result<bytecode::Bytecode, QuillError> {
    let program = parse(source)?;
    let mut compiler = bytecode::Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}

/// Compile source code and render its bytecode as text.
pub fn disassemble(source: &str) -> Result<String, QuillError> {
    let compiled = compile(source)?;
    Ok(bytecode::disassemble_bytecode(&compiled))
}
