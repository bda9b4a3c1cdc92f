//! Interactive REPL driving the lexer, parser, compiler, and VM.
//!
//! Input is buffered until braces and parentheses balance, so
//! definitions can span lines. The symbol table, constant pool, and
//! globals store survive across inputs; a later line sees the bindings
//! of an earlier one at the same indices.

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::bytecode::compiler::Compiler;
use crate::bytecode::disassembler::disassemble_bytecode;
use crate::bytecode::symbol_table::SymbolTable;
use crate::bytecode::vm::{Vm, GLOBALS_SIZE};
use crate::error::QuillError;
use crate::interpreter::builtins;
use crate::interpreter::value::Value;
use crate::lexer::Scanner;
use crate::parser::Parser;

const PROMPT: &str = ">> ";
const MULTILINE_PROMPT: &str = "... ";
const HISTORY_FILE: &str = ".quill_history";

/// What processing one buffered input produced.
enum Outcome {
    /// A normal run; print the VM's last-popped value.
    Value(Value),
    /// A `dis(...)` request; print the dump verbatim.
    Disassembly(String),
    /// The input did not parse; report every collected error.
    ParseErrors(Vec<String>),
}

pub struct Repl {
    symbol_table: Rc<RefCell<SymbolTable>>,
    constants: Vec<Value>,
    globals: Vec<Value>,
    buffer: String,
}

impl Repl {
    pub fn new() -> Self {
        let symbol_table = Rc::new(RefCell::new(SymbolTable::new()));
        for (index, builtin) in builtins::BUILTINS.iter().enumerate() {
            symbol_table.borrow_mut().define_builtin(index, builtin.name);
        }

        Self {
            symbol_table,
            constants: Vec::new(),
            globals: vec![Value::Null; GLOBALS_SIZE],
            buffer: String::new(),
        }
    }

    pub fn run(&mut self) {
        println!("Quill {}", env!("CARGO_PKG_VERSION"));
        println!("Wrap code in dis(...) to inspect its bytecode. Ctrl+D exits.\n");

        let mut rl = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(_) => {
                println!("Warning: using basic input (no history)");
                self.run_basic();
                return;
            }
        };

        let history_file = Self::history_path();
        let _ = rl.load_history(&history_file);

        loop {
            let prompt = if self.buffer.is_empty() {
                PROMPT
            } else {
                MULTILINE_PROMPT
            };

            match rl.readline(prompt) {
                Ok(line) => {
                    if self.buffer.is_empty() {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if trimmed == "exit" || trimmed == "quit" {
                            break;
                        }
                    }
                    let _ = rl.add_history_entry(&line);
                    self.feed_line(&line);
                }
                Err(ReadlineError::Interrupted) => {
                    self.buffer.clear();
                    println!("^C");
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    println!("{}", format!("error: {}", err).red());
                    break;
                }
            }
        }

        let _ = rl.save_history(&history_file);
        println!("Goodbye!");
    }

    fn run_basic(&mut self) {
        let stdin = io::stdin();
        loop {
            let prompt = if self.buffer.is_empty() {
                PROMPT
            } else {
                MULTILINE_PROMPT
            };
            print!("{}", prompt);
            let _ = io::stdout().flush();

            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim_end();
                    if self.buffer.is_empty() && (trimmed == "exit" || trimmed == "quit") {
                        break;
                    }
                    self.feed_line(trimmed);
                }
                Err(_) => break,
            }
        }
        println!("Goodbye!");
    }

    /// Append a line to the buffer; once braces and parens balance,
    /// process the whole buffered input.
    fn feed_line(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');

        if !is_balanced(&self.buffer) {
            return;
        }

        let input = std::mem::take(&mut self.buffer);
        if input.trim().is_empty() {
            return;
        }
        self.process_input(&input);
    }

    fn process_input(&mut self, input: &str) {
        match self.eval_input(input) {
            Ok(Outcome::Value(value)) => println!("{}", value),
            Ok(Outcome::Disassembly(dump)) => {
                println!("Bytecode disassembly:");
                print!("{}", dump);
            }
            Ok(Outcome::ParseErrors(errors)) => print_parser_errors(&errors),
            Err(err) => println!("{}", err.to_string().red()),
        }
    }

    /// Compile and run one complete input against the persistent state.
    fn eval_input(&mut self, input: &str) -> Result<Outcome, QuillError> {
        let trimmed = input.trim();
        if let Some(code) = extract_dis_code(trimmed) {
            return self.disassemble(code);
        }

        let tokens = Scanner::new(input).scan_tokens()?;
        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(errors) => {
                return Ok(Outcome::ParseErrors(
                    errors.iter().map(|e| e.to_string()).collect(),
                ))
            }
        };

        // A failed compile must not corrupt the persistent pool, so the
        // compiler works on a copy of the constants.
        let mut compiler =
            Compiler::with_state(Rc::clone(&self.symbol_table), self.constants.clone());
        compiler.compile(&program)?;
        let bytecode = compiler.bytecode();
        self.constants = bytecode.constants.clone();

        let mut vm = Vm::with_globals(bytecode, std::mem::take(&mut self.globals));
        let outcome = vm.run();
        let value = vm.last_popped().clone();
        self.globals = vm.into_globals();
        outcome?;

        Ok(Outcome::Value(value))
    }

    /// Compile without running, in a fresh compiler, and dump the result.
    fn disassemble(&self, code: &str) -> Result<Outcome, QuillError> {
        let tokens = Scanner::new(code).scan_tokens()?;
        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(errors) => {
                return Ok(Outcome::ParseErrors(
                    errors.iter().map(|e| e.to_string()).collect(),
                ))
            }
        };

        let mut compiler = Compiler::new();
        compiler.compile(&program)?;
        Ok(Outcome::Disassembly(disassemble_bytecode(
            &compiler.bytecode(),
        )))
    }

    fn history_path() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            home.join(HISTORY_FILE)
        } else {
            PathBuf::from(HISTORY_FILE)
        }
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

fn print_parser_errors(errors: &[String]) {
    println!("{}", "parser errors:".red());
    for message in errors {
        println!("\t{}", message);
    }
}

/// Balanced braces and parentheses, ignoring string contents.
fn is_balanced(input: &str) -> bool {
    let mut braces = 0i32;
    let mut parens = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for c in input.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => braces += 1,
                '}' => braces -= 1,
                '(' => parens += 1,
                ')' => parens -= 1,
                _ => {}
            }
        }
    }

    braces <= 0 && parens <= 0
}

/// If the input is a `dis(<code>)` request, return the inner code.
fn extract_dis_code(input: &str) -> Option<&str> {
    input
        .strip_prefix("dis(")
        .and_then(|rest| rest.strip_suffix(')'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(repl: &mut Repl, input: &str) -> Outcome {
        repl.eval_input(input).expect("eval error")
    }

    #[test]
    fn test_balance_tracking() {
        assert!(is_balanced("1 + 2"));
        assert!(!is_balanced("let f = fn() {"));
        assert!(is_balanced("let f = fn() { 1 }"));
        assert!(!is_balanced("add(1,"));
        assert!(is_balanced("add(1, 2)"));
        // Braces inside strings do not count.
        assert!(is_balanced(r#""{""#));
        assert!(is_balanced(r#""\"{""#));
    }

    #[test]
    fn test_dis_extraction() {
        assert_eq!(extract_dis_code("dis(1 + 2)"), Some("1 + 2"));
        assert_eq!(extract_dis_code("1 + 2"), None);
        assert_eq!(extract_dis_code("display(1)"), None);
    }

    #[test]
    fn test_state_persists_across_inputs() {
        let mut repl = Repl::new();

        match eval(&mut repl, "let one = 1; let two = 2;") {
            Outcome::Value(_) => {}
            _ => panic!("expected a value outcome"),
        }
        match eval(&mut repl, "one + two;") {
            Outcome::Value(value) => assert_eq!(value, Value::Int(3)),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn test_functions_persist_across_inputs() {
        let mut repl = Repl::new();
        eval(&mut repl, "let add = fn(a, b) { a + b; };");
        match eval(&mut repl, "add(3, 4);") {
            Outcome::Value(value) => assert_eq!(value, Value::Int(7)),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn test_failed_compile_keeps_state_usable() {
        let mut repl = Repl::new();
        eval(&mut repl, "let x = 10;");
        assert!(repl.eval_input("y + 1;").is_err());
        match eval(&mut repl, "x + 1;") {
            Outcome::Value(value) => assert_eq!(value, Value::Int(11)),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn test_parse_errors_are_reported_not_fatal() {
        let mut repl = Repl::new();
        match eval(&mut repl, "let = 1;") {
            Outcome::ParseErrors(errors) => assert!(!errors.is_empty()),
            _ => panic!("expected parse errors"),
        }
        // The session keeps working afterwards.
        match eval(&mut repl, "2 + 2;") {
            Outcome::Value(value) => assert_eq!(value, Value::Int(4)),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn test_disassembly_outcome() {
        let mut repl = Repl::new();
        match eval(&mut repl, "dis(1 + 2)") {
            Outcome::Disassembly(dump) => {
                assert!(dump.contains("0000 OpConstant 0"));
                assert!(dump.contains("0006 OpAdd"));
                assert!(dump.contains("Constants:"));
            }
            _ => panic!("expected a disassembly"),
        }
    }
}
