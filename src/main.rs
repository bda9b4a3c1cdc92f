//! Quill CLI: run script files or start the REPL.

use std::env;
use std::fs;
use std::process;

use colored::Colorize;

use quill::{repl::Repl, run_with_options, ExecutionMode};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Start the REPL
    Repl,
    /// Run a script file
    Run { file: String },
    /// Evaluate a string and print its value
    Eval { code: String },
}

struct Options {
    command: Command,
    mode: ExecutionMode,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("Quill {} - a small scripting language", VERSION);
    eprintln!();
    eprintln!("Usage: quill [options] [script.ql]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>       Evaluate code and print the result");
    eprintln!("  --interpret     Use the tree-walking interpreter instead of the VM");
    eprintln!("  --dis           Print the compiled bytecode before running");
    eprintln!("  --help, -h      Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  quill                     Start the interactive REPL");
    eprintln!("  quill script.ql           Run a script file on the bytecode VM");
    eprintln!("  quill --interpret s.ql    Run a script on the interpreter");
    eprintln!("  quill --dis script.ql     Show bytecode, then run");
    eprintln!("  quill -e '1 + 2'          Evaluate an expression");
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut options = Options {
        command: Command::Repl,
        mode: ExecutionMode::Bytecode,
        disassemble: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--interpret" => options.mode = ExecutionMode::TreeWalk,
            "--dis" => options.disassemble = true,
            "-e" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("-e requires an argument");
                    print_usage();
                    process::exit(64);
                }
                options.command = Command::Eval {
                    code: args[i].clone(),
                };
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown option: {}", arg);
                print_usage();
                process::exit(64);
            }
            file => {
                options.command = Command::Run {
                    file: file.to_string(),
                };
            }
        }
        i += 1;
    }

    options
}

fn main() {
    let options = parse_args();

    match options.command {
        Command::Repl => Repl::new().run(),

        Command::Run { file } => {
            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!("{}", format!("could not read {}: {}", file, err).red());
                    process::exit(66);
                }
            };
            if let Err(err) = run_with_options(&source, options.mode, options.disassemble) {
                eprintln!("{}", err.to_string().red());
                process::exit(70);
            }
        }

        Command::Eval { code } => match run_with_options(&code, options.mode, options.disassemble)
        {
            Ok(value) => println!("{}", value),
            Err(err) => {
                eprintln!("{}", err.to_string().red());
                process::exit(70);
            }
        },
    }
}
