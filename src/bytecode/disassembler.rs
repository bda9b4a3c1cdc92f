//! Program-level bytecode dump: instruction listing plus constant pool.

use std::fmt::Write;

use crate::bytecode::compiler::Bytecode;
use crate::bytecode::instruction;
use crate::interpreter::value::Value;

/// Render compiled bytecode as an instruction listing followed by the
/// constant pool. Function constants get their own indented listing.
pub fn disassemble_bytecode(bytecode: &Bytecode) -> String {
    let mut out = String::new();

    out.push_str("Instructions:\n");
    out.push_str(&instruction::disassemble(&bytecode.instructions));

    out.push_str("\nConstants:\n");
    for (index, constant) in bytecode.constants.iter().enumerate() {
        let _ = writeln!(out, "{:04} {}", index, constant);
        if let Value::CompiledFunction(func) = constant {
            for line in instruction::disassemble(&func.instructions).lines() {
                let _ = writeln!(out, "     | {}", line);
            }
        }
    }

    out
}

/// Print the dump to stdout.
pub fn print_disassembly(bytecode: &Bytecode) {
    print!("{}", disassemble_bytecode(bytecode));
}
