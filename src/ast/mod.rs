//! Abstract Syntax Tree for Quill.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, UnaryOp};
pub use stmt::{Block, Program, Stmt, StmtKind};
