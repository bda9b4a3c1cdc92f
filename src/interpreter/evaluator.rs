//! Tree-walking evaluator.
//!
//! Control flow inside loops and functions travels as marker values
//! (`ReturnValue`, `Break`, `Continue`) that block evaluation surfaces
//! to the nearest construct that consumes them.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{BinaryOp, Block, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::error::RuntimeError;
use crate::interpreter::builtins;
use crate::interpreter::environment::Environment;
use crate::interpreter::value::{Function, HashPair, Value};

pub type EvalResult = Result<Value, RuntimeError>;

/// The tree-walking interpreter. Holds the global environment so REPL
/// inputs can share state.
pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            globals: Rc::new(RefCell::new(Environment::new())),
        }
    }

    pub fn global_env(&self) -> Rc<RefCell<Environment>> {
        Rc::clone(&self.globals)
    }

    /// Evaluate a program, returning the value of its last statement.
    pub fn interpret(&mut self, program: &Program) -> EvalResult {
        let env = Rc::clone(&self.globals);
        let mut result = Value::Null;

        for stmt in &program.statements {
            result = self.eval_statement(stmt, &env)?;
            if let Value::ReturnValue(value) = result {
                return Ok(*value);
            }
        }

        Ok(result)
    }

    fn eval_statement(&self, stmt: &Stmt, env: &Rc<RefCell<Environment>>) -> EvalResult {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                let value = self.eval_expression(value, env)?;
                env.borrow_mut().define(name.clone(), value);
                Ok(Value::Null)
            }
            StmtKind::Return(value) => {
                let value = self.eval_expression(value, env)?;
                Ok(Value::ReturnValue(Box::new(value)))
            }
            StmtKind::Break => Ok(Value::Break),
            StmtKind::Continue => Ok(Value::Continue),
            StmtKind::Expression(expr) => self.eval_expression(expr, env),
        }
    }

    // Blocks do not open a new scope; only function calls do.
    fn eval_block(&self, block: &Block, env: &Rc<RefCell<Environment>>) -> EvalResult {
        let mut result = Value::Null;

        for stmt in &block.statements {
            result = self.eval_statement(stmt, env)?;
            if matches!(
                result,
                Value::ReturnValue(_) | Value::Break | Value::Continue
            ) {
                return Ok(result);
            }
        }

        Ok(result)
    }

    fn eval_expression(&self, expr: &Expr, env: &Rc<RefCell<Environment>>) -> EvalResult {
        match &expr.kind {
            ExprKind::IntLiteral(n) => Ok(Value::Int(*n)),
            ExprKind::StringLiteral(s) => Ok(Value::String(Rc::new(s.clone()))),
            ExprKind::BoolLiteral(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),

            ExprKind::Identifier(name) => self.eval_identifier(name, env),

            ExprKind::Prefix { operator, operand } => {
                let operand = self.eval_expression(operand, env)?;
                self.eval_prefix(*operator, operand)
            }

            ExprKind::Infix {
                left,
                operator,
                right,
            } => {
                let left = self.eval_expression(left, env)?;
                let right = self.eval_expression(right, env)?;
                self.eval_infix(*operator, left, right)
            }

            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                let condition = self.eval_expression(condition, env)?;
                if condition.is_truthy() {
                    self.eval_block(consequence, env)
                } else if let Some(alternative) = alternative {
                    self.eval_block(alternative, env)
                } else {
                    Ok(Value::Null)
                }
            }

            ExprKind::While { condition, body } => {
                loop {
                    let condition = self.eval_expression(condition, env)?;
                    if !condition.is_truthy() {
                        break;
                    }
                    let result = self.eval_block(body, env)?;
                    match result {
                        Value::ReturnValue(_) => return Ok(result),
                        Value::Break => break,
                        _ => {}
                    }
                }
                Ok(Value::Null)
            }

            ExprKind::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.eval_statement(init, env)?;
                }
                loop {
                    let condition = self.eval_expression(condition, env)?;
                    if !condition.is_truthy() {
                        break;
                    }
                    let result = self.eval_block(body, env)?;
                    match result {
                        Value::ReturnValue(_) => return Ok(result),
                        Value::Break => break,
                        // Continue still runs the step before re-testing.
                        _ => {}
                    }
                    self.eval_statement(step, env)?;
                }
                Ok(Value::Null)
            }

            ExprKind::Function { parameters, body } => Ok(Value::Function(Rc::new(Function {
                parameters: parameters.clone(),
                body: body.clone(),
                env: Rc::clone(env),
            }))),

            ExprKind::Call { callee, arguments } => {
                let callee = self.eval_expression(callee, env)?;
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.eval_expression(argument, env)?);
                }
                self.apply_function(callee, args)
            }

            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expression(element, env)?);
                }
                Ok(Value::Array(Rc::new(values)))
            }

            ExprKind::Hash(pairs) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (key_expr, value_expr) in pairs {
                    let key = self.eval_expression(key_expr, env)?;
                    let value = self.eval_expression(value_expr, env)?;
                    let hash_key = key
                        .hash_key()
                        .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
                    map.insert(hash_key, HashPair { key, value });
                }
                Ok(Value::Hash(Rc::new(map)))
            }

            ExprKind::Index { left, index } => {
                let left = self.eval_expression(left, env)?;
                let index = self.eval_expression(index, env)?;
                self.eval_index(left, index)
            }
        }
    }

    fn eval_identifier(&self, name: &str, env: &Rc<RefCell<Environment>>) -> EvalResult {
        if let Some(value) = env.borrow().get(name) {
            return Ok(value);
        }
        if let Some(builtin) = builtins::lookup(name) {
            return Ok(Value::Builtin(builtin));
        }
        Err(RuntimeError::UndefinedVariable(name.to_string()))
    }

    fn eval_prefix(&self, operator: UnaryOp, operand: Value) -> EvalResult {
        match operator {
            // The evaluator's bang treats null as true.
            UnaryOp::Bang => Ok(match operand {
                Value::Bool(b) => Value::Bool(!b),
                Value::Null => Value::Bool(true),
                _ => Value::Bool(false),
            }),
            UnaryOp::Minus => match operand {
                Value::Int(n) => Ok(Value::Int(-n)),
                other => Err(RuntimeError::UnknownPrefixOperator {
                    operator: "-".to_string(),
                    operand: other.type_name(),
                }),
            },
        }
    }

    fn eval_infix(&self, operator: BinaryOp, left: Value, right: Value) -> EvalResult {
        match (&left, &right) {
            (Value::Int(l), Value::Int(r)) => self.eval_integer_infix(operator, *l, *r),
            (Value::String(l), Value::String(r)) => self.eval_string_infix(operator, l, r),
            _ => match operator {
                BinaryOp::And => Ok(Value::Bool(left.to_bool() && right.to_bool())),
                BinaryOp::Or => Ok(Value::Bool(left.to_bool() || right.to_bool())),
                BinaryOp::Equal => Ok(Value::Bool(left == right)),
                BinaryOp::NotEqual => Ok(Value::Bool(left != right)),
                _ if left.type_name() != right.type_name() => Err(RuntimeError::TypeMismatch {
                    left: left.type_name(),
                    operator: operator.to_string(),
                    right: right.type_name(),
                }),
                _ => Err(RuntimeError::UnknownInfixOperator {
                    left: left.type_name(),
                    operator: operator.to_string(),
                    right: right.type_name(),
                }),
            },
        }
    }

    fn eval_integer_infix(&self, operator: BinaryOp, left: i64, right: i64) -> EvalResult {
        let value = match operator {
            BinaryOp::Add => Value::Int(left + right),
            BinaryOp::Subtract => Value::Int(left - right),
            BinaryOp::Multiply => Value::Int(left * right),
            BinaryOp::Divide => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Value::Int(left / right)
            }
            BinaryOp::Less => Value::Bool(left < right),
            BinaryOp::Greater => Value::Bool(left > right),
            BinaryOp::LessEqual => Value::Bool(left <= right),
            BinaryOp::GreaterEqual => Value::Bool(left >= right),
            BinaryOp::Equal => Value::Bool(left == right),
            BinaryOp::NotEqual => Value::Bool(left != right),
            BinaryOp::And => Value::Bool(left != 0 && right != 0),
            BinaryOp::Or => Value::Bool(left != 0 || right != 0),
        };
        Ok(value)
    }

    fn eval_string_infix(&self, operator: BinaryOp, left: &str, right: &str) -> EvalResult {
        let value = match operator {
            BinaryOp::Add => Value::String(Rc::new(format!("{}{}", left, right))),
            BinaryOp::Less => Value::Bool(left < right),
            BinaryOp::Greater => Value::Bool(left > right),
            BinaryOp::LessEqual => Value::Bool(left <= right),
            BinaryOp::GreaterEqual => Value::Bool(left >= right),
            BinaryOp::Equal => Value::Bool(left == right),
            BinaryOp::NotEqual => Value::Bool(left != right),
            BinaryOp::And => Value::Bool(!left.is_empty() && !right.is_empty()),
            BinaryOp::Or => Value::Bool(!left.is_empty() || !right.is_empty()),
            _ => {
                return Err(RuntimeError::UnknownInfixOperator {
                    left: "String",
                    operator: operator.to_string(),
                    right: "String",
                })
            }
        };
        Ok(value)
    }

    fn eval_index(&self, left: Value, index: Value) -> EvalResult {
        match (&left, &index) {
            (Value::Array(elements), Value::Int(i)) => {
                if *i < 0 || *i as usize >= elements.len() {
                    Ok(Value::Null)
                } else {
                    Ok(elements[*i as usize].clone())
                }
            }
            (Value::Hash(pairs), index) => {
                let key = index
                    .hash_key()
                    .ok_or(RuntimeError::UnusableHashKey(index.type_name()))?;
                Ok(pairs
                    .get(&key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Null))
            }
            _ => Err(RuntimeError::IndexNotSupported(left.type_name())),
        }
    }

    fn apply_function(&self, callee: Value, args: Vec<Value>) -> EvalResult {
        match callee {
            Value::Function(func) => {
                if args.len() != func.parameters.len() {
                    return Err(RuntimeError::WrongArity {
                        want: func.parameters.len(),
                        got: args.len(),
                    });
                }

                let call_env = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
                    &func.env,
                ))));
                for (param, arg) in func.parameters.iter().zip(args) {
                    call_env.borrow_mut().define(param.clone(), arg);
                }

                let result = self.eval_block(&func.body, &call_env)?;
                Ok(match result {
                    Value::ReturnValue(value) => *value,
                    other => other,
                })
            }
            Value::Builtin(builtin) => Ok((builtin.func)(&args)),
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
