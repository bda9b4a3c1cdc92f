//! Stack-based virtual machine with call frames.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::compiler::Bytecode;
use crate::bytecode::instruction::{read_u16, OpCode};
use crate::error::RuntimeError;
use crate::interpreter::builtins;
use crate::interpreter::value::{Builtin, CompiledFunction, HashPair, Value};

/// Operand stack capacity.
pub const STACK_SIZE: usize = 2048;
/// Global binding capacity.
pub const GLOBALS_SIZE: usize = 65536;
/// Call frame capacity.
pub const MAX_FRAMES: usize = 1024;

pub type VmResult<T> = Result<T, RuntimeError>;

/// One active function call: the function, its instruction pointer, and
/// the stack offset where its locals region begins.
///
/// `ip` starts at -1 and is pre-incremented before every fetch, so
/// freshly pushed frames and continuing frames run through the same
/// loop head.
#[derive(Debug, Clone)]
struct Frame {
    func: Rc<CompiledFunction>,
    ip: isize,
    base_pointer: usize,
}

impl Frame {
    fn new(func: Rc<CompiledFunction>, base_pointer: usize) -> Self {
        Self {
            func,
            ip: -1,
            base_pointer,
        }
    }
}

/// The virtual machine. Frame slots are pre-allocated; calls only move
/// the frame cursor.
pub struct Vm {
    constants: Vec<Value>,

    stack: Vec<Value>,
    /// Index of the next free stack slot; the top of stack is `stack[sp - 1]`.
    sp: usize,
    globals: Vec<Value>,

    frames: Vec<Frame>,
    frames_index: usize,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Create a VM reusing an existing globals store. The REPL threads
    /// the store through successive runs so globals keep their indices.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main_func = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });

        let placeholder = Rc::new(CompiledFunction::default());
        let mut frames = vec![Frame::new(Rc::clone(&placeholder), 0); MAX_FRAMES];
        frames[0] = Frame::new(main_func, 0);

        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
            frames_index: 1,
        }
    }

    /// Recover the globals store for the next run.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The value most recently removed by `OpPop`, which the REPL prints
    /// as the result of the last expression statement.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.sp]
    }

    /// Execute the loaded bytecode to completion.
    pub fn run(&mut self) -> VmResult<()> {
        while self.current_frame().ip < self.current_frame().func.instructions.len() as isize - 1 {
            self.current_frame_mut().ip += 1;

            let ip = self.current_frame().ip as usize;
            let op_byte = self.current_frame().func.instructions[ip];
            let op = OpCode::from_u8(op_byte).ok_or(RuntimeError::UnknownOpcode(op_byte))?;

            match op {
                OpCode::Constant => {
                    let index = self.read_u16_operand(ip) as usize;
                    self.current_frame_mut().ip += 2;

                    let constant = self
                        .constants
                        .get(index)
                        .cloned()
                        .ok_or(RuntimeError::InvalidConstant(index))?;
                    self.push(constant)?;
                }

                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    self.execute_binary_operation(op)?;
                }

                OpCode::Pop => {
                    self.pop()?;
                }

                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,
                OpCode::Null => self.push(Value::Null)?,

                OpCode::Equal | OpCode::NotEqual | OpCode::GreaterThan => {
                    self.execute_comparison(op)?;
                }

                OpCode::Bang => {
                    // Strict boolean negation: anything that is not
                    // exactly `false` negates to false.
                    let operand = self.pop()?;
                    self.push(Value::Bool(matches!(operand, Value::Bool(false))))?;
                }

                OpCode::Minus => {
                    let operand = self.pop()?;
                    match operand {
                        Value::Int(n) => self.push(Value::Int(-n))?,
                        other => {
                            return Err(RuntimeError::UnsupportedNegation(other.type_name()))
                        }
                    }
                }

                OpCode::Jump => {
                    let target = self.read_u16_operand(ip) as isize;
                    // -1 so the loop's pre-increment lands on the target.
                    self.current_frame_mut().ip = target - 1;
                }

                OpCode::JumpNotTruthy => {
                    let target = self.read_u16_operand(ip) as isize;
                    self.current_frame_mut().ip += 2;

                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target - 1;
                    }
                }

                OpCode::SetGlobal => {
                    let index = self.read_u16_operand(ip) as usize;
                    self.current_frame_mut().ip += 2;
                    let value = self.pop()?;
                    self.globals[index] = value;
                }

                OpCode::GetGlobal => {
                    let index = self.read_u16_operand(ip) as usize;
                    self.current_frame_mut().ip += 2;
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }

                OpCode::Array => {
                    let count = self.read_u16_operand(ip) as usize;
                    self.current_frame_mut().ip += 2;

                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::Array(Rc::new(elements)))?;
                }

                OpCode::Hash => {
                    let count = self.read_u16_operand(ip) as usize;
                    self.current_frame_mut().ip += 2;

                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }

                OpCode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index(left, index)?;
                }

                OpCode::Call => {
                    let argc = self.read_u8_operand(ip) as usize;
                    self.current_frame_mut().ip += 1;
                    self.execute_call(argc)?;
                }

                OpCode::ReturnValue => {
                    let return_value = self.pop()?;

                    let frame = self.pop_frame();
                    if self.frames_index == 0 {
                        // Return at the top level ends the program.
                        self.sp = 0;
                        self.stack[0] = return_value;
                        return Ok(());
                    }

                    // Drops the locals region and the callee slot.
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }

                OpCode::Return => {
                    let frame = self.pop_frame();
                    if self.frames_index == 0 {
                        self.sp = 0;
                        self.stack[0] = Value::Null;
                        return Ok(());
                    }

                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }

                OpCode::SetLocal => {
                    let index = self.read_u8_operand(ip) as usize;
                    self.current_frame_mut().ip += 1;

                    let base = self.current_frame().base_pointer;
                    let value = self.pop()?;
                    self.stack[base + index] = value;
                }

                OpCode::GetLocal => {
                    let index = self.read_u8_operand(ip) as usize;
                    self.current_frame_mut().ip += 1;

                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + index].clone();
                    self.push(value)?;
                }

                OpCode::GetBuiltin => {
                    let index = self.read_u8_operand(ip) as usize;
                    self.current_frame_mut().ip += 1;

                    let builtin =
                        builtins::get(index).ok_or(RuntimeError::InvalidBuiltin(index))?;
                    self.push(Value::Builtin(builtin))?;
                }
            }
        }
        Ok(())
    }

    fn read_u16_operand(&self, ip: usize) -> u16 {
        read_u16(&self.current_frame().func.instructions[ip + 1..])
    }

    fn read_u8_operand(&self, ip: usize) -> u8 {
        self.current_frame().func.instructions[ip + 1]
    }

    fn execute_binary_operation(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Value::Int(l), Value::Int(r)) => self.execute_binary_integer_operation(op, *l, *r),
            (Value::String(l), Value::String(r)) => {
                if op != OpCode::Add {
                    return Err(RuntimeError::UnknownInfixOperator {
                        left: "String",
                        operator: op.name().to_string(),
                        right: "String",
                    });
                }
                self.push(Value::String(Rc::new(format!("{}{}", l, r))))
            }
            _ => Err(RuntimeError::UnsupportedTypes {
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn execute_binary_integer_operation(&mut self, op: OpCode, left: i64, right: i64) -> VmResult<()> {
        let result = match op {
            OpCode::Add => left + right,
            OpCode::Sub => left - right,
            OpCode::Mul => left * right,
            OpCode::Div => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                left / right
            }
            other => {
                return Err(RuntimeError::UnknownInfixOperator {
                    left: "Int",
                    operator: other.name().to_string(),
                    right: "Int",
                })
            }
        };
        self.push(Value::Int(result))
    }

    fn execute_comparison(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        if let (Value::Int(l), Value::Int(r)) = (&left, &right) {
            return self.execute_integer_comparison(op, *l, *r);
        }

        match op {
            // Non-integers compare by identity; booleans and null are
            // canonical, so this is value comparison for them.
            OpCode::Equal => {
                let eq = left == right;
                self.push(Value::Bool(eq))
            }
            OpCode::NotEqual => {
                let ne = left != right;
                self.push(Value::Bool(ne))
            }
            other => Err(RuntimeError::UnknownInfixOperator {
                left: left.type_name(),
                operator: other.name().to_string(),
                right: right.type_name(),
            }),
        }
    }

    fn execute_integer_comparison(&mut self, op: OpCode, left: i64, right: i64) -> VmResult<()> {
        let result = match op {
            OpCode::Equal => right == left,
            OpCode::NotEqual => right != left,
            // Expressed as right < left so that the compiler's
            // swapped-operand encoding of `<` works unchanged.
            OpCode::GreaterThan => right < left,
            other => {
                return Err(RuntimeError::UnknownInfixOperator {
                    left: "Int",
                    operator: other.name().to_string(),
                    right: "Int",
                })
            }
        };
        self.push(Value::Bool(result))
    }

    fn build_hash(&self, start: usize, end: usize) -> VmResult<Value> {
        let mut pairs = IndexMap::with_capacity((end - start) / 2);

        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let hash_key = key
                .hash_key()
                .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
            pairs.insert(hash_key, HashPair { key, value });

            i += 2;
        }

        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index(&mut self, left: Value, index: Value) -> VmResult<()> {
        match (&left, &index) {
            (Value::Array(elements), Value::Int(i)) => {
                let value = if *i < 0 || *i as usize >= elements.len() {
                    Value::Null
                } else {
                    elements[*i as usize].clone()
                };
                self.push(value)
            }
            (Value::Hash(pairs), index) => {
                let key = index
                    .hash_key()
                    .ok_or(RuntimeError::UnusableHashKey(index.type_name()))?;
                let value = pairs
                    .get(&key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            _ => Err(RuntimeError::IndexNotSupported(left.type_name())),
        }
    }

    fn execute_call(&mut self, argc: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - 1 - argc].clone();
        match callee {
            Value::CompiledFunction(func) => self.call_function(func, argc),
            Value::Builtin(builtin) => self.call_builtin(builtin, argc),
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    fn call_function(&mut self, func: Rc<CompiledFunction>, argc: usize) -> VmResult<()> {
        if argc != func.num_parameters {
            return Err(RuntimeError::WrongArity {
                want: func.num_parameters,
                got: argc,
            });
        }

        // Arguments already sit at the bottom of the new frame's locals
        // region; reserve the remaining local slots above them.
        let base_pointer = self.sp - argc;
        let num_locals = func.num_locals;
        self.push_frame(Frame::new(func, base_pointer))?;
        self.sp = base_pointer + num_locals;

        Ok(())
    }

    fn call_builtin(&mut self, builtin: &'static Builtin, argc: usize) -> VmResult<()> {
        let args = self.stack[self.sp - argc..self.sp].to_vec();
        let result = (builtin.func)(&args);

        // Drop the arguments and the callee slot.
        self.sp = self.sp - argc - 1;
        self.push(result)
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frames_index - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.frames_index - 1]
    }

    fn push_frame(&mut self, frame: Frame) -> VmResult<()> {
        if self.frames_index >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }
        self.frames[self.frames_index] = frame;
        self.frames_index += 1;
        Ok(())
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames_index -= 1;
        self.frames[self.frames_index].clone()
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        if self.sp == 0 {
            return Err(RuntimeError::StackUnderflow);
        }
        self.sp -= 1;
        // The slot keeps the value so last_popped can observe it.
        Ok(self.stack[self.sp].clone())
    }
}
