//! Runtime values, shared by the interpreter and the bytecode VM.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Block;
use crate::interpreter::environment::Environment;

/// A runtime value. Heap-backed kinds are `Rc`-shared and immutable once
/// constructed; builtins that "extend" a container return a fresh one.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Null,
    String(Rc<String>),
    Array(Rc<Vec<Value>>),
    Hash(Rc<IndexMap<HashKey, HashPair>>),
    /// An interpreter function closing over its definition environment.
    Function(Rc<Function>),
    /// A function compiled to bytecode.
    CompiledFunction(Rc<CompiledFunction>),
    /// A native function from the fixed registry.
    Builtin(&'static Builtin),
    /// A first-class error value (builtins return these).
    Error(Rc<String>),

    // Control-flow markers, produced and consumed only by the
    // tree-walking evaluator.
    ReturnValue(Box<Value>),
    Break,
    Continue,
}

/// The key half of a hash entry: a type tag plus a 64-bit digest of the
/// value. Only integers, booleans, and strings are hashable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub tag: KeyTag,
    pub raw: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTag {
    Int,
    Bool,
    Str,
}

/// A stored hash entry: the original key value plus the mapped value.
#[derive(Debug, Clone)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// An interpreter-level function value.
#[derive(Debug)]
pub struct Function {
    pub parameters: Vec<String>,
    pub body: Block,
    pub env: Rc<RefCell<Environment>>,
}

/// A function lowered to bytecode, with its local-slot and parameter
/// counts. The instruction buffer is immutable once the compilation
/// scope that produced it is closed.
#[derive(Debug, Clone, Default)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// The signature of a native function: variadic in, one value out.
/// Failures come back as `Value::Error`, not as a Rust error.
pub type BuiltinFn = fn(&[Value]) -> Value;

/// A named native function.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over a byte slice.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl Value {
    /// The value's type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::Null => "Null",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::Function(_) => "Function",
            Value::CompiledFunction(_) => "Function",
            Value::Builtin(_) => "Builtin",
            Value::Error(_) => "Error",
            Value::ReturnValue(_) => "ReturnValue",
            Value::Break => "Break",
            Value::Continue => "Continue",
        }
    }

    /// Condition truthiness: false and null are falsy, everything else
    /// (including 0 and "") is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Null)
    }

    /// Boolean coercion for `&&`/`||`: zero integers and empty strings
    /// are also false.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Int(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            Value::Error(_) => false,
            _ => true,
        }
    }

    /// Derive the hash key for this value, or `None` if its kind cannot
    /// be used as a hash key.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Int(n) => Some(HashKey {
                tag: KeyTag::Int,
                raw: *n as u64,
            }),
            Value::Bool(b) => Some(HashKey {
                tag: KeyTag::Bool,
                raw: u64::from(*b),
            }),
            Value::String(s) => Some(HashKey {
                tag: KeyTag::Str,
                raw: fnv1a_64(s.as_bytes()),
            }),
            _ => None,
        }
    }
}

// Equality follows the VM's rules: integers, booleans, and null compare
// by value (the singleton invariant is structural for enum variants);
// heap-backed values compare by identity. Two string constants with the
// same contents are distinct values. The evaluator compares string
// contents itself where the language calls for it.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (_, pair)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "<fn({})>", func.parameters.join(", ")),
            Value::CompiledFunction(func) => write!(f, "<fn/{}>", func.num_parameters),
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            Value::Error(message) => write!(f, "ERROR: {}", message),
            Value::ReturnValue(value) => write!(f, "{}", value),
            Value::Break => write!(f, "break"),
            Value::Continue => write!(f, "continue"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_keys_match_by_content() {
        let a = Value::String(Rc::new("hello".to_string()));
        let b = Value::String(Rc::new("hello".to_string()));
        let c = Value::String(Rc::new("world".to_string()));

        assert_eq!(a.hash_key(), b.hash_key());
        assert_ne!(a.hash_key(), c.hash_key());
    }

    #[test]
    fn test_integer_hash_key_is_raw_bits() {
        let key = Value::Int(-1).hash_key().unwrap();
        assert_eq!(key.raw, (-1i64) as u64);
        assert_eq!(key.tag, KeyTag::Int);
    }

    #[test]
    fn test_boolean_hash_keys() {
        assert_eq!(Value::Bool(true).hash_key().unwrap().raw, 1);
        assert_eq!(Value::Bool(false).hash_key().unwrap().raw, 0);
    }

    #[test]
    fn test_same_number_different_tag() {
        let int_key = Value::Int(1).hash_key().unwrap();
        let bool_key = Value::Bool(true).hash_key().unwrap();
        assert_ne!(int_key, bool_key);
    }

    #[test]
    fn test_unhashable_kinds() {
        assert!(Value::Null.hash_key().is_none());
        assert!(Value::Array(Rc::new(vec![])).hash_key().is_none());
        assert!(Value::Hash(Rc::new(IndexMap::new())).hash_key().is_none());
    }

    #[test]
    fn test_equality_is_identity_for_strings() {
        let shared = Rc::new("x".to_string());
        let a = Value::String(Rc::clone(&shared));
        let b = Value::String(shared);
        let c = Value::String(Rc::new("x".to_string()));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Int(0).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::Int(1).is_truthy());

        assert!(!Value::Int(0).to_bool());
        assert!(!Value::String(Rc::new(String::new())).to_bool());
    }
}
