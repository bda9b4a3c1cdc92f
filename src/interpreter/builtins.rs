//! The fixed, ordered registry of native functions.
//!
//! Registry order is part of the compiled format: the compiler assigns
//! builtin symbols their registry index, and `OpGetBuiltin` operands
//! index into this table at runtime. Entries must not be reordered.

use std::rc::Rc;

use indexmap::IndexMap;
use lazy_static::lazy_static;

use crate::interpreter::value::{Builtin, HashPair, Value};

lazy_static! {
    pub static ref BUILTINS: Vec<Builtin> = vec![
        Builtin {
            name: "puts",
            func: builtin_puts,
        },
        Builtin {
            name: "push",
            func: builtin_push,
        },
        Builtin {
            name: "len",
            func: builtin_len,
        },
        Builtin {
            name: "first",
            func: builtin_first,
        },
        Builtin {
            name: "last",
            func: builtin_last,
        },
        Builtin {
            name: "rest",
            func: builtin_rest,
        },
    ];
}

/// Look up a builtin by name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Look up a builtin by registry index.
pub fn get(index: usize) -> Option<&'static Builtin> {
    BUILTINS.get(index)
}

fn error(message: String) -> Value {
    Value::Error(Rc::new(message))
}

/// Print each argument's display form on its own line.
fn builtin_puts(args: &[Value]) -> Value {
    for arg in args {
        println!("{}", arg);
    }
    Value::Null
}

/// Immutable extension: `push(array, elem)` returns a new array with the
/// element appended; `push(hash, key, value)` returns a new hash with the
/// pair added.
fn builtin_push(args: &[Value]) -> Value {
    if args.len() != 2 && args.len() != 3 {
        return error(format!(
            "wrong number of arguments. got={}, want=2 or 3",
            args.len()
        ));
    }

    match &args[0] {
        Value::Array(elements) => {
            if args.len() != 2 {
                return error(format!(
                    "wrong number of arguments for array push. got={}, want=2",
                    args.len()
                ));
            }
            let mut extended = Vec::with_capacity(elements.len() + 1);
            extended.extend(elements.iter().cloned());
            extended.push(args[1].clone());
            Value::Array(Rc::new(extended))
        }
        Value::Hash(pairs) => {
            if args.len() != 3 {
                return error(format!(
                    "wrong number of arguments for hash push. got={}, want=3",
                    args.len()
                ));
            }
            let key = args[1].clone();
            let value = args[2].clone();
            let Some(hash_key) = key.hash_key() else {
                return error(format!("unusable as hash key: {}", key.type_name()));
            };

            let mut extended: IndexMap<_, _> =
                pairs.iter().map(|(k, v)| (*k, v.clone())).collect();
            extended.insert(hash_key, HashPair { key, value });
            Value::Hash(Rc::new(extended))
        }
        other => error(format!(
            "argument to `push` must be Array or Hash, got {}",
            other.type_name()
        )),
    }
}

fn builtin_len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }

    match &args[0] {
        Value::String(s) => Value::Int(s.len() as i64),
        Value::Array(elements) => Value::Int(elements.len() as i64),
        other => error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn builtin_first(args: &[Value]) -> Value {
    match single_array_arg("first", args) {
        Ok(elements) => elements.first().cloned().unwrap_or(Value::Null),
        Err(err) => err,
    }
}

fn builtin_last(args: &[Value]) -> Value {
    match single_array_arg("last", args) {
        Ok(elements) => elements.last().cloned().unwrap_or(Value::Null),
        Err(err) => err,
    }
}

fn builtin_rest(args: &[Value]) -> Value {
    match single_array_arg("rest", args) {
        Ok(elements) => {
            if elements.is_empty() {
                Value::Null
            } else {
                Value::Array(Rc::new(elements[1..].to_vec()))
            }
        }
        Err(err) => err,
    }
}

fn single_array_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a [Value], Value> {
    if args.len() != 1 {
        return Err(error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        )));
    }
    match &args[0] {
        Value::Array(elements) => Ok(elements),
        other => Err(error(format!(
            "argument to `{}` must be Array, got {}",
            name,
            other.type_name()
        ))),
    }
}
