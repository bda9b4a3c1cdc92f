//! Runtime environment for interpreter variable scopes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::interpreter::value::Value;

/// A runtime environment containing variable bindings.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Self {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Define a variable in the current scope, overwriting any existing
    /// binding of the same name.
    pub fn define(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    /// Get a variable's value, searching up the scope chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.get(name) {
            return Some(value.clone());
        }
        if let Some(ref enclosing) = self.enclosing {
            return enclosing.borrow().get(name);
        }
        None
    }

    /// Names bound in this scope, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get() {
        let mut env = Environment::new();
        env.define("a".to_string(), Value::Int(1));
        assert_eq!(env.get("a"), Some(Value::Int(1)));
        assert_eq!(env.get("b"), None);
    }

    #[test]
    fn test_enclosing_lookup() {
        let outer = Rc::new(RefCell::new(Environment::new()));
        outer.borrow_mut().define("a".to_string(), Value::Int(1));

        let inner = Environment::with_enclosing(Rc::clone(&outer));
        assert_eq!(inner.get("a"), Some(Value::Int(1)));
    }

    #[test]
    fn test_shadowing() {
        let outer = Rc::new(RefCell::new(Environment::new()));
        outer.borrow_mut().define("a".to_string(), Value::Int(1));

        let mut inner = Environment::with_enclosing(Rc::clone(&outer));
        inner.define("a".to_string(), Value::Int(2));

        assert_eq!(inner.get("a"), Some(Value::Int(2)));
        assert_eq!(outer.borrow().get("a"), Some(Value::Int(1)));
    }
}
