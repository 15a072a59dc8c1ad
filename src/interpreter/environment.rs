use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::interpreter::value::Value;

/// One lexical scope. Lookups and assignments walk outward through the
/// enclosing chain; definitions always land in this scope.
#[derive(Debug)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
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

    /// Fresh shared scope whose parent is `parent`.
    pub fn child(parent: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Self::with_enclosing(Rc::clone(parent))))
    }

    pub fn define(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    /// `None` means the name is bound nowhere in the chain; a binding that
    /// holds no value comes back as `Some(Value::None)`.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(val) = self.values.get(name) {
            return Some(val.clone());
        }
        if let Some(ref enclosing) = self.enclosing {
            return enclosing.borrow().get(name);
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
            || self
                .enclosing
                .as_ref()
                .is_some_and(|enclosing| enclosing.borrow().contains(name))
    }

    /// Overwrite an existing binding. Returns `false`, leaving every scope
    /// untouched, if the name is bound nowhere in the chain.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            return true;
        }
        if let Some(ref enclosing) = self.enclosing {
            return enclosing.borrow_mut().assign(name, value);
        }
        false
    }
}
