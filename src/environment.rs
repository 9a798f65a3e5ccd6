use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Symbol, Value};
use crate::evaluator::Evaluator;

struct Frame {
    bindings: RefCell<HashMap<Symbol, Value>>,
    parent: Option<Environment>,
}

/// Environment for variable bindings
///
/// A handle to one frame of a lexical scope chain. Cloning the handle shares the frame, so
/// closures created in the same scope observe each other's `set!`. The parent is fixed when
/// the frame is created, which keeps chains acyclic.
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

impl Environment {
    pub fn new() -> Self {
        Self::from_parts(None)
    }

    pub fn with_parent(parent: &Environment) -> Self {
        Self::from_parts(Some(parent.clone()))
    }

    fn from_parts(parent: Option<Environment>) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent,
        }))
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// Walk the chain outwards and return the first binding of `symbol`.
    pub fn lookup(&self, symbol: &Symbol) -> Result<Value, Error> {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if let Some(value) = env.0.bindings.borrow().get(symbol) {
                return Ok(value.clone());
            }
            frame = env.parent();
        }
        Err(Error::UnboundSymbol(symbol.name().to_owned()))
    }

    /// Insert or overwrite in this frame only.
    pub fn define(&self, symbol: Symbol, value: Value) -> Value {
        self.0.bindings.borrow_mut().insert(symbol, value.clone());
        value
    }

    /// Mutate the nearest frame that already binds `symbol`.
    pub fn set(&self, symbol: &Symbol, value: Value) -> Result<Value, Error> {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if let Some(slot) = env.0.bindings.borrow_mut().get_mut(symbol) {
                *slot = value.clone();
                return Ok(value);
            }
            frame = env.parent();
        }
        Err(Error::UnboundSymbol(symbol.name().to_owned()))
    }

    pub fn is_bound_locally(&self, symbol: &Symbol) -> bool {
        self.0.bindings.borrow().contains_key(symbol)
    }

    /// Register a host function under `name` in this frame.
    ///
    /// The function receives the evaluator performing the call and the evaluated
    /// arguments. It is responsible for its own arity checks.
    ///
    /// # Example
    /// ```
    /// use towerlisp::{Error, Evaluator, Value};
    ///
    /// fn answer(_: &Evaluator, _: Vec<Value>) -> Result<Value, Error> {
    ///     Ok(Value::from(42))
    /// }
    ///
    /// let evaluator = Evaluator::new();
    /// evaluator.global_env().register_builtin("answer", answer);
    /// assert_eq!(evaluator.eval_source("(answer)").unwrap(), Value::from(42));
    /// ```
    pub fn register_builtin<F>(&self, name: &str, func: F)
    where
        F: Fn(&Evaluator, Vec<Value>) -> Result<Value, Error> + 'static,
    {
        self.define(
            Symbol::new(name),
            Value::Builtin {
                id: name.to_owned(),
                func: Rc::new(func),
            },
        );
    }

    /// Get all bindings visible from this environment, inner frames shadowing outer ones.
    /// Returns (name, value) pairs sorted by name.
    pub fn get_all_bindings(&self) -> Vec<(Symbol, Value)> {
        let mut bindings = HashMap::new();

        if let Some(parent) = self.parent() {
            bindings.extend(parent.get_all_bindings());
        }

        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Environments are compared by identity
impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0;
        let mut frame = self.parent();
        while let Some(env) = frame {
            depth += 1;
            frame = env.parent();
        }
        f.debug_struct("Environment")
            .field("bindings", &self.0.bindings.borrow().len())
            .field("depth", &depth)
            .finish()
    }
}
