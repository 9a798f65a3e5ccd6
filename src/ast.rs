//! This module defines the value types shared by the reader and the evaluator. Code is
//! data: the parser produces [`Value`] trees made only of numbers, strings, symbols and
//! lists, and the evaluator returns the same type, extended with runtime-only variants
//! (booleans, primitives, procedures, evaluators, environments and the "no value" marker).
//! Helper functions such as [`val`], [`sym`] and [`nil`] keep AST construction in code and
//! tests short.

use std::fmt;
use std::rc::Rc;

use crate::builtinops::PrimitiveFn;
use crate::environment::Environment;
use crate::evaluator::Evaluator;

/// Interned-by-value identifier. Two symbols are equal when their names are equal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Symbol(Rc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

/// Numeric literal: integers stay exact until mixed with a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Integer(n) => n == 0,
            Number::Float(x) => x == 0.0,
        }
    }

    /// Numeric comparison across integers and floats
    pub fn numeric_cmp(self, other: Number) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(n) => write!(f, "{n}"),
            // Debug keeps the trailing ".0" so floats stay distinguishable
            Number::Float(x) => write!(f, "{x:?}"),
        }
    }
}

/// A closure: parameters, body and the environment it was created in.
///
/// `evaluator` records the tower level that created the procedure. When present, the body
/// always runs under that evaluator, even when the procedure is called from another level.
pub struct Procedure {
    pub name: Option<Symbol>,
    pub params: Vec<Symbol>,
    pub body: Rc<[Value]>,
    pub env: Environment,
    pub evaluator: Option<Evaluator>,
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The captured environment is left out, it usually contains the procedure itself
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// Core value type of the interpreter, used both for expressions and for results.
///
/// To build an AST, use the helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for empty lists
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    Number(Number),
    String(String),
    Symbol(Symbol),
    /// Produced by comparisons and predicates; there is no literal syntax
    Bool(bool),
    /// Ordered sequence of sub-expressions; the empty list is nil
    List(Vec<Value>),
    /// Host primitive. Compared by id, never by function pointer.
    Builtin {
        id: String,
        func: Rc<PrimitiveFn>,
    },
    Procedure(Rc<Procedure>),
    /// A tower level, returned by `make-evaluator`
    Evaluator(Evaluator),
    Environment(Environment),
    /// The "no value" marker (e.g. `if` without alternative). Never equal to anything.
    Unspecified,
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::List(list) if list.is_empty())
    }

    /// Everything is true except `#f`, the no-value marker, zero, "" and the empty list.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Unspecified => false,
            Value::Number(n) => !n.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::List(list) => !list.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Builtin { .. } | Value::Procedure(_))
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(Number::Integer(_)) => "integer",
            Value::Number(Number::Float(_)) => "float",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
            Value::Builtin { .. } => "builtin",
            Value::Procedure(_) => "procedure",
            Value::Evaluator(_) => "evaluator",
            Value::Environment(_) => "environment",
            Value::Unspecified => "unspecified",
        }
    }

    /// Rendering used by `display`: strings are written without quotes or escapes.
    pub fn display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(Number::Integer(n)) => write!(f, "Integer({n})"),
            Value::Number(Number::Float(x)) => write!(f, "Float({x:?})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Symbol(s) => write!(f, "{s:?}"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Builtin { id, .. } => write!(f, "Builtin({id})"),
            Value::Procedure(p) => write!(f, "{p:?}"),
            Value::Evaluator(e) => write!(f, "Evaluator(level={})", e.level()),
            Value::Environment(_) => write!(f, "Environment"),
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::Builtin { id, .. } => write!(f, "#<builtin:{id}>"),
            Value::Procedure(p) => match &p.name {
                Some(name) => write!(f, "#<procedure:{name}>"),
                None => write!(f, "#<procedure>"),
            },
            Value::Evaluator(e) => write!(f, "#<evaluator:{}>", e.level()),
            Value::Environment(_) => write!(f, "#<environment>"),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Builtin { id: a, .. }, Value::Builtin { id: b, .. }) => a == b,
            (Value::Procedure(a), Value::Procedure(b)) => Rc::ptr_eq(a, b),
            (Value::Evaluator(a), Value::Evaluator(b)) => a == b,
            (Value::Environment(a), Value::Environment(b)) => a == b,
            (Value::Unspecified, _) | (_, Value::Unspecified) => false,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Number(Number::Float(x))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(Number::Integer(n as i64))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

/// Symbol helper, works in mixed lists
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(Symbol::new(name.as_ref()))
}

/// Value helper, accepts anything convertible into a `Value`
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// The empty list
pub fn nil() -> Value {
    Value::List(vec![])
}
