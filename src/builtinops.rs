//! Built-in primitive registry.
//!
//! Every root [`Evaluator`] installs the primitives of this module into its global
//! environment exactly once. Child evaluators created by `make-evaluator` do not reinstall
//! them; they reach the primitives through their parent chain and may shadow any of them.
//!
//! ```scheme
//! (+ 1 2 3)              ; arithmetic folds over any number of arguments
//! (- 5)                  ; one argument negates
//! (cons 1 '(2 3))        ; list operations
//! (eval '(* 6 7))        ; reflection: data evaluated as code
//! (make-evaluator)       ; tower step
//! ```
//!
//! Primitives receive the evaluator that performs the call. This is what makes `eval`,
//! `current-evaluator` and `make-evaluator` relative to the level they are invoked from.
//!
//! ## Adding New Operations
//!
//! 1. Implement `fn(&Evaluator, Vec<Value>) -> Result<Value, Error>`
//! 2. Add it to `BUILTIN_OPS` with its name and arity
//! 3. Add tests covering the error cases

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Number, Value};
use crate::environment::Environment;
use crate::evaluator::Evaluator;

/// Canonical erased primitive signature stored in [`Value::Builtin`].
pub type PrimitiveFn = dyn Fn(&Evaluator, Vec<Value>) -> Result<Value, Error>;

/// Accepted argument counts of a primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
        }
    }

    pub fn validate(self, callee: &str, count: usize) -> Result<(), Error> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(Error::arity_error(callee, self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Definition of a built-in primitive
#[derive(Debug, Clone, Copy)]
pub struct BuiltinOp {
    pub name: &'static str,
    pub arity: Arity,
    pub func: fn(&Evaluator, Vec<Value>) -> Result<Value, Error>,
}

impl BuiltinOp {
    /// Wrap the primitive into a value that checks its arity before running.
    pub fn to_value(&self) -> Value {
        let BuiltinOp { name, arity, func } = *self;
        Value::Builtin {
            id: name.to_owned(),
            func: Rc::new(move |evaluator: &Evaluator, args: Vec<Value>| {
                arity.validate(name, args.len())?;
                func(evaluator, args)
            }),
        }
    }
}

//
// Argument helpers
//

fn type_error(callee: &str, expected: &str, got: &Value) -> Error {
    Error::eval(format!("{callee}: expected {expected}, got {}", got.type_name()))
}

fn exact<const N: usize>(callee: &str, args: Vec<Value>) -> Result<[Value; N], Error> {
    let got = args.len();
    args.try_into()
        .map_err(|_| Error::arity_error(callee, N, got))
}

fn number(callee: &str, value: &Value) -> Result<Number, Error> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(type_error(callee, "a number", other)),
    }
}

/// Optional evaluator argument, defaulting to the invoking evaluator
fn target_evaluator(callee: &str, evaluator: &Evaluator, args: Vec<Value>) -> Result<Evaluator, Error> {
    match args.into_iter().next() {
        None => Ok(evaluator.clone()),
        Some(Value::Evaluator(target)) => Ok(target),
        Some(other) => Err(type_error(callee, "an evaluator", &other)),
    }
}

//
// Arithmetic
//

macro_rules! checked_arithmetic {
    ($name:ident, $checked:ident, $op:tt, $what:expr) => {
        fn $name(a: Number, b: Number) -> Result<Number, Error> {
            match (a, b) {
                (Number::Integer(x), Number::Integer(y)) => x
                    .$checked(y)
                    .map(Number::Integer)
                    .ok_or_else(|| Error::eval(concat!("integer overflow in ", $what))),
                (x, y) => Ok(Number::Float(x.as_f64() $op y.as_f64())),
            }
        }
    };
}

checked_arithmetic!(number_add, checked_add, +, "addition");
checked_arithmetic!(number_sub, checked_sub, -, "subtraction");
checked_arithmetic!(number_mul, checked_mul, *, "multiplication");

fn fold_numbers(
    callee: &str,
    init: Number,
    args: &[Value],
    op: fn(Number, Number) -> Result<Number, Error>,
) -> Result<Number, Error> {
    args.iter()
        .try_fold(init, |acc, arg| op(acc, number(callee, arg)?))
}

fn builtin_add(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    fold_numbers("+", Number::Integer(0), &args, number_add).map(Value::Number)
}

fn builtin_mul(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    fold_numbers("*", Number::Integer(1), &args, number_mul).map(Value::Number)
}

fn builtin_sub(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let Some((first, rest)) = args.split_first() else {
        return Err(Error::arity_error("-", Arity::AtLeast(1), 0));
    };
    let first = number("-", first)?;

    if rest.is_empty() {
        return number_sub(Number::Integer(0), first)
            .map_err(|_| Error::eval("integer overflow in negation"))
            .map(Value::Number);
    }
    fold_numbers("-", first, rest, number_sub).map(Value::Number)
}

/// Division always produces a float. Any zero divisor is an error.
fn builtin_div(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let Some((first_arg, rest)) = args.split_first() else {
        return Err(Error::arity_error("/", Arity::AtLeast(1), 0));
    };
    let first = number("/", first_arg)?;

    let (mut quotient, divisors) = if rest.is_empty() {
        (1.0, std::slice::from_ref(first_arg))
    } else {
        (first.as_f64(), rest)
    };

    for divisor in divisors {
        let divisor = number("/", divisor)?;
        if divisor.is_zero() {
            return Err(Error::eval("division by zero"));
        }
        quotient /= divisor.as_f64();
    }
    Ok(Value::Number(Number::Float(quotient)))
}

//
// Comparison
//

/// Structural equality where numbers compare by value across integer and float, at any depth
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x.numeric_cmp(*y) == Some(std::cmp::Ordering::Equal)
        }
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}

fn builtin_num_eq(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [a, b] = exact::<2>("=", args)?;
    Ok(Value::Bool(values_equal(&a, &b)))
}

macro_rules! ordering_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
            let [a, b] = exact::<2>($op_str, args)?;
            let result = match (&a, &b) {
                (Value::Number(x), Value::Number(y)) => x
                    .numeric_cmp(*y)
                    .is_some_and(|ordering| ordering $op std::cmp::Ordering::Equal),
                (Value::String(x), Value::String(y)) => x $op y,
                _ => {
                    return Err(Error::eval(format!(
                        "{}: cannot compare {} with {}",
                        $op_str,
                        a.type_name(),
                        b.type_name()
                    )));
                }
            };
            Ok(Value::Bool(result))
        }
    };
}

ordering_comparison!(builtin_lt, <, "<");
ordering_comparison!(builtin_gt, >, ">");
ordering_comparison!(builtin_le, <=, "<=");
ordering_comparison!(builtin_ge, >=, ">=");

//
// Lists
//

/// A non-list tail yields a two element list, there are no dotted pairs.
fn builtin_cons(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [head, tail] = exact::<2>("cons", args)?;
    match tail {
        Value::List(mut items) => {
            items.insert(0, head);
            Ok(Value::List(items))
        }
        other => Ok(Value::List(vec![head, other])),
    }
}

fn builtin_car(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [list] = exact::<1>("car", args)?;
    match list {
        Value::List(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| Error::eval("car of empty list")),
        other => Err(type_error("car", "a list", &other)),
    }
}

fn builtin_cdr(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [list] = exact::<1>("cdr", args)?;
    match list {
        Value::List(items) if items.is_empty() => Err(Error::eval("cdr of empty list")),
        Value::List(items) => Ok(Value::List(items.into_iter().skip(1).collect())),
        other => Err(type_error("cdr", "a list", &other)),
    }
}

fn builtin_list(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::List(args))
}

//
// Predicates
//

macro_rules! predicate {
    ($name:ident, $op_str:expr, $pattern:pat) => {
        fn $name(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
            let [value] = exact::<1>($op_str, args)?;
            Ok(Value::Bool(matches!(value, $pattern)))
        }
    };
}

predicate!(builtin_is_number, "number?", Value::Number(_));
predicate!(builtin_is_symbol, "symbol?", Value::Symbol(_));
predicate!(builtin_is_string, "string?", Value::String(_));
predicate!(builtin_is_procedure, "procedure?", Value::Procedure(_) | Value::Builtin { .. });
predicate!(builtin_is_evaluator, "evaluator?", Value::Evaluator(_));
predicate!(builtin_is_environment, "environment?", Value::Environment(_));

fn builtin_null(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = exact::<1>("null?", args)?;
    Ok(Value::Bool(value.is_nil()))
}

fn builtin_not(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = exact::<1>("not", args)?;
    Ok(Value::Bool(!value.is_truthy()))
}

//
// Output
//

fn builtin_display(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = exact::<1>("display", args)?;
    evaluator.write_output(&value.display_string())?;
    Ok(Value::Unspecified)
}

fn builtin_newline(evaluator: &Evaluator, _: Vec<Value>) -> Result<Value, Error> {
    evaluator.write_output("\n")?;
    Ok(Value::Unspecified)
}

//
// Reflection and the tower
//

/// `(eval expr)`, `(eval expr environment)` or `(eval expr evaluator)`
fn builtin_eval(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let expr = args.next().unwrap_or(Value::Unspecified);
    match args.next() {
        None => evaluator.eval(&expr, &evaluator.global_env()),
        Some(Value::Environment(env)) => evaluator.eval(&expr, &env),
        Some(Value::Evaluator(level)) => level.eval(&expr, &level.global_env()),
        Some(other) => Err(type_error("eval", "an environment or evaluator", &other)),
    }
}

fn builtin_apply(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [callable, arguments] = exact::<2>("apply", args)?;
    match arguments {
        Value::List(arguments) => evaluator.apply(&callable, arguments),
        other => Err(type_error("apply", "an argument list", &other)),
    }
}

fn builtin_make_evaluator(evaluator: &Evaluator, _: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Evaluator(evaluator.make_child()))
}

fn builtin_current_evaluator(evaluator: &Evaluator, _: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Evaluator(evaluator.clone()))
}

fn builtin_meta_evaluator(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let target = target_evaluator("meta-evaluator", evaluator, args)?;
    Ok(target.meta().map_or(Value::Unspecified, Value::Evaluator))
}

fn builtin_evaluator_environment(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let target = target_evaluator("evaluator-environment", evaluator, args)?;
    Ok(Value::Environment(target.global_env()))
}

fn builtin_evaluator_level(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let target = target_evaluator("evaluator-level", evaluator, args)?;
    let level = i64::try_from(target.level())
        .map_err(|_| Error::eval("evaluator-level: tower too tall"))?;
    Ok(Value::Number(Number::Integer(level)))
}

macro_rules! op {
    ($name:expr, $arity:expr, $func:expr) => {
        BuiltinOp {
            name: $name,
            arity: $arity,
            func: $func,
        }
    };
}

/// Global registry of all built-in primitives
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic
    op!("+", Arity::Any, builtin_add),
    op!("-", Arity::AtLeast(1), builtin_sub),
    op!("*", Arity::Any, builtin_mul),
    op!("/", Arity::AtLeast(1), builtin_div),
    // Comparison, binary only
    op!("=", Arity::Exact(2), builtin_num_eq),
    op!("<", Arity::Exact(2), builtin_lt),
    op!(">", Arity::Exact(2), builtin_gt),
    op!("<=", Arity::Exact(2), builtin_le),
    op!(">=", Arity::Exact(2), builtin_ge),
    // Lists
    op!("cons", Arity::Exact(2), builtin_cons),
    op!("car", Arity::Exact(1), builtin_car),
    op!("cdr", Arity::Exact(1), builtin_cdr),
    op!("list", Arity::Any, builtin_list),
    op!("null?", Arity::Exact(1), builtin_null),
    // Type predicates
    op!("number?", Arity::Exact(1), builtin_is_number),
    op!("symbol?", Arity::Exact(1), builtin_is_symbol),
    op!("string?", Arity::Exact(1), builtin_is_string),
    op!("procedure?", Arity::Exact(1), builtin_is_procedure),
    op!("evaluator?", Arity::Exact(1), builtin_is_evaluator),
    op!("environment?", Arity::Exact(1), builtin_is_environment),
    op!("not", Arity::Exact(1), builtin_not),
    // Output
    op!("display", Arity::Exact(1), builtin_display),
    op!("newline", Arity::Exact(0), builtin_newline),
    // Reflection
    op!("eval", Arity::Range(1, 2), builtin_eval),
    op!("apply", Arity::Exact(2), builtin_apply),
    // Tower
    op!("make-evaluator", Arity::Exact(0), builtin_make_evaluator),
    op!("current-evaluator", Arity::Exact(0), builtin_current_evaluator),
    op!("meta-evaluator", Arity::Range(0, 1), builtin_meta_evaluator),
    op!("evaluator-environment", Arity::Range(0, 1), builtin_evaluator_environment),
    op!("evaluator-level", Arity::Range(0, 1), builtin_evaluator_level),
];

/// Lazy index from name to BuiltinOp
static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.name, op)).collect());

pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_INDEX.get(name).copied()
}

/// Bind every primitive in `env`.
pub(crate) fn install_builtins(env: &Environment) {
    for op in get_builtin_ops() {
        env.define(op.name.into(), op.to_value());
    }
}
