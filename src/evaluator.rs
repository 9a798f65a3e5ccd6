use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Procedure, Symbol, Value};
use crate::builtinops::install_builtins;
use crate::environment::Environment;
use crate::lexer::tokenize;
use crate::parser::Parser;

/// Destination for `display` and `newline`. Shared by every level of a tower.
pub type OutputSink = Rc<RefCell<dyn Write>>;

/// Syntax keywords, recognized before any environment lookup and therefore not shadowable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    If,
    Define,
    Set,
    Lambda,
    Begin,
    Let,
}

impl SpecialForm {
    pub fn from_symbol(symbol: &Symbol) -> Option<Self> {
        match symbol.name() {
            "quote" => Some(SpecialForm::Quote),
            "if" => Some(SpecialForm::If),
            "define" => Some(SpecialForm::Define),
            "set!" => Some(SpecialForm::Set),
            "lambda" => Some(SpecialForm::Lambda),
            "begin" => Some(SpecialForm::Begin),
            "let" => Some(SpecialForm::Let),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SpecialForm::Quote => "quote",
            SpecialForm::If => "if",
            SpecialForm::Define => "define",
            SpecialForm::Set => "set!",
            SpecialForm::Lambda => "lambda",
            SpecialForm::Begin => "begin",
            SpecialForm::Let => "let",
        }
    }
}

struct Level {
    global: Environment,
    meta: Option<Evaluator>,
    level: usize,
    output: OutputSink,
}

/// One level of the evaluator tower
///
/// An `Evaluator` is a cheap handle: clones share the same global environment and output
/// sink. The root level (created by [`Evaluator::new`] or [`Evaluator::with_output`]) owns
/// a fresh global environment with every primitive installed. Each level created with
/// [`Evaluator::make_child`] gets a global frame chained onto its creator's, so it can read
/// and shadow everything below while its own definitions stay private.
#[derive(Clone)]
pub struct Evaluator(Rc<Level>);

impl Evaluator {
    /// Root evaluator writing to standard output
    pub fn new() -> Self {
        Self::with_output(Rc::new(RefCell::new(std::io::stdout())))
    }

    /// Root evaluator writing to `output`
    pub fn with_output(output: OutputSink) -> Self {
        let global = Environment::new();
        install_builtins(&global);
        Evaluator(Rc::new(Level {
            global,
            meta: None,
            level: 0,
            output,
        }))
    }

    pub fn global_env(&self) -> Environment {
        self.0.global.clone()
    }

    /// The evaluator that created this one, `None` at the root
    pub fn meta(&self) -> Option<Evaluator> {
        self.0.meta.clone()
    }

    pub fn level(&self) -> usize {
        self.0.level
    }

    /// Create the next level of the tower on top of this evaluator.
    pub fn make_child(&self) -> Evaluator {
        let child = Evaluator(Rc::new(Level {
            global: Environment::with_parent(&self.0.global),
            meta: Some(self.clone()),
            level: self.0.level + 1,
            output: Rc::clone(&self.0.output),
        }));
        log::debug!(target: "tower", "level {} created level {}", self.level(), child.level());
        child
    }

    pub(crate) fn write_output(&self, text: &str) -> Result<(), Error> {
        let mut output = self
            .0
            .output
            .try_borrow_mut()
            .map_err(|_| Error::eval("output sink is already in use"))?;
        output
            .write_all(text.as_bytes())
            .and_then(|()| output.flush())
            .map_err(|e| Error::eval(format!("output error: {e}")))
    }

    /// Evaluate an expression in `env`
    pub fn eval(&self, expr: &Value, env: &Environment) -> Result<Value, Error> {
        match expr {
            Value::Symbol(symbol) => env.lookup(symbol),
            Value::List(elements) => self
                .eval_list(elements, env)
                .map_err(|err| add_context(err, expr)),
            // Everything else is self-evaluating, including runtime values handed to `eval`
            _ => Ok(expr.clone()),
        }
    }

    /// Evaluate each expression in order and return the last result
    pub fn eval_sequence(&self, exprs: &[Value], env: &Environment) -> Result<Value, Error> {
        let mut result = Value::Unspecified;
        for expr in exprs {
            result = self.eval(expr, env)?;
        }
        Ok(result)
    }

    /// Read and evaluate every top-level form of `source` in the global environment,
    /// returning the last result.
    ///
    /// Forms are read one at a time, so the effects of forms before a syntax error persist.
    pub fn eval_source(&self, source: &str) -> Result<Value, Error> {
        let mut result = Value::Unspecified;
        self.eval_each(source, |value| result = value)?;
        Ok(result)
    }

    /// Like [`Evaluator::eval_source`], but hands the result of each top-level form to
    /// `each` as soon as it is produced.
    pub fn eval_each<F>(&self, source: &str, mut each: F) -> Result<(), Error>
    where
        F: FnMut(Value),
    {
        let mut parser = Parser::new(tokenize(source));
        let global = self.global_env();
        while let Some(expr) = parser.parse()? {
            each(self.eval(&expr, &global)?);
        }
        Ok(())
    }

    /// Apply a callable value to already evaluated arguments
    pub fn apply(&self, callable: &Value, args: Vec<Value>) -> Result<Value, Error> {
        match callable {
            Value::Procedure(procedure) => {
                let evaluator = procedure.evaluator.as_ref().unwrap_or(self);
                evaluator.invoke(procedure, args)
            }
            Value::Builtin { func, .. } => func(self, args),
            other => Err(Error::ApplyError(other.to_string())),
        }
    }

    fn invoke(&self, procedure: &Procedure, args: Vec<Value>) -> Result<Value, Error> {
        let callee = procedure.name.as_ref().map_or("lambda", Symbol::name);
        if procedure.params.len() != args.len() {
            return Err(Error::arity_error(callee, procedure.params.len(), args.len()));
        }
        log::trace!(target: "eval", "level {} applying {callee} to {} arguments", self.level(), args.len());

        let frame = Environment::with_parent(&procedure.env);
        for (param, arg) in procedure.params.iter().zip(args) {
            frame.define(param.clone(), arg);
        }
        self.eval_sequence(&procedure.body, &frame)
    }

    fn eval_list(&self, elements: &[Value], env: &Environment) -> Result<Value, Error> {
        let [head, operands @ ..] = elements else {
            return Err(Error::eval("invalid expression: ()"));
        };

        if let Value::Symbol(keyword) = head
            && let Some(form) = SpecialForm::from_symbol(keyword)
        {
            return self.eval_special_form(form, operands, env);
        }

        let callable = self.eval(head, env)?;
        let args = operands
            .iter()
            .map(|operand| self.eval(operand, env))
            .collect::<Result<Vec<_>, _>>()?;
        self.apply(&callable, args)
    }

    fn eval_special_form(
        &self,
        form: SpecialForm,
        operands: &[Value],
        env: &Environment,
    ) -> Result<Value, Error> {
        match form {
            SpecialForm::Quote => match operands {
                [datum] => Ok(datum.clone()),
                _ => Err(malformed(form, "expects exactly one operand")),
            },
            SpecialForm::If => self.eval_if(operands, env),
            SpecialForm::Define => self.eval_define(operands, env),
            SpecialForm::Set => match operands {
                [Value::Symbol(name), expr] => {
                    let value = self.eval(expr, env)?;
                    env.set(name, value)
                }
                _ => Err(malformed(form, "expects a symbol and a value")),
            },
            SpecialForm::Lambda => match operands {
                [Value::List(params), body @ ..] => self.make_procedure(None, params, body, env),
                _ => Err(malformed(form, "expects a parameter list and a body")),
            },
            SpecialForm::Begin => self.eval_sequence(operands, env),
            SpecialForm::Let => self.eval_let(operands, env),
        }
    }

    fn eval_if(&self, operands: &[Value], env: &Environment) -> Result<Value, Error> {
        let (test, consequent, alternative) = match operands {
            [test, consequent] => (test, consequent, None),
            [test, consequent, alternative] => (test, consequent, Some(alternative)),
            _ => return Err(malformed(SpecialForm::If, "expects a test, a consequent and an optional alternative")),
        };

        if self.eval(test, env)?.is_truthy() {
            self.eval(consequent, env)
        } else if let Some(alternative) = alternative {
            self.eval(alternative, env)
        } else {
            Ok(Value::Unspecified)
        }
    }

    fn eval_define(&self, operands: &[Value], env: &Environment) -> Result<Value, Error> {
        let (name, value) = match operands {
            [Value::Symbol(name), expr] => (name, self.eval(expr, env)?),
            [Value::List(signature), body @ ..] => match signature.as_slice() {
                [Value::Symbol(name), params @ ..] => {
                    (name, self.make_procedure(Some(name.clone()), params, body, env)?)
                }
                _ => return Err(malformed(SpecialForm::Define, "expects a procedure name")),
            },
            _ => return Err(malformed(SpecialForm::Define, "expects a symbol and a value")),
        };

        log::debug!(target: "eval", "level {} defined {name}", self.level());
        Ok(env.define(name.clone(), value))
    }

    /// Parallel `let`: every initializer sees only the outer environment
    fn eval_let(&self, operands: &[Value], env: &Environment) -> Result<Value, Error> {
        let [Value::List(bindings), body @ ..] = operands else {
            return Err(malformed(SpecialForm::Let, "expects a binding list and a body"));
        };
        if body.is_empty() {
            return Err(malformed(SpecialForm::Let, "requires a body"));
        }

        let mut values = Vec::with_capacity(bindings.len());
        for binding in bindings {
            match binding {
                Value::List(pair) => match pair.as_slice() {
                    [Value::Symbol(name), expr] => values.push((name.clone(), self.eval(expr, env)?)),
                    _ => return Err(malformed(SpecialForm::Let, "bindings must be (name expression) pairs")),
                },
                _ => return Err(malformed(SpecialForm::Let, "bindings must be (name expression) pairs")),
            }
        }

        let frame = Environment::with_parent(env);
        for (name, value) in values {
            frame.define(name, value);
        }
        self.eval_sequence(body, &frame)
    }

    fn make_procedure(
        &self,
        name: Option<Symbol>,
        params: &[Value],
        body: &[Value],
        env: &Environment,
    ) -> Result<Value, Error> {
        let form = if name.is_some() {
            SpecialForm::Define
        } else {
            SpecialForm::Lambda
        };
        if body.is_empty() {
            return Err(malformed(form, "requires a body"));
        }

        let mut symbols: Vec<Symbol> = Vec::with_capacity(params.len());
        for param in params {
            let Value::Symbol(param) = param else {
                return Err(malformed(form, "parameters must be symbols"));
            };
            if symbols.contains(param) {
                return Err(Error::eval(format!("Duplicate parameter name: {param}")));
            }
            symbols.push(param.clone());
        }

        Ok(Value::Procedure(Rc::new(Procedure {
            name,
            params: symbols,
            body: body.into(),
            env: env.clone(),
            evaluator: Some(self.clone()),
        })))
    }
}

fn malformed(form: SpecialForm, problem: &str) -> Error {
    Error::eval(format!("malformed {}: {problem}", form.keyword()))
}

/// Attach the innermost failing expression to an EvalError, once
fn add_context(error: Error, expr: &Value) -> Error {
    match error {
        Error::EvalError(msg) if !msg.contains("\n  Context:") => {
            Error::EvalError(format!("{msg}\n  Context: while evaluating {expr}"))
        }
        other => other,
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluators are compared by identity
impl PartialEq for Evaluator {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("level", &self.0.level)
            .field("global", &self.0.global)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Fails,                       // Evaluation should fail (any error)
        Unspecified,                 // Evaluation should succeed with no useful value
        Succeeds,                    // Evaluation should succeed, value not checked
    }
    use TestResult::*;

    /// Test cases that share one evaluator
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    fn execute_test_case(input: &str, expected: &TestResult, evaluator: &Evaluator, test_id: &str) {
        match (evaluator.eval_source(input), expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                assert_eq!(&actual, expected_val, "{test_id}: wrong value for {input}");
            }
            (Ok(Value::Unspecified), Unspecified) | (Ok(_), Succeeds) => {}
            (Err(_), Fails) => {}
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (actual, expected) => {
                panic!("{test_id}: for {input} expected {expected:?}, got {actual:?}");
            }
        }
    }

    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let evaluator = Evaluator::new();
            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &evaluator, &test_id);
            }
        }
    }

    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let evaluator = Evaluator::new();
            execute_test_case(input, expected, &evaluator, &format!("#{}", i + 1));
        }
    }

    fn capturing_evaluator() -> (Evaluator, Rc<RefCell<Vec<u8>>>) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let evaluator = Evaluator::with_output(buffer.clone());
        (evaluator, buffer)
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", success(42)),
            ("2.5", success(2.5)),
            ("\"hello\"", success("hello")),
            ("\"\"", success("")),
            ("", Unspecified),
            // === SYMBOLS ===
            ("undefined-var", SpecificError("Unbound symbol: undefined-var")),
            // === QUOTE ===
            ("'x", success(sym("x"))),
            ("(quote (1 2 3))", success([1, 2, 3])),
            ("'(a (b c))", success(vec![sym("a"), val(vec![sym("b"), sym("c")])])),
            ("'()", success(nil())),
            ("''a", success(vec![sym("quote"), sym("a")])),
            ("(quote)", SpecificError("malformed quote")),
            ("(quote a b)", SpecificError("malformed quote")),
            // === IF ===
            ("(if (< 1 2) \"yes\" \"no\")", success("yes")),
            ("(if (> 1 2) \"yes\" \"no\")", success("no")),
            ("(if 0 'a 'b)", success(sym("b"))),
            ("(if \"\" 'a 'b)", success(sym("b"))),
            ("(if '() 'a 'b)", success(sym("b"))),
            ("(if 1 'a 'b)", success(sym("a"))),
            ("(if \"x\" 'a 'b)", success(sym("a"))),
            ("(if '(0) 'a 'b)", success(sym("a"))),
            ("(if (= 1 2) 'a)", Unspecified),
            ("(if (= 1 1) 'a)", success(sym("a"))),
            // only the taken branch is evaluated
            ("(if 1 'ok (undefined-fn))", success(sym("ok"))),
            ("(if 0 (undefined-fn) 'ok)", success(sym("ok"))),
            ("(if)", SpecificError("malformed if")),
            ("(if 1)", SpecificError("malformed if")),
            ("(if 1 2 3 4)", SpecificError("malformed if")),
            // === DEFINE ===
            ("(define x 10)", success(10)),
            ("(define x)", SpecificError("malformed define")),
            ("(define 5 10)", SpecificError("malformed define")),
            ("(define (5 x) x)", SpecificError("malformed define")),
            ("(define (f x))", SpecificError("malformed define: requires a body")),
            // === LAMBDA ===
            ("((lambda (x) (* x x)) 7)", success(49)),
            ("((lambda () 5))", success(5)),
            ("((lambda (x y) (+ x y)) 3 4)", success(7)),
            ("((lambda (x) 1 2 x) 3)", success(3)),
            ("((lambda (x) x))", SpecificError("ArityError: lambda expected 1 arguments, got 0")),
            ("((lambda (x) x) 1 2)", SpecificError("expected 1 arguments, got 2")),
            ("(lambda (x))", SpecificError("malformed lambda: requires a body")),
            ("(lambda x x)", SpecificError("malformed lambda")),
            ("(lambda (1) 1)", SpecificError("parameters must be symbols")),
            ("(lambda (x x) x)", SpecificError("Duplicate parameter name: x")),
            // === BEGIN ===
            ("(begin 1 2 3)", success(3)),
            ("(begin)", Unspecified),
            ("(begin (define x 5) (+ x 1))", success(6)),
            // === LET ===
            ("(let ((x 1) (y 2)) (+ x y))", success(3)),
            ("(let () 7)", success(7)),
            ("(let ((x 1) (y x)) y)", SpecificError("Unbound symbol: x")),
            ("(let ((x 1)) (let ((x 2) (y x)) y))", success(1)),
            ("(let ((x 1)))", SpecificError("malformed let: requires a body")),
            ("(let (x) x)", SpecificError("malformed let")),
            ("(let ((1 2)) 1)", SpecificError("malformed let")),
            ("(let x 1)", SpecificError("malformed let")),
            // === SET! ===
            ("(set! nope 1)", SpecificError("Unbound symbol: nope")),
            ("(set! 1 2)", SpecificError("malformed set!")),
            // === APPLICATION ===
            ("(+ 1 2 3)", success(6)),
            ("(+ (* 2 3) (- 10 4))", success(12)),
            ("(= '(1 (2)) '(1.0 (2.0)))", success(true)),
            ("()", SpecificError("invalid expression")),
            ("(1 2 3)", SpecificError("ApplyError: not callable: 1")),
            ("(\"f\" 1)", SpecificError("not callable")),
            ("((quote x) 1)", SpecificError("not callable: x")),
            // arguments are evaluated before the callee fails
            ("(1 (undefined-fn))", SpecificError("Unbound symbol: undefined-fn")),
            // === ERROR CONTEXT ===
            ("(+ 1 (car '()))", SpecificError("Context: while evaluating (car (quote ()))")),
            // === SYNTAX ERRORS PROPAGATE ===
            ("(+ 1", SpecificError("ParseError")),
            ("1.2.3", SpecificError("LexError")),
            // === KEYWORDS ARE NOT VALUES ===
            ("if", SpecificError("Unbound symbol: if")),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_stateful_programs() {
        let test_environments = vec![
            TestEnvironment(vec![
                ("(define (adder n) (lambda (x) (+ x n)))", Succeeds),
                ("((adder 5) 3)", success(8)),
                ("(define add2 (adder 2))", Succeeds),
                ("(add2 40)", success(42)),
                // a later global n does not reach the captured one
                ("(define a5 (adder 5))", Succeeds),
                ("(define n 100)", success(100)),
                ("(a5 3)", success(8)),
            ]),
            TestEnvironment(vec![
                ("(define f (lambda (x) (* x x)))", Succeeds),
                ("(f 7)", success(49)),
                ("(define (square x) (* x x)) (square 4)", success(16)),
            ]),
            // recursion resolves through the defining environment
            TestEnvironment(vec![
                ("(define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))", Succeeds),
                ("(fact 10)", success(3_628_800)),
                ("(define (even? n) (if (= n 0) (= 0 0) (odd? (- n 1))))", Succeeds),
                ("(define (odd? n) (if (= n 0) (= 0 1) (even? (- n 1))))", Succeeds),
                ("(even? 10)", success(true)),
                ("(odd? 7)", success(true)),
            ]),
            // set! and shared closures
            TestEnvironment(vec![
                ("(define counter 0)", success(0)),
                ("(set! counter (+ counter 1))", success(1)),
                ("counter", success(1)),
                (
                    "(define (make-counter) (let ((n 0)) (list (lambda () (set! n (+ n 1))) (lambda () n))))",
                    Succeeds,
                ),
                ("(define c (make-counter))", Succeeds),
                ("((car c))", success(1)),
                ("((car c))", success(2)),
                ("((car (cdr c)))", success(2)),
                // the global counter is untouched by the closure's n
                ("counter", success(1)),
            ]),
            // define inside a procedure body stays local
            TestEnvironment(vec![
                ("(define x 1)", success(1)),
                ("(define (shadow) (define x 2) x)", Succeeds),
                ("(shadow)", success(2)),
                ("x", success(1)),
                ("(define (outer-set) (set! x 3))", Succeeds),
                ("(outer-set)", success(3)),
                ("x", success(3)),
            ]),
            // a failed top-level form leaves earlier bindings intact
            TestEnvironment(vec![
                ("(define y 5)", success(5)),
                ("(define y (car '()))", Fails),
                ("y", success(5)),
                ("(define z 1) (undefined-fn) (define z 2)", SpecificError("undefined-fn")),
                ("z", success(1)),
            ]),
            // primitives can be rebound like any other value
            TestEnvironment(vec![
                ("(define plus +)", Succeeds),
                ("(plus 1 2)", success(3)),
                ("(define (twice f x) (f (f x)))", Succeeds),
                ("(twice (lambda (n) (* n 3)) 2)", success(18)),
                ("(apply twice (list car '((1 2) 3)))", success(1)),
                ("(apply + '(1 2 3))", success(6)),
            ]),
        ];

        run_tests_in_environment(test_environments);
    }

    #[test]
    fn test_special_forms_are_not_shadowable() {
        let evaluator = Evaluator::new();
        evaluator.eval_source("(define if (lambda (a b c) 'shadowed))").unwrap();
        assert_eq!(evaluator.eval_source("(if 1 2 3)").unwrap(), val(2));
        assert_eq!(SpecialForm::from_symbol(&Symbol::new("set!")), Some(SpecialForm::Set));
        assert_eq!(SpecialForm::from_symbol(&Symbol::new("+")), None);
    }

    #[test]
    fn test_define_returns_procedure() {
        let evaluator = Evaluator::new();
        let value = evaluator.eval_source("(define (sq x) (* x x))").unwrap();
        let Value::Procedure(procedure) = value else {
            panic!("expected a procedure, got {value:?}");
        };
        assert_eq!(procedure.name, Some(Symbol::new("sq")));
        assert_eq!(procedure.params, vec![Symbol::new("x")]);
        assert_eq!(procedure.evaluator.as_ref(), Some(&evaluator));
        assert_eq!(procedure.env, evaluator.global_env());
    }

    #[test]
    fn test_display_and_newline_capture() {
        let (evaluator, buffer) = capturing_evaluator();
        let result = evaluator
            .eval_source("(display \"hi\") (newline) (display 42) (display '(1 \"two\" x))")
            .unwrap();
        assert!(matches!(result, Value::Unspecified), "got {result:?}");
        assert_eq!(String::from_utf8(buffer.borrow().clone()).unwrap(), "hi\n42(1 \"two\" x)");
    }

    #[test]
    fn test_eval_each_reports_every_form() {
        let evaluator = Evaluator::new();
        let mut results = Vec::new();
        evaluator
            .eval_each("1 (define x 2) (+ x 1) 'done", |value| results.push(value))
            .unwrap();
        assert_eq!(results, vec![val(1), val(2), val(3), sym("done")]);

        // results before a failing form are still delivered
        let mut results = Vec::new();
        let err = evaluator
            .eval_each("(+ x 10) (car '()) 99", |value| results.push(value))
            .unwrap_err();
        assert_eq!(results, vec![val(12)]);
        assert!(err.to_string().contains("car of empty list"), "got {err}");

        let mut count = 0;
        evaluator.eval_each("  ; only a comment", |_| count += 1).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_tower_visibility() {
        let (root, buffer) = capturing_evaluator();
        root.eval_source("(define shared 1)").unwrap();

        let child = root.make_child();
        assert_eq!(child.level(), 1);
        assert_eq!(child.meta(), Some(root.clone()));
        assert_eq!(root.meta(), None);
        assert_eq!(child.global_env().parent(), Some(&root.global_env()));

        // downward bindings are visible, upward ones are not
        assert_eq!(child.eval_source("shared").unwrap(), val(1));
        child.eval_source("(define private 2)").unwrap();
        assert!(matches!(
            root.eval_source("private"),
            Err(Error::UnboundSymbol(name)) if name == "private"
        ));

        // shadowing a primitive only affects the child
        child.eval_source("(define + -)").unwrap();
        assert_eq!(child.eval_source("(+ 10 1)").unwrap(), val(9));
        assert_eq!(root.eval_source("(+ 10 1)").unwrap(), val(11));

        // set! from the child reaches the creator's binding
        child.eval_source("(set! shared 5)").unwrap();
        assert_eq!(root.eval_source("shared").unwrap(), val(5));

        // the output sink is shared
        child.eval_source("(display \"up\")").unwrap();
        assert_eq!(buffer.borrow().as_slice(), b"up");
    }

    #[test]
    fn test_tower_from_inside_the_language() {
        let test_environments = vec![TestEnvironment(vec![
            ("(define level (make-evaluator))", Succeeds),
            ("(evaluator? level)", success(true)),
            ("(evaluator-level level)", success(1)),
            ("(evaluator-level)", success(0)),
            ("(eval '(define + -) level)", Succeeds),
            ("(eval '(+ 10 1) level)", success(9)),
            ("(+ 10 1)", success(11)),
            ("(= (meta-evaluator level) (current-evaluator))", success(true)),
            ("(eval '(evaluator-level) level)", success(1)),
            // a level created from inside level 1 stacks on top of it
            ("(define level2 (eval '(make-evaluator) level))", Succeeds),
            ("(evaluator-level level2)", success(2)),
            ("(eval '(+ 10 1) level2)", success(9)),
            ("(= (meta-evaluator level2) level)", success(true)),
            // evaluate in an explicit environment
            ("(eval 'x (evaluator-environment level))", SpecificError("Unbound symbol: x")),
            ("(eval '(define x 3) level)", success(3)),
            ("(eval 'x (evaluator-environment level))", success(3)),
            ("(eval 'x (evaluator-environment level2))", success(3)),
            ("x", SpecificError("Unbound symbol: x")),
            ("(meta-evaluator)", Unspecified),
        ])];

        run_tests_in_environment(test_environments);
    }

    #[test]
    fn test_procedures_run_under_their_creator() {
        let root = Evaluator::new();
        let child = root.make_child();

        // defined at the root, called from the child
        root.eval_source("(define (which) (evaluator-level))").unwrap();
        root.eval_source("(define (add a b) (+ a b))").unwrap();
        assert_eq!(child.eval_source("(which)").unwrap(), val(0));

        // the child's rebinding of + does not leak into the root procedure
        child.eval_source("(define + -)").unwrap();
        assert_eq!(child.eval_source("(add 5 3)").unwrap(), val(8));

        // and a child procedure handed down still runs at level 1
        child.eval_source("(define (up) (+ 5 3))").unwrap();
        let up = child.global_env().lookup(&Symbol::new("up")).unwrap();
        assert_eq!(root.apply(&up, vec![]).unwrap(), val(2));
    }

    #[test]
    fn test_apply_non_callable() {
        let evaluator = Evaluator::new();
        let err = evaluator.apply(&val(42), vec![]).unwrap_err();
        assert_eq!(err, Error::ApplyError("42".into()));
    }
}
