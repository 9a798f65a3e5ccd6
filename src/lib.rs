//! towerlisp - a small Lisp with a reflective tower of evaluators
//!
//! This crate provides a meta-circular evaluator for a minimal Lisp dialect. Source text is
//! turned into tokens by the [`lexer`], into s-expressions by the [`parser`], and evaluated
//! by an [`evaluator::Evaluator`] against a chain of [`environment::Environment`] frames.
//!
//! ```scheme
//! (define (adder n) (lambda (x) (+ x n)))
//! ((adder 5) 3)                 ; => 8
//! (let ((x 1) (y 2)) (+ x y))   ; => 3
//! '(a b c)                      ; => (a b c)
//! ```
//!
//! ## The Tower
//!
//! Evaluation is reflective: `eval` and `apply` are ordinary values inside the language,
//! and `(make-evaluator)` creates a new evaluator one level up. The new level sees every
//! binding of the level that created it through its environment chain, can shadow any of
//! them (including primitives such as `+`), and its own definitions stay invisible to
//! the level below. Procedures remember the evaluator that created them and always run
//! under it, no matter which level calls them.
//!
//! ```scheme
//! (define level (make-evaluator))
//! (eval '(define + -) level)    ; rebind + for the new level only
//! (eval '(+ 10 1) level)        ; => 9
//! (+ 10 1)                      ; => 11
//! ```
//!
//! ## Modules
//!
//! - `lexer`: lazy tokenization of source text
//! - `parser`: recursive-descent s-expression reader
//! - `ast`: values, symbols, numbers and procedures
//! - `environment`: lexical scope chains
//! - `builtinops`: the primitive registry installed into every root evaluator
//! - `evaluator`: special forms, application and the tower

use std::fmt;

/// Diagnostic details for lexing and parsing failures.
#[derive(Debug, PartialEq, Clone)]
pub struct SyntaxError {
    pub message: String,
    /// Snippet of the input around the failure (max 60 chars)
    pub context: Option<String>,
    /// The offending token or text, if identifiable
    pub found: Option<String>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, context: Option<String>, found: Option<String>) -> Self {
        SyntaxError {
            message: message.into(),
            context,
            found,
        }
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self::new(message, None, None)
    }

    /// Build an error whose context is taken from `input` around `offset`.
    pub fn with_context(
        message: impl Into<String>,
        input: &str,
        offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 60;

        let start = floor_char_boundary(input, offset.saturating_sub(20));
        let snippet: String = input[start..].chars().take(MAX_CONTEXT).collect();

        let mut context = String::new();
        if start > 0 {
            context.push_str("[...]");
        }
        context.push_str(&snippet);
        if start + snippet.len() < input.len() {
            context.push_str("[...]");
        }

        let context = context.replace('\n', "\\n").replace('\r', "");
        Self::new(message, Some(context), found)
    }
}

fn floor_char_boundary(input: &str, mut index: usize) -> usize {
    if index >= input.len() {
        return input.len();
    }
    while !input.is_char_boundary(index) {
        index -= 1;
    }
    index
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error kinds surfaced by the interpreter. None of them can be caught from inside the
/// interpreted language; they all propagate to the caller of `eval`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("LexError: {0}")]
    LexError(SyntaxError),
    #[error("ParseError: {0}")]
    ParseError(SyntaxError),
    #[error("Unbound symbol: {0}")]
    UnboundSymbol(String),
    #[error("ArityError: {callee} expected {expected} arguments, got {got}")]
    ArityError {
        expected: String,
        got: usize,
        callee: String,
    },
    #[error("ApplyError: not callable: {0}")]
    ApplyError(String),
    #[error("EvalError: {0}")]
    EvalError(String),
}

impl Error {
    pub fn arity_error(callee: impl Into<String>, expected: impl fmt::Display, got: usize) -> Self {
        Error::ArityError {
            expected: expected.to_string(),
            got,
            callee: callee.into(),
        }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        Error::EvalError(message.into())
    }
}

pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use ast::{Number, Procedure, Symbol, Value};
pub use environment::Environment;
pub use evaluator::{Evaluator, OutputSink};
pub use lexer::{Token, TokenKind, tokenize};
pub use parser::{Parser, parse, parse_program};
