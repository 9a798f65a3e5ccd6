//! Lazy tokenizer. [`tokenize`] returns an iterator that materializes one [`Token`] at a
//! time, ending with a single [`TokenKind::Eof`]. The individual token shapes are
//! recognized with `nom` combinators over the remaining input.

use std::fmt;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, take_while1},
    character::complete::char,
    combinator::{opt, value},
    multi::many0_count,
    sequence::pair,
};

use crate::ast::{Number, Symbol};
use crate::{Error, SyntaxError};

/// Characters that end a symbol besides whitespace
const DELIMITERS: &str = "()'";

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(Number),
    Symbol(Symbol),
    String(String),
    LParen,
    RParen,
    Quote,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {n}"),
            TokenKind::Symbol(s) => write!(f, "symbol {s}"),
            TokenKind::String(s) => write!(f, "string {s:?}"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::Quote => write!(f, "quote"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token in the source
    pub offset: usize,
}

/// Iterator over the tokens of a source string. Yields nothing after `Eof` or an error.
pub struct Lexer<'a> {
    source: &'a str,
    remaining: &'a str,
    finished: bool,
}

/// Start tokenizing `text`. To restart, call again on the same text.
pub fn tokenize(text: &str) -> Lexer<'_> {
    Lexer {
        source: text,
        remaining: text,
        finished: false,
    }
}

/// Whitespace and `;` comments running to the end of the line
fn trivia(input: &str) -> IResult<&str, usize> {
    many0_count(alt((
        value((), take_while1(|c: char| c.is_whitespace())),
        value((), pair(char(';'), opt(is_not("\n")))),
    )))
    .parse(input)
}

fn number_run(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_digit() || c == '.').parse(input)
}

fn symbol_run(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && !DELIMITERS.contains(c)).parse(input)
}

/// String literal. Reaching the end of input before the closing quote is a failure.
fn string_literal(input: &str) -> IResult<&str, String> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), text)),
            Some('\\') => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some(other) => text.push(other),
                None => break,
            },
            Some(ch) => text.push(ch),
            None => break,
        }
        remaining = chars.as_str();
    }

    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn parse_number(text: &str) -> Option<Number> {
    if text.contains('.') {
        text.parse::<f64>().ok().map(Number::Float)
    } else {
        text.parse::<i64>().ok().map(Number::Integer)
    }
}

impl<'a> Lexer<'a> {
    fn offset(&self) -> usize {
        self.source.len() - self.remaining.len()
    }

    fn lex_error(&self, message: &str, offset: usize, found: &str) -> Error {
        Error::LexError(SyntaxError::with_context(
            message,
            self.source,
            offset,
            Some(found.to_owned()),
        ))
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        // trivia always succeeds, many0_count accepts zero matches
        if let Ok((rest, _)) = trivia(self.remaining) {
            self.remaining = rest;
        }

        let offset = self.offset();
        let Some(first) = self.remaining.chars().next() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset,
            });
        };

        let (rest, kind) = match first {
            '(' => (&self.remaining[1..], TokenKind::LParen),
            ')' => (&self.remaining[1..], TokenKind::RParen),
            '\'' => (&self.remaining[1..], TokenKind::Quote),
            '"' => match string_literal(self.remaining) {
                Ok((rest, text)) => (rest, TokenKind::String(text)),
                Err(_) => {
                    return Err(self.lex_error("unterminated string", offset, self.remaining));
                }
            },
            c if c.is_ascii_digit() => {
                let (rest, run) = number_run(self.remaining)
                    .map_err(|_| self.lex_error("invalid number", offset, self.remaining))?;
                let number =
                    parse_number(run).ok_or_else(|| self.lex_error("invalid number", offset, run))?;
                (rest, TokenKind::Number(number))
            }
            _ => {
                let (rest, run) = symbol_run(self.remaining)
                    .map_err(|_| self.lex_error("invalid symbol", offset, self.remaining))?;
                (rest, TokenKind::Symbol(Symbol::new(run)))
            }
        };

        self.remaining = rest;
        Ok(Token { kind, offset })
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.next_token();
        if matches!(
            result,
            Err(_)
                | Ok(Token {
                    kind: TokenKind::Eof,
                    ..
                })
        ) {
            self.finished = true;
        }
        Some(result)
    }
}
