//! Recursive-descent reader with one token of lookahead.
//!
//! [`Parser::parse`] consumes exactly one top-level expression per call, so a caller can
//! read a whole program form by form and evaluate each before reading the next.

use crate::ast::{Symbol, Value};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::{Error, SyntaxError};

pub struct Parser<I>
where
    I: Iterator<Item = Result<Token, Error>>,
{
    tokens: I,
    lookahead: Option<Token>,
    /// Offset reported for the synthetic EOF once the stream runs dry
    end_offset: usize,
}

impl<I> Parser<I>
where
    I: Iterator<Item = Result<Token, Error>>,
{
    pub fn new(tokens: I) -> Self {
        Parser {
            tokens,
            lookahead: None,
            end_offset: 0,
        }
    }

    /// Parse the next top-level expression, or `None` when only EOF remains.
    pub fn parse(&mut self) -> Result<Option<Value>, Error> {
        if self.peek()?.kind == TokenKind::Eof {
            return Ok(None);
        }
        self.expression().map(Some)
    }

    fn pull(&mut self) -> Result<Token, Error> {
        match self.tokens.next() {
            Some(token) => {
                let token = token?;
                self.end_offset = token.offset;
                Ok(token)
            }
            None => Ok(Token {
                kind: TokenKind::Eof,
                offset: self.end_offset,
            }),
        }
    }

    fn peek(&mut self) -> Result<&Token, Error> {
        let token = match self.lookahead.take() {
            Some(token) => token,
            None => self.pull()?,
        };
        Ok(self.lookahead.insert(token))
    }

    fn advance(&mut self) -> Result<Token, Error> {
        match self.lookahead.take() {
            Some(token) => Ok(token),
            None => self.pull(),
        }
    }

    fn expression(&mut self) -> Result<Value, Error> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Number(n) => Ok(Value::Number(n)),
            TokenKind::String(s) => Ok(Value::String(s)),
            TokenKind::Symbol(s) => Ok(Value::Symbol(s)),
            TokenKind::LParen => self.list_tail(),
            TokenKind::Quote => {
                let quoted = self.expression()?;
                Ok(Value::List(vec![Value::Symbol(Symbol::new("quote")), quoted]))
            }
            TokenKind::RParen | TokenKind::Eof => Err(unexpected(&token)),
        }
    }

    /// Elements after an opening parenthesis, up to and including the closing one
    fn list_tail(&mut self) -> Result<Value, Error> {
        let mut elements = Vec::new();
        loop {
            let next = self.peek()?;
            match next.kind {
                TokenKind::RParen => {
                    self.advance()?;
                    return Ok(Value::List(elements));
                }
                TokenKind::Eof => {
                    return Err(Error::ParseError(SyntaxError::new(
                        "unexpected end of input",
                        Some(format!("expected ')' at byte offset {}", next.offset)),
                        Some(TokenKind::Eof.to_string()),
                    )));
                }
                _ => elements.push(self.expression()?),
            }
        }
    }
}

fn unexpected(token: &Token) -> Error {
    Error::ParseError(SyntaxError::new(
        format!("unexpected token: {}", token.kind),
        Some(format!("at byte offset {}", token.offset)),
        Some(token.kind.to_string()),
    ))
}

/// Parse the first expression of `input`. Trailing forms are left unread.
pub fn parse(input: &str) -> Result<Option<Value>, Error> {
    Parser::new(tokenize(input)).parse()
}

/// Parse every top-level expression of `input`, in order.
pub fn parse_program(input: &str) -> Result<Vec<Value>, Error> {
    let mut parser = Parser::new(tokenize(input));
    let mut forms = Vec::new();
    while let Some(form) = parser.parse()? {
        forms.push(form);
    }
    Ok(forms)
}
