//! Recursive descent reader for the printed notation.

use crate::error::ParseError;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::span::{Span, Spanned};
use symql_proto::Value;

/// Symbol that `'x` expands to.
pub const QUOTE: &str = "quote";

/// Reader turning printed text into host values.
pub struct Parser<'source> {
    lexer: Lexer<'source>,
}

impl<'source> Parser<'source> {
    /// Create a new parser for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            lexer: Lexer::new(source),
        }
    }

    /// Read the next top-level form, or `None` at end of input.
    pub fn read_next(&mut self) -> Result<Option<Spanned<Value>>, ParseError> {
        match self.lexer.next_token() {
            None => Ok(None),
            Some(token) => self.read_from(token?).map(Some),
        }
    }

    /// Read exactly one form covering the whole input.
    pub fn read_single(&mut self) -> Result<Spanned<Value>, ParseError> {
        let form = self.read_next()?.ok_or_else(|| {
            ParseError::new("expected a form, found end of input", Span::point(0))
        })?;
        if let Some(extra) = self.lexer.next_token() {
            let extra = extra?;
            return Err(ParseError::new("unexpected input after form", extra.span)
                .with_hint("read_all reads a sequence of forms"));
        }
        Ok(form)
    }

    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        match self.lexer.next_token() {
            Some(token) => token,
            None => Err(ParseError::new(
                "unexpected end of input",
                Span::point(self.lexer.offset()),
            )),
        }
    }

    fn read_from(&mut self, tok: SpannedToken) -> Result<Spanned<Value>, ParseError> {
        let span = tok.span;
        let value = match tok.token {
            Token::LParen => return self.read_seq(span, Token::RParen).map(|s| s.map(Value::List)),
            Token::LBracket => {
                return self
                    .read_seq(span, Token::RBracket)
                    .map(|s| s.map(Value::Vector))
            }
            Token::RParen | Token::RBracket => {
                return Err(ParseError::new("unexpected closing delimiter", span));
            }
            Token::Quote => {
                let quoted = self.next_token()?;
                let inner = self.read_from(quoted)?;
                return Ok(Spanned::new(
                    Value::list([Value::symbol(QUOTE), inner.value]),
                    span.merge(inner.span),
                ));
            }
            Token::Nil => Value::Null,
            Token::Integer(i) => Value::Integer(i),
            Token::Float(f) => Value::Float(f),
            Token::String(s) => Value::String(s),
            Token::Keyword(k) => Value::Keyword(k),
            Token::Symbol(s) => Value::Symbol(s),
        };
        Ok(Spanned::new(value, span))
    }

    fn read_seq(&mut self, open: Span, close: Token) -> Result<Spanned<Vec<Value>>, ParseError> {
        let mut items = Vec::new();
        loop {
            let Some(tok) = self.lexer.next_token() else {
                return Err(ParseError::new(
                    "unclosed delimiter",
                    open.merge(Span::point(self.lexer.offset())),
                )
                .with_hint(format!("add a matching '{}'", closing_char(&close))));
            };
            let tok = tok?;
            if tok.token == close {
                return Ok(Spanned::new(items, open.merge(tok.span)));
            }
            if tok.token.is_closing() {
                return Err(ParseError::new("mismatched closing delimiter", tok.span)
                    .with_hint(format!("expected '{}'", closing_char(&close))));
            }
            items.push(self.read_from(tok)?.value);
        }
    }
}

fn closing_char(token: &Token) -> char {
    match token {
        Token::RBracket => ']',
        _ => ')',
    }
}

/// Read a single form.
pub fn read(source: &str) -> Result<Value, ParseError> {
    Parser::new(source).read_single().map(|form| form.value)
}

/// Read every form in the source.
pub fn read_all(source: &str) -> Result<Vec<Spanned<Value>>, ParseError> {
    let mut parser = Parser::new(source);
    let mut forms = Vec::new();
    while let Some(form) = parser.read_next()? {
        forms.push(form);
    }
    Ok(forms)
}
