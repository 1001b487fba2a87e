//! Lexer for the printed notation using logos.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Tokens of the printed notation.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r";[^\n]*")]
pub enum Token {
    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("'")]
    Quote,

    #[token("nil")]
    Nil,

    // Literals
    #[regex(r"[+-]?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),
    #[regex(r"[+-]?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[+-]?[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    String(String),

    // Names
    #[regex(r":[A-Za-z0-9_.*+/<>=!?%&|$^~@-]+", |lex| lex.slice()[1..].to_string())]
    Keyword(String),
    #[regex(
        r"[A-Za-z_.*/<>=!?%&|$^~@][A-Za-z0-9_.*+/<>=!?%&|$^~@-]*|[+-]([A-Za-z_.*+/<>=!?%&|$^~@-][A-Za-z0-9_.*+/<>=!?%&|$^~@-]*)?",
        |lex| lex.slice().to_string()
    )]
    Symbol(String),
}

/// Strip the quotes of a string token and resolve its escapes.
fn unescape(slice: &str) -> Option<String> {
    let inner = &slice[1..slice.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next()? {
            '"' => result.push('"'),
            '\\' => result.push('\\'),
            'n' => result.push('\n'),
            'r' => result.push('\r'),
            't' => result.push('\t'),
            _ => return None,
        }
    }
    Some(result)
}

impl Token {
    /// Check if this token closes a list or vector.
    pub fn is_closing(&self) -> bool {
        matches!(self, Token::RParen | Token::RBracket)
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    /// The token.
    pub token: Token,
    /// Source span.
    pub span: Span,
}

/// Lexer wrapper that turns logos errors into [`ParseError`]s.
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }

    /// Get the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Result<SpannedToken, ParseError>> {
        let token = self.inner.next()?;
        let span: Span = self.inner.span().into();
        Some(match token {
            Ok(token) => Ok(SpannedToken { token, span }),
            Err(()) => Err(ParseError::new(
                format!("invalid token '{}'", self.inner.slice()),
                span,
            )
            .with_hint("strings use double quotes and only the escapes \\\\ \\\" \\n \\r \\t")),
        })
    }

    /// Get the end of the most recent token.
    pub fn offset(&self) -> usize {
        self.inner.span().end
    }

    /// Get the source string.
    pub fn source(&self) -> &'source str {
        self.inner.source()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<SpannedToken, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Tokenize a source string into a vector of spanned tokens.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    Lexer::new(source).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_statement_tokens() {
        assert_eq!(
            tokens("[:select [name id] :from people]"),
            vec![
                Token::LBracket,
                Token::Keyword("select".into()),
                Token::LBracket,
                Token::Symbol("name".into()),
                Token::Symbol("id".into()),
                Token::RBracket,
                Token::Keyword("from".into()),
                Token::Symbol("people".into()),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 -7 2.5 -0.25 1e300 1.5e-7"),
            vec![
                Token::Integer(42),
                Token::Integer(-7),
                Token::Float(2.5),
                Token::Float(-0.25),
                Token::Float(1e300),
                Token::Float(1.5e-7),
            ]
        );
    }

    #[test]
    fn test_sign_symbols() {
        assert_eq!(
            tokens("(- a 1) -x + <= !="),
            vec![
                Token::LParen,
                Token::Symbol("-".into()),
                Token::Symbol("a".into()),
                Token::Integer(1),
                Token::RParen,
                Token::Symbol("-x".into()),
                Token::Symbol("+".into()),
                Token::Symbol("<=".into()),
                Token::Symbol("!=".into()),
            ]
        );
    }

    #[test]
    fn test_slots_and_names() {
        assert_eq!(
            tokens("$s1 $i2 people.name first-name nil nile"),
            vec![
                Token::Symbol("$s1".into()),
                Token::Symbol("$i2".into()),
                Token::Symbol("people.name".into()),
                Token::Symbol("first-name".into()),
                Token::Nil,
                Token::Symbol("nile".into()),
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            tokens(r#""Jeff" "say \"hi\"\n" """#),
            vec![
                Token::String("Jeff".into()),
                Token::String("say \"hi\"\n".into()),
                Token::String(String::new()),
            ]
        );
    }

    #[test]
    fn test_comments_and_quote() {
        assert_eq!(
            tokens("; leading comment\n'x ; trailing\n"),
            vec![Token::Quote, Token::Symbol("x".into())]
        );
    }

    #[test]
    fn test_invalid_escape() {
        let err = tokenize(r#""bad \q escape""#).unwrap_err();
        assert!(err.message.contains("invalid token"));
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        assert!(tokenize("99999999999999999999").is_err());
    }
}
