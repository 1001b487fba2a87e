//! Host values and their printed notation.
//!
//! Every value has a canonical printed form (its `Display` output). The
//! printed form is what the wire carries and what the backend stores for
//! anything that is not a native number, so printing must stay in lockstep
//! with the reader in `symql-lang`.

use std::fmt;

/// The printed token for [`Value::Null`].
pub const NIL: &str = "nil";

/// Characters allowed inside a symbol or keyword name besides ASCII
/// letters and digits.
pub const SYMBOL_PUNCTUATION: &str = "-_.*+/<>=!?%&|$^~@";

/// A host value.
///
/// Statements are values too: a statement is a [`Value::Vector`] whose
/// first element is a [`Value::Keyword`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The distinguished null value, printed `nil`.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Bare symbol; in statements an identifier or a template slot.
    Symbol(String),
    /// Keyword, printed with a leading `:`; in statements a directive.
    Keyword(String),
    /// Parenthesized list; in statements an expression or a schema.
    List(Vec<Value>),
    /// Bracketed vector; in statements a row-group.
    Vector(Vec<Value>),
}

impl Value {
    /// Create a symbol.
    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    /// Create a keyword (without the leading colon).
    pub fn keyword(name: impl Into<String>) -> Self {
        Value::Keyword(name.into())
    }

    /// Create a list.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    /// Create a vector.
    pub fn vector(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Vector(items.into_iter().collect())
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a native number.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the name of a symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the name of a keyword.
    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Value::Keyword(k) => Some(k),
            _ => None,
        }
    }

    /// Try to get the items of a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Try to get the items of a vector.
    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Value::Vector(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the value's shape, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "nil",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Keyword(_) => "keyword",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
        }
    }

    /// Check that printing this value and reading it back yields an equal
    /// value.
    ///
    /// Non-finite floats and symbols or keywords whose names do not lex as a
    /// single token have no readable form.
    pub fn is_readable(&self) -> bool {
        self.first_unreadable().is_none()
    }

    /// Find the first nested value without a readable printed form.
    pub fn first_unreadable(&self) -> Option<&Value> {
        match self {
            Value::Null | Value::Integer(_) | Value::String(_) => None,
            Value::Float(f) => (!f.is_finite()).then_some(self),
            Value::Symbol(name) => (!is_symbol_name(name)).then_some(self),
            Value::Keyword(name) => (!is_keyword_name(name)).then_some(self),
            Value::List(items) | Value::Vector(items) => {
                items.iter().find_map(Value::first_unreadable)
            }
        }
    }
}

/// Check if a name prints and reads back as a single symbol.
pub fn is_symbol_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if name == NIL || first.is_ascii_digit() || !name.chars().all(is_symbol_char) {
        return false;
    }
    // An optional sign, an optional dot, then a digit reads as a number.
    let mut rest = name.strip_prefix(['-', '+']).unwrap_or(name);
    rest = rest.strip_prefix('.').unwrap_or(rest);
    !rest.starts_with(|c: char| c.is_ascii_digit())
}

/// Check if a name prints and reads back as a keyword (`:name`).
pub fn is_keyword_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_symbol_char)
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || SYMBOL_PUNCTUATION.contains(c)
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            other => write!(f, "{}", other)?,
        }
    }
    f.write_str("\"")
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str(close)
}

/// Writes the printed form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str(NIL),
            Value::Integer(i) => write!(f, "{}", i),
            // Debug keeps a `.0` or an exponent, so floats read back as floats.
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write_string(f, s),
            Value::Symbol(s) => f.write_str(s),
            Value::Keyword(k) => write!(f, ":{}", k),
            Value::List(items) => write_seq(f, "(", items, ")"),
            Value::Vector(items) => write_seq(f, "[", items, "]"),
        }
    }
}

// Conversion implementations
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Vector(v.into_iter().map(Into::into).collect())
    }
}
