//! Value codec between host values and SQL text.
//!
//! Null becomes SQL `NULL` and numbers stay native. Every other value is
//! stored as its printed form inside a SQL string literal, so reading a
//! cell back yields a value equal to the one written.

use crate::error::CodecError;
use crate::parser;
use symql_proto::{Param, Value};

/// SQL text for the null value.
pub const SQL_NULL: &str = "NULL";

/// Wrap text in a SQL string literal, doubling embedded quotes.
pub fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Strip a SQL string literal, collapsing doubled quotes.
fn unquote_text(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\'' && chars.next() != Some('\'') {
            return None;
        }
        result.push(c);
    }
    Some(result)
}

fn check_readable(value: &Value) -> Result<(), CodecError> {
    match value.first_unreadable() {
        None => Ok(()),
        Some(bad) => Err(CodecError::Unencodable {
            value: bad.to_string(),
            reason: match bad {
                Value::Float(_) => "non-finite float".to_string(),
                other => format!("{} name does not read back", other.type_name()),
            },
        }),
    }
}

/// Encode a value as a SQL literal.
pub fn encode(value: &Value) -> Result<String, CodecError> {
    check_readable(value)?;
    Ok(match value {
        Value::Null => SQL_NULL.to_string(),
        Value::Integer(_) | Value::Float(_) => value.to_string(),
        other => quote_text(&other.to_string()),
    })
}

/// Encode a value as a SQL string literal, quoting numbers too.
///
/// Pattern operands of `LIKE` and friends always go through this form.
pub fn encode_text(value: &Value) -> Result<String, CodecError> {
    check_readable(value)?;
    Ok(match value {
        Value::Null => SQL_NULL.to_string(),
        other => quote_text(&other.to_string()),
    })
}

/// Convert a value to a positional parameter.
///
/// Matches [`encode`]: the engine stores the parameter exactly as it
/// would store the inline literal.
pub fn to_param(value: &Value) -> Result<Param, CodecError> {
    check_readable(value)?;
    Ok(match value {
        Value::Null => Param::Null,
        Value::Integer(i) => Param::Integer(*i),
        Value::Float(f) => Param::Real(*f),
        other => Param::Text(other.to_string()),
    })
}

/// Convert a value to a textual positional parameter, as [`encode_text`].
pub fn to_text_param(value: &Value) -> Result<Param, CodecError> {
    check_readable(value)?;
    Ok(match value {
        Value::Null => Param::Null,
        other => Param::Text(other.to_string()),
    })
}

/// Decode one result cell.
pub fn decode(text: &str) -> Result<Value, CodecError> {
    let undecodable = |reason: String| CodecError::Undecodable {
        text: text.to_string(),
        reason,
    };

    if text == SQL_NULL {
        return Ok(Value::Null);
    }
    if text.starts_with('\'') {
        let printed = unquote_text(text)
            .ok_or_else(|| undecodable("unterminated string literal".to_string()))?;
        return match parser::read(&printed).map_err(|e| undecodable(e.to_string()))? {
            Value::Null => Err(undecodable("only NULL decodes to null".to_string())),
            value => Ok(value),
        };
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Integer(i));
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(Value::Float(f)),
        _ => Err(undecodable("not NULL, a number or a string literal".to_string())),
    }
}

/// Decode every cell of a row.
pub fn decode_row(cells: &[String]) -> Result<Vec<Value>, CodecError> {
    cells.iter().map(|cell| decode(cell)).collect()
}
