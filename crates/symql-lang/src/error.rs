//! Error types for reading, compiling and value encoding.

use crate::span::{line_column, Span};
use thiserror::Error;

/// Error while reading the printed notation.
#[derive(Debug, Clone, Error)]
pub struct ParseError {
    /// The error message.
    pub message: String,
    /// Source span where the error occurred.
    pub span: Span,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.message, self.span.start)
    }
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    /// Add a hint to the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = line_column(source, self.span.start);
        let mut result = format!("error: {}\n", self.message);
        result.push_str(&format!("  --> line {}:{}\n", line, col));

        if let Some(source_line) = source.lines().nth(line - 1) {
            result.push_str(&format!("   |\n{:3}| {}\n   |", line, source_line));
            result.push_str(&" ".repeat(col));
            result.push('^');

            let span_len = self.span.len();
            let room = source_line.len().saturating_sub(col) + 1;
            if span_len > 1 {
                result.push_str(&"~".repeat(span_len.min(room).saturating_sub(1)));
            }
            result.push('\n');
        }

        if let Some(hint) = &self.hint {
            result.push_str(&format!("   = hint: {}\n", hint));
        }

        result
    }
}

/// Error while compiling a statement or binding its arguments.
#[derive(Debug, Clone, Error)]
pub struct CompileError {
    /// The error message.
    pub message: String,
    /// Error kind for programmatic handling.
    pub kind: CompileErrorKind,
    /// Printed form of the statement being compiled, when known.
    pub shape: Option<String>,
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(shape) = &self.shape {
            write!(f, " in {}", shape)?;
        }
        Ok(())
    }
}

/// Kinds of compile errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// The statement does not have a valid shape.
    MalformedStatement,
    /// An expression head that is neither a known operator nor a valid
    /// function name.
    UnknownOperator,
    /// An operator the notation names but that is not translated.
    UnsupportedOperator,
    /// A value with no readable printed form.
    UnencodableValue,
    /// Wrong number or shape of template arguments.
    ArgumentMismatch,
}

impl std::fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CompileErrorKind::MalformedStatement => "malformed statement",
            CompileErrorKind::UnknownOperator => "unknown operator",
            CompileErrorKind::UnsupportedOperator => "unsupported operator",
            CompileErrorKind::UnencodableValue => "unencodable value",
            CompileErrorKind::ArgumentMismatch => "argument mismatch",
        })
    }
}

impl CompileError {
    /// Create a new compile error.
    pub fn new(message: impl Into<String>, kind: CompileErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            shape: None,
        }
    }

    /// Create a malformed statement error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(message, CompileErrorKind::MalformedStatement)
    }

    /// Create an unknown operator error.
    pub fn unknown_operator(name: &str) -> Self {
        Self::new(
            format!("'{}' is not an operator or function name", name),
            CompileErrorKind::UnknownOperator,
        )
    }

    /// Create an unsupported operator error.
    pub fn unsupported_operator(name: &str) -> Self {
        Self::new(
            format!("operator '{}' is not supported", name),
            CompileErrorKind::UnsupportedOperator,
        )
    }

    /// Create an argument mismatch error.
    pub fn argument_mismatch(message: impl Into<String>) -> Self {
        Self::new(message, CompileErrorKind::ArgumentMismatch)
    }

    /// Attach the printed statement, unless one is already attached.
    pub fn with_shape(mut self, shape: impl Into<String>) -> Self {
        if self.shape.is_none() {
            self.shape = Some(shape.into());
        }
        self
    }
}

impl From<CodecError> for CompileError {
    fn from(err: CodecError) -> Self {
        Self::new(err.to_string(), CompileErrorKind::UnencodableValue)
    }
}

/// Error while translating between host values and SQL text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// The value has no readable printed form.
    #[error("value {value} cannot be encoded: {reason}")]
    Unencodable {
        /// Printed form of the offending value.
        value: String,
        /// Why it cannot be encoded.
        reason: String,
    },

    /// The text is not a value the codec produced.
    #[error("cannot decode '{text}': {reason}")]
    Undecodable {
        /// The offending text.
        text: String,
        /// Why it cannot be decoded.
        reason: String,
    },
}

/// A combined error type for the public API.
#[derive(Debug, Error)]
pub enum LangError {
    /// Read error.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// Compile error.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_with_source() {
        let source = "[:select *\n :from (people]";
        let err = ParseError::new("mismatched ']'", Span::new(24, 25)).with_hint("close '(' with ')'");
        let formatted = err.format_with_source(source);
        assert!(formatted.contains("line 2:"));
        assert!(formatted.contains("hint: close '(' with ')'"));
    }

    #[test]
    fn test_compile_error_display() {
        let err = CompileError::malformed(":values needs a payload").with_shape("[:insert-into t :values]");
        assert_eq!(
            err.to_string(),
            "malformed statement: :values needs a payload in [:insert-into t :values]"
        );
        assert_eq!(err.kind, CompileErrorKind::MalformedStatement);
    }

    #[test]
    fn test_codec_error_becomes_unencodable() {
        let err: CompileError = CodecError::Unencodable {
            value: "NaN".into(),
            reason: "non-finite float".into(),
        }
        .into();
        assert_eq!(err.kind, CompileErrorKind::UnencodableValue);
    }
}
