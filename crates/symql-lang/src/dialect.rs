//! SQL dialects: reserved words, column type names and placeholders.

use std::collections::{HashMap, HashSet};

use crate::error::CompileError;

/// How positional parameters are written in SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?1`, `?2`, ...
    Numbered,
    /// `$1`, `$2`, ...
    Dollar,
}

/// Words reserved by ANSI SQL; the baseline for every dialect.
pub const ANSI_RESERVED: &[&str] = &[
    "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "CHECK", "COLUMN",
    "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE",
    "END", "EXISTS", "FOREIGN", "FROM", "FULL", "GROUP", "HAVING", "IN", "INNER", "INSERT",
    "INTO", "IS", "JOIN", "KEY", "LEFT", "LIKE", "LIMIT", "NOT", "NULL", "OFFSET", "ON", "OR",
    "ORDER", "OUTER", "PRIMARY", "REFERENCES", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TO",
    "UNION", "UNIQUE", "UPDATE", "USING", "VALUES", "WHEN", "WHERE", "WITH",
];

/// A target SQL dialect.
///
/// Backends declare their dialect; statement compilation and argument
/// binding both need one.
#[derive(Debug, Clone)]
pub struct Dialect {
    name: String,
    reserved: HashSet<String>,
    types: HashMap<String, String>,
    placeholders: PlaceholderStyle,
}

impl Dialect {
    /// Create a dialect with the ANSI reserved words and the default
    /// column types.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reserved: HashSet::new(),
            types: HashMap::new(),
            placeholders: PlaceholderStyle::Numbered,
        }
        .with_reserved_words(ANSI_RESERVED.iter().copied())
        .with_type("integer", "INTEGER")
        .with_type("float", "REAL")
        .with_type("object", "TEXT")
    }

    /// Generic ANSI dialect.
    pub fn ansi() -> Self {
        Self::new("ansi")
    }

    /// Add reserved words (case-insensitive).
    pub fn with_reserved_words<'a>(mut self, words: impl IntoIterator<Item = &'a str>) -> Self {
        self.reserved
            .extend(words.into_iter().map(|w| w.to_ascii_uppercase()));
        self
    }

    /// Map a column type tag to its SQL type name.
    pub fn with_type(mut self, tag: impl Into<String>, sql: impl Into<String>) -> Self {
        self.types.insert(tag.into(), sql.into());
        self
    }

    /// Set the placeholder style.
    pub fn with_placeholders(mut self, style: PlaceholderStyle) -> Self {
        self.placeholders = style;
        self
    }

    /// Dialect name; part of the compiled statement cache key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if a word is reserved.
    pub fn is_reserved(&self, word: &str) -> bool {
        self.reserved.contains(&word.to_ascii_uppercase())
    }

    /// SQL type name for a column type tag.
    pub fn type_name(&self, tag: &str) -> Option<&str> {
        self.types.get(tag).map(String::as_str)
    }

    /// Placeholder for the 1-based parameter position.
    pub fn placeholder(&self, position: usize) -> String {
        match self.placeholders {
            PlaceholderStyle::Numbered => format!("?{}", position),
            PlaceholderStyle::Dollar => format!("${}", position),
        }
    }

    /// Render a symbol name as a SQL identifier.
    ///
    /// Dashes become underscores and dotted parts are escaped separately.
    /// A part that is reserved or contains characters outside
    /// `[A-Za-z0-9_]` is double-quoted; `*` passes through.
    pub fn escape_identifier(&self, name: &str) -> Result<String, CompileError> {
        if name.is_empty() || name.starts_with('$') || name.starts_with(':') {
            return Err(CompileError::malformed(format!(
                "'{}' is not an identifier",
                name
            )));
        }
        let parts = name
            .split('.')
            .map(|part| self.escape_part(part, name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join("."))
    }

    fn escape_part(&self, part: &str, name: &str) -> Result<String, CompileError> {
        if part == "*" {
            return Ok(part.to_string());
        }
        if part.is_empty() {
            return Err(CompileError::malformed(format!(
                "identifier '{}' has an empty part",
                name
            )));
        }
        let part = part.replace('-', "_");
        let plain = part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
            && !part.starts_with(|c: char| c.is_ascii_digit());
        if plain && !self.is_reserved(&part) {
            Ok(part)
        } else {
            Ok(format!("\"{}\"", part.replace('"', "\"\"")))
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::ansi()
    }
}
