//! symql statement language.
//!
//! This crate reads the printed notation, compiles structured statements to
//! SQL, and translates values to and from SQL text.
//!
//! # Statements
//!
//! A statement is a vector led by a keyword. Keywords are SQL directives,
//! vectors are row-groups, lists are expressions (or a schema when led by a
//! vector), plain symbols are identifiers and `$` symbols are template slots:
//!
//! ```text
//! [:create-table people ([name (id :primary) (salary :type float)])]
//! [:insert-into people [name id salary] :values $v1]
//! [:select [name id] :from people :where (> salary $s1)]
//! [:select * :from $i1 :where (like name "%ab%")]
//! ```
//!
//! Slots are `$iN` (identifier), `$sN` (scalar), `$vN` (row-vector) and
//! `$SN` (schema), where `N` is the 1-based argument position.
//!
//! # Usage
//!
//! ```rust
//! use symql_lang::{format, read, Dialect, Value};
//!
//! let statement = read("[:select [name] :from people :where (> salary $s1)]").unwrap();
//! let sql = format(&statement, &[Value::Integer(62000)], &Dialect::ansi()).unwrap();
//! assert_eq!(sql, "SELECT name FROM people WHERE salary > 62000");
//! ```

pub mod ast;
pub mod cache;
pub mod codec;
pub mod compiler;
pub mod dialect;
pub mod error;
mod expr;
pub mod lexer;
pub mod parser;
mod schema;
pub mod span;

// Re-export main types
pub use ast::{Operator, Slot, SlotKind};
pub use cache::{CacheStats, ShapeKey, StatementCache};
pub use codec::{decode, decode_row, encode, encode_text};
pub use compiler::{Binding, BoundStatement, CompiledStatement, Compiler};
pub use dialect::{Dialect, PlaceholderStyle};
pub use error::{CodecError, CompileError, CompileErrorKind, LangError, ParseError};
pub use span::{Span, Spanned};

/// Host value type.
pub use symql_proto::Value;

/// Read a single value or statement from its printed form.
///
/// # Example
///
/// ```rust
/// use symql_lang::read;
///
/// let statement = read("[:select * :from people]").unwrap();
/// assert!(statement.as_vector().is_some());
/// ```
pub fn read(source: &str) -> Result<Value, ParseError> {
    parser::read(source)
}

/// Read every form in the source.
pub fn read_all(source: &str) -> Result<Vec<Spanned<Value>>, ParseError> {
    parser::read_all(source)
}

/// Compile a statement for a dialect, bypassing any cache.
pub fn compile(statement: &Value, dialect: &Dialect) -> Result<CompiledStatement, CompileError> {
    Compiler::new(dialect).compile(statement)
}

/// Compile a statement and bind its arguments inline, returning final SQL.
pub fn format(statement: &Value, args: &[Value], dialect: &Dialect) -> Result<String, CompileError> {
    compile(statement, dialect)?.to_sql(args, dialect)
}

/// Read, compile and bind in one step.
pub fn read_and_format(source: &str, args: &[Value], dialect: &Dialect) -> Result<String, LangError> {
    let statement = read(source)?;
    Ok(format(&statement, args, dialect)?)
}
