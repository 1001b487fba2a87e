//! Classification of statement values.
//!
//! Statements are plain host values; this module gives each element its
//! statement-level role so the compiler can dispatch on it.

use crate::error::CompileError;
use symql_proto::Value;

/// Kind of a template slot, written as the letter after `$`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// `$iN`: an identifier argument.
    Identifier,
    /// `$sN`: a scalar argument.
    Scalar,
    /// `$vN`: a row-vector argument (or a list of them after `:values`).
    Vector,
    /// `$SN`: a schema argument.
    Schema,
}

impl SlotKind {
    /// The tag letter following `$`.
    pub fn tag(&self) -> char {
        match self {
            SlotKind::Identifier => 'i',
            SlotKind::Scalar => 's',
            SlotKind::Vector => 'v',
            SlotKind::Schema => 'S',
        }
    }

    /// Look up a kind by its tag letter.
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'i' => Some(SlotKind::Identifier),
            's' => Some(SlotKind::Scalar),
            'v' => Some(SlotKind::Vector),
            'S' => Some(SlotKind::Schema),
            _ => None,
        }
    }

    /// Human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            SlotKind::Identifier => "identifier",
            SlotKind::Scalar => "scalar",
            SlotKind::Vector => "vector",
            SlotKind::Schema => "schema",
        }
    }
}

/// A template slot: an argument kind and its 1-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    /// What the argument must be.
    pub kind: SlotKind,
    /// 1-based argument position.
    pub index: usize,
}

impl Slot {
    /// Parse a slot symbol such as `$s1`.
    ///
    /// Returns `Ok(None)` for symbols that do not start with `$`.
    pub fn parse(symbol: &str) -> Result<Option<Slot>, CompileError> {
        let Some(rest) = symbol.strip_prefix('$') else {
            return Ok(None);
        };
        let mut chars = rest.chars();
        let kind = chars
            .next()
            .and_then(SlotKind::from_tag)
            .ok_or_else(|| {
                CompileError::malformed(format!(
                    "slot '{}' must be $i, $s, $v or $S followed by a position",
                    symbol
                ))
            })?;
        let digits = chars.as_str();
        let index = digits
            .parse::<usize>()
            .ok()
            .filter(|i| *i > 0 && digits.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| {
                CompileError::malformed(format!(
                    "slot '{}' needs a position starting at 1",
                    symbol
                ))
            })?;
        Ok(Some(Slot { kind, index }))
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}{}", self.kind.tag(), self.index)
    }
}

/// Role of a single element inside a statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Element<'a> {
    /// Keyword: a SQL directive.
    Directive(&'a str),
    /// Vector led by a keyword: a nested statement.
    Statement(&'a [Value]),
    /// Any other vector: a row-group.
    RowGroup(&'a [Value]),
    /// List led by a vector: a schema.
    Schema(&'a [Value]),
    /// Any other list: an expression.
    Expression(&'a [Value]),
    /// Plain symbol.
    Identifier(&'a str),
    /// `$` symbol.
    Slot(Slot),
    /// String, number or nil.
    Literal(&'a Value),
}

impl<'a> Element<'a> {
    /// Classify one statement element.
    pub fn classify(value: &'a Value) -> Result<Element<'a>, CompileError> {
        Ok(match value {
            Value::Keyword(k) => Element::Directive(k),
            Value::Vector(items) if is_statement(items) => Element::Statement(items),
            Value::Vector(items) => Element::RowGroup(items),
            Value::List(items) if matches!(items.first(), Some(Value::Vector(_))) => {
                Element::Schema(items)
            }
            Value::List(items) => Element::Expression(items),
            Value::Symbol(s) => match Slot::parse(s)? {
                Some(slot) => Element::Slot(slot),
                None => Element::Identifier(s),
            },
            Value::Null | Value::Integer(_) | Value::Float(_) | Value::String(_) => {
                Element::Literal(value)
            }
        })
    }
}

/// Check if the items of a vector form a statement.
pub fn is_statement(items: &[Value]) -> bool {
    matches!(items.first(), Some(Value::Keyword(_)))
}

/// Expression operators.
///
/// Anything not listed is a function call when its head is a valid
/// function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    ShiftLeft,
    ShiftRight,
    BitAnd,
    BitOr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Is,
    IsNot,
    And,
    Or,
    Not,
    Like,
    NotLike,
    Glob,
    Regexp,
    Match,
    In,
    NotIn,
    Between,
    NotBetween,
    Exists,
    NotExists,
    Asc,
    Desc,
    As,
    Distinct,
    Cast,
    Quote,
    Funcall,
    /// String concatenation; recognized but not translated.
    Concat,
    /// Plain function call by name.
    Call(String),
}

impl Operator {
    /// Look up the operator for an expression head.
    pub fn lookup(name: &str) -> Operator {
        match name {
            "+" => Operator::Add,
            "-" => Operator::Sub,
            "*" => Operator::Mul,
            "/" => Operator::Div,
            "%" => Operator::Mod,
            "<<" => Operator::ShiftLeft,
            ">>" => Operator::ShiftRight,
            "&" => Operator::BitAnd,
            "|" => Operator::BitOr,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "<=" => Operator::Le,
            ">=" => Operator::Ge,
            "=" => Operator::Eq,
            "!=" => Operator::Ne,
            "is" => Operator::Is,
            "is-not" => Operator::IsNot,
            "and" => Operator::And,
            "or" => Operator::Or,
            "not" => Operator::Not,
            "like" => Operator::Like,
            "not-like" => Operator::NotLike,
            "glob" => Operator::Glob,
            "regexp" => Operator::Regexp,
            "match" => Operator::Match,
            "in" => Operator::In,
            "not-in" => Operator::NotIn,
            "between" => Operator::Between,
            "not-between" => Operator::NotBetween,
            "exists" => Operator::Exists,
            "not-exists" => Operator::NotExists,
            "asc" => Operator::Asc,
            "desc" => Operator::Desc,
            "as" => Operator::As,
            "distinct" => Operator::Distinct,
            "cast" => Operator::Cast,
            "quote" => Operator::Quote,
            "funcall" => Operator::Funcall,
            "||" => Operator::Concat,
            other => Operator::Call(other.to_string()),
        }
    }

    /// SQL text of an infix or prefix operator.
    pub fn sql(&self) -> Option<&'static str> {
        Some(match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::ShiftLeft => "<<",
            Operator::ShiftRight => ">>",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Glob => "GLOB",
            Operator::Regexp => "REGEXP",
            Operator::Match => "MATCH",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::Exists => "EXISTS",
            Operator::NotExists => "NOT EXISTS",
            Operator::Asc => "ASC",
            Operator::Desc => "DESC",
            Operator::As => "AS",
            Operator::Distinct => "DISTINCT",
            _ => return None,
        })
    }
}
