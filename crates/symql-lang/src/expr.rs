//! Expression compiler.

use crate::ast::{is_statement, Operator, Slot, SlotKind};
use crate::codec;
use crate::compiler::{Compiler, SlotContext, SqlBuilder};
use crate::error::CompileError;
use crate::parser::QUOTE;
use symql_proto::Value;

/// Operand count an operator accepts.
#[derive(Clone, Copy)]
enum Arity {
    Exactly(usize),
    AtLeast(usize),
    Between(usize, usize),
}

impl Arity {
    fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exactly(k) => n == k,
            Arity::AtLeast(k) => n >= k,
            Arity::Between(lo, hi) => (lo..=hi).contains(&n),
        }
    }

    fn describe(self) -> String {
        match self {
            Arity::Exactly(1) => "1 operand".to_string(),
            Arity::Exactly(k) => format!("{} operands", k),
            Arity::AtLeast(k) => format!("at least {} operands", k),
            Arity::Between(lo, hi) => format!("{} or {} operands", lo, hi),
        }
    }
}

fn arity(op: &Operator) -> Arity {
    match op {
        Operator::Add | Operator::Mul => Arity::AtLeast(2),
        Operator::Sub => Arity::Between(1, 2),
        Operator::Le | Operator::Ge => Arity::Between(2, 3),
        Operator::And | Operator::Or => Arity::AtLeast(1),
        Operator::Between | Operator::NotBetween => Arity::Exactly(3),
        Operator::Not
        | Operator::Exists
        | Operator::NotExists
        | Operator::Asc
        | Operator::Desc
        | Operator::Distinct
        | Operator::Quote => Arity::Exactly(1),
        Operator::Funcall => Arity::AtLeast(1),
        Operator::Call(_) | Operator::Concat => Arity::AtLeast(0),
        _ => Arity::Exactly(2),
    }
}

/// Check if an operand needs parentheses when nested.
fn is_compound(value: &Value) -> bool {
    let Some(Value::Symbol(head)) = value.as_list().and_then(|items| items.first()) else {
        return false;
    };
    !matches!(
        Operator::lookup(head),
        Operator::Call(_) | Operator::Funcall | Operator::Cast | Operator::Quote
    )
}

/// Check if a name is usable as a SQL function name.
fn is_function_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl Compiler<'_> {
    /// Compile an expression in a position that needs no parentheses.
    pub(crate) fn expr(&self, value: &Value) -> Result<SqlBuilder, CompileError> {
        match value {
            Value::Null | Value::Integer(_) | Value::Float(_) | Value::String(_) => {
                self.literal(value)
            }
            Value::Keyword(k) => Err(CompileError::malformed(format!(
                "directive :{} inside an expression",
                k
            ))),
            Value::Symbol(name) => match Slot::parse(name)? {
                Some(slot) if slot.kind == SlotKind::Schema => Err(CompileError::malformed(
                    format!("schema slot {} inside an expression", slot),
                )),
                Some(slot) => self.slot(slot, SlotContext::Value),
                None => self.identifier(name),
            },
            Value::Vector(items) if is_statement(items) => Ok(self.statement(items)?.parenthesized()),
            Value::Vector(items) => self.row(items),
            Value::List(items) => self.call(items),
        }
    }

    /// Compile an operand of an operator.
    fn operand(&self, value: &Value) -> Result<SqlBuilder, CompileError> {
        let sql = self.expr(value)?;
        Ok(if is_compound(value) { sql.parenthesized() } else { sql })
    }

    fn operands(&self, values: &[Value]) -> Result<Vec<SqlBuilder>, CompileError> {
        values.iter().map(|v| self.operand(v)).collect()
    }

    /// Compile an `(op args...)` form.
    pub(crate) fn call(&self, items: &[Value]) -> Result<SqlBuilder, CompileError> {
        let (head, args) = items
            .split_first()
            .ok_or_else(|| CompileError::malformed("empty expression"))?;
        let name = head
            .as_symbol()
            .ok_or_else(|| CompileError::unknown_operator(&head.to_string()))?;
        let op = Operator::lookup(name);

        if op == Operator::Concat {
            return Err(CompileError::unsupported_operator(name));
        }
        let expected = arity(&op);
        if !expected.accepts(args.len()) {
            return Err(CompileError::malformed(format!(
                "'{}' takes {}, got {}",
                name,
                expected.describe(),
                args.len()
            )));
        }

        match op {
            Operator::Sub if args.len() == 1 => {
                // The space keeps a negative operand from forming a `--` comment.
                let mut sql = SqlBuilder::text("- ");
                sql.push_sql(self.operand(&args[0])?);
                Ok(sql)
            }
            Operator::Le | Operator::Ge if args.len() == 3 => {
                // (<= a b c) bounds b below by a; (>= a b c) bounds b above by a.
                let (low, high) = if op == Operator::Le {
                    (&args[0], &args[2])
                } else {
                    (&args[2], &args[0])
                };
                self.between(&args[1], low, high, "BETWEEN")
            }
            Operator::Between | Operator::NotBetween => {
                let keyword = op.sql().unwrap_or("BETWEEN");
                self.between(&args[0], &args[1], &args[2], keyword)
            }
            Operator::Not | Operator::Distinct => {
                let mut sql = SqlBuilder::text(format!("{} ", op.sql().unwrap_or_default()));
                sql.push_sql(self.operand(&args[0])?);
                Ok(sql)
            }
            Operator::Exists | Operator::NotExists => {
                let query = args[0]
                    .as_vector()
                    .filter(|items| is_statement(items))
                    .ok_or_else(|| {
                        CompileError::malformed(format!("'{}' needs a subquery", name))
                    })?;
                let mut sql = SqlBuilder::text(format!("{} ", op.sql().unwrap_or_default()));
                sql.push_sql(self.statement(query)?.parenthesized());
                Ok(sql)
            }
            Operator::Asc | Operator::Desc => {
                let mut sql = self.operand(&args[0])?;
                sql.push_str(&format!(" {}", op.sql().unwrap_or_default()));
                Ok(sql)
            }
            Operator::As => {
                let mut sql = self.operand(&args[0])?;
                sql.push_str(" AS ");
                sql.push_sql(self.name(&args[1])?);
                Ok(sql)
            }
            Operator::Like
            | Operator::NotLike
            | Operator::Glob
            | Operator::Regexp
            | Operator::Match => {
                let mut sql = self.operand(&args[0])?;
                sql.push_str(&format!(" {} ", op.sql().unwrap_or_default()));
                sql.push_sql(self.pattern(&args[1])?);
                Ok(sql)
            }
            Operator::In | Operator::NotIn => {
                let mut sql = self.operand(&args[0])?;
                sql.push_str(&format!(" {} ", op.sql().unwrap_or_default()));
                sql.push_sql(self.membership(&args[1])?);
                Ok(sql)
            }
            Operator::Cast => {
                let tag = args[1].as_symbol().ok_or_else(|| {
                    CompileError::malformed(format!("cast needs a type name, got {}", args[1]))
                })?;
                let type_name = self.dialect.type_name(tag).ok_or_else(|| {
                    CompileError::malformed(format!("unknown type '{}'", tag))
                })?;
                let mut sql = SqlBuilder::text("CAST(");
                sql.push_sql(self.expr(&args[0])?);
                sql.push_str(&format!(" AS {})", type_name));
                Ok(sql)
            }
            Operator::Quote => Ok(SqlBuilder::text(codec::encode(&args[0])?)),
            Operator::Funcall => {
                let function = args[0].as_symbol().ok_or_else(|| {
                    CompileError::unknown_operator(&args[0].to_string())
                })?;
                self.function(function, &args[1..])
            }
            Operator::Call(ref function) => self.function(function, args),
            _ => {
                let symbol = op.sql().unwrap_or_default();
                Ok(SqlBuilder::join(
                    self.operands(args)?,
                    &format!(" {} ", symbol),
                ))
            }
        }
    }

    fn between(
        &self,
        value: &Value,
        low: &Value,
        high: &Value,
        keyword: &str,
    ) -> Result<SqlBuilder, CompileError> {
        let mut sql = self.operand(value)?;
        sql.push_str(&format!(" {} ", keyword));
        sql.push_sql(self.operand(low)?);
        sql.push_str(" AND ");
        sql.push_sql(self.operand(high)?);
        Ok(sql)
    }

    fn function(&self, name: &str, args: &[Value]) -> Result<SqlBuilder, CompileError> {
        if !is_function_name(name) {
            return Err(CompileError::unknown_operator(name));
        }
        let args = args
            .iter()
            .map(|arg| self.expr(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let mut sql = SqlBuilder::text(format!("{}(", name.replace('-', "_")));
        sql.push_sql(SqlBuilder::join(args, ", "));
        sql.push_str(")");
        Ok(sql)
    }

    /// Pattern operands are matched against printed text, so literals and
    /// scalar slots render as quoted text even when numeric.
    fn pattern(&self, value: &Value) -> Result<SqlBuilder, CompileError> {
        match value {
            Value::Null | Value::Integer(_) | Value::Float(_) | Value::String(_) => {
                Ok(SqlBuilder::text(codec::encode_text(value)?))
            }
            Value::Symbol(name) => match Slot::parse(name)? {
                Some(slot) if slot.kind == SlotKind::Scalar => self.slot(slot, SlotContext::Text),
                Some(slot) => Err(CompileError::malformed(format!(
                    "pattern operand {} must be a scalar slot",
                    slot
                ))),
                None => self.identifier(name),
            },
            Value::List(items)
                if items.len() == 2 && items[0].as_symbol() == Some(QUOTE) =>
            {
                Ok(SqlBuilder::text(codec::encode_text(&items[1])?))
            }
            other => self.operand(other),
        }
    }

    fn membership(&self, value: &Value) -> Result<SqlBuilder, CompileError> {
        match value {
            Value::Vector(items) if is_statement(items) => Ok(self.statement(items)?.parenthesized()),
            Value::Vector(items) => self.row(items),
            Value::Symbol(name) => match Slot::parse(name)? {
                Some(slot) if slot.kind == SlotKind::Vector => self.slot(slot, SlotContext::Value),
                _ => Err(CompileError::malformed(format!(
                    "membership needs a vector, a $v slot or a subquery, got {}",
                    name
                ))),
            },
            other => Err(CompileError::malformed(format!(
                "membership needs a vector, a $v slot or a subquery, got {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Compiler;
    use crate::dialect::Dialect;
    use crate::error::{CompileError, CompileErrorKind};
    use crate::parser::read;
    use pretty_assertions::assert_eq;

    fn expr(source: &str) -> Result<String, CompileError> {
        let dialect = Dialect::ansi();
        let compiler = Compiler::new(&dialect);
        let value = read(source).unwrap();
        Ok(compiler.expr(&value)?.static_text().unwrap_or_default())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(expr("(+ a b 1)").unwrap(), "a + b + 1");
        assert_eq!(expr("(- a)").unwrap(), "- a");
        assert_eq!(expr("(- a b)").unwrap(), "a - b");
        assert_eq!(expr("(* (+ a 1) 2)").unwrap(), "(a + 1) * 2");
        assert_eq!(expr("(% a 2)").unwrap(), "a % 2");
        assert_eq!(expr("(<< 1 4)").unwrap(), "1 << 4");
    }

    #[test]
    fn test_negated_negative_literal() {
        assert_eq!(expr("(- -5)").unwrap(), "- -5");
        assert_eq!(expr("(- (- a))").unwrap(), "- (- a)");
        assert!(!expr("(- -5.5)").unwrap().contains("--"));
    }

    #[test]
    fn test_comparison_arity() {
        assert_eq!(expr("(<= a b)").unwrap(), "a <= b");
        assert_eq!(expr("(<= a b c)").unwrap(), "b BETWEEN a AND c");
        assert_eq!(expr("(>= a b c)").unwrap(), "b BETWEEN c AND a");
        assert_eq!(expr("(<= 1 x 10)").unwrap(), "x BETWEEN 1 AND 10");
        let err = expr("(<= a b c d)").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::MalformedStatement);
        assert!(expr("(< a b c)").is_err());
        assert!(expr("(= a)").is_err());
    }

    #[test]
    fn test_identifier_versus_quote() {
        assert_eq!(expr("(= name foo)").unwrap(), "name = foo");
        assert_eq!(expr("(= name 'foo)").unwrap(), "name = 'foo'");
        assert_eq!(expr("(= name (quote foo))").unwrap(), "name = 'foo'");
        assert_eq!(expr("(= name \"foo\")").unwrap(), "name = '\"foo\"'");
    }

    #[test]
    fn test_logic() {
        assert_eq!(
            expr("(and (> a 1) (or (= b 2) (not c)))").unwrap(),
            "(a > 1) AND ((b = 2) OR (NOT c))"
        );
        assert_eq!(expr("(is a nil)").unwrap(), "a IS NULL");
        assert_eq!(expr("(is-not a nil)").unwrap(), "a IS NOT NULL");
        assert_eq!(expr("(between x 1 5)").unwrap(), "x BETWEEN 1 AND 5");
        assert_eq!(expr("(not-between x 1 5)").unwrap(), "x NOT BETWEEN 1 AND 5");
    }

    #[test]
    fn test_patterns_are_text() {
        assert_eq!(expr("(like name \"%ab%\")").unwrap(), "name LIKE '\"%ab%\"'");
        assert_eq!(expr("(glob code 12)").unwrap(), "code GLOB '12'");
        assert_eq!(expr("(not-like name 'x)").unwrap(), "name NOT LIKE 'x'");
        assert_eq!(expr("(regexp a b)").unwrap(), "a REGEXP b");
    }

    #[test]
    fn test_membership() {
        assert_eq!(expr("(in id [1 2 3])").unwrap(), "id IN (1, 2, 3)");
        assert_eq!(
            expr("(not-in id [:select [id] :from banned])").unwrap(),
            "id NOT IN (SELECT id FROM banned)"
        );
        assert!(expr("(in id 5)").is_err());
        assert!(expr("(in id $s1)").is_err());
    }

    #[test]
    fn test_subquery_tests() {
        assert_eq!(
            expr("(exists [:select * :from t])").unwrap(),
            "EXISTS (SELECT * FROM t)"
        );
        assert!(expr("(exists t)").is_err());
    }

    #[test]
    fn test_ordering_alias_distinct_cast() {
        assert_eq!(expr("(desc (+ a b))").unwrap(), "(a + b) DESC");
        assert_eq!(expr("(asc name)").unwrap(), "name ASC");
        assert_eq!(expr("(as (max salary) top)").unwrap(), "max(salary) AS top");
        assert_eq!(expr("(distinct name)").unwrap(), "DISTINCT name");
        assert_eq!(expr("(cast x float)").unwrap(), "CAST(x AS REAL)");
        assert!(expr("(cast x decimal)").is_err());
    }

    #[test]
    fn test_function_calls() {
        assert_eq!(expr("(count *)").unwrap(), "count(*)");
        assert_eq!(expr("(funcall max salary)").unwrap(), "max(salary)");
        assert_eq!(expr("(group-concat name)").unwrap(), "group_concat(name)");
        assert_eq!(expr("(random)").unwrap(), "random()");
        assert_eq!(
            expr("(coalesce (+ a 1) 0)").unwrap(),
            "coalesce(a + 1, 0)"
        );
    }

    #[test]
    fn test_unknown_operator() {
        let err = expr("(f?g x)").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnknownOperator);
        let err = expr("((a) x)").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnknownOperator);
        let err = expr("(funcall 1 x)").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnknownOperator);
    }

    #[test]
    fn test_concat_unsupported() {
        let err = expr("(|| a b)").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnsupportedOperator);
    }

    #[test]
    fn test_empty_and_misplaced() {
        assert!(expr("()").is_err());
        assert!(expr("(= a :from)").is_err());
        assert!(expr("(= a $S1)").is_err());
    }
}
