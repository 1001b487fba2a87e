//! Statement compiler and compiled statement binding.

use std::collections::BTreeMap;

use crate::ast::{is_statement, Element, Slot, SlotKind};
use crate::codec;
use crate::dialect::Dialect;
use crate::error::CompileError;
use symql_proto::{Param, Value};

/// How a slot's argument is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotContext {
    /// Rendered by its kind: identifier, literal, row or schema.
    Value,
    /// Pattern operand: scalars are always quoted text.
    Text,
    /// `:values` payload: one row-vector or a list of them.
    Rows,
}

/// A piece of compiled SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Literal SQL text.
    Sql(String),
    /// An unresolved template slot.
    Slot {
        /// The slot.
        slot: Slot,
        /// How to render its argument.
        context: SlotContext,
    },
}

/// SQL text under construction, with slots left open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlBuilder {
    fragments: Vec<Fragment>,
}

impl SqlBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder holding plain text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            fragments: vec![Fragment::Sql(text.into())],
        }
    }

    /// Create a builder holding a single slot.
    pub fn slot(slot: Slot, context: SlotContext) -> Self {
        Self {
            fragments: vec![Fragment::Slot { slot, context }],
        }
    }

    /// Append plain text.
    pub fn push_str(&mut self, text: &str) {
        match self.fragments.last_mut() {
            Some(Fragment::Sql(last)) => last.push_str(text),
            _ => self.fragments.push(Fragment::Sql(text.to_string())),
        }
    }

    /// Append another builder.
    pub fn push_sql(&mut self, other: SqlBuilder) {
        for fragment in other.fragments {
            match fragment {
                Fragment::Sql(text) => self.push_str(&text),
                slot => self.fragments.push(slot),
            }
        }
    }

    /// Join builders with a separator.
    pub fn join(parts: impl IntoIterator<Item = SqlBuilder>, separator: &str) -> SqlBuilder {
        let mut joined = SqlBuilder::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                joined.push_str(separator);
            }
            joined.push_sql(part);
        }
        joined
    }

    /// Wrap in parentheses.
    pub fn parenthesized(self) -> SqlBuilder {
        let mut wrapped = SqlBuilder::text("(");
        wrapped.push_sql(self);
        wrapped.push_str(")");
        wrapped
    }

    /// The fragments built so far.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Concatenated text when the builder holds no slots.
    pub fn static_text(&self) -> Option<String> {
        self.fragments
            .iter()
            .map(|f| match f {
                Fragment::Sql(text) => Some(text.as_str()),
                Fragment::Slot { .. } => None,
            })
            .collect()
    }
}

/// Statement compiler for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'d> {
    pub(crate) dialect: &'d Dialect,
    slots_allowed: bool,
}

impl<'d> Compiler<'d> {
    /// Create a compiler for the given dialect.
    pub fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            slots_allowed: true,
        }
    }

    /// Reject template slots; used for schema arguments at bind time.
    pub(crate) fn without_slots(mut self) -> Self {
        self.slots_allowed = false;
        self
    }

    /// Compile a statement into SQL with unresolved slots.
    pub fn compile(&self, statement: &Value) -> Result<CompiledStatement, CompileError> {
        let shape = statement.to_string();
        let items = statement
            .as_vector()
            .filter(|items| is_statement(items))
            .ok_or_else(|| {
                CompileError::malformed("a statement is a vector starting with a keyword")
                    .with_shape(&shape)
            })?;
        let sql = self
            .statement(items)
            .and_then(|sql| {
                let params = collect_slots(&sql)?;
                Ok((sql, params))
            })
            .map_err(|e| e.with_shape(&shape));
        let (sql, params) = sql?;
        Ok(CompiledStatement {
            fragments: sql.fragments,
            params,
            shape,
            dialect: self.dialect.name().to_string(),
        })
    }

    /// Compile the items of a statement vector.
    pub(crate) fn statement(&self, items: &[Value]) -> Result<SqlBuilder, CompileError> {
        let mut parts = Vec::with_capacity(items.len());
        let mut after_directive = false;
        let mut values_pending = false;

        for item in items {
            if values_pending {
                parts.push(self.values_payload(item)?);
                values_pending = false;
                after_directive = false;
                continue;
            }
            let element = Element::classify(item)?;
            let sql = match element {
                Element::Directive(name) => {
                    values_pending = name == "values";
                    after_directive = true;
                    parts.push(SqlBuilder::text(directive(name)?));
                    continue;
                }
                Element::RowGroup(row) if after_directive => self.row_items(row)?,
                Element::RowGroup(row) => self.row_items(row)?.parenthesized(),
                Element::Statement(inner) => self.statement(inner)?.parenthesized(),
                Element::Schema(schema) => self.schema(schema)?,
                Element::Expression(expr) => self.call(expr)?,
                Element::Identifier(name) => self.identifier(name)?,
                Element::Slot(slot) => self.slot(slot, SlotContext::Value)?,
                Element::Literal(value) => self.literal(value)?,
            };
            parts.push(sql);
            after_directive = false;
        }

        if values_pending {
            return Err(CompileError::malformed(":values needs a payload"));
        }
        Ok(SqlBuilder::join(parts, " "))
    }

    /// The payload following `:values`.
    fn values_payload(&self, payload: &Value) -> Result<SqlBuilder, CompileError> {
        match payload {
            Value::Vector(row) if !is_statement(row) => self.row(row),
            Value::List(rows) if !rows.is_empty() => {
                let rows = rows
                    .iter()
                    .map(|row| match row {
                        Value::Vector(items) if !is_statement(items) => self.row(items),
                        other => Err(CompileError::malformed(format!(
                            ":values rows must be vectors, got {}",
                            other.type_name()
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SqlBuilder::join(rows, ", "))
            }
            Value::Symbol(name) => match Slot::parse(name)? {
                Some(slot) if slot.kind == SlotKind::Vector => self.slot(slot, SlotContext::Rows),
                _ => Err(CompileError::malformed(format!(
                    ":values payload '{}' is not a vector slot",
                    name
                ))),
            },
            other => Err(CompileError::malformed(format!(
                ":values needs a vector, a list of vectors or a $v slot, got {}",
                other
            ))),
        }
    }

    /// Comma-joined row elements without parentheses.
    pub(crate) fn row_items(&self, items: &[Value]) -> Result<SqlBuilder, CompileError> {
        if items.is_empty() {
            return Err(CompileError::malformed("empty row-group"));
        }
        let parts = items
            .iter()
            .map(|item| self.expr(item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SqlBuilder::join(parts, ", "))
    }

    /// Parenthesized row.
    pub(crate) fn row(&self, items: &[Value]) -> Result<SqlBuilder, CompileError> {
        Ok(self.row_items(items)?.parenthesized())
    }

    pub(crate) fn identifier(&self, name: &str) -> Result<SqlBuilder, CompileError> {
        Ok(SqlBuilder::text(self.dialect.escape_identifier(name)?))
    }

    pub(crate) fn literal(&self, value: &Value) -> Result<SqlBuilder, CompileError> {
        Ok(SqlBuilder::text(codec::encode(value)?))
    }

    pub(crate) fn slot(&self, slot: Slot, context: SlotContext) -> Result<SqlBuilder, CompileError> {
        if !self.slots_allowed {
            return Err(CompileError::malformed(format!(
                "template slot {} inside a schema argument",
                slot
            )));
        }
        Ok(SqlBuilder::slot(slot, context))
    }

    /// A name position that also accepts an identifier slot.
    pub(crate) fn name(&self, value: &Value) -> Result<SqlBuilder, CompileError> {
        let name = value.as_symbol().ok_or_else(|| {
            CompileError::malformed(format!("expected a name, got {}", value))
        })?;
        match Slot::parse(name)? {
            Some(slot) if slot.kind == SlotKind::Identifier => self.slot(slot, SlotContext::Value),
            Some(slot) => Err(CompileError::malformed(format!(
                "{} slot {} used as a name",
                slot.kind.name(),
                slot
            ))),
            None => self.identifier(name),
        }
    }
}

/// SQL keywords for a directive: dashes split words, words are uppercased.
fn directive(name: &str) -> Result<String, CompileError> {
    let valid = !name.is_empty()
        && name
            .split('-')
            .all(|word| !word.is_empty() && word.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'));
    if !valid {
        return Err(CompileError::malformed(format!(
            "':{}' is not a directive",
            name
        )));
    }
    Ok(name
        .split('-')
        .map(str::to_ascii_uppercase)
        .collect::<Vec<_>>()
        .join(" "))
}

/// Check slot usage and return the slot kind of each argument position.
fn collect_slots(sql: &SqlBuilder) -> Result<Vec<SlotKind>, CompileError> {
    let mut kinds: BTreeMap<usize, SlotKind> = BTreeMap::new();
    for fragment in sql.fragments() {
        if let Fragment::Slot { slot, .. } = fragment {
            match kinds.get(&slot.index) {
                Some(kind) if *kind != slot.kind => {
                    return Err(CompileError::malformed(format!(
                        "position {} is used as both {} and {}",
                        slot.index,
                        kind.name(),
                        slot.kind.name()
                    )));
                }
                _ => {
                    kinds.insert(slot.index, slot.kind);
                }
            }
        }
    }
    let arity = kinds.keys().next_back().copied().unwrap_or(0);
    if let Some(missing) = (1..=arity).find(|i| !kinds.contains_key(i)) {
        return Err(CompileError::malformed(format!(
            "argument position {} is never used",
            missing
        )));
    }
    Ok(kinds.into_values().collect())
}

/// How arguments reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding {
    /// Scalars are encoded into the SQL text.
    #[default]
    Inline,
    /// Scalars travel as positional parameters.
    Parameters,
}

/// SQL ready to send, with parameters when bound with
/// [`Binding::Parameters`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    /// Final SQL text.
    pub sql: String,
    /// Positional parameters in placeholder order.
    pub params: Vec<Param>,
}

/// A compiled statement.
///
/// Holds no argument values; it is shared by every execution of the
/// same statement shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    fragments: Vec<Fragment>,
    params: Vec<SlotKind>,
    shape: String,
    dialect: String,
}

impl CompiledStatement {
    /// Printed form of the source statement.
    pub fn shape(&self) -> &str {
        &self.shape
    }

    /// Name of the dialect this was compiled for.
    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    /// Number of arguments the statement takes.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Slot kind expected at each argument position.
    pub fn param_kinds(&self) -> &[SlotKind] {
        &self.params
    }

    /// Compiled fragments.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// SQL text with slots written as `$s1`-style markers.
    pub fn template(&self) -> String {
        self.fragments
            .iter()
            .map(|f| match f {
                Fragment::Sql(text) => text.clone(),
                Fragment::Slot { slot, .. } => slot.to_string(),
            })
            .collect()
    }

    /// Resolve every slot against the arguments.
    pub fn bind(
        &self,
        args: &[Value],
        binding: Binding,
        dialect: &Dialect,
    ) -> Result<BoundStatement, CompileError> {
        if args.len() != self.arity() {
            return Err(CompileError::argument_mismatch(format!(
                "statement takes {} arguments, got {}",
                self.arity(),
                args.len()
            ))
            .with_shape(&self.shape));
        }

        let mut binder = Binder {
            dialect,
            binding,
            sql: String::new(),
            params: Vec::new(),
        };
        for fragment in &self.fragments {
            match fragment {
                Fragment::Sql(text) => binder.sql.push_str(text),
                Fragment::Slot { slot, context } => binder
                    .slot(*slot, *context, &args[slot.index - 1])
                    .map_err(|e| e.with_shape(&self.shape))?,
            }
        }
        Ok(BoundStatement {
            sql: binder.sql,
            params: binder.params,
        })
    }

    /// Bind inline and return the final SQL text.
    pub fn to_sql(&self, args: &[Value], dialect: &Dialect) -> Result<String, CompileError> {
        Ok(self.bind(args, Binding::Inline, dialect)?.sql)
    }
}

struct Binder<'a> {
    dialect: &'a Dialect,
    binding: Binding,
    sql: String,
    params: Vec<Param>,
}

impl Binder<'_> {
    fn slot(&mut self, slot: Slot, context: SlotContext, arg: &Value) -> Result<(), CompileError> {
        let mismatch = |expected: &str| {
            CompileError::argument_mismatch(format!(
                "argument {} for {} must be {}, got {}",
                slot.index,
                slot,
                expected,
                arg.type_name()
            ))
        };

        match slot.kind {
            SlotKind::Identifier => {
                let name = arg.as_symbol().ok_or_else(|| mismatch("a symbol"))?;
                let escaped = self.dialect.escape_identifier(name)?;
                self.sql.push_str(&escaped);
            }
            SlotKind::Scalar => self.scalar(arg, context == SlotContext::Text)?,
            SlotKind::Vector => match (context, arg) {
                (_, Value::Vector(items)) if !items.is_empty() => self.row(items)?,
                (SlotContext::Rows, Value::List(rows)) if !rows.is_empty() => {
                    for (i, row) in rows.iter().enumerate() {
                        let items = row
                            .as_vector()
                            .filter(|items| !items.is_empty())
                            .ok_or_else(|| mismatch("a list of non-empty vectors"))?;
                        if i > 0 {
                            self.sql.push_str(", ");
                        }
                        self.row(items)?;
                    }
                }
                (SlotContext::Rows, _) => {
                    return Err(mismatch("a non-empty vector or a list of vectors"))
                }
                _ => return Err(mismatch("a non-empty vector")),
            },
            SlotKind::Schema => {
                let items = arg
                    .as_list()
                    .filter(|items| matches!(items.first(), Some(Value::Vector(_))))
                    .ok_or_else(|| mismatch("a schema list"))?;
                let schema = Compiler::new(self.dialect).without_slots().schema(items)?;
                let text = schema
                    .static_text()
                    .ok_or_else(|| CompileError::malformed("schema argument contains slots"))?;
                self.sql.push_str(&text);
            }
        }
        Ok(())
    }

    fn scalar(&mut self, value: &Value, as_text: bool) -> Result<(), CompileError> {
        match self.binding {
            Binding::Inline => {
                let literal = if as_text {
                    codec::encode_text(value)?
                } else {
                    codec::encode(value)?
                };
                self.sql.push_str(&literal);
            }
            Binding::Parameters => {
                let param = if as_text {
                    codec::to_text_param(value)?
                } else {
                    codec::to_param(value)?
                };
                self.params.push(param);
                self.sql.push_str(&self.dialect.placeholder(self.params.len()));
            }
        }
        Ok(())
    }

    fn row(&mut self, items: &[Value]) -> Result<(), CompileError> {
        self.sql.push('(');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.scalar(item, false)?;
        }
        self.sql.push(')');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;
    use crate::parser::read;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> Result<CompiledStatement, CompileError> {
        Compiler::new(&Dialect::ansi()).compile(&read(source).unwrap())
    }

    fn sql(source: &str, args: &[Value]) -> String {
        compile(source)
            .unwrap()
            .to_sql(args, &Dialect::ansi())
            .unwrap()
    }

    #[test]
    fn test_select_with_scalar_slot() {
        let compiled = compile("[:select [name id] :from people :where (> salary $s1)]").unwrap();
        assert_eq!(compiled.arity(), 1);
        assert_eq!(
            compiled.template(),
            "SELECT name, id FROM people WHERE salary > $s1"
        );
        assert_eq!(
            compiled.to_sql(&[Value::Integer(62000)], &Dialect::ansi()).unwrap(),
            "SELECT name, id FROM people WHERE salary > 62000"
        );
    }

    #[test]
    fn test_compound_directives() {
        assert_eq!(
            sql("[:create-table :if-not-exists people ([name id])]", &[]),
            "CREATE TABLE IF NOT EXISTS people (name, id)"
        );
        assert_eq!(
            sql("[:create :table :if :not :exists people ([name id])]", &[]),
            "CREATE TABLE IF NOT EXISTS people (name, id)"
        );
    }

    #[test]
    fn test_insert_values() {
        assert_eq!(
            sql("[:insert-into people [name id] :values ([\"Jeff\" 1000] [\"Susan\" 1001])]", &[]),
            "INSERT INTO people (name, id) VALUES ('\"Jeff\"', 1000), ('\"Susan\"', 1001)"
        );
        assert_eq!(
            sql("[:insert-into people :values [\"Jeff\" 1000 nil]]", &[]),
            "INSERT INTO people VALUES ('\"Jeff\"', 1000, NULL)"
        );
    }

    #[test]
    fn test_values_slot() {
        let compiled = compile("[:insert-into people [name id] :values $v1]").unwrap();
        let rows = Value::list([
            Value::vector([Value::from("Jeff"), Value::Integer(1000)]),
            Value::vector([Value::from("Susan"), Value::Integer(1001)]),
        ]);
        assert_eq!(
            compiled.to_sql(&[rows], &Dialect::ansi()).unwrap(),
            "INSERT INTO people (name, id) VALUES ('\"Jeff\"', 1000), ('\"Susan\"', 1001)"
        );
        let row = Value::vector([Value::from("Jeff"), Value::Integer(1000)]);
        assert_eq!(
            compiled.to_sql(&[row], &Dialect::ansi()).unwrap(),
            "INSERT INTO people (name, id) VALUES ('\"Jeff\"', 1000)"
        );
    }

    #[test]
    fn test_malformed_values() {
        for source in [
            "[:insert-into people :values]",
            "[:insert-into people :values people]",
            "[:insert-into people :values 5]",
            "[:insert-into people :values $s1]",
            "[:insert-into people :values ([1] 2)]",
            "[:insert-into people :values [:select 1]]",
        ] {
            let err = compile(source).unwrap_err();
            assert_eq!(err.kind, CompileErrorKind::MalformedStatement, "{}", source);
            assert!(err.shape.is_some());
        }
    }

    #[test]
    fn test_not_a_statement() {
        assert!(compile("[select x]").is_err());
        assert!(compile("(:select x)").is_err());
        assert!(compile("[]").is_err());
    }

    #[test]
    fn test_nested_statement() {
        assert_eq!(
            sql("[:select * :from (as [:select [id] :from people] p)]", &[]),
            "SELECT * FROM (SELECT id FROM people) AS p"
        );
        assert_eq!(
            sql("[:insert-into archive [:select * :from people]]", &[]),
            "INSERT INTO archive (SELECT * FROM people)"
        );
    }

    #[test]
    fn test_identifier_slot() {
        let compiled = compile("[:select * :from $i1 :where (= id $s2)]").unwrap();
        assert_eq!(compiled.param_kinds(), &[SlotKind::Identifier, SlotKind::Scalar]);
        assert_eq!(
            compiled
                .to_sql(&[Value::symbol("first-people"), Value::Integer(3)], &Dialect::ansi())
                .unwrap(),
            "SELECT * FROM first_people WHERE id = 3"
        );
        let err = compiled
            .to_sql(&[Value::from("people"), Value::Integer(3)], &Dialect::ansi())
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::ArgumentMismatch);
    }

    #[test]
    fn test_argument_count() {
        let compiled = compile("[:select * :from people :where (= id $s1)]").unwrap();
        let err = compiled.to_sql(&[], &Dialect::ansi()).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::ArgumentMismatch);
        assert!(err.message.contains("takes 1 arguments, got 0"));
    }

    #[test]
    fn test_slot_reuse_and_gaps() {
        let compiled = compile("[:select * :from t :where (or (= a $s1) (= b $s1))]").unwrap();
        assert_eq!(compiled.arity(), 1);

        let conflict = compile("[:select * :from $i1 :where (= a $s1)]").unwrap_err();
        assert_eq!(conflict.kind, CompileErrorKind::MalformedStatement);

        let gap = compile("[:select * :from t :where (= a $s2)]").unwrap_err();
        assert!(gap.message.contains("position 1 is never used"));
    }

    #[test]
    fn test_parameter_binding() {
        let compiled =
            compile("[:select * :from $i1 :where (and (= name $s2) (like note $s3))]").unwrap();
        let bound = compiled
            .bind(
                &[Value::symbol("people"), Value::from("Jeff"), Value::Integer(5)],
                Binding::Parameters,
                &Dialect::ansi(),
            )
            .unwrap();
        assert_eq!(
            bound.sql,
            "SELECT * FROM people WHERE (name = ?1) AND (note LIKE ?2)"
        );
        assert_eq!(
            bound.params,
            vec![Param::Text("\"Jeff\"".into()), Param::Text("5".into())]
        );
    }

    #[test]
    fn test_schema_slot() {
        let compiled = compile("[:create-table $i1 $S2]").unwrap();
        let schema = read("([(id integer :primary) name])").unwrap();
        assert_eq!(
            compiled
                .to_sql(&[Value::symbol("people"), schema], &Dialect::ansi())
                .unwrap(),
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name)"
        );

        let with_slot = read("([(id :default $s1)])").unwrap();
        let err = compiled
            .to_sql(&[Value::symbol("people"), with_slot], &Dialect::ansi())
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::MalformedStatement);
    }

    #[test]
    fn test_unencodable_argument() {
        let compiled = compile("[:select * :from t :where (= x $s1)]").unwrap();
        let err = compiled
            .to_sql(&[Value::Float(f64::NAN)], &Dialect::ansi())
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnencodableValue);
    }

    #[test]
    fn test_literals_at_statement_level() {
        assert_eq!(
            sql("[:select * :from people :limit 10 :offset 5]", &[]),
            "SELECT * FROM people LIMIT 10 OFFSET 5"
        );
    }

    #[test]
    fn test_bad_directive() {
        let err = compile("[:select* x]").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::MalformedStatement);
    }
}
