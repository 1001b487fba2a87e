//! Schema compiler: column definitions and table constraints.
//!
//! A schema is `([col-spec ...] table-constraint ...)`. A column spec is a
//! bare name or `(name [type] option ...)`:
//!
//! ```text
//! ([(id integer :primary :autoincrement)
//!   (name :type object :not-null)
//!   (boss-id integer)]
//!  (:unique [name])
//!  (:foreign [boss-id] :references people [id] :on-delete :cascade))
//! ```

use crate::compiler::{Compiler, SqlBuilder};
use crate::error::CompileError;
use crate::parser::QUOTE;
use symql_proto::Value;

fn action(value: Option<&Value>) -> Result<&'static str, CompileError> {
    match value.and_then(Value::as_keyword) {
        Some("cascade") => Ok("CASCADE"),
        Some("restrict") => Ok("RESTRICT"),
        Some("set-null") => Ok("SET NULL"),
        Some("set-default") => Ok("SET DEFAULT"),
        Some("no-action") => Ok("NO ACTION"),
        _ => Err(CompileError::malformed(format!(
            "expected :cascade, :restrict, :set-null, :set-default or :no-action, got {}",
            value.map(Value::to_string).unwrap_or_else(|| "nothing".to_string())
        ))),
    }
}

fn single_arg<'v>(kind: &str, args: &'v [Value]) -> Result<&'v Value, CompileError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(CompileError::malformed(format!(
            "(:{} ...) takes exactly one argument",
            kind
        ))),
    }
}

fn is_quoted(value: &Value) -> bool {
    value
        .as_list()
        .and_then(|items| items.first())
        .and_then(Value::as_symbol)
        == Some(QUOTE)
}

impl Compiler<'_> {
    /// Compile the items of a schema list into a parenthesized definition.
    pub(crate) fn schema(&self, items: &[Value]) -> Result<SqlBuilder, CompileError> {
        let (columns, constraints) = items
            .split_first()
            .ok_or_else(|| CompileError::malformed("empty schema"))?;
        let columns = columns
            .as_vector()
            .filter(|columns| !columns.is_empty())
            .ok_or_else(|| CompileError::malformed("schema needs a vector of columns"))?;

        let mut parts = columns
            .iter()
            .map(|column| self.column(column))
            .collect::<Result<Vec<_>, _>>()?;
        for constraint in constraints {
            parts.push(self.table_constraint(constraint)?);
        }
        Ok(SqlBuilder::join(parts, ", ").parenthesized())
    }

    fn column(&self, spec: &Value) -> Result<SqlBuilder, CompileError> {
        let items = match spec {
            Value::Symbol(_) => return self.name(spec),
            Value::List(items) if !items.is_empty() => items,
            other => {
                return Err(CompileError::malformed(format!(
                    "column spec must be a name or a list, got {}",
                    other
                )))
            }
        };

        let mut sql = self.name(&items[0])?;
        let mut column_type: Option<&str> = None;
        let mut constraints: Vec<SqlBuilder> = Vec::new();
        let mut options = items[1..].iter();

        while let Some(option) = options.next() {
            let keyword = match option {
                Value::Symbol(tag) => {
                    self.set_column_type(&mut column_type, tag, &items[0])?;
                    continue;
                }
                Value::Keyword(keyword) => keyword.as_str(),
                other => {
                    return Err(CompileError::malformed(format!(
                        "unexpected {} in column {}",
                        other, items[0]
                    )))
                }
            };
            match keyword {
                "type" => {
                    let tag = options.next().and_then(Value::as_symbol).ok_or_else(|| {
                        CompileError::malformed(":type needs a type name")
                    })?;
                    self.set_column_type(&mut column_type, tag, &items[0])?;
                }
                "primary" => constraints.push(SqlBuilder::text("PRIMARY KEY")),
                "autoincrement" => constraints.push(SqlBuilder::text("AUTOINCREMENT")),
                "not-null" => constraints.push(SqlBuilder::text("NOT NULL")),
                "unique" => constraints.push(SqlBuilder::text("UNIQUE")),
                "default" => {
                    let value = options
                        .next()
                        .ok_or_else(|| CompileError::malformed(":default needs a value"))?;
                    let mut default = SqlBuilder::text("DEFAULT ");
                    let sql = self.expr(value)?;
                    default.push_sql(match value {
                        Value::List(_) if !is_quoted(value) => sql.parenthesized(),
                        _ => sql,
                    });
                    constraints.push(default);
                }
                "check" => {
                    let expr = options
                        .next()
                        .ok_or_else(|| CompileError::malformed(":check needs an expression"))?;
                    constraints.push(self.check(expr)?);
                }
                other => {
                    return Err(CompileError::malformed(format!(
                        "unknown column option :{}",
                        other
                    )))
                }
            }
        }

        if let Some(column_type) = column_type {
            sql.push_str(&format!(" {}", column_type));
        }
        for constraint in constraints {
            sql.push_str(" ");
            sql.push_sql(constraint);
        }
        Ok(sql)
    }

    fn set_column_type<'t>(
        &'t self,
        slot: &mut Option<&'t str>,
        tag: &str,
        column: &Value,
    ) -> Result<(), CompileError> {
        if slot.is_some() {
            return Err(CompileError::malformed(format!(
                "column {} has more than one type",
                column
            )));
        }
        let sql_type = self.dialect.type_name(tag).ok_or_else(|| {
            CompileError::malformed(format!("unknown column type '{}'", tag))
        })?;
        *slot = Some(sql_type);
        Ok(())
    }

    fn check(&self, expr: &Value) -> Result<SqlBuilder, CompileError> {
        let mut sql = SqlBuilder::text("CHECK ");
        sql.push_sql(self.expr(expr)?.parenthesized());
        Ok(sql)
    }

    fn column_list(&self, value: Option<&Value>) -> Result<SqlBuilder, CompileError> {
        let columns = value
            .and_then(Value::as_vector)
            .filter(|columns| !columns.is_empty())
            .ok_or_else(|| CompileError::malformed("expected a vector of column names"))?;
        let names = columns
            .iter()
            .map(|column| self.name(column))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SqlBuilder::join(names, ", ").parenthesized())
    }

    fn table_constraint(&self, value: &Value) -> Result<SqlBuilder, CompileError> {
        let (kind, args) = value
            .as_list()
            .and_then(|items| items.split_first())
            .and_then(|(head, args)| Some((head.as_keyword()?, args)))
            .ok_or_else(|| {
                CompileError::malformed(format!(
                    "table constraint must be a list led by a keyword, got {}",
                    value
                ))
            })?;

        match kind {
            "primary" => {
                let mut sql = SqlBuilder::text("PRIMARY KEY ");
                sql.push_sql(self.column_list(Some(single_arg(kind, args)?))?);
                Ok(sql)
            }
            "unique" => {
                let mut sql = SqlBuilder::text("UNIQUE ");
                sql.push_sql(self.column_list(Some(single_arg(kind, args)?))?);
                Ok(sql)
            }
            "check" => self.check(single_arg(kind, args)?),
            "foreign" => self.foreign_key(args),
            other => Err(CompileError::malformed(format!(
                "unknown table constraint :{}",
                other
            ))),
        }
    }

    fn foreign_key(&self, args: &[Value]) -> Result<SqlBuilder, CompileError> {
        let mut args = args.iter().peekable();
        let mut sql = SqlBuilder::text("FOREIGN KEY ");
        sql.push_sql(self.column_list(args.next())?);

        if args.next().and_then(Value::as_keyword) != Some("references") {
            return Err(CompileError::malformed(
                "foreign key needs :references after its columns",
            ));
        }
        let table = args
            .next()
            .ok_or_else(|| CompileError::malformed(":references needs a table"))?;
        sql.push_str(" REFERENCES ");
        sql.push_sql(self.name(table)?);
        if matches!(args.peek(), Some(Value::Vector(_))) {
            sql.push_str(" ");
            sql.push_sql(self.column_list(args.next())?);
        }

        while let Some(option) = args.next() {
            let clause = match option.as_keyword() {
                Some("on-delete") => "ON DELETE",
                Some("on-update") => "ON UPDATE",
                _ => {
                    return Err(CompileError::malformed(format!(
                        "unexpected {} in foreign key",
                        option
                    )))
                }
            };
            sql.push_str(&format!(" {} {}", clause, action(args.next())?));
        }
        Ok(sql)
    }
}
