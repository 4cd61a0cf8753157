use crate::{
    AsValue, ColumnDescriptor, Command, Direction, Parameter, Result, RowLabeled, TableRef, Value,
    convert_value, separated_by, value_for_sql_type,
};
use anyhow::Context;
use std::fmt::Write;
use time::OffsetDateTime;

/// The two statements needed to serve one page of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingQueries {
    /// Returns the total number of records matching the predicate.
    pub count: String,
    /// Returns the records of the requested page.
    pub page: String,
}

/// SQL text generation and capabilities of a database flavor.
///
/// Predicates, projections and orderings reach the dialect as SQL fragments
/// without their leading keyword, an empty fragment means "absent".
pub trait Dialect: Send + Sync {
    fn as_dyn(&self) -> &dyn Dialect;

    fn write_table_ref(&self, out: &mut String, table: &TableRef) {
        if !table.schema.is_empty() {
            out.push_str(&table.schema);
            out.push('.');
        }
        out.push_str(&table.name);
    }

    fn parameter_prefix(&self) -> &'static str {
        "@"
    }

    fn prefix_parameter_name(&self, name: &str) -> String {
        let prefix = self.parameter_prefix();
        if name.starts_with(prefix) {
            return name.to_string();
        }
        format!("{prefix}{name}")
    }

    fn deprefix_parameter_name<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(self.parameter_prefix()).unwrap_or(name)
    }

    fn supports_anonymous_parameters(&self) -> bool {
        false
    }

    /// Placeholder text of an anonymous parameter.
    fn anonymous_parameter(&self) -> &'static str {
        "?"
    }

    fn supports_cursors(&self) -> bool {
        false
    }

    /// Output parameters may be bound without a declared type.
    fn ignores_output_types(&self) -> bool {
        false
    }

    /// Marshal a value before it is bound to a parameter.
    fn set_value(&self, value: Value) -> Result<Value> {
        Ok(value)
    }

    /// Marshal a cursor handle before it is bound to a parameter.
    fn set_cursor(&self, value: Value) -> Result<Value> {
        Ok(value)
    }

    /// Unmarshal a value read back from the database.
    fn get_value(&self, value: Value) -> Value {
        value
    }

    /// Keys are generated by named sequences rather than identity columns.
    fn is_sequence_based(&self) -> bool {
        false
    }

    /// Expression returning the last identity value generated by this session.
    fn identity_retrieval(&self) -> &'static str {
        "@@IDENTITY"
    }

    fn write_nextval(&self, out: &mut String, sequence: &str) {
        let _ = write!(out, "nextval('{sequence}')");
    }

    fn write_currval(&self, out: &mut String, sequence: &str) {
        let _ = write!(out, "currval('{sequence}')");
    }

    /// Appended to a `SELECT` that reads no table, for dialects that require a `FROM`.
    fn from_no_table(&self) -> &'static str {
        ""
    }

    /// Turn a sequence of statements into something executable in one round trip.
    fn wrap_command_block(&self, sql: String) -> String {
        sql
    }

    /// The command must run inside a transaction (for example to dereference cursors).
    fn requires_wrapping_transaction(&self, _command: &Command) -> bool {
        false
    }

    fn write_select(
        &self,
        out: &mut String,
        columns: &str,
        from: &TableRef,
        condition: &str,
        order_by: &str,
        limit: Option<u32>,
    ) {
        out.push_str("SELECT ");
        out.push_str(if columns.is_empty() { "*" } else { columns });
        out.push_str("\nFROM ");
        self.write_table_ref(out, from);
        if !condition.is_empty() {
            out.push_str("\nWHERE ");
            out.push_str(condition);
        }
        if !order_by.is_empty() {
            out.push_str("\nORDER BY ");
            out.push_str(order_by);
        }
        if let Some(limit) = limit {
            let _ = write!(out, "\nLIMIT {}", limit);
        }
        out.push(';');
    }

    /// `values` are SQL expressions: parameter names, `NULL` or `nextval(..)`.
    fn write_insert(&self, out: &mut String, table: &TableRef, values: &[(String, String)]) {
        out.push_str("INSERT INTO ");
        self.write_table_ref(out, table);
        out.push_str(" (");
        separated_by(out, values, |out, (name, _)| out.push_str(name), ", ");
        out.push_str(") VALUES (");
        separated_by(out, values, |out, (_, value)| out.push_str(value), ", ");
        out.push_str(");");
    }

    fn write_update(
        &self,
        out: &mut String,
        table: &TableRef,
        assignments: &[(String, String)],
        condition: &str,
    ) {
        out.push_str("UPDATE ");
        self.write_table_ref(out, table);
        out.push_str("\nSET ");
        separated_by(
            out,
            assignments,
            |out, (name, value)| {
                let _ = write!(out, "{name} = {value}");
            },
            ", ",
        );
        out.push_str("\nWHERE ");
        out.push_str(condition);
        out.push(';');
    }

    fn write_delete(&self, out: &mut String, table: &TableRef, condition: &str) {
        out.push_str("DELETE FROM ");
        self.write_table_ref(out, table);
        out.push_str("\nWHERE ");
        out.push_str(condition);
        out.push(';');
    }

    fn write_aggregate(
        &self,
        out: &mut String,
        function: &str,
        columns: &str,
        from: &TableRef,
        condition: &str,
    ) {
        let expression = format!(
            "{}({})",
            function.to_ascii_uppercase(),
            if columns.is_empty() { "*" } else { columns }
        );
        self.write_select(out, &expression, from, condition, "", None);
    }

    fn write_paging(
        &self,
        columns: &str,
        from: &TableRef,
        condition: &str,
        order_by: &str,
        limit: u64,
        offset: u64,
    ) -> PagingQueries {
        let mut count = String::new();
        self.write_aggregate(&mut count, "COUNT", "*", from, condition);
        let mut page = String::new();
        self.write_select(&mut page, columns, from, condition, order_by, None);
        page.pop();
        let _ = write!(page, "\nLIMIT {limit} OFFSET {offset};");
        PagingQueries { count, page }
    }

    /// Command returning one row per column of `table`, in ordinal order.
    fn write_table_metadata_query(&self, table: &TableRef) -> Command {
        let mut command = Command::new(String::new());
        command.sql.push_str("SELECT * FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = ");
        let name = self.prefix_parameter_name("0");
        command.sql.push_str(&name);
        command.parameters.push(Parameter {
            name,
            value: Value::Varchar(Some(table.name.clone())),
            direction: Direction::Input,
        });
        if !table.schema.is_empty() {
            command.sql.push_str(" AND TABLE_SCHEMA = ");
            let name = self.prefix_parameter_name("1");
            command.sql.push_str(&name);
            command.parameters.push(Parameter {
                name,
                value: Value::Varchar(Some(table.schema.clone())),
                direction: Direction::Input,
            });
        }
        command.sql.push_str(" ORDER BY ORDINAL_POSITION;");
        command
    }

    /// Interpret one row returned by the metadata query.
    fn column_descriptor(&self, row: &RowLabeled) -> Result<ColumnDescriptor> {
        let text = |label: &str| -> Result<Option<String>> {
            match row.get_column_ignore_case(label).cloned() {
                None => Ok(None),
                Some(value) => Option::<String>::try_from_value(value)
                    .with_context(|| format!("Column `{label}` of the metadata query")),
            }
        };
        let name = text("COLUMN_NAME")?.context("The metadata query returned no COLUMN_NAME")?;
        let data_type = text("DATA_TYPE")?.unwrap_or_default();
        let nullable = text("IS_NULLABLE")?.is_none_or(|v| v.eq_ignore_ascii_case("YES"));
        Ok(ColumnDescriptor {
            value: value_for_sql_type(&data_type),
            name,
            default: text("COLUMN_DEFAULT")?,
            data_type,
            nullable,
            primary_key: false,
        })
    }

    /// Value a column takes when an insert does not mention it.
    fn column_default(&self, column: &ColumnDescriptor) -> Value {
        let Some(default) = column.default.as_deref() else {
            return column.value.clone();
        };
        let mut default = default.trim();
        while default.starts_with('(') && default.ends_with(')') && default.len() >= 2 {
            default = default[1..default.len() - 1].trim();
        }
        let upper = default.to_ascii_uppercase();
        let now = OffsetDateTime::now_utc();
        let literal = match upper.as_str() {
            "NULL" => return column.value.clone(),
            "CURRENT_TIMESTAMP" | "NOW()" | "GETDATE()" | "SYSDATE" => {
                Value::Timestamp(Some(time::PrimitiveDateTime::new(now.date(), now.time())))
            }
            "CURRENT_DATE" => Value::Date(Some(now.date())),
            "CURRENT_TIME" => Value::Time(Some(now.time())),
            "TRUE" => Value::Boolean(Some(true)),
            "FALSE" => Value::Boolean(Some(false)),
            _ if default.len() >= 2 && default.starts_with('\'') && default.ends_with('\'') => {
                Value::Varchar(Some(default[1..default.len() - 1].replace("''", "'")))
            }
            _ => Value::Varchar(Some(default.to_string())),
        };
        convert_value(literal, &column.value).unwrap_or_else(|_| column.value.clone())
    }

    fn write_transaction_begin(&self, out: &mut String) {
        out.push_str("BEGIN;");
    }

    fn write_transaction_commit(&self, out: &mut String) {
        out.push_str("COMMIT;");
    }

    fn write_transaction_rollback(&self, out: &mut String) {
        out.push_str("ROLLBACK;");
    }
}

/// Dialect with every default, talking ANSI-ish SQL and `@name` parameters.
#[derive(Default, Debug, Clone, Copy)]
pub struct GenericDialect;

impl GenericDialect {
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for GenericDialect {
    fn as_dyn(&self) -> &dyn Dialect {
        self
    }
}
