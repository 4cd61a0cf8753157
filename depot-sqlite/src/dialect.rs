use depot_core::{
    AsValue, ColumnDescriptor, Command, Context, Dialect, Direction, Parameter, Result, RowLabeled,
    TableRef, Value, value_for_sql_type,
};

/// SQL flavor of SQLite: `:name` parameters, rowid identities and `pragma_table_info` metadata.
#[derive(Default, Debug, Clone, Copy)]
pub struct SqliteDialect;

/// Typed NULL for a declared column type, falling back on SQLite type affinity.
pub fn sqlite_column_value(declared: &str) -> Value {
    match value_for_sql_type(declared) {
        Value::Int8(..) | Value::Int16(..) | Value::Int32(..) => return Value::Int64(None),
        Value::Float32(..) => return Value::Float64(None),
        Value::Null => {}
        v => return v,
    }
    let upper = declared.to_ascii_uppercase();
    if upper.contains("INT") {
        Value::Int64(None)
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|v| upper.contains(v)) {
        Value::Varchar(None)
    } else if upper.trim().is_empty() || upper.contains("BLOB") {
        Value::Null
    } else if ["REAL", "FLOA", "DOUB"].iter().any(|v| upper.contains(v)) {
        Value::Float64(None)
    } else {
        Value::Decimal(None)
    }
}

impl Dialect for SqliteDialect {
    fn as_dyn(&self) -> &dyn Dialect {
        self
    }

    fn parameter_prefix(&self) -> &'static str {
        ":"
    }

    fn identity_retrieval(&self) -> &'static str {
        "last_insert_rowid()"
    }

    fn write_table_metadata_query(&self, table: &TableRef) -> Command {
        let mut command = Command::new(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(",
        );
        let mut arguments = vec![table.name.clone()];
        if !table.schema.is_empty() {
            arguments.push(table.schema.clone());
        }
        for (i, argument) in arguments.into_iter().enumerate() {
            let name = self.prefix_parameter_name(&i.to_string());
            if i > 0 {
                command.sql.push_str(", ");
            }
            command.sql.push_str(&name);
            command.parameters.push(Parameter {
                name,
                value: Value::Varchar(Some(argument)),
                direction: Direction::Input,
            });
        }
        command.sql.push_str(") ORDER BY cid;");
        command
    }

    fn column_descriptor(&self, row: &RowLabeled) -> Result<ColumnDescriptor> {
        let column = |label: &str| row.get_column(label).cloned().unwrap_or_default();
        let name = String::try_from_value(column("name")).context("Column name of pragma_table_info")?;
        let data_type = Option::<String>::try_from_value(column("type"))?.unwrap_or_default();
        let not_null = Option::<i64>::try_from_value(column("notnull"))?.unwrap_or_default();
        let primary_key = Option::<i64>::try_from_value(column("pk"))?.unwrap_or_default();
        Ok(ColumnDescriptor {
            value: sqlite_column_value(&data_type),
            name,
            default: Option::<String>::try_from_value(column("dflt_value"))?,
            data_type,
            nullable: not_null == 0,
            primary_key: primary_key > 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn declared_types_follow_affinity() {
        assert_eq!(sqlite_column_value("INTEGER"), Value::Int64(None));
        assert_eq!(sqlite_column_value("UNSIGNED BIG INT"), Value::Int64(None));
        assert_eq!(sqlite_column_value("VARCHAR(100)"), Value::Varchar(None));
        assert_eq!(sqlite_column_value("NATIVE CHARACTER(70)"), Value::Varchar(None));
        assert_eq!(sqlite_column_value("DECIMAL(10, 2)"), Value::Decimal(None));
        assert_eq!(sqlite_column_value("DOUBLE"), Value::Float64(None));
        assert_eq!(sqlite_column_value("REAL"), Value::Float64(None));
        assert_eq!(sqlite_column_value("FLOATING POINT"), Value::Int64(None));
        assert_eq!(sqlite_column_value("DATETIME"), Value::Timestamp(None));
        assert_eq!(sqlite_column_value(""), Value::Null);
        assert_eq!(sqlite_column_value("WHATEVER"), Value::Decimal(None));
    }

    #[test]
    fn reads_table_info_rows() {
        let dialect = SqliteDialect;
        let command = dialect.write_table_metadata_query(&TableRef::parse("main.products"));
        assert_eq!(
            command.sql,
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(:0, :1) ORDER BY cid;"
        );
        assert_eq!(command.parameters[1].value, Value::Varchar(Some("main".into())));
        let labels: Arc<[String]> = ["cid", "name", "type", "notnull", "dflt_value", "pk"]
            .into_iter()
            .map(String::from)
            .collect();
        let row = RowLabeled::new(
            labels,
            [
                Value::Int64(Some(2)),
                Value::Varchar(Some("qty".into())),
                Value::Varchar(Some("INTEGER".into())),
                Value::Int64(Some(1)),
                Value::Varchar(Some("0".into())),
                Value::Int64(Some(0)),
            ]
            .into(),
        );
        let column = dialect.column_descriptor(&row).unwrap();
        assert_eq!(column.name, "qty");
        assert!(!column.nullable);
        assert!(!column.primary_key);
        assert_eq!(dialect.column_default(&column), Value::Int64(Some(0)));
    }
}
