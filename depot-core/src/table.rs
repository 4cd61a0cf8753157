use crate::{Dialect, Error, Result, SchemaCache, split_names};
use std::fmt::{self, Display};

/// Possibly schema qualified table name.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub schema: String,
}

impl TableRef {
    /// Parse `table` or `owner.table`.
    pub fn parse(value: &str) -> Self {
        match value.trim().rsplit_once('.') {
            Some((schema, name)) => Self {
                name: name.trim().to_string(),
                schema: schema.trim().to_string(),
            },
            None => Self {
                name: value.trim().to_string(),
                schema: String::new(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    pub fn full_name(&self) -> String {
        let mut result = String::new();
        if !self.schema.is_empty() {
            result.push_str(&self.schema);
            result.push('.');
        }
        result.push_str(&self.name);
        result
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Where the value of a single primary key comes from on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// The caller supplies key values, nothing is read back.
    Manual,
    /// The database generates the key, read back through this expression.
    Identity(String),
    /// The key is drawn from this sequence.
    Sequence(String),
}

impl KeySource {
    pub fn is_generated(&self) -> bool {
        !matches!(self, KeySource::Manual)
    }
}

/// A table handle: name, primary key, default projection, key source and the
/// lazily loaded schema.
#[derive(Debug)]
pub struct TableDef {
    pub table: TableRef,
    pub primary_keys: Box<[String]>,
    /// Default projection, `*` unless configured.
    pub columns: String,
    pub key_source: KeySource,
    schema: SchemaCache,
}

impl TableDef {
    /// `primary_key` is a comma separated list. `sequence` means, on identity
    /// based dialects, an override of the identity retrieval expression (empty
    /// disables generated keys) and on sequence based dialects the sequence name.
    pub fn new(
        dialect: &dyn Dialect,
        table: &str,
        primary_key: &str,
        columns: &str,
        sequence: Option<&str>,
    ) -> Result<Self> {
        let table = TableRef::parse(table);
        let primary_keys = split_names(primary_key);
        let columns = match columns.trim() {
            "" => "*".to_string(),
            v => v.to_string(),
        };
        let key_source = if dialect.is_sequence_based() {
            match sequence.map(str::trim) {
                None | Some("") => KeySource::Manual,
                Some(sequence) => {
                    if primary_keys.len() != 1 {
                        let error = Error::msg(format!(
                            "Table `{}` uses sequence `{}` but has {} primary key fields, a sequence requires exactly one",
                            table,
                            sequence,
                            primary_keys.len()
                        ));
                        log::error!("{:#}", error);
                        return Err(error);
                    }
                    KeySource::Sequence(sequence.to_string())
                }
            }
        } else if primary_keys.len() == 1 {
            match sequence.map(str::trim) {
                None => KeySource::Identity(dialect.identity_retrieval().to_string()),
                Some("") => KeySource::Manual,
                Some(expression) => KeySource::Identity(expression.to_string()),
            }
        } else {
            KeySource::Manual
        };
        Ok(Self {
            table,
            primary_keys,
            columns,
            key_source,
            schema: SchemaCache::new(),
        })
    }

    pub fn name(&self) -> String {
        self.table.full_name()
    }

    pub fn schema(&self) -> &SchemaCache {
        &self.schema
    }

    /// Case-insensitive primary key membership.
    pub fn is_key(&self, name: &str) -> bool {
        self.key_position(name).is_some()
    }

    pub fn key_position(&self, name: &str) -> Option<usize> {
        self.primary_keys
            .iter()
            .position(|v| v.eq_ignore_ascii_case(name))
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_keys.is_empty()
    }

    /// Primary key fields as a comma separated list, the default ordering.
    pub fn primary_key_list(&self) -> String {
        self.primary_keys.join(", ")
    }

    /// `k1 = @k1 AND k2 = @k2`.
    pub fn key_predicate(&self, dialect: &dyn Dialect) -> String {
        let mut out = String::new();
        crate::separated_by(
            &mut out,
            self.primary_keys.iter(),
            |out, key| {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(&dialect.prefix_parameter_name(key));
            },
            " AND ",
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenericDialect;

    struct Sequences;
    impl Dialect for Sequences {
        fn as_dyn(&self) -> &dyn Dialect {
            self
        }
        fn is_sequence_based(&self) -> bool {
            true
        }
    }

    #[test]
    fn parses_qualified_names() {
        let table = TableRef::parse(" sales.products ");
        assert_eq!(table.schema, "sales");
        assert_eq!(table.name, "products");
        assert_eq!(table.full_name(), "sales.products");
        assert_eq!(TableRef::parse("products").full_name(), "products");
    }

    #[test]
    fn resolves_key_sources() {
        let dialect = GenericDialect;
        let table = TableDef::new(&dialect, "products", "id", "", None).unwrap();
        assert_eq!(table.columns, "*");
        assert_eq!(table.key_source, KeySource::Identity("@@IDENTITY".into()));
        let table = TableDef::new(&dialect, "products", "id", "", Some("")).unwrap();
        assert_eq!(table.key_source, KeySource::Manual);
        let table = TableDef::new(&dialect, "products", "id", "", Some("SCOPE_IDENTITY()")).unwrap();
        assert_eq!(table.key_source, KeySource::Identity("SCOPE_IDENTITY()".into()));
        let table = TableDef::new(&dialect, "lines", "order_id, line", "", None).unwrap();
        assert_eq!(table.key_source, KeySource::Manual);
        assert_eq!(&*table.primary_keys, ["order_id", "line"]);

        let table = TableDef::new(&Sequences, "products", "id", "", None).unwrap();
        assert_eq!(table.key_source, KeySource::Manual);
        let table = TableDef::new(&Sequences, "products", "id", "", Some("products_seq")).unwrap();
        assert_eq!(table.key_source, KeySource::Sequence("products_seq".into()));
        assert!(TableDef::new(&Sequences, "lines", "a, b", "", Some("lines_seq")).is_err());
    }

    #[test]
    fn key_predicate_joins_keys() {
        let table = TableDef::new(&GenericDialect, "lines", "order_id,line", "", None).unwrap();
        assert_eq!(
            table.key_predicate(&GenericDialect),
            "order_id = @order_id AND line = @line"
        );
        assert!(table.is_key("ORDER_ID"));
        assert!(!table.is_key("qty"));
    }
}
