//! Turns name/value sources into directional command parameters.
use crate::{Command, Dialect, Direction, Item, MappingError, Parameter, Record, Result, Value};

/// Restricts binding to a subset of the fields of a source.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFilter {
    #[default]
    All,
    /// Only primary key fields (for WHERE clauses).
    KeysOnly,
    /// Only fields that are not primary keys (for SET clauses).
    NoKeys,
}

impl KeyFilter {
    fn accepts(&self, is_key: bool) -> bool {
        match self {
            KeyFilter::All => true,
            KeyFilter::KeysOnly => is_key,
            KeyFilter::NoKeys => !is_key,
        }
    }
}

/// Append one parameter.
///
/// `None` names the parameter after its position in the command, an empty
/// name asks for an anonymous parameter.
pub fn bind_value(
    command: &mut Command,
    dialect: &dyn Dialect,
    name: Option<&str>,
    value: Value,
    direction: Direction,
) -> Result<()> {
    let name = match name {
        Some("") => {
            if !dialect.supports_anonymous_parameters() {
                return Err(MappingError::AnonymousParametersUnsupported {
                    parameter: command.parameters.len(),
                }
                .raise());
            }
            dialect.anonymous_parameter().to_string()
        }
        Some(name) => dialect.prefix_parameter_name(name),
        None => dialect.prefix_parameter_name(&command.parameters.len().to_string()),
    };
    let value = match value {
        Value::Null if !direction.is_input() && !dialect.ignores_output_types() => {
            return Err(MappingError::UnsupportedParameterDirectionWithoutType {
                parameter: name,
                direction,
            }
            .raise());
        }
        Value::Cursor(cursor) => {
            if !dialect.supports_cursors() {
                return Err(MappingError::CursorUnsupported { parameter: name }.raise());
            }
            dialect.set_cursor(Value::Cursor(cursor))?
        }
        value => dialect.set_value(value)?,
    };
    command.parameters.push(Parameter {
        name,
        value,
        direction,
    });
    Ok(())
}

/// Bind every field of `source` accepted by `filter`. Key membership is
/// decided by `keys`, compared case-insensitively.
pub fn bind(
    command: &mut Command,
    dialect: &dyn Dialect,
    source: &(impl Item + ?Sized),
    direction: Direction,
    filter: KeyFilter,
    keys: &[String],
) -> Result<()> {
    for field in source.name_values() {
        if filter != KeyFilter::All {
            let is_key = field
                .name
                .as_deref()
                .is_some_and(|name| keys.iter().any(|k| k.eq_ignore_ascii_case(name)));
            if !filter.accepts(is_key) {
                continue;
            }
        }
        bind_value(command, dialect, field.name.as_deref(), field.value, direction)?;
    }
    Ok(())
}

/// Bind positional input values named `0`, `1`, …
pub fn bind_positional(command: &mut Command, dialect: &dyn Dialect, values: &[Value]) -> Result<()> {
    for value in values {
        bind_value(command, dialect, None, value.clone(), Direction::Input)?;
    }
    Ok(())
}

/// Copy the final value of every non-input parameter into a [`Record`], under
/// its unprefixed name. Database NULLs become [`Value::Null`].
pub fn extract_results(dialect: &dyn Dialect, parameters: &[Parameter]) -> Record {
    parameters
        .iter()
        .filter(|v| !v.direction.is_input())
        .map(|v| {
            (
                dialect.deprefix_parameter_name(&v.name).to_string(),
                dialect.get_value(v.value.clone()).untyped_if_null(),
            )
        })
        .collect()
}

/// Named parameters of a command call, by direction.
#[derive(Default)]
pub struct Params<'a> {
    pub inputs: Option<&'a dyn Item>,
    pub outputs: Option<&'a dyn Item>,
    pub input_outputs: Option<&'a dyn Item>,
    pub return_value: Option<&'a dyn Item>,
}

impl<'a> Params<'a> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn inputs(mut self, item: &'a dyn Item) -> Self {
        self.inputs = Some(item);
        self
    }
    pub fn outputs(mut self, item: &'a dyn Item) -> Self {
        self.outputs = Some(item);
        self
    }
    pub fn input_outputs(mut self, item: &'a dyn Item) -> Self {
        self.input_outputs = Some(item);
        self
    }
    pub fn return_value(mut self, item: &'a dyn Item) -> Self {
        self.return_value = Some(item);
        self
    }

    /// Bind all the groups, inputs first.
    pub fn bind(&self, command: &mut Command, dialect: &dyn Dialect) -> Result<()> {
        let groups = [
            (self.inputs, Direction::Input),
            (self.outputs, Direction::Output),
            (self.input_outputs, Direction::InputOutput),
            (self.return_value, Direction::ReturnValue),
        ];
        for (item, direction) in groups {
            if let Some(item) = item {
                bind(command, dialect, item, direction, KeyFilter::All, &[])?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenericDialect, record};

    struct Permissive;
    impl Dialect for Permissive {
        fn as_dyn(&self) -> &dyn Dialect {
            self
        }
        fn parameter_prefix(&self) -> &'static str {
            ":"
        }
        fn supports_anonymous_parameters(&self) -> bool {
            true
        }
        fn supports_cursors(&self) -> bool {
            true
        }
        fn ignores_output_types(&self) -> bool {
            true
        }
    }

    #[test]
    fn names_parameters() {
        let mut command = Command::default();
        let dialect = GenericDialect;
        bind_positional(&mut command, &dialect, &[1.into(), "a".into()]).unwrap();
        bind_value(&mut command, &dialect, Some("qty"), 3.into(), Direction::Input).unwrap();
        let names: Vec<_> = command.parameters.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["@0", "@1", "@qty"]);
        let error = bind_value(&mut command, &dialect, Some(""), 3.into(), Direction::Input)
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<MappingError>(),
            Some(MappingError::AnonymousParametersUnsupported { parameter: 3 })
        ));
        bind_value(&mut command, &Permissive, Some(""), 3.into(), Direction::Input).unwrap();
        assert_eq!(command.parameters[3].name, "?");
    }

    #[test]
    fn untyped_nulls_need_an_input_direction() {
        let dialect = GenericDialect;
        let mut command = Command::default();
        bind_value(&mut command, &dialect, Some("a"), Value::Null, Direction::Input).unwrap();
        bind_value(&mut command, &dialect, Some("b"), Value::Int32(None), Direction::Output)
            .unwrap();
        assert_eq!(command.parameters[1].value, Value::Int32(None));
        let error = bind_value(&mut command, &dialect, Some("c"), Value::Null, Direction::Output)
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<MappingError>(),
            Some(MappingError::UnsupportedParameterDirectionWithoutType { .. })
        ));
        bind_value(&mut command, &Permissive, Some("c"), Value::Null, Direction::ReturnValue)
            .unwrap();
    }

    #[test]
    fn cursors_need_dialect_support() {
        let mut command = Command::default();
        let error = bind_value(
            &mut command,
            &GenericDialect,
            Some("cur"),
            Value::Cursor(None),
            Direction::Output,
        )
        .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<MappingError>(),
            Some(MappingError::CursorUnsupported { .. })
        ));
        bind_value(&mut command, &Permissive, Some("cur"), Value::Cursor(None), Direction::Output)
            .unwrap();
        assert_eq!(command.parameters[0].name, ":cur");
    }

    #[test]
    fn filters_keys() {
        let item = record! { ID: 5, name: "Widget", qty: 2 };
        let keys = ["id".to_string()];
        let mut command = Command::default();
        bind(&mut command, &GenericDialect, &item, Direction::Input, KeyFilter::NoKeys, &keys)
            .unwrap();
        bind(&mut command, &GenericDialect, &item, Direction::Input, KeyFilter::KeysOnly, &keys)
            .unwrap();
        let names: Vec<_> = command.parameters.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["@name", "@qty", "@ID"]);
    }

    #[test]
    fn extracts_non_input_values() {
        let parameters = [
            Parameter {
                name: "@a".into(),
                value: Value::Int32(Some(1)),
                direction: Direction::Input,
            },
            Parameter {
                name: "@total".into(),
                value: Value::Int64(Some(10)),
                direction: Direction::Output,
            },
            Parameter {
                name: "@note".into(),
                value: Value::Varchar(None),
                direction: Direction::InputOutput,
            },
        ];
        let result = extract_results(&GenericDialect, &parameters);
        assert_eq!(result, record! { total: 10i64, note: Value::Null });
    }
}
