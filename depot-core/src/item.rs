use crate::{Record, Result, Value};
use std::borrow::Cow;

/// One field of an item. Positional values have no name.
#[derive(Debug, Clone, PartialEq)]
pub struct NameValue<'a> {
    pub name: Option<Cow<'a, str>>,
    pub value: Value,
}

impl<'a> NameValue<'a> {
    pub fn named(name: impl Into<Cow<'a, str>>, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }
    pub fn positional(value: impl Into<Value>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }
}

/// Anything that can be handed to the resolver or the binder.
///
/// An item is a bag of name/value pairs. When the database generates a key on
/// insert, the resolver offers it back through [`Item::write_key`]; items that
/// cannot hold it answer `false` and the resolver returns a new [`Record`]
/// carrying the item's fields plus the key instead.
pub trait Item: Send + Sync {
    fn name_values(&self) -> Vec<NameValue<'_>>;

    fn write_key(&mut self, _name: &str, _value: Value) -> Result<bool> {
        Ok(false)
    }
}

impl Item for Record {
    fn name_values(&self) -> Vec<NameValue<'_>> {
        self.fields()
            .map(|(k, v)| NameValue::named(k.as_str(), v.clone()))
            .collect()
    }

    fn write_key(&mut self, name: &str, value: Value) -> Result<bool> {
        let name = self
            .names()
            .find(|v| v.eq_ignore_ascii_case(name))
            .unwrap_or(name)
            .to_string();
        self.set(name, value);
        Ok(true)
    }
}

/// A single positional value, typically a key.
impl Item for Value {
    fn name_values(&self) -> Vec<NameValue<'_>> {
        vec![NameValue::positional(self.clone())]
    }
}

/// Positional values, typically a compound key.
impl Item for Vec<Value> {
    fn name_values(&self) -> Vec<NameValue<'_>> {
        self.iter().cloned().map(NameValue::positional).collect()
    }
}

impl Item for [Value] {
    fn name_values(&self) -> Vec<NameValue<'_>> {
        self.iter().cloned().map(NameValue::positional).collect()
    }
}

impl<T: Item + ?Sized> Item for &T {
    fn name_values(&self) -> Vec<NameValue<'_>> {
        (**self).name_values()
    }
}

impl<T: Item + ?Sized> Item for Box<T> {
    fn name_values(&self) -> Vec<NameValue<'_>> {
        (**self).name_values()
    }
    fn write_key(&mut self, name: &str, value: Value) -> Result<bool> {
        (**self).write_key(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn records_accept_keys() {
        let mut item = record! { NAME: "Widget" };
        assert!(item.write_key("id", Value::Int64(Some(7))).unwrap());
        assert!(item.write_key("name", Value::Varchar(Some("Gadget".into()))).unwrap());
        assert_eq!(item.get("id"), Some(&Value::Int64(Some(7))));
        assert_eq!(item.get("NAME"), Some(&Value::Varchar(Some("Gadget".into()))));
        assert_eq!(item.len(), 2);
    }

    #[test]
    fn positional_values_are_immutable() {
        let mut key = Value::Int32(Some(1));
        assert!(!key.write_key("id", Value::Int64(Some(2))).unwrap());
        let values = vec![Value::Int32(Some(1)), Value::Varchar(Some("a".into()))];
        assert!(values.name_values().iter().all(|v| v.name.is_none()));
    }
}
