use crate::{AsValue, Error, Result, RowLabeled, Value};
use std::{borrow::Cow, slice, vec};

/// Dynamic name→value record, in insertion order.
///
/// Names are matched verbatim by [`Record::get`], rows read from the database
/// keep the column names exactly as the database returned them.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }
    pub fn len(&self) -> usize {
        self.fields.len()
    }
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
    pub fn get_ignore_case(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
    /// Typed read of a field.
    pub fn get_as<T: AsValue>(&self, name: &str) -> Result<T> {
        let value = self.get(name).cloned().ok_or_else(|| {
            Error::msg(format!("The record has no field named `{name}`"))
        })?;
        T::try_from_value(value)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
    /// Insert or replace, returning the previous value.
    pub fn set(&mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        if let Some((_, current)) = self.fields.iter_mut().find(|(k, _)| *k == *name) {
            return Some(std::mem::replace(current, value));
        }
        self.fields.push((name.into_owned(), value));
        None
    }
    /// Builder flavor of [`Record::set`].
    pub fn with(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let position = self.fields.iter().position(|(k, _)| k == name)?;
        Some(self.fields.remove(position).1)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }
    pub(crate) fn fields(&self) -> slice::Iter<'_, (String, Value)> {
        self.fields.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut result = Record::new();
        for (k, v) in iter {
            let k: String = k.into();
            result.set(k, v);
        }
        result
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = vec::IntoIter<(String, Value)>;
    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl From<RowLabeled> for Record {
    fn from(value: RowLabeled) -> Self {
        Self {
            fields: value
                .labels
                .iter()
                .cloned()
                .zip(value.values.into_vec())
                .collect(),
        }
    }
}

/// Build a [`Record`] from `name: value` pairs, or `"name" => value` for names
/// that are not identifiers.
///
/// ```rust
/// use depot_core::{Value, record};
/// let item = record! { name: "Widget", qty: 5 };
/// assert_eq!(item.get("qty"), Some(&Value::Int32(Some(5))));
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($name:ident : $value:expr),+ $(,)?) => {
        $crate::Record::new()$(.with(stringify!($name), $value))+
    };
    ($($name:literal => $value:expr),+ $(,)?) => {
        $crate::Record::new()$(.with($name, $value))+
    };
}
