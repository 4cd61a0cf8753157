use crate::{NameValue, Result, Value};
use std::{borrow::Cow, collections::HashMap};

/// Accessors of one field of a [`Shape`].
pub struct FieldDef<T> {
    /// Rust field name.
    pub field: &'static str,
    /// Column the field maps to.
    pub column: &'static str,
    /// The field accepts NULL (it is an `Option`).
    pub nullable: bool,
    pub get: fn(&T) -> Value,
    pub set: fn(&mut T, Value) -> Result<()>,
}

/// A statically shaped record: a struct with a fixed set of typed fields.
///
/// Implemented through `#[derive(Shape)]`, which also implements
/// [`Item`](crate::Item) and [`FromRow`](crate::FromRow) for the type.
pub trait Shape: Default + Send + Sync + Sized + 'static {
    fn fields() -> &'static [FieldDef<Self>];
    /// Name→field map, built once per type.
    fn index() -> &'static ShapeIndex;
}

/// Column name to field position lookup of a [`Shape`].
#[derive(Debug, Default)]
pub struct ShapeIndex {
    exact: HashMap<&'static str, usize>,
    folded: HashMap<String, usize>,
}

impl ShapeIndex {
    pub fn new<T>(fields: &[FieldDef<T>]) -> Self {
        let mut result = Self::default();
        for (i, field) in fields.iter().enumerate() {
            result.exact.entry(field.column).or_insert(i);
            result
                .folded
                .entry(field.column.to_ascii_lowercase())
                .or_insert(i);
        }
        result
    }

    pub fn lookup(&self, name: &str, case_sensitive: bool) -> Option<usize> {
        if let Some(i) = self.exact.get(name) {
            return Some(*i);
        }
        if case_sensitive {
            return None;
        }
        self.folded.get(&name.to_ascii_lowercase()).copied()
    }
}

/// Field values of a shaped item, named by column.
pub fn shape_name_values<T: Shape>(item: &T) -> Vec<NameValue<'static>> {
    T::fields()
        .iter()
        .map(|field| NameValue {
            name: Some(Cow::Borrowed(field.column)),
            value: (field.get)(item),
        })
        .collect()
}

/// Write a generated key into the field mapped to `name`, if the shape has one.
pub fn shape_write_key<T: Shape>(item: &mut T, name: &str, value: Value) -> Result<bool> {
    let Some(i) = T::index().lookup(name, false) else {
        return Ok(false);
    };
    let field = &T::fields()[i];
    (field.set)(item, value)?;
    Ok(true)
}
