use crate::{
    Error, Result, Value, parse_date, parse_time, parse_timestamp, parse_timestamp_with_timezone,
};
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use std::any;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Conversion between native Rust types and the dynamically typed [`Value`].
///
/// This is the bridge used both ways: items turn their fields into values
/// through [`AsValue::as_value`] before binding, and the materializer turns
/// column values back into fields through [`AsValue::try_from_value`].
///
/// # Conversion rules
/// - The canonical variant for the type is always accepted.
/// - Numeric variants of other widths are accepted after a range check, floats
///   only when they carry no fractional part.
/// - `Value::Varchar` is parsed, since many drivers report numbers, dates and
///   UUIDs as text.
/// - Anything else is an error naming the value and the target type.
///
/// ```rust
/// use depot_core::{AsValue, Value};
/// let v = 42i32.as_value();
/// assert!(matches!(v, Value::Int32(Some(42))));
/// let n: i64 = AsValue::try_from_value(v).unwrap();
/// assert_eq!(n, 42);
/// ```
pub trait AsValue {
    /// Typed NULL for this type.
    fn as_empty_value() -> Value;
    fn as_value(self) -> Value;
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.into()))
    }
}

fn conversion_error<T>(value: &Value) -> Error {
    Error::msg(format!(
        "Cannot convert {:?} to {}",
        value,
        any::type_name::<T>()
    ))
}

macro_rules! impl_as_value_integer {
    ($source:ty, $destination:path) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                let converted = match &value {
                    Value::Int8(Some(v)) => <$source>::try_from(*v).ok(),
                    Value::Int16(Some(v)) => <$source>::try_from(*v).ok(),
                    Value::Int32(Some(v)) => <$source>::try_from(*v).ok(),
                    Value::Int64(Some(v)) => <$source>::try_from(*v).ok(),
                    Value::UInt8(Some(v)) => <$source>::try_from(*v).ok(),
                    Value::UInt16(Some(v)) => <$source>::try_from(*v).ok(),
                    Value::UInt32(Some(v)) => <$source>::try_from(*v).ok(),
                    Value::UInt64(Some(v)) => <$source>::try_from(*v).ok(),
                    Value::Boolean(Some(v)) => Some(*v as $source),
                    Value::Float32(Some(v)) => {
                        let v = *v as f64;
                        (v.fract() == 0.0 && v >= <$source>::MIN as f64 && v <= <$source>::MAX as f64)
                            .then(|| v as $source)
                    }
                    Value::Float64(Some(v)) => {
                        let v = *v;
                        (v.fract() == 0.0 && v >= <$source>::MIN as f64 && v <= <$source>::MAX as f64)
                            .then(|| v as $source)
                    }
                    Value::Decimal(Some(v)) if v.fract().is_zero() => v
                        .to_i128()
                        .and_then(|v| <$source>::try_from(v).ok()),
                    Value::Varchar(Some(v)) => v.trim().parse::<$source>().ok(),
                    _ => None,
                };
                converted.ok_or_else(|| conversion_error::<Self>(&value))
            }
        }
    };
}

impl_as_value_integer!(i8, Value::Int8);
impl_as_value_integer!(i16, Value::Int16);
impl_as_value_integer!(i32, Value::Int32);
impl_as_value_integer!(i64, Value::Int64);
impl_as_value_integer!(u8, Value::UInt8);
impl_as_value_integer!(u16, Value::UInt16);
impl_as_value_integer!(u32, Value::UInt32);
impl_as_value_integer!(u64, Value::UInt64);

macro_rules! impl_as_value_float {
    ($source:ty, $destination:path, $to_float:ident) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                let converted = match &value {
                    Value::Float32(Some(v)) => Some(*v as $source),
                    Value::Float64(Some(v)) => Some(*v as $source),
                    Value::Int8(Some(v)) => Some(*v as $source),
                    Value::Int16(Some(v)) => Some(*v as $source),
                    Value::Int32(Some(v)) => Some(*v as $source),
                    Value::Int64(Some(v)) => Some(*v as $source),
                    Value::UInt8(Some(v)) => Some(*v as $source),
                    Value::UInt16(Some(v)) => Some(*v as $source),
                    Value::UInt32(Some(v)) => Some(*v as $source),
                    Value::UInt64(Some(v)) => Some(*v as $source),
                    Value::Decimal(Some(v)) => v.$to_float(),
                    Value::Varchar(Some(v)) => v.trim().parse::<$source>().ok(),
                    _ => None,
                };
                converted.ok_or_else(|| conversion_error::<Self>(&value))
            }
        }
    };
}

impl_as_value_float!(f32, Value::Float32, to_f32);
impl_as_value_float!(f64, Value::Float64, to_f64);

impl AsValue for bool {
    fn as_empty_value() -> Value {
        Value::Boolean(None)
    }
    fn as_value(self) -> Value {
        Value::Boolean(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        let converted = match &value {
            Value::Boolean(Some(v)) => Some(*v),
            Value::Int8(Some(v)) => Some(*v != 0),
            Value::Int16(Some(v)) => Some(*v != 0),
            Value::Int32(Some(v)) => Some(*v != 0),
            Value::Int64(Some(v)) => Some(*v != 0),
            Value::UInt8(Some(v)) => Some(*v != 0),
            Value::UInt16(Some(v)) => Some(*v != 0),
            Value::UInt32(Some(v)) => Some(*v != 0),
            Value::UInt64(Some(v)) => Some(*v != 0),
            Value::Varchar(Some(v)) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Some(true),
                "false" | "f" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        converted.ok_or_else(|| conversion_error::<Self>(&value))
    }
}

impl AsValue for Decimal {
    fn as_empty_value() -> Value {
        Value::Decimal(None)
    }
    fn as_value(self) -> Value {
        Value::Decimal(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        let converted = match &value {
            Value::Decimal(Some(v)) => Some(*v),
            Value::Int8(Some(v)) => Some(Decimal::from(*v)),
            Value::Int16(Some(v)) => Some(Decimal::from(*v)),
            Value::Int32(Some(v)) => Some(Decimal::from(*v)),
            Value::Int64(Some(v)) => Some(Decimal::from(*v)),
            Value::UInt8(Some(v)) => Some(Decimal::from(*v)),
            Value::UInt16(Some(v)) => Some(Decimal::from(*v)),
            Value::UInt32(Some(v)) => Some(Decimal::from(*v)),
            Value::UInt64(Some(v)) => Some(Decimal::from(*v)),
            Value::Float32(Some(v)) => Decimal::from_f32(*v),
            Value::Float64(Some(v)) => Decimal::from_f64(*v),
            Value::Varchar(Some(v)) => v.trim().parse::<Decimal>().ok(),
            _ => None,
        };
        converted.ok_or_else(|| conversion_error::<Self>(&value))
    }
}

impl AsValue for String {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Varchar(Some(v)) | Value::Cursor(Some(v)) => Ok(v),
            _ => Err(conversion_error::<Self>(&value)),
        }
    }
}

impl AsValue for Box<[u8]> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(Some(v)) => Ok(v),
            _ => Err(conversion_error::<Self>(&value)),
        }
    }
}

impl AsValue for Vec<u8> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self.into_boxed_slice()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Box::<[u8]>::try_from_value(value).map(Into::into)
    }
}

impl AsValue for Date {
    fn as_empty_value() -> Value {
        Value::Date(None)
    }
    fn as_value(self) -> Value {
        Value::Date(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.date()),
            Value::Varchar(Some(ref v)) => parse_date(v),
            _ => Err(conversion_error::<Self>(&value)),
        }
    }
}

impl AsValue for Time {
    fn as_empty_value() -> Value {
        Value::Time(None)
    }
    fn as_value(self) -> Value {
        Value::Time(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Time(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) => parse_time(v),
            _ => Err(conversion_error::<Self>(&value)),
        }
    }
}

impl AsValue for PrimitiveDateTime {
    fn as_empty_value() -> Value {
        Value::Timestamp(None)
    }
    fn as_value(self) -> Value {
        Value::Timestamp(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(Some(v)) => Ok(v),
            Value::Date(Some(v)) => Ok(v.midnight()),
            Value::Varchar(Some(ref v)) => parse_timestamp(v),
            _ => Err(conversion_error::<Self>(&value)),
        }
    }
}

impl AsValue for OffsetDateTime {
    fn as_empty_value() -> Value {
        Value::TimestampWithTimezone(None)
    }
    fn as_value(self) -> Value {
        Value::TimestampWithTimezone(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::TimestampWithTimezone(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.assume_utc()),
            Value::Varchar(Some(ref v)) => parse_timestamp_with_timezone(v),
            _ => Err(conversion_error::<Self>(&value)),
        }
    }
}

impl AsValue for Uuid {
    fn as_empty_value() -> Value {
        Value::Uuid(None)
    }
    fn as_value(self) -> Value {
        Value::Uuid(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        let converted = match &value {
            Value::Uuid(Some(v)) => Some(*v),
            Value::Varchar(Some(v)) => Uuid::parse_str(v.trim()).ok(),
            Value::Blob(Some(v)) => Uuid::from_slice(v).ok(),
            _ => None,
        };
        converted.ok_or_else(|| conversion_error::<Self>(&value))
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::try_from_value(value).map(Some)
    }
}

/// Convert `value` into the type of `prototype`. NULLs become the typed NULL of
/// the prototype, an untyped prototype accepts anything.
pub fn convert_value(value: Value, prototype: &Value) -> Result<Value> {
    if value.is_null() {
        return Ok(prototype.as_null());
    }
    Ok(match prototype {
        Value::Null => value,
        Value::Boolean(..) => bool::try_from_value(value)?.as_value(),
        Value::Int8(..) => i8::try_from_value(value)?.as_value(),
        Value::Int16(..) => i16::try_from_value(value)?.as_value(),
        Value::Int32(..) => i32::try_from_value(value)?.as_value(),
        Value::Int64(..) => i64::try_from_value(value)?.as_value(),
        Value::UInt8(..) => u8::try_from_value(value)?.as_value(),
        Value::UInt16(..) => u16::try_from_value(value)?.as_value(),
        Value::UInt32(..) => u32::try_from_value(value)?.as_value(),
        Value::UInt64(..) => u64::try_from_value(value)?.as_value(),
        Value::Float32(..) => f32::try_from_value(value)?.as_value(),
        Value::Float64(..) => f64::try_from_value(value)?.as_value(),
        Value::Decimal(..) => Decimal::try_from_value(value)?.as_value(),
        Value::Varchar(..) => String::try_from_value(value)?.as_value(),
        Value::Blob(..) => Box::<[u8]>::try_from_value(value)?.as_value(),
        Value::Date(..) => Date::try_from_value(value)?.as_value(),
        Value::Time(..) => Time::try_from_value(value)?.as_value(),
        Value::Timestamp(..) => PrimitiveDateTime::try_from_value(value)?.as_value(),
        Value::TimestampWithTimezone(..) => OffsetDateTime::try_from_value(value)?.as_value(),
        Value::Uuid(..) => Uuid::try_from_value(value)?.as_value(),
        Value::Cursor(..) => Value::Cursor(Some(String::try_from_value(value)?)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_range_checked() {
        assert_eq!(i64::try_from_value(Value::Int32(Some(-7))).unwrap(), -7);
        assert_eq!(u8::try_from_value(Value::Int64(Some(255))).unwrap(), 255);
        assert!(u8::try_from_value(Value::Int64(Some(256))).is_err());
        assert!(u32::try_from_value(Value::Int8(Some(-1))).is_err());
        assert_eq!(i32::try_from_value(Value::Float64(Some(12.0))).unwrap(), 12);
        assert!(i32::try_from_value(Value::Float64(Some(12.5))).is_err());
        assert_eq!(
            i64::try_from_value(Value::Varchar(Some(" 42 ".into()))).unwrap(),
            42
        );
        assert!(i64::try_from_value(Value::Null).is_err());
    }

    #[test]
    fn options_carry_typed_nulls() {
        assert_eq!(Option::<i32>::None.as_value(), Value::Int32(None));
        assert_eq!(
            Option::<String>::try_from_value(Value::Null).unwrap(),
            None
        );
        assert_eq!(
            Option::<String>::try_from_value(Value::Varchar(None)).unwrap(),
            None
        );
        assert_eq!(
            Option::<i16>::try_from_value(Value::Int64(Some(3))).unwrap(),
            Some(3)
        );
    }

    #[test]
    fn text_is_parsed_into_temporal_types() {
        let date = Date::try_from_value(Value::Varchar(Some("2024-02-29".into()))).unwrap();
        assert_eq!(date.to_string(), "2024-02-29");
        let ts =
            PrimitiveDateTime::try_from_value(Value::Varchar(Some("2024-02-29 10:11:12.5".into())))
                .unwrap();
        assert_eq!(ts.millisecond(), 500);
        assert!(Time::try_from_value(Value::Varchar(Some("25:00:00".into()))).is_err());
    }
}
