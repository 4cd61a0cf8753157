use crate::error_message;
use depot_core::{
    Error, MappingError, Parameter, Result, Value, format_date, format_time,
    format_timestamp, format_timestamp_with_timezone,
};
use libsqlite3_sys::*;
use rust_decimal::prelude::ToPrimitive;
use std::{
    ffi::{CString, c_int},
    os::raw::{c_char, c_void},
};

unsafe fn bind_text(statement: *mut sqlite3_stmt, index: c_int, value: &str) -> c_int {
    unsafe {
        sqlite3_bind_text(
            statement,
            index,
            value.as_ptr() as *const c_char,
            value.len() as c_int,
            SQLITE_TRANSIENT(),
        )
    }
}

fn out_of_bounds(parameter: &Parameter) -> Error {
    let error = Error::msg(format!(
        "Cannot bind `{:?}` to parameter `{}`, it does not fit a SQLite integer",
        parameter.value, parameter.name
    ));
    log::error!("{:#}", error);
    error
}

/// Bind `parameter` at the 1-based `index` of the statement.
pub(crate) fn bind_value(
    statement: *mut sqlite3_stmt,
    index: c_int,
    parameter: &Parameter,
) -> Result<()> {
    unsafe {
        let rc = match &parameter.value {
            Value::Boolean(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::Int8(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::Int16(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::Int32(Some(v)) => sqlite3_bind_int(statement, index, *v),
            Value::Int64(Some(v)) => sqlite3_bind_int64(statement, index, *v),
            Value::UInt8(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::UInt16(Some(v)) => sqlite3_bind_int(statement, index, *v as c_int),
            Value::UInt32(Some(v)) => sqlite3_bind_int64(statement, index, *v as sqlite3_int64),
            Value::UInt64(Some(v)) => {
                let v = sqlite3_int64::try_from(*v).map_err(|_| out_of_bounds(parameter))?;
                sqlite3_bind_int64(statement, index, v)
            }
            Value::Float32(Some(v)) => sqlite3_bind_double(statement, index, *v as f64),
            Value::Float64(Some(v)) => sqlite3_bind_double(statement, index, *v),
            Value::Decimal(Some(v)) => sqlite3_bind_double(
                statement,
                index,
                v.to_f64().ok_or_else(|| {
                    Error::msg(format!("Cannot convert the Decimal value `{}` to f64", v))
                })?,
            ),
            Value::Varchar(Some(v)) => bind_text(statement, index, v),
            Value::Blob(Some(v)) => sqlite3_bind_blob(
                statement,
                index,
                v.as_ptr() as *const c_void,
                v.len() as c_int,
                SQLITE_TRANSIENT(),
            ),
            Value::Date(Some(v)) => bind_text(statement, index, &format_date(v)?),
            Value::Time(Some(v)) => bind_text(statement, index, &format_time(v)?),
            Value::Timestamp(Some(v)) => bind_text(statement, index, &format_timestamp(v)?),
            Value::TimestampWithTimezone(Some(v)) => {
                bind_text(statement, index, &format_timestamp_with_timezone(v)?)
            }
            Value::Uuid(Some(v)) => bind_text(statement, index, &v.to_string()),
            Value::Cursor(..) => {
                return Err(MappingError::CursorUnsupported {
                    parameter: parameter.name.clone(),
                }
                .raise());
            }
            _ => sqlite3_bind_null(statement, index),
        };
        if rc != SQLITE_OK {
            let error = Error::msg(error_message(sqlite3_db_handle(statement)))
                .context(format!("Cannot bind parameter `{}`", parameter.name));
            log::error!("{:#}", error);
            return Err(error);
        }
    }
    Ok(())
}

pub(crate) fn bind_all(
    statement: *mut sqlite3_stmt,
    parameters: &[Parameter],
    names: &[CString],
) -> Result<()> {
    for (parameter, name) in parameters.iter().zip(names) {
        let index = unsafe { sqlite3_bind_parameter_index(statement, name.as_ptr()) };
        // The parameter belongs to another statement of the same command.
        if index == 0 {
            continue;
        }
        bind_value(statement, index, parameter)?;
    }
    Ok(())
}
