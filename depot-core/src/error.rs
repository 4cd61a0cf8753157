use crate::{CrudAction, Error};
use std::fmt::{self, Display};

/// Failures raised by the mapping engine.
///
/// They travel inside [`anyhow::Error`] (directly, or as context around a
/// lower level cause) and can be recovered with `error.downcast_ref::<MappingError>()`.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Could not load the schema of table `{table}`")]
    SchemaLoadFailure { table: String },
    #[error("Item {index} for table `{table}`: {reason}")]
    KeyCoherenceViolation {
        table: String,
        index: usize,
        reason: KeyCoherence,
    },
    #[error(
        "Item {index} for table `{table}` has {given} positional values but only {declared} primary key fields are declared"
    )]
    TooManyKeyValues {
        table: String,
        index: usize,
        given: usize,
        declared: usize,
    },
    #[error(
        "Parameter `{parameter}` has direction {direction:?} but no declared type, the dialect cannot bind it"
    )]
    UnsupportedParameterDirectionWithoutType {
        parameter: String,
        direction: crate::Direction,
    },
    #[error("Parameter `{parameter}` is a cursor but the dialect does not support cursor parameters")]
    CursorUnsupported { parameter: String },
    #[error("Could not {action} item {index} of table `{table}`: {affected} rows were affected instead of 1")]
    AffectedRowCountMismatch {
        table: String,
        action: CrudAction,
        index: usize,
        affected: u64,
    },
    #[error("Cannot convert column `{column}` of row {row} into the target field")]
    MaterializationTypeMismatch { column: String, row: usize },
    #[error("Column `{column}` has no matching field in `{target}`")]
    UnmappedColumn { column: String, target: &'static str },
    #[error("Refusing to {action} on table `{table}` without a predicate")]
    MissingPredicate { table: String, action: CrudAction },
    #[error("Validation failed on table `{table}` while trying to {action}: {}", ItemErrors(.errors))]
    ValidationFailure {
        table: String,
        action: CrudAction,
        errors: Vec<ItemError>,
    },
    #[error("Table `{table}` has no primary key, cannot {action}")]
    NoPrimaryKey { table: String, action: CrudAction },
    #[error("No table name was given, cannot {operation}")]
    NoTableName { operation: String },
    #[error("Parameter `{parameter}` is anonymous but the dialect requires names")]
    AnonymousParametersUnsupported { parameter: usize },
    #[error("Item {index} for table `{table}` has no field to {action}")]
    NothingToWrite {
        table: String,
        action: CrudAction,
        index: usize,
    },
    #[error("The operation was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCoherence {
    SomeKeysMissing,
    SomeKeysDefault,
    /// A primary key field given more than once, under any spelling.
    DuplicateKeys,
}

impl Display for KeyCoherence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyCoherence::SomeKeysMissing => "all or no primary key fields must be present",
            KeyCoherence::SomeKeysDefault => "all or no primary key fields must be at default value",
            KeyCoherence::DuplicateKeys => "each primary key field must be given once",
        })
    }
}

/// One validation message, attributed to the item that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub index: usize,
    pub message: String,
}

struct ItemErrors<'a>(&'a [ItemError]);

impl Display for ItemErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "item {}: {}", error.index, error.message)?;
        }
        Ok(())
    }
}

impl MappingError {
    /// Wrap into an [`Error`], logging it.
    pub fn raise(self) -> Error {
        let error = Error::new(self);
        log::error!("{:#}", error);
        error
    }

    /// Attach as context to a lower level cause, logging the result.
    pub fn wrap(self, cause: Error) -> Error {
        let error = cause.context(self);
        log::error!("{:#}", error);
        error
    }
}

/// Find the [`MappingError`] carried by an error, if any.
pub fn mapping_error(error: &Error) -> Option<&MappingError> {
    error.downcast_ref::<MappingError>()
}
