use crate::{
    Dialect, Driver, Error, Executor, MappingError, Result, RowLabeled, TableRef, Value,
    stream::TryStreamExt,
};
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU8, Ordering},
};
use tokio::sync::Mutex;

/// Metadata of one column as reported by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Name with the database casing.
    pub name: String,
    /// Raw default expression, `None` when the column has no default.
    pub default: Option<String>,
    /// Declared type as reported.
    pub data_type: String,
    /// Typed NULL derived from `data_type`.
    pub value: Value,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Case-insensitive column lookup.
pub fn find_column<'c>(columns: &'c [ColumnDescriptor], name: &str) -> Option<&'c ColumnDescriptor> {
    columns.iter().find(|v| v.name.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaCacheState {
    Unloaded,
    Loading,
    Loaded,
}

const UNLOADED: u8 = 0;
const LOADING: u8 = 1;
const LOADED: u8 = 2;

/// Lazily loaded column set of a table handle.
///
/// The set is loaded at most once and never replaced. Tasks racing the first
/// load wait on the handle's lock and then observe the winner's set. A failed
/// or cancelled load leaves the cache unloaded, the next call retries.
#[derive(Debug, Default)]
pub struct SchemaCache {
    state: AtomicU8,
    lock: Mutex<()>,
    columns: OnceLock<Arc<[ColumnDescriptor]>>,
}

/// Settles the state on every exit path of a load, including the future being dropped.
struct LoadGuard<'a> {
    state: &'a AtomicU8,
    loaded: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.state.store(
            if self.loaded { LOADED } else { UNLOADED },
            Ordering::Release,
        );
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchemaCacheState {
        match self.state.load(Ordering::Acquire) {
            LOADED => SchemaCacheState::Loaded,
            LOADING => SchemaCacheState::Loading,
            _ => SchemaCacheState::Unloaded,
        }
    }

    /// The column set, if already loaded.
    pub fn loaded(&self) -> Option<Arc<[ColumnDescriptor]>> {
        if self.state.load(Ordering::Acquire) != LOADED {
            return None;
        }
        self.columns.get().cloned()
    }

    /// The column set, loading it through `executor` on first use.
    pub async fn columns<E: Executor>(
        &self,
        table: &TableRef,
        executor: &mut E,
    ) -> Result<Arc<[ColumnDescriptor]>> {
        if let Some(columns) = self.loaded() {
            return Ok(columns);
        }
        let _lock = self.lock.lock().await;
        if let Some(columns) = self.loaded() {
            return Ok(columns);
        }
        let mut guard = LoadGuard {
            state: &self.state,
            loaded: false,
        };
        self.state.store(LOADING, Ordering::Release);
        match load(table, executor).await {
            Ok(columns) => {
                let columns = self.columns.get_or_init(|| columns).clone();
                guard.loaded = true;
                Ok(columns)
            }
            Err(error) => Err(MappingError::SchemaLoadFailure {
                table: table.full_name(),
            }
            .wrap(error)),
        }
    }
}

async fn load<E: Executor>(table: &TableRef, executor: &mut E) -> Result<Arc<[ColumnDescriptor]>> {
    let command = executor
        .driver()
        .dialect()
        .write_table_metadata_query(table);
    log::debug!("Loading the schema of `{}`: {}", table, command);
    let rows: Vec<RowLabeled> = executor.fetch(command).try_collect().await?;
    if rows.is_empty() {
        return Err(Error::msg(format!(
            "The database reported no columns for table `{}`",
            table
        )));
    }
    let dialect = executor.driver().dialect();
    rows.iter()
        .map(|row| dialect.column_descriptor(row))
        .collect::<Result<Vec<_>>>()
        .map(Into::into)
}
