use crate::{
    CBox, DRIVER, SqliteDriver, SqliteTransaction,
    bind::bind_all,
    error_message,
    extract::{extract_name, extract_value},
};
use async_stream::stream;
use depot_core::{
    Command, Connection, Context, Driver, Error, Executor, QueryResult, Result, Row, RowLabeled,
    RowNames, RowsAffected, stream::Stream, truncate_long,
};
use libsqlite3_sys::*;
use std::{
    borrow::Cow,
    ffi::{CString, c_int},
    ptr,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::{sync::mpsc, task::spawn_blocking};
use url::form_urlencoded;

// Not exported by the bundled libsqlite3-sys bindings, but present in the bundled library.
unsafe extern "C" {
    fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// Rows buffered between the worker thread and the consumer of a command.
const CHANNEL_CAPACITY: usize = 256;
const BUSY_TIMEOUT_MS: c_int = 5_000;

type Handle = Arc<Mutex<CBox<sqlite3>>>;

/// A connection to a SQLite database.
///
/// Commands run on a blocking worker holding the handle lock, so commands of
/// the same connection never interleave even when a stream is dropped early.
pub struct SqliteConnection {
    pub(crate) connection: Handle,
}

impl SqliteConnection {
    fn open_flags(query: &str) -> Result<c_int> {
        let mut flags = SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                "mode" => {
                    flags = match &*value {
                        "ro" => SQLITE_OPEN_READONLY,
                        "rw" => SQLITE_OPEN_READWRITE,
                        "rwc" => SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE,
                        "memory" => {
                            SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE | SQLITE_OPEN_MEMORY
                        }
                        _ => {
                            let error = Error::msg(format!(
                                "Unknown sqlite mode `{}`, expected one of: ro, rw, rwc, memory",
                                value
                            ));
                            log::error!("{:#}", error);
                            return Err(error);
                        }
                    }
                }
                _ => log::warn!("Ignoring unknown sqlite connection option `{}`", key),
            }
        }
        Ok(flags | SQLITE_OPEN_FULLMUTEX)
    }

    /// Roll back a transaction left open on this connection.
    pub(crate) fn rollback_open_transaction(&self) {
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        unsafe {
            if sqlite3_get_autocommit(**connection) != 0 {
                return;
            }
            log::warn!("A transaction was dropped without commit or rollback, rolling it back");
            let rc = sqlite3_exec(
                **connection,
                c"ROLLBACK;".as_ptr(),
                None,
                ptr::null_mut(),
                ptr::null_mut(),
            );
            if rc != SQLITE_OK {
                log::error!(
                    "Could not roll back the dropped transaction: {}",
                    error_message(**connection)
                );
            }
        }
    }
}

fn send(sender: &mpsc::Sender<Result<QueryResult>>, result: QueryResult) -> bool {
    sender.blocking_send(Ok(result)).is_ok()
}

/// Run every statement of `command`, sending results until the receiver goes away.
fn run_command(
    connection: &Mutex<CBox<sqlite3>>,
    command: Command,
    sender: &mpsc::Sender<Result<QueryResult>>,
) -> Result<()> {
    if command.procedure {
        return Err(Error::msg(format!(
            "SQLite has no stored procedures, cannot call `{}`",
            command.sql
        )));
    }
    if let Some(parameter) = command.parameters.iter().find(|v| !v.direction.is_input()) {
        return Err(Error::msg(format!(
            "SQLite supports only input parameters, `{}` is {:?}",
            parameter.name, parameter.direction
        )));
    }
    let names = command
        .parameters
        .iter()
        .map(|v| {
            CString::new(v.name.as_bytes())
                .with_context(|| format!("Invalid parameter name `{}`", v.name))
        })
        .collect::<Result<Vec<_>>>()?;
    let sql = CString::new(command.sql.as_bytes())
        .context("Could not create a CString from the query String")?;
    let context = || format!("While executing the query:\n{}", truncate_long!(command.sql));
    let connection = connection.lock().unwrap_or_else(PoisonError::into_inner);
    let db = **connection;
    unsafe {
        let mut tail = sql.as_ptr();
        while *tail != 0 {
            let mut statement = CBox::new(ptr::null_mut(), |p| unsafe {
                sqlite3_finalize(p);
            });
            let mut next = ptr::null();
            if sqlite3_prepare_v2(db, tail, -1, &mut *statement, &mut next) != SQLITE_OK {
                return Err(Error::msg(error_message(db)).context(context()));
            }
            tail = next;
            // Whitespace or a comment
            if statement.is_null() {
                continue;
            }
            bind_all(*statement, &command.parameters, &names)?;
            let count = sqlite3_column_count(*statement);
            let labels = (0..count)
                .map(|i| extract_name(*statement, i))
                .collect::<Result<RowNames>>()?;
            if count > 0 && !send(sender, QueryResult::ResultSet(labels.clone())) {
                return Ok(());
            }
            let changes = sqlite3_total_changes64(db);
            let rowid = sqlite3_last_insert_rowid(db);
            loop {
                match sqlite3_step(*statement) {
                    SQLITE_ROW => {
                        let values = (0..count)
                            .map(|i| extract_value(*statement, i))
                            .collect::<Result<Row>>()?;
                        if !send(sender, RowLabeled::new(labels.clone(), values).into()) {
                            return Ok(());
                        }
                    }
                    SQLITE_DONE => break,
                    _ => return Err(Error::msg(error_message(db)).context(context())),
                }
            }
            if count == 0 {
                let last_rowid = sqlite3_last_insert_rowid(db);
                let affected = RowsAffected {
                    rows_affected: (sqlite3_total_changes64(db) - changes).max(0) as u64,
                    last_affected_id: (last_rowid != rowid).then_some(last_rowid),
                };
                if !send(sender, affected.into()) {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

impl Executor for SqliteConnection {
    type Driver = SqliteDriver;

    fn driver(&self) -> &SqliteDriver {
        &DRIVER
    }

    fn run(&mut self, command: Command) -> impl Stream<Item = Result<QueryResult>> + Send {
        let connection = self.connection.clone();
        stream! {
            let (sender, mut receiver) = mpsc::channel(CHANNEL_CAPACITY);
            let worker = spawn_blocking(move || {
                if let Err(error) = run_command(&connection, command, &sender) {
                    log::error!("{:#}", error);
                    let _ = sender.blocking_send(Err(error));
                }
            });
            while let Some(result) = receiver.recv().await {
                yield result;
            }
            if let Err(error) = worker.await {
                let error = Error::new(error).context("The sqlite worker did not complete");
                log::error!("{:#}", error);
                yield Err(error);
            }
        }
    }
}

impl Connection for SqliteConnection {
    /// Open `sqlite://path` (`sqlite://:memory:` for a private in memory
    /// database). The `mode` option takes `ro`, `rw`, `rwc` (default) or `memory`.
    #[allow(refining_impl_trait)]
    async fn connect(url: Cow<'static, str>) -> Result<SqliteConnection> {
        let prefix = format!("{}://", SqliteDriver::NAME);
        let Some(rest) = url.strip_prefix(&prefix) else {
            let error = Error::msg(format!(
                "Expected sqlite connection url to start with `{}`",
                &prefix
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let flags = Self::open_flags(query)?;
        let context = format!("Error while opening the sqlite database `{}`", url);
        let path = urlencoding::decode(path).with_context(|| context.clone())?;
        let path = CString::new(path.as_bytes()).with_context(|| context.clone())?;
        let connection = spawn_blocking(move || unsafe {
            let mut connection = CBox::new(ptr::null_mut(), |p| unsafe {
                sqlite3_close_v2(p);
            });
            let rc = sqlite3_open_v2(path.as_ptr(), &mut *connection, flags, ptr::null());
            if rc != SQLITE_OK {
                let error = Error::msg(error_message(*connection)).context(context);
                log::error!("{:#}", error);
                return Err(error);
            }
            sqlite3_busy_timeout(*connection, BUSY_TIMEOUT_MS);
            Ok(connection)
        })
        .await??;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    #[allow(refining_impl_trait)]
    async fn begin(&mut self) -> Result<SqliteTransaction<'_>> {
        SqliteTransaction::new(self).await
    }
}
