#![allow(dead_code)]
use async_stream::try_stream;
use depot_core::{
    Command, Connection, Dialect, Driver, Error, Executor, QueryResult, Result, RowLabeled,
    RowsAffected, Transaction, Value, impl_executor_transaction, stream::Stream,
};
use std::{
    borrow::Cow,
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub type Responder = Box<dyn FnMut(&Command) -> Result<Vec<QueryResult>> + Send>;

/// Generic dialect with switchable capabilities.
#[derive(Default, Debug, Clone, Copy)]
pub struct FakeDialect {
    pub sequences: bool,
    pub wrapping: bool,
}

impl Dialect for FakeDialect {
    fn as_dyn(&self) -> &dyn Dialect {
        self
    }
    fn is_sequence_based(&self) -> bool {
        self.sequences
    }
    fn requires_wrapping_transaction(&self, _command: &Command) -> bool {
        self.wrapping
    }
}

#[derive(Default, Debug)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub open: AtomicUsize,
    pub commands: AtomicUsize,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl Counters {
    pub fn get(value: &AtomicUsize) -> usize {
        value.load(Ordering::SeqCst)
    }
}

struct State {
    responder: Mutex<Responder>,
    log: Mutex<Vec<Command>>,
    counters: Counters,
}

impl State {
    fn respond(&self, command: &Command) -> Result<Vec<QueryResult>> {
        self.counters.commands.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.log.lock() {
            log.push(command.clone());
        }
        let mut responder = self
            .responder
            .lock()
            .map_err(|_| Error::msg("Responder poisoned"))?;
        (*responder)(command)
    }
}

/// Driver answering every command through a scripted responder.
#[derive(Clone)]
pub struct FakeDriver {
    dialect: FakeDialect,
    delay: Duration,
    state: Arc<State>,
}

impl FakeDriver {
    pub fn new(
        responder: impl FnMut(&Command) -> Result<Vec<QueryResult>> + Send + 'static,
    ) -> Self {
        Self {
            dialect: FakeDialect::default(),
            delay: Duration::ZERO,
            state: Arc::new(State {
                responder: Mutex::new(Box::new(responder)),
                log: Default::default(),
                counters: Default::default(),
            }),
        }
    }

    pub fn with_dialect(mut self, dialect: FakeDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Every command waits `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn counters(&self) -> &Counters {
        &self.state.counters
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.log.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn sql(&self) -> Vec<String> {
        self.commands().into_iter().map(|v| v.sql).collect()
    }
}

impl Driver for FakeDriver {
    type Connection = FakeConnection;
    type Dialect = FakeDialect;
    type Transaction<'c> = FakeTransaction<'c>;

    const NAME: &'static str = "fake";

    fn dialect(&self) -> &Self::Dialect {
        &self.dialect
    }

    fn connect(
        &self,
        _url: Cow<'static, str>,
    ) -> impl Future<Output = Result<Self::Connection>> + Send {
        let driver = self.clone();
        async move {
            driver.counters().connects.fetch_add(1, Ordering::SeqCst);
            driver.counters().open.fetch_add(1, Ordering::SeqCst);
            Ok(FakeConnection { driver })
        }
    }
}

pub struct FakeConnection {
    driver: FakeDriver,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.driver.counters().open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Executor for FakeConnection {
    type Driver = FakeDriver;

    fn driver(&self) -> &Self::Driver {
        &self.driver
    }

    fn run(&mut self, command: Command) -> impl Stream<Item = Result<QueryResult>> + Send {
        let state = self.driver.state.clone();
        let delay = self.driver.delay;
        try_stream! {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            for result in state.respond(&command)? {
                yield result;
            }
        }
    }
}

impl Connection for FakeConnection {
    async fn connect(_url: Cow<'static, str>) -> Result<FakeConnection> {
        Err(Error::msg("Fake connections are opened through FakeDriver::connect"))
    }

    #[allow(refining_impl_trait)]
    async fn begin(&mut self) -> Result<FakeTransaction<'_>> {
        self.driver.counters().begins.fetch_add(1, Ordering::SeqCst);
        Ok(FakeTransaction { connection: self })
    }
}

pub struct FakeTransaction<'c> {
    connection: &'c mut FakeConnection,
}

impl_executor_transaction!(FakeDriver, FakeTransaction<'c>, connection);

impl<'c> Transaction<'c> for FakeTransaction<'c> {
    async fn commit(self) -> Result<()> {
        self.connection
            .driver
            .counters()
            .commits
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.connection
            .driver
            .counters()
            .rollbacks
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One result set, every row sharing the same labels.
pub fn rows(labels: &[&str], rows: Vec<Vec<Value>>) -> Vec<QueryResult> {
    let labels: Arc<[String]> = labels.iter().map(|v| v.to_string()).collect();
    [QueryResult::ResultSet(labels.clone())]
        .into_iter()
        .chain(
            rows.into_iter()
                .map(|values| QueryResult::Row(RowLabeled::new(labels.clone(), values.into()))),
        )
        .collect()
}

pub fn affected(rows_affected: u64) -> Vec<QueryResult> {
    vec![QueryResult::Affected(RowsAffected {
        rows_affected,
        last_affected_id: None,
    })]
}

pub fn scalar(value: impl Into<Value>) -> Vec<QueryResult> {
    rows(&["value"], vec![vec![value.into()]])
}

/// INFORMATION_SCHEMA rows for `products (id, name, qty, price)`.
pub fn products_schema() -> Vec<QueryResult> {
    let column = |name: &str, data_type: &str, nullable: &str, default: Value| {
        vec![
            Value::from(name),
            Value::from(data_type),
            Value::from(nullable),
            default,
        ]
    };
    rows(
        &["COLUMN_NAME", "DATA_TYPE", "IS_NULLABLE", "COLUMN_DEFAULT"],
        vec![
            column("id", "INTEGER", "NO", Value::Varchar(None)),
            column("name", "VARCHAR(100)", "NO", Value::from("'unnamed'")),
            column("qty", "INTEGER", "YES", Value::from("((0))")),
            column("price", "DECIMAL(10, 2)", "YES", Value::Varchar(None)),
        ],
    )
}

pub fn is_schema_query(command: &Command) -> bool {
    command.sql.contains("INFORMATION_SCHEMA.COLUMNS")
}
