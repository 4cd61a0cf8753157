use crate::{SqliteConnection, SqliteDriver};
use depot_core::{Dialect, Driver, Executor, Result, Transaction, impl_executor_transaction};

/// Transaction borrowing a [`SqliteConnection`]. Dropping it without settling rolls it back.
pub struct SqliteTransaction<'c> {
    connection: &'c mut SqliteConnection,
    settled: bool,
}

impl<'c> SqliteTransaction<'c> {
    pub(crate) async fn new(connection: &'c mut SqliteConnection) -> Result<Self> {
        let mut sql = String::new();
        connection
            .driver()
            .dialect()
            .write_transaction_begin(&mut sql);
        connection.execute(sql.into()).await?;
        Ok(Self {
            connection,
            settled: false,
        })
    }
}

impl_executor_transaction!(SqliteDriver, SqliteTransaction<'c>, connection);

impl<'c> Transaction<'c> for SqliteTransaction<'c> {
    async fn commit(mut self) -> Result<()> {
        let mut sql = String::new();
        self.driver().dialect().write_transaction_commit(&mut sql);
        self.connection.execute(sql.into()).await?;
        self.settled = true;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        let mut sql = String::new();
        self.driver().dialect().write_transaction_rollback(&mut sql);
        self.connection.execute(sql.into()).await?;
        self.settled = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.connection.rollback_open_transaction();
        }
    }
}
