use crate::{SqliteConnection, SqliteDialect, SqliteTransaction};
use depot_core::Driver;

pub(crate) static DRIVER: SqliteDriver = SqliteDriver::new();

#[derive(Default, Debug, Clone, Copy)]
pub struct SqliteDriver {
    dialect: SqliteDialect,
}

impl SqliteDriver {
    pub const fn new() -> Self {
        Self {
            dialect: SqliteDialect,
        }
    }
}

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;
    type Dialect = SqliteDialect;
    type Transaction<'c> = SqliteTransaction<'c>;

    const NAME: &'static str = "sqlite";

    fn dialect(&self) -> &SqliteDialect {
        &self.dialect
    }
}
