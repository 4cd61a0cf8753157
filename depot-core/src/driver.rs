use crate::{Connection, Dialect, Result, Transaction};
use std::{borrow::Cow, future::Future};

/// Entry point of a backend: knows its dialect and how to open connections.
pub trait Driver: Send + Sync + Sized {
    type Connection: Connection<Driver = Self>;
    type Dialect: Dialect;
    type Transaction<'c>: Transaction<'c, Driver = Self>;

    const NAME: &'static str;

    fn dialect(&self) -> &Self::Dialect;

    fn connect(
        &self,
        url: Cow<'static, str>,
    ) -> impl Future<Output = Result<Self::Connection>> + Send {
        Self::Connection::connect(url)
    }
}
