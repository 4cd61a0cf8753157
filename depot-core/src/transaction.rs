use crate::{Executor, Result};
use std::future::Future;

/// A transaction borrowing its connection for `'c`.
///
/// Dropping it without calling either method leaves the outcome to the backend,
/// which for every supported driver means rolling back.
pub trait Transaction<'c>: Executor {
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}
