mod as_value;
pub mod binder;
mod cancel;
mod connection;
mod dialect;
mod driver;
mod error;
mod executor;
mod item;
mod mapper;
mod materialize;
mod query;
mod record;
mod resolver;
mod schema;
mod shape;
mod table;
mod transaction;
mod util;
mod validator;
mod value;

pub use ::anyhow::Context;
pub use as_value::*;
pub use binder::*;
pub use cancel::*;
pub use connection::*;
pub use dialect::*;
pub use driver::*;
pub use error::*;
pub use executor::*;
pub use item::*;
pub use mapper::*;
pub use materialize::*;
pub use query::*;
pub use record::*;
pub use resolver::*;
pub use schema::*;
pub use shape::*;
pub use table::*;
pub use transaction::*;
pub use util::*;
pub use validator::*;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
