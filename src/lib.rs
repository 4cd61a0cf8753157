//! Schema-driven data mapping: save, insert, update and delete loosely typed
//! [`Record`]s or `#[derive(Shape)]` structs, and read rows back into them.
//!
//! ```rust,no_run
//! use depot::{DataMapper, Driver, Record, Result, Select, record, stream::TryStreamExt};
//!
//! async fn restock<D: Driver>(driver: D) -> Result<Vec<Record>> {
//!     let products = DataMapper::builder(driver)
//!         .url("sqlite://products.sqlite")
//!         .table("products")
//!         .primary_key("id")
//!         .build()?;
//!     let mut items = [record! { name: "Widget", qty: 5 }];
//!     products.save(&mut items).await?;
//!     products.all(Select::new().condition("qty < 10")).try_collect().await
//! }
//! ```
pub use depot_core::*;
pub use depot_macros::Shape;
