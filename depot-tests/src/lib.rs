//! Integration suite shared by the drivers. The DDL it runs is plain SQL
//! accepted by SQLite, tables are dropped and recreated by each group.
mod compound;
mod products;
mod reads;
mod schema;
mod shapes;
mod transactions;
mod validation;

use compound::compound_keys;
use depot::{DataMapper, Dialect, Driver};
use log::LevelFilter;
use products::products;
use reads::reads;
use schema::schema;
use shapes::shapes;
use std::env;
use transactions::transactions;
use validation::validation;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Run every group against the database at `url`.
pub async fn execute_tests<D: Driver + Clone>(driver: D, url: &str) {
    products(driver.clone(), url).await;
    shapes(driver.clone(), url).await;
    compound_keys(driver.clone(), url).await;
    schema(driver.clone(), url).await;
    reads(driver.clone(), url).await;
    transactions(driver.clone(), url).await;
    validation(driver, url).await;
}

/// Builder of a mapper for `table`, keyed on `primary_key`.
pub(crate) fn mapper<D: Driver>(driver: D, url: &str, table: &str, primary_key: &str) -> DataMapper<D> {
    DataMapper::builder(driver)
        .url(url.to_string())
        .table(table)
        .primary_key(primary_key)
        .build()
        .unwrap_or_else(|e| panic!("Could not build the mapper of `{}`: {:#}", table, e))
}

/// Placeholder of parameter `name` in the dialect of `mapper`.
pub(crate) fn param<D: Driver>(mapper: &DataMapper<D>, name: &str) -> String {
    mapper.dialect().prefix_parameter_name(name)
}

/// Drop `table` if it exists and create it again with `ddl`.
pub(crate) async fn recreate<D: Driver>(mapper: &DataMapper<D>, table: &str, ddl: &str) {
    mapper
        .execute(format!("DROP TABLE IF EXISTS {};", table), &[])
        .await
        .unwrap_or_else(|e| panic!("Failed to drop table `{}`: {:#}", table, e));
    mapper
        .execute(ddl, &[])
        .await
        .unwrap_or_else(|e| panic!("Failed to create table `{}`: {:#}", table, e));
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}
