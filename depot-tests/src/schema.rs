use crate::{mapper, recreate};
use depot::{Driver, SchemaCacheState, Value, record};
use indoc::indoc;
use rust_decimal::Decimal;
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn schema<D: Driver>(driver: D, url: &str) {
    let _lock = MUTEX.lock().await;
    let catalog = mapper(driver, url, "catalog", "id");

    // Setup
    recreate(
        &catalog,
        "catalog",
        indoc! {"
            CREATE TABLE catalog (
                id INTEGER PRIMARY KEY,
                name VARCHAR(100) NOT NULL DEFAULT 'unnamed',
                qty INTEGER DEFAULT 0,
                price DECIMAL(10, 2)
            );
        "},
    )
    .await;
    let schema = catalog
        .table_def()
        .expect("The catalog mapper has a table")
        .schema();
    assert_eq!(schema.state(), SchemaCacheState::Unloaded);

    // Loaded once, then served from the cache
    let columns = catalog
        .columns()
        .await
        .expect("Failed to load the columns of the catalog");
    assert_eq!(schema.state(), SchemaCacheState::Loaded);
    assert_eq!(
        columns.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
        ["id", "name", "qty", "price"]
    );
    assert!(columns[0].primary_key);
    let again = catalog.columns().await.expect("Failed to read the cached columns");
    assert!(std::sync::Arc::ptr_eq(&columns, &again));

    let name = catalog
        .column_info("NAME")
        .await
        .expect("Failed to describe the name column");
    assert_eq!(name.name, "name");
    assert!(!name.nullable);
    assert!(catalog.column_info("missing").await.is_err());

    // Defaults are typed by the declared column type
    assert_eq!(
        catalog.column_default("name").await.unwrap(),
        Value::Varchar(Some("unnamed".into()))
    );
    assert_eq!(
        catalog.column_default("qty").await.unwrap(),
        Value::Int64(Some(0))
    );
    assert_eq!(
        catalog.column_default("price").await.unwrap(),
        Value::Decimal(None)
    );

    // Given values are kept as they are, unknown names are dropped
    let item = catalog
        .new_from(&record! { QTY: 5, ghost: 1 }, true)
        .await
        .expect("Failed to build a new catalog item");
    assert_eq!(item.len(), 4);
    assert_eq!(item.get("id"), Some(&Value::Int64(None)));
    assert_eq!(item.get_as::<String>("name").unwrap(), "unnamed");
    assert_eq!(item.get("qty"), Some(&Value::Int32(Some(5))));
    assert_eq!(item.get("price"), Some(&Value::Decimal(None)));
    assert!(!item.contains("ghost"));
    let item = catalog
        .new_from(&record! { price: Decimal::new(99, 1) }, false)
        .await
        .expect("Failed to build a partial catalog item");
    assert_eq!(item.len(), 1);
    assert_eq!(item.get_as::<Decimal>("price").unwrap(), Decimal::new(99, 1));
}
