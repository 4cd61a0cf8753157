use crate::{mapper, param, recreate};
use depot::{
    Driver, MappingError, Record, Value, record,
    stream::{StreamExt, TryStreamExt},
};
use indoc::indoc;
use rust_decimal::Decimal;
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn products<D: Driver>(driver: D, url: &str) {
    let _lock = MUTEX.lock().await;
    let products = mapper(driver, url, "products", "id");

    // Setup
    recreate(
        &products,
        "products",
        indoc! {"
            CREATE TABLE products (
                id INTEGER PRIMARY KEY,
                name VARCHAR(100) NOT NULL DEFAULT 'unnamed',
                qty INTEGER DEFAULT 0,
                price DECIMAL(10, 2)
            );
        "},
    )
    .await;

    // Save inserts items without a key and writes the generated key back
    let mut items = [
        record! { name: "Widget", qty: 3, price: Decimal::new(1250, 2) },
        record! { name: "Gadget" },
    ];
    let processed = products
        .save(&mut items)
        .await
        .expect("Failed to save two new products");
    assert_eq!(processed, 2);
    assert_eq!(items[0].get_as::<i64>("id").unwrap(), 1);
    assert_eq!(items[1].get_as::<i64>("id").unwrap(), 2);

    let gadget: Record = products
        .single_by_key(&Value::from(2i64))
        .await
        .expect("Failed to read product 2")
        .expect("Product 2 was not found");
    assert_eq!(gadget.get_as::<String>("name").unwrap(), "Gadget");
    assert_eq!(gadget.get_as::<i32>("qty").unwrap(), 0);
    assert!(gadget.get("price").is_some_and(Value::is_null));

    // Save updates items with a key
    items[1].set("qty", 7);
    let processed = products
        .save(&mut items[1..])
        .await
        .expect("Failed to update product 2");
    assert_eq!(processed, 1);
    let qty = products
        .scalar(
            format!("SELECT qty FROM products WHERE id = {};", param(&products, "0")),
            &[2.into()],
        )
        .await
        .expect("Failed to read the quantity of product 2");
    assert_eq!(qty, Some(Value::Int64(Some(7))));

    // Insert reports the first generated key
    let outcome = products
        .insert(&mut [record! { name: "Doohickey" }, record! { name: "Gizmo" }])
        .await
        .expect("Failed to insert two products")
        .expect("The generated key was not reported");
    assert_eq!(outcome.key, 3);
    assert!(outcome.item.is_none());

    // NULL values are written as literals, not as defaults
    let mut nothing = record! { name: "Nothing", qty: Value::Int32(None) };
    products
        .insert_one(&mut nothing)
        .await
        .expect("Failed to insert a product with a NULL quantity");
    let nothing: Record = products
        .single_by_key(&nothing.get("id").cloned().unwrap_or_default())
        .await
        .expect("Failed to read the NULL product")
        .expect("The NULL product was not found");
    assert!(nothing.get("qty").is_some_and(Value::is_null));

    // Update and the affected rows check
    let updated = products
        .update(&[record! { id: 3i64, name: "Thingamajig" }])
        .await
        .expect("Failed to update product 3");
    assert_eq!(updated, 1);
    let error = products
        .update(&[record! { id: 99i64, name: "Ghost" }])
        .await
        .expect_err("Updating a missing row must fail");
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::AffectedRowCountMismatch { affected: 0, .. })
    ));

    // Predicate driven writes
    let updated = products
        .update_using(
            &record! { qty: 1 },
            &format!("qty = {}", param(&products, "0")),
            &[0.into()],
        )
        .await
        .expect("Failed to update the products out of stock");
    assert_eq!(updated, 2);
    let updated = products
        .update_from(&record! { price: Decimal::new(425, 2) }, &Value::from(4i64))
        .await
        .expect("Failed to update the price of product 4");
    assert_eq!(updated, 1);
    let error = products
        .delete_where("  ", &[])
        .await
        .expect_err("A delete without predicate must fail");
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::MissingPredicate { .. })
    ));
    let error = products
        .update_using(&record! { qty: 0 }, "WHERE", &[])
        .await
        .expect_err("An update without predicate must fail");
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::MissingPredicate { .. })
    ));
    assert_eq!(products.count("", &[]).await.unwrap(), 5);

    // Deletes
    let deleted = products
        .delete(&[record! { id: 1i64 }])
        .await
        .expect("Failed to delete product 1");
    assert_eq!(deleted, 1);
    let deleted = products
        .delete_by_key(&Value::from(2i64))
        .await
        .expect("Failed to delete product 2");
    assert_eq!(deleted, 1);
    let deleted = products
        .delete_where(
            &format!("name = {}", param(&products, "0")),
            &["Gizmo".into()],
        )
        .await
        .expect("Failed to delete the gizmos");
    assert_eq!(deleted, 1);
    let names: Vec<String> = products
        .query::<Record>("SELECT name FROM products ORDER BY id;", &[])
        .map(|v| v.and_then(|v| v.get_as::<String>("name")))
        .try_collect()
        .await
        .expect("Failed to list the remaining products");
    assert_eq!(names, ["Thingamajig", "Nothing"]);

    // Batches count every deleted item
    let mut batch = [
        record! { name: "Cog" },
        record! { name: "Lever" },
        record! { name: "Pulley" },
    ];
    products
        .insert(&mut batch)
        .await
        .expect("Failed to insert the batch");
    assert_eq!(products.count("", &[]).await.unwrap(), 5);
    let deleted = products
        .delete(&batch)
        .await
        .expect("Failed to delete the batch");
    assert_eq!(deleted, 3);
    assert_eq!(products.count("", &[]).await.unwrap(), 2);
}
