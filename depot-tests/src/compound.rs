use crate::{mapper, recreate};
use depot::{
    Dispatched, Driver, KeyCoherence, MappingError, Record, Select, Value, Verb, record,
};
use indoc::indoc;
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn compound_keys<D: Driver>(driver: D, url: &str) {
    let _lock = MUTEX.lock().await;
    let lines = mapper(driver, url, "order_lines", "order_id, line");

    // Setup
    recreate(
        &lines,
        "order_lines",
        indoc! {"
            CREATE TABLE order_lines (
                order_id INTEGER NOT NULL,
                line INTEGER NOT NULL,
                product VARCHAR(60) NOT NULL,
                qty INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (order_id, line)
            );
        "},
    )
    .await;

    // Keys supplied by the caller are inserted as they are, nothing is read back
    let mut items = [
        record! { order_id: 1, line: 1, product: "Bolt" },
        record! { order_id: 1, line: 2, product: "Nut", qty: 4 },
        record! { order_id: 2, line: 1, product: "Washer" },
    ];
    let outcome = lines
        .insert(&mut items)
        .await
        .expect("Failed to insert the order lines");
    assert!(outcome.is_none());
    assert_eq!(lines.count("", &[]).await.unwrap(), 3);

    // With every key present save updates
    let processed = lines
        .save(&mut [record! { order_id: 1, line: 1, product: "Bolt", qty: 10 }])
        .await
        .expect("Failed to update line 1 of order 1");
    assert_eq!(processed, 1);

    // Last reverses every key of the ordering
    let last = lines
        .dispatch::<Record>(Verb::lookup("last"), Select::new())
        .await
        .expect("Failed to read the last order line");
    let Dispatched::One(Some(last)) = last else {
        panic!("Expected the last order line, got {:?}", last);
    };
    assert_eq!(last.get_as::<i32>("order_id").unwrap(), 2);
    assert_eq!(last.get_as::<i32>("line").unwrap(), 1);
    let last = lines
        .dispatch::<Record>(
            Verb::lookup("last"),
            Select::new().condition("order_id = 1").order_by("order_id, line"),
        )
        .await
        .expect("Failed to read the last line of order 1");
    assert!(matches!(&last, Dispatched::One(Some(v)) if v.get_as::<i32>("line").unwrap() == 2));

    // Keys must be all present and all set, or neither
    let error = lines
        .save(&mut [record! { order_id: 1, product: "Screw" }])
        .await
        .expect_err("A partial key must be rejected");
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::KeyCoherenceViolation {
            reason: KeyCoherence::SomeKeysMissing,
            index: 0,
            ..
        })
    ));
    let error = lines
        .save(&mut [record! { order_id: 0, line: 2, product: "Screw" }])
        .await
        .expect_err("A key partially at default must be rejected");
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::KeyCoherenceViolation {
            reason: KeyCoherence::SomeKeysDefault,
            index: 0,
            ..
        })
    ));

    // Positional keys follow the declared key order
    let nut: Record = lines
        .single_by_key(&vec![Value::from(1), Value::from(2)])
        .await
        .expect("Failed to read line 2 of order 1")
        .expect("Line 2 of order 1 was not found");
    assert_eq!(nut.get_as::<String>("product").unwrap(), "Nut");
    assert_eq!(nut.get_as::<i32>("qty").unwrap(), 4);
    let bolt: Record = lines
        .single_by_key(&vec![Value::from(1), Value::from(1)])
        .await
        .expect("Failed to read line 1 of order 1")
        .expect("Line 1 of order 1 was not found");
    assert_eq!(bolt.get_as::<i32>("qty").unwrap(), 10);
    let error = lines
        .single_by_key::<Record>(&vec![Value::from(1), Value::from(1), Value::from(1)])
        .await
        .expect_err("Three values for two keys must be rejected");
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::TooManyKeyValues {
            given: 3,
            declared: 2,
            ..
        })
    ));

    let deleted = lines
        .delete_by_key(&vec![Value::from(1), Value::from(2)])
        .await
        .expect("Failed to delete line 2 of order 1");
    assert_eq!(deleted, 1);
    let deleted = lines
        .delete(&[record! { order_id: 2, line: 1 }])
        .await
        .expect("Failed to delete line 1 of order 2");
    assert_eq!(deleted, 1);
    assert_eq!(lines.count("", &[]).await.unwrap(), 1);
}
