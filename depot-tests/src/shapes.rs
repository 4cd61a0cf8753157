use crate::{mapper, param, recreate};
use depot::{
    DataMapper, Driver, MappingError, Record, Select, Shape, stream::TryStreamExt,
};
use indoc::indoc;
use rust_decimal::Decimal;
use std::sync::LazyLock;
use time::macros::date;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Shape, Default, Debug, Clone, PartialEq)]
struct Gadget {
    id: i64,
    name: String,
    #[depot(name = "qty")]
    quantity: Option<i32>,
    price: Option<Decimal>,
    released: Option<time::Date>,
    serial: Option<Uuid>,
    #[depot(ignore)]
    selected: bool,
}

/// Has no field for the generated key.
#[derive(Shape, Default, Debug, Clone, PartialEq)]
struct GadgetName {
    name: String,
}

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn shapes<D: Driver + Clone>(driver: D, url: &str) {
    let _lock = MUTEX.lock().await;
    let gadgets = mapper(driver.clone(), url, "gadgets", "id");

    // Setup
    recreate(
        &gadgets,
        "gadgets",
        indoc! {"
            CREATE TABLE gadgets (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                qty INTEGER,
                price DECIMAL(10, 2),
                released DATE,
                serial TEXT
            );
        "},
    )
    .await;

    // Keys at their default value are generated
    let mut items = [
        Gadget {
            name: "Sprocket".into(),
            quantity: Some(12),
            price: Some(Decimal::new(1250, 2)),
            released: Some(date!(2024 - 02 - 29)),
            serial: Some(Uuid::parse_str("5e915574-bb30-4430-98cf-c5854f61fbbd").unwrap()),
            ..Default::default()
        },
        Gadget {
            name: "Flange".into(),
            selected: true,
            ..Default::default()
        },
    ];
    let processed = gadgets
        .save(&mut items)
        .await
        .expect("Failed to save the gadgets");
    assert_eq!(processed, 2);
    assert_eq!(items[0].id, 1);
    assert_eq!(items[1].id, 2);

    // Rows come back as shapes, NULL columns as None
    let loaded: Vec<Gadget> = gadgets
        .all(Select::new().order_by("id"))
        .try_collect()
        .await
        .expect("Failed to read the gadgets");
    assert_eq!(loaded[0], items[0]);
    assert_eq!(
        loaded[1],
        Gadget {
            selected: false,
            ..items[1].clone()
        }
    );
    assert_eq!(loaded[1].quantity, None);
    assert_eq!(loaded[1].serial, None);

    // Updates go through the same shape
    let mut flange = loaded[1].clone();
    flange.quantity = Some(3);
    gadgets
        .save(std::slice::from_mut(&mut flange))
        .await
        .expect("Failed to update the flange");
    let flange: Gadget = gadgets
        .single(Select::new().condition(format!("name = {}", param(&gadgets, "0"))).arg("Flange"))
        .await
        .expect("Failed to read the flange")
        .expect("The flange was not found");
    assert_eq!(flange.quantity, Some(3));

    // Items that cannot hold the key come back as records
    let outcome = gadgets
        .insert_one(&mut GadgetName {
            name: "Spare".into(),
        })
        .await
        .expect("Failed to insert a gadget by name")
        .expect("The generated key was not reported");
    assert_eq!(outcome.key, 3);
    let record = outcome.item.expect("A record carrying the key was expected");
    assert_eq!(record.get_as::<i64>("id").unwrap(), 3);
    assert_eq!(record.get_as::<String>("name").unwrap(), "Spare");

    // Columns without a field are skipped unless the mapping is strict
    let names: Vec<GadgetName> = gadgets
        .query("SELECT name, 1 AS extra FROM gadgets ORDER BY id;", &[])
        .try_collect()
        .await
        .expect("Failed to read the gadget names");
    assert_eq!(names.len(), 3);
    let strict = DataMapper::builder(driver)
        .url(url.to_string())
        .table("gadgets")
        .primary_key("id")
        .strict_columns(true)
        .build()
        .expect("Could not build the strict mapper");
    let error = strict
        .query::<GadgetName>("SELECT name, 1 AS extra FROM gadgets;", &[])
        .try_collect::<Vec<_>>()
        .await
        .expect_err("An unmapped column must fail a strict mapping");
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::UnmappedColumn { column, .. }) if column == "extra"
    ));

    // A value that does not convert names the column and the row
    let error = gadgets
        .query::<Gadget>("SELECT 'a dozen' AS qty;", &[])
        .try_collect::<Vec<_>>()
        .await
        .expect_err("A text quantity must fail");
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::MaterializationTypeMismatch { column, row: 0 }) if column == "qty"
    ));

    // Records and shapes read the same rows
    let records: Vec<Record> = gadgets
        .all(Select::new().columns("id, name").order_by("id").limit(1))
        .try_collect()
        .await
        .expect("Failed to read the gadgets as records");
    assert_eq!(records[0].get_as::<String>("name").unwrap(), "Sprocket");
}
