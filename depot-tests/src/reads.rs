use crate::{mapper, param, recreate};
use depot::{
    Cancel, Dispatched, Driver, MappingError, Paging, Record, Select, Value, Verb, cancellable,
    record,
    stream::{StreamExt, TryStreamExt},
};
use indoc::indoc;
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn reads<D: Driver>(driver: D, url: &str) {
    let _lock = MUTEX.lock().await;
    let readings = mapper(driver, url, "readings", "id");

    // Setup
    recreate(
        &readings,
        "readings",
        indoc! {"
            CREATE TABLE readings (
                id INTEGER PRIMARY KEY,
                sensor VARCHAR(20) NOT NULL,
                reading INTEGER NOT NULL
            );
        "},
    )
    .await;
    let mut items = (1..=25)
        .map(|i| record! { sensor: if i % 2 == 0 { "even" } else { "odd" }, reading: i * 2 })
        .collect::<Vec<_>>();
    readings
        .insert(&mut items)
        .await
        .expect("Failed to insert the readings");
    assert_eq!(items[24].get_as::<i64>("id").unwrap(), 25);

    // Pages
    let page = readings
        .paged::<Record>(&Paging::new(Select::new()).page_size(10).current_page(3))
        .await
        .expect("Failed to read the third page");
    assert_eq!(page.total_records, 25);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.items[0].get_as::<i64>("id").unwrap(), 21);
    let page = readings
        .paged::<Record>(
            &Paging::new(
                Select::new()
                    .condition(format!("sensor = {}", param(&readings, "0")))
                    .arg("odd")
                    .order_by("reading DESC"),
            )
            .page_size(5),
        )
        .await
        .expect("Failed to read the first page of the odd readings");
    assert_eq!(page.total_records, 13);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items[0].get_as::<i32>("reading").unwrap(), 50);

    // Aggregates
    assert_eq!(readings.count("", &[]).await.unwrap(), 25);
    assert_eq!(
        readings
            .count(&format!("reading > {}", param(&readings, "0")), &[40.into()])
            .await
            .unwrap(),
        5
    );
    assert_eq!(
        readings.aggregate("max", "reading", "", &[]).await.unwrap(),
        Some(Value::Int64(Some(50)))
    );
    assert_eq!(
        readings
            .aggregate("sum", "reading", "WHERE sensor = 'even'", &[])
            .await
            .unwrap(),
        Some(Value::Int64(Some(312)))
    );

    // Verbs picked by name
    let first = readings
        .dispatch::<Record>(Verb::lookup("FirstReading"), Select::new())
        .await
        .expect("Failed to dispatch first");
    let Dispatched::One(Some(first)) = first else {
        panic!("Expected the first reading, got {:?}", first);
    };
    assert_eq!(first.get_as::<i64>("id").unwrap(), 1);
    let last = readings
        .dispatch::<Record>(Verb::lookup("last"), Select::new())
        .await
        .expect("Failed to dispatch last");
    assert!(matches!(&last, Dispatched::One(Some(v)) if v.get_as::<i64>("id").unwrap() == 25));
    let last = readings
        .dispatch::<Record>(Verb::lookup("last"), Select::new().order_by("reading DESC"))
        .await
        .expect("Failed to dispatch last with a descending order");
    assert!(matches!(&last, Dispatched::One(Some(v)) if v.get_as::<i32>("reading").unwrap() == 2));
    let count = readings
        .dispatch::<Record>(
            Verb::lookup("CountBySensor"),
            Select::new().condition("sensor = 'even'"),
        )
        .await
        .expect("Failed to dispatch count");
    assert_eq!(count, Dispatched::Scalar(Some(Value::Int64(Some(12)))));
    let all = readings
        .dispatch::<Record>(Verb::lookup("readings"), Select::new().limit(4))
        .await
        .expect("Failed to dispatch all");
    assert!(matches!(&all, Dispatched::Rows(v) if v.len() == 4));

    // Raw queries
    let sets = readings
        .query_multiple::<Record>(
            indoc! {"
                SELECT id FROM readings WHERE id <= 2 ORDER BY id;
                SELECT sensor, reading FROM readings WHERE id = 25;
            "},
            &[],
        )
        .await
        .expect("Failed to read two result sets");
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0].len(), 2);
    assert_eq!(sets[1][0].get_as::<String>("sensor").unwrap(), "odd");
    let sets = readings
        .query_multiple::<Record>(
            indoc! {"
                SELECT id FROM readings WHERE id > 100;
                SELECT reading FROM readings WHERE id = 1;
            "},
            &[],
        )
        .await
        .expect("Failed to read an empty result set");
    assert_eq!(sets.len(), 2);
    assert!(sets[0].is_empty());
    assert_eq!(sets[1][0].get_as::<i32>("reading").unwrap(), 2);
    let reading = readings
        .scalar(
            format!("SELECT reading FROM readings WHERE id = {};", param(&readings, "0")),
            &[7.into()],
        )
        .await
        .expect("Failed to read reading 7");
    assert_eq!(reading, Some(Value::Int64(Some(14))));
    let missing = readings
        .scalar("SELECT reading FROM readings WHERE id = 100;", &[])
        .await
        .expect("Failed to read a missing reading");
    assert_eq!(missing, None);
    let highest: Record = readings
        .single(
            Select::new()
                .columns("id, reading")
                .condition(format!("reading < {}", param(&readings, "0")))
                .arg(45)
                .order_by("reading DESC"),
        )
        .await
        .expect("Failed to read the highest reading under 45")
        .expect("No reading under 45");
    assert_eq!(highest.get_as::<i32>("reading").unwrap(), 44);
    assert!(!highest.contains("sensor"));

    // A stream dropped early releases its connection
    let head: Vec<Record> = readings
        .all(Select::new().order_by("id"))
        .take(3)
        .try_collect()
        .await
        .expect("Failed to read the first readings");
    assert_eq!(head.len(), 3);
    assert_eq!(readings.count("", &[]).await.unwrap(), 25);

    // Cancelled before starting
    let cancel = Cancel::new();
    cancel.cancel();
    let error = cancellable(&cancel, readings.count("", &[]))
        .await
        .expect_err("A cancelled count must fail");
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::Cancelled)
    ));
    assert_eq!(readings.count("", &[]).await.unwrap(), 25);
}
