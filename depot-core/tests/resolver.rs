mod fake;

use depot_core::{
    CrudAction, DataMapper, InsertOutcome, Item, KeyCoherence, MappingError, NameValue,
    Prevalidation, Validator, Value, record,
};
use fake::{Counters, FakeDialect, FakeDriver, affected, scalar};
use std::sync::atomic::{AtomicI64, Ordering};

fn mapper(driver: FakeDriver, table: &str, primary_key: &str) -> DataMapper<FakeDriver> {
    DataMapper::builder(driver)
        .url("fake://")
        .table(table)
        .primary_key(primary_key)
        .build()
        .expect("Could not build the mapper")
}

/// Inserts answer with increasing generated keys, everything else affects one row.
fn identity_driver() -> FakeDriver {
    let next = AtomicI64::new(41);
    FakeDriver::new(move |command| {
        Ok(if command.sql.starts_with("INSERT") {
            scalar(next.fetch_add(1, Ordering::SeqCst) + 1)
        } else {
            affected(1)
        })
    })
}

fn parameter_names(driver: &FakeDriver, index: usize) -> Vec<String> {
    driver.commands()[index]
        .parameters
        .iter()
        .map(|v| v.name.clone())
        .collect()
}

#[tokio::test]
async fn save_inserts_default_keys_and_updates_the_others() {
    let driver = identity_driver();
    let mapper = mapper(driver.clone(), "products", "id");
    let mut items = vec![
        record! { id: 0, name: "Widget", qty: 3 },
        record! { id: 7, name: "Gadget", qty: Value::Int32(None) },
    ];
    let processed = mapper.save(&mut items).await.expect("Save failed");
    assert_eq!(processed, 2);
    assert_eq!(items[0].get("id"), Some(&Value::Int64(Some(42))));
    assert_eq!(
        driver.sql(),
        [
            "INSERT INTO products (name, qty) VALUES (@name, @qty);\nSELECT @@IDENTITY;",
            "UPDATE products\nSET name = @name, qty = NULL\nWHERE id = @id;",
        ]
    );
    assert_eq!(parameter_names(&driver, 0), ["@name", "@qty"]);
    assert_eq!(parameter_names(&driver, 1), ["@name", "@id"]);
}

#[tokio::test]
async fn insert_returns_the_first_item() {
    let driver = identity_driver();
    let mapper = mapper(driver.clone(), "products", "id");
    let mut items = vec![
        record! { name: "A" },
        record! { name: "B" },
        record! { name: "C" },
    ];
    let outcome = mapper.insert(&mut items).await.expect("Insert failed");
    assert_eq!(outcome, Some(InsertOutcome { key: 42, item: None }));
    let keys: Vec<_> = items.iter().map(|v| v.get_as::<i64>("id").unwrap()).collect();
    assert_eq!(keys, [42, 43, 44]);
}

struct Frozen {
    name: &'static str,
}

impl Item for Frozen {
    fn name_values(&self) -> Vec<NameValue<'_>> {
        vec![NameValue::named("name", self.name)]
    }
}

#[tokio::test]
async fn immutable_items_come_back_as_records() {
    let driver = identity_driver();
    let mapper = mapper(driver, "products", "id");
    let mut item = Frozen { name: "Frozen" };
    let outcome = mapper.insert_one(&mut item).await.unwrap();
    assert_eq!(
        outcome,
        Some(InsertOutcome {
            key: 42,
            item: Some(record! { name: "Frozen", id: 42i64 }),
        })
    );
}

#[tokio::test]
async fn null_values_are_literals() {
    let driver = identity_driver();
    let mapper = mapper(driver.clone(), "products", "id");
    let mut items = [record! { name: Value::Null, qty: 3 }];
    mapper.insert(&mut items).await.unwrap();
    assert_eq!(
        driver.sql(),
        ["INSERT INTO products (name, qty) VALUES (NULL, @qty);\nSELECT @@IDENTITY;"]
    );
    assert_eq!(parameter_names(&driver, 0), ["@qty"]);
}

#[tokio::test]
async fn affected_rows_must_be_one() {
    let driver = FakeDriver::new(|_| Ok(affected(0)));
    let mapper = mapper(driver, "products", "id");
    let error = mapper
        .update(&[record! { id: 9, name: "Missing" }])
        .await
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::AffectedRowCountMismatch {
            action: CrudAction::Update,
            index: 0,
            affected: 0,
            ..
        })
    ));
    assert!(error.to_string().starts_with("Could not update item 0"));
}

#[tokio::test]
async fn deletes_count_every_item() {
    let driver = identity_driver();
    let mapper = mapper(driver.clone(), "products", "id");
    let mut items = vec![
        record! { name: "A" },
        record! { name: "B" },
        record! { name: "C" },
    ];
    mapper.insert(&mut items).await.expect("Insert failed");
    let deleted = mapper.delete(&items).await.expect("Delete failed");
    assert_eq!(deleted, 3);
    assert_eq!(
        driver.sql()[3..],
        ["DELETE FROM products\nWHERE id = @id;"; 3]
    );
    let keys = driver.commands()[3..]
        .iter()
        .map(|v| v.parameters[0].value.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        keys,
        [
            Value::Int64(Some(42)),
            Value::Int64(Some(43)),
            Value::Int64(Some(44))
        ]
    );
}

#[tokio::test]
async fn compound_keys_must_be_coherent() {
    let driver = FakeDriver::new(|_| Ok(affected(1)));
    let mapper = mapper(driver.clone(), "order_lines", "order_id, line");

    let error = mapper
        .save(&mut [record! { order_id: 3, qty: 1 }])
        .await
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::KeyCoherenceViolation {
            reason: KeyCoherence::SomeKeysMissing,
            ..
        })
    ));
    assert!(error.to_string().contains("all or no primary key fields must be present"));

    let error = mapper
        .save(&mut [record! { order_id: 3, line: 0, qty: 1 }])
        .await
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::KeyCoherenceViolation {
            reason: KeyCoherence::SomeKeysDefault,
            ..
        })
    ));
    assert_eq!(Counters::get(&driver.counters().commands), 0);

    mapper
        .save(&mut [
            record! { order_id: 3, line: 2, qty: 1 },
            record! { order_id: 0, line: 0, qty: 1 },
        ])
        .await
        .unwrap();
    assert_eq!(
        driver.sql(),
        [
            "UPDATE order_lines\nSET qty = @qty\nWHERE order_id = @order_id AND line = @line;",
            "INSERT INTO order_lines (qty) VALUES (@qty);",
        ]
    );
}

#[tokio::test]
async fn keys_given_twice_are_rejected() {
    let driver = FakeDriver::new(|_| Ok(affected(1)));
    let mapper = mapper(driver.clone(), "products", "id");

    let error = mapper
        .save(&mut [record! { id: 7, ID: 7, name: "Widget" }])
        .await
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::KeyCoherenceViolation {
            reason: KeyCoherence::DuplicateKeys,
            index: 0,
            ..
        })
    ));
    assert!(error.to_string().contains("each primary key field must be given once"));

    let error = mapper
        .delete_by_key(&record! { id: 7, Id: 7 })
        .await
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::KeyCoherenceViolation {
            reason: KeyCoherence::DuplicateKeys,
            ..
        })
    ));
    assert_eq!(Counters::get(&driver.counters().commands), 0);
}

#[tokio::test]
async fn positional_keys() {
    let driver = FakeDriver::new(|_| Ok(affected(1)));
    let mapper = mapper(driver.clone(), "products", "id");
    let error = mapper
        .delete(&[vec![Value::from(1), Value::from(2)]])
        .await
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::TooManyKeyValues {
            given: 2,
            declared: 1,
            ..
        })
    ));
    assert_eq!(mapper.delete(&[Value::from(5)]).await.unwrap(), 1);
    assert_eq!(driver.sql(), ["DELETE FROM products\nWHERE id = @id;"]);
    assert_eq!(driver.commands()[0].parameters[0].value, Value::Int32(Some(5)));
}

#[tokio::test]
async fn sequence_keys() {
    let driver = FakeDriver::new(|command| {
        Ok(if command.sql.contains("currval") {
            scalar(Value::Decimal(Some(100.into())))
        } else {
            affected(1)
        })
    })
    .with_dialect(FakeDialect {
        sequences: true,
        ..Default::default()
    });
    let sequenced = DataMapper::builder(driver.clone())
        .table("products")
        .primary_key("id")
        .sequence("products_seq")
        .build()
        .unwrap();
    let mut item = record! { id: 0, name: "W" };
    let outcome = sequenced.insert_one(&mut item).await.unwrap();
    assert_eq!(outcome.map(|v| v.key), Some(100));
    assert_eq!(item.get("id"), Some(&Value::Int64(Some(100))));

    let manual = mapper(driver.clone(), "products", "id");
    let outcome = manual
        .insert_one(&mut record! { id: 10, name: "M" })
        .await
        .unwrap();
    assert_eq!(outcome, None);
    assert_eq!(
        driver.sql(),
        [
            "INSERT INTO products (name, id) VALUES (@name, nextval('products_seq'));\nSELECT currval('products_seq');",
            "INSERT INTO products (id, name) VALUES (@id, @name);",
        ]
    );
}

#[tokio::test]
async fn sequences_need_a_single_key() {
    let driver = FakeDriver::new(|_| Ok(affected(1))).with_dialect(FakeDialect {
        sequences: true,
        ..Default::default()
    });
    let result = DataMapper::builder(driver)
        .table("order_lines")
        .primary_key("order_id, line")
        .sequence("lines_seq")
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn tables_without_keys() {
    let driver = FakeDriver::new(|_| Ok(affected(1)));
    let mapper = mapper(driver.clone(), "logs", "");
    let error = mapper.update(&[record! { msg: "x" }]).await.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::NoPrimaryKey {
            action: CrudAction::Update,
            ..
        })
    ));
    assert_eq!(mapper.save(&mut [record! { msg: "x" }]).await.unwrap(), 1);
    assert_eq!(driver.sql(), ["INSERT INTO logs (msg) VALUES (@msg);"]);
}

#[tokio::test]
async fn predicates_are_required() {
    let driver = FakeDriver::new(|_| Ok(affected(12)));
    let mapper = mapper(driver.clone(), "products", "id");

    for condition in ["", "  ", "WHERE "] {
        let error = mapper.delete_where(condition, &[]).await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<MappingError>(),
            Some(MappingError::MissingPredicate {
                action: CrudAction::Delete,
                ..
            })
        ));
    }
    let error = mapper
        .update_using(&record! { qty: 0 }, "", &[])
        .await
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::MissingPredicate {
            action: CrudAction::Update,
            ..
        })
    ));
    assert_eq!(Counters::get(&driver.counters().commands), 0);

    assert_eq!(mapper.delete_where("1=1", &[]).await.unwrap(), 12);
    assert_eq!(
        mapper
            .update_using(&record! { qty: 0, id: 4 }, "WHERE qty < @0", &[5.into()])
            .await
            .unwrap(),
        12
    );
    mapper
        .update_from(&record! { name: "n" }, &Value::from(4))
        .await
        .unwrap();
    mapper.delete_by_key(&vec![Value::from(4)]).await.unwrap();
    assert_eq!(
        driver.sql(),
        [
            "DELETE FROM products\nWHERE 1=1;",
            "UPDATE products\nSET qty = @qty\nWHERE qty < @0;",
            "UPDATE products\nSET name = @name\nWHERE id = @id;",
            "DELETE FROM products\nWHERE id = @id;",
        ]
    );
    assert_eq!(parameter_names(&driver, 1), ["@0", "@qty"]);
    assert_eq!(parameter_names(&driver, 2), ["@name", "@id"]);
}

struct RequireName {
    mode: Prevalidation,
}

impl Validator for RequireName {
    fn prevalidation(&self) -> Prevalidation {
        self.mode
    }

    fn validate(&self, item: &dyn Item, _action: CrudAction, errors: &mut Vec<String>) {
        let named = item
            .name_values()
            .iter()
            .any(|v| v.name.as_deref() == Some("name") && !v.value.is_null());
        if !named {
            errors.push("name is required".into());
        }
    }

    fn performing(&self, item: &dyn Item, _action: CrudAction) -> bool {
        !item
            .name_values()
            .iter()
            .any(|v| v.name.as_deref() == Some("qty") && v.value.is_default())
    }
}

fn validated(driver: FakeDriver, mode: Prevalidation) -> DataMapper<FakeDriver> {
    DataMapper::builder(driver)
        .table("products")
        .primary_key("id")
        .validator(RequireName { mode })
        .build()
        .unwrap()
}

#[tokio::test]
async fn prevalidation_collects_errors_before_running() {
    let items = || {
        vec![
            record! { id: 1, name: "ok", qty: 1 },
            record! { id: 2, qty: 1 },
            record! { id: 3, name: Value::Null, qty: 1 },
        ]
    };
    let driver = FakeDriver::new(|_| Ok(affected(1)));

    let full = validated(driver.clone(), Prevalidation::Full);
    let error = full.update(&items()).await.unwrap_err();
    let Some(MappingError::ValidationFailure { errors, action, .. }) =
        error.downcast_ref::<MappingError>()
    else {
        panic!("Unexpected error: {error:#}");
    };
    assert_eq!(*action, CrudAction::Update);
    assert_eq!(errors.iter().map(|v| v.index).collect::<Vec<_>>(), [1, 2]);

    let first = validated(driver.clone(), Prevalidation::ToFirstFailure);
    let error = first.update(&items()).await.unwrap_err();
    let Some(MappingError::ValidationFailure { errors, .. }) = error.downcast_ref::<MappingError>()
    else {
        panic!("Unexpected error: {error:#}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].index, 1);
    assert_eq!(errors[0].message, "name is required");

    assert_eq!(Counters::get(&driver.counters().commands), 0);

    let off = validated(driver.clone(), Prevalidation::Off);
    assert_eq!(off.update(&items()).await.unwrap(), 3);
}

#[tokio::test]
async fn skipped_items_are_not_counted() {
    let driver = FakeDriver::new(|_| Ok(affected(1)));
    let mapper = validated(driver.clone(), Prevalidation::Off);
    let mut items = vec![
        record! { id: 1, name: "a", qty: 1 },
        record! { id: 2, name: "b", qty: 0 },
        record! { id: 3, name: "c", qty: 5 },
    ];
    assert_eq!(mapper.save(&mut items).await.unwrap(), 2);
    assert_eq!(Counters::get(&driver.counters().commands), 2);
}

#[tokio::test]
async fn wrapping_transactions_per_command() {
    let driver = FakeDriver::new(|command| {
        if command.sql.contains("fail") {
            return Err(depot_core::Error::msg("constraint violated"));
        }
        Ok(affected(1))
    })
    .with_dialect(FakeDialect {
        wrapping: true,
        ..Default::default()
    });
    let mapper = mapper(driver.clone(), "products", "id");
    let counters = driver.counters();

    mapper
        .save(&mut [record! { id: 1, qty: 1 }, record! { id: 2, qty: 2 }])
        .await
        .unwrap();
    assert_eq!(Counters::get(&counters.connects), 1);
    assert_eq!(Counters::get(&counters.begins), 2);
    assert_eq!(Counters::get(&counters.commits), 2);

    let mut connection = mapper.connect().await.unwrap();
    mapper
        .save_on(&mut connection, &mut [record! { id: 3, qty: 1 }])
        .await
        .unwrap();
    assert_eq!(Counters::get(&counters.begins), 2);
    drop(connection);

    assert!(mapper.execute("fail", &[]).await.is_err());
    assert_eq!(Counters::get(&counters.begins), 3);
    assert_eq!(Counters::get(&counters.commits), 2);
    assert_eq!(Counters::get(&counters.rollbacks), 1);
    assert_eq!(Counters::get(&counters.open), 0);
}
