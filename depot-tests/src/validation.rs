use crate::recreate;
use depot::{
    AsValue, CrudAction, DataMapper, Driver, Item, ItemError, MappingError, Prevalidation,
    Validator, record,
};
use indoc::indoc;
use std::sync::{
    Arc, LazyLock,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Requires an owner, skips negative balances and counts what was written.
struct LedgerRules {
    prevalidation: Prevalidation,
    performed: Arc<AtomicUsize>,
}

fn field<T: AsValue>(item: &dyn Item, name: &str) -> Option<T> {
    item.name_values()
        .into_iter()
        .find(|v| v.name.as_deref() == Some(name))
        .and_then(|v| T::try_from_value(v.value).ok())
}

impl Validator for LedgerRules {
    fn prevalidation(&self) -> Prevalidation {
        self.prevalidation
    }

    fn validate(&self, item: &dyn Item, _action: CrudAction, errors: &mut Vec<String>) {
        if field::<String>(item, "owner").is_none_or(|v| v.trim().is_empty()) {
            errors.push("owner is required".into());
        }
    }

    fn performing(&self, item: &dyn Item, _action: CrudAction) -> bool {
        field::<i64>(item, "balance").is_none_or(|v| v >= 0)
    }

    fn performed(&self, _item: &dyn Item, _action: CrudAction) {
        self.performed.fetch_add(1, Ordering::Relaxed);
    }
}

fn ledger<D: Driver>(
    driver: D,
    url: &str,
    prevalidation: Prevalidation,
) -> (DataMapper<D>, Arc<AtomicUsize>) {
    let performed = Arc::new(AtomicUsize::new(0));
    let mapper = DataMapper::builder(driver)
        .url(url.to_string())
        .table("ledger")
        .primary_key("id")
        .validator(LedgerRules {
            prevalidation,
            performed: performed.clone(),
        })
        .build()
        .expect("Could not build the ledger mapper");
    (mapper, performed)
}

pub async fn validation<D: Driver + Clone>(driver: D, url: &str) {
    let _lock = MUTEX.lock().await;
    let (full, performed) = ledger(driver.clone(), url, Prevalidation::Full);
    let (first, _) = ledger(driver.clone(), url, Prevalidation::ToFirstFailure);
    let (unchecked, _) = ledger(driver, url, Prevalidation::Off);

    // Setup
    recreate(
        &full,
        "ledger",
        indoc! {"
            CREATE TABLE ledger (
                id INTEGER PRIMARY KEY,
                owner VARCHAR(50),
                balance INTEGER NOT NULL DEFAULT 0
            );
        "},
    )
    .await;

    // Every failing item is reported, nothing is written
    let mut items = [
        record! { owner: "", balance: 1 },
        record! { owner: "ada", balance: 2 },
        record! { balance: 3 },
    ];
    let error = full
        .save(&mut items)
        .await
        .expect_err("Items without an owner must be rejected");
    let Some(MappingError::ValidationFailure { errors, action, .. }) =
        error.downcast_ref::<MappingError>()
    else {
        panic!("Expected a validation failure, got {:#}", error);
    };
    assert_eq!(*action, CrudAction::Save);
    assert_eq!(
        *errors,
        [
            ItemError {
                index: 0,
                message: "owner is required".into()
            },
            ItemError {
                index: 2,
                message: "owner is required".into()
            },
        ]
    );
    assert_eq!(full.count("", &[]).await.unwrap(), 0);

    // Stops at the first failing item
    let error = first
        .insert(&mut items)
        .await
        .expect_err("Items without an owner must be rejected");
    assert!(matches!(
        error.downcast_ref::<MappingError>(),
        Some(MappingError::ValidationFailure { errors, .. }) if errors.len() == 1 && errors[0].index == 0
    ));
    assert_eq!(first.count("", &[]).await.unwrap(), 0);

    // Skipped items are neither written nor counted
    let mut items = [
        record! { owner: "ada", balance: 10 },
        record! { owner: "grace", balance: -5 },
        record! { owner: "linus", balance: 0 },
    ];
    let processed = full
        .save(&mut items)
        .await
        .expect("Failed to save the ledger entries");
    assert_eq!(processed, 2);
    assert_eq!(performed.load(Ordering::Relaxed), 2);
    assert!(!items[1].contains("id"));
    assert_eq!(full.count("", &[]).await.unwrap(), 2);

    // Without prevalidation the hooks still skip items
    let processed = unchecked
        .save(&mut [record! { owner: "", balance: -1 }])
        .await
        .expect("Failed to run an unchecked save");
    assert_eq!(processed, 0);
    assert_eq!(unchecked.count("", &[]).await.unwrap(), 2);
}
