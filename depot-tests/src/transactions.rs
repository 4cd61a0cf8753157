use crate::{mapper, param, recreate};
use depot::{
    Connection, Driver, Record, Select, Transaction, Value, record, stream::TryStreamExt,
};
use indoc::indoc;
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn transactions<D: Driver>(driver: D, url: &str) {
    let _lock = MUTEX.lock().await;
    let accounts = mapper(driver, url, "accounts", "id");

    // Setup
    recreate(
        &accounts,
        "accounts",
        indoc! {"
            CREATE TABLE accounts (
                id INTEGER PRIMARY KEY,
                owner VARCHAR(50) NOT NULL,
                balance INTEGER NOT NULL DEFAULT 0
            );
        "},
    )
    .await;
    let mut connection = accounts
        .connect()
        .await
        .expect("Could not open a connection");

    // Rolled back writes disappear
    let mut transaction = connection
        .begin()
        .await
        .expect("Could not begin a transaction");
    let processed = accounts
        .save_on(
            &mut transaction,
            &mut [record! { owner: "ada" }, record! { owner: "grace" }],
        )
        .await
        .expect("Failed to save inside the transaction");
    assert_eq!(processed, 2);
    assert_eq!(accounts.count_on(&mut transaction, "", &[]).await.unwrap(), 2);
    transaction
        .rollback()
        .await
        .expect("Could not roll back the transaction");
    assert_eq!(accounts.count_on(&mut connection, "", &[]).await.unwrap(), 0);

    // Committed writes stay
    let mut transaction = connection
        .begin()
        .await
        .expect("Could not begin a transaction");
    let mut items = [
        record! { owner: "ada", balance: 100 },
        record! { owner: "grace", balance: 50 },
    ];
    let outcome = accounts
        .insert_on(&mut transaction, &mut items)
        .await
        .expect("Failed to insert inside the transaction")
        .expect("The generated key was not reported");
    let updated = accounts
        .update_from_on(
            &mut transaction,
            &record! { balance: 75 },
            &Value::from(outcome.key),
        )
        .await
        .expect("Failed to update inside the transaction");
    assert_eq!(updated, 1);
    transaction
        .commit()
        .await
        .expect("Could not commit the transaction");
    assert_eq!(accounts.count("", &[]).await.unwrap(), 2);
    let ada: Record = accounts
        .single_on(
            &mut connection,
            Select::new()
                .condition(format!("owner = {}", param(&accounts, "0")))
                .arg("ada"),
        )
        .await
        .expect("Failed to read the account of ada")
        .expect("The account of ada was not found");
    assert_eq!(ada.get_as::<i32>("balance").unwrap(), 75);

    // A dropped transaction is rolled back
    {
        let mut transaction = connection
            .begin()
            .await
            .expect("Could not begin a transaction");
        let deleted = accounts
            .delete_where_on(&mut transaction, "balance > 0", &[])
            .await
            .expect("Failed to delete inside the transaction");
        assert_eq!(deleted, 2);
    }
    assert_eq!(accounts.count_on(&mut connection, "", &[]).await.unwrap(), 2);

    // Streams read through the caller's executor
    let owners: Vec<Record> = accounts
        .all_on(&mut connection, Select::new().columns("owner").order_by("owner"))
        .try_collect()
        .await
        .expect("Failed to list the owners");
    assert_eq!(owners.len(), 2);
    assert_eq!(owners[1].get_as::<String>("owner").unwrap(), "grace");
}
