#[cfg(test)]
mod tests {
    use depot_core::{Command, Connection, Executor, Transaction, Value, stream::TryStreamExt};
    use depot_sqlite::SqliteConnection;
    use depot_tests::{init_logs, silent_logs};
    use std::{path::Path, sync::Mutex};
    use tokio::fs;

    static MUTEX: Mutex<()> = Mutex::new(());

    async fn count(connection: &mut SqliteConnection) -> Value {
        connection
            .scalar(Command::new("SELECT COUNT(*) FROM notes;"))
            .await
            .expect("Failed to count the notes")
            .expect("The count returned no row")
    }

    #[tokio::test]
    async fn create_database() {
        init_logs();
        const DB_PATH: &'static str = "../target/debug/creation.sqlite";
        let _guard = MUTEX.lock().unwrap();
        if Path::new(DB_PATH).exists() {
            fs::remove_file(DB_PATH)
                .await
                .expect(format!("Failed to remove test database file {}", DB_PATH).as_str());
        }
        assert!(
            !Path::new(DB_PATH).exists(),
            "Database file should not exist before test"
        );
        SqliteConnection::connect(format!("sqlite://{}?mode=rwc", DB_PATH).into())
            .await
            .expect("Could not open the database");
        assert!(
            Path::new(DB_PATH).exists(),
            "Database file should be created after connection"
        );
        SqliteConnection::connect(format!("sqlite://{}?mode=ro", DB_PATH).into())
            .await
            .expect("Could not open the database");
        fs::remove_file(DB_PATH)
            .await
            .expect(format!("Failed to remove existing test database file {}", DB_PATH).as_str());
        silent_logs! {
            assert!(
                SqliteConnection::connect(format!("sqlite://{}?mode=ro", DB_PATH).into())
                    .await
                    .is_err(),
                "Should not be able to open in read only unexisting database"
            );
        }
    }

    #[tokio::test]
    async fn wrong_url() {
        silent_logs! {
            assert!(
                SqliteConnection::connect("postgres://some_value".into())
                    .await
                    .is_err()
            );
            assert!(
                SqliteConnection::connect("sqlite://:memory:?mode=sideways".into())
                    .await
                    .is_err()
            );
        };
    }

    #[tokio::test]
    async fn memory_transactions() {
        init_logs();
        let mut connection = SqliteConnection::connect("sqlite://:memory:".into())
            .await
            .expect("Could not open an in memory database");
        connection
            .execute(Command::new(
                "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);",
            ))
            .await
            .expect("Failed to create the notes table");
        let affected = connection
            .execute(Command::new(
                "INSERT INTO notes (body) VALUES ('first'); INSERT INTO notes (body) VALUES ('second');",
            ))
            .await
            .expect("Failed to insert the notes");
        assert_eq!(affected.rows_affected, 2);
        assert_eq!(affected.last_affected_id, Some(2));

        {
            let mut transaction = connection
                .begin()
                .await
                .expect("Could not begin a transaction");
            transaction
                .execute(Command::new("DELETE FROM notes;"))
                .await
                .expect("Failed to delete the notes");
        }
        assert_eq!(count(&mut connection).await, Value::Int64(Some(2)));

        let mut transaction = connection
            .begin()
            .await
            .expect("Could not begin a transaction");
        transaction
            .execute(Command::new("DELETE FROM notes WHERE id = 1;"))
            .await
            .expect("Failed to delete the first note");
        transaction
            .commit()
            .await
            .expect("Could not commit the transaction");
        assert_eq!(count(&mut connection).await, Value::Int64(Some(1)));

        let bodies: Vec<_> = connection
            .fetch(Command::new("SELECT body FROM notes;"))
            .try_collect()
            .await
            .expect("Failed to read the notes");
        assert_eq!(bodies[0].values(), [Value::Varchar(Some("second".into()))]);

        silent_logs! {
            assert!(
                connection
                    .execute(Command::new("CALL nothing();"))
                    .await
                    .is_err()
            );
        }
    }
}
