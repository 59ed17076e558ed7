use std::error::Error;
use std::time::Duration;

use ferry_core::DocPath;
use ferry_store::{ChangeKind, DocumentStore, PgDocumentStore};
use ferry_test_support::postgres::start_postgres;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;

#[tokio::test]
async fn pg_store_persists_and_notifies() -> Result<(), Box<dyn Error>> {
    let Ok(database) = start_postgres() else {
        eprintln!("skipping pg_store_persists_and_notifies: no test database");
        return Ok(());
    };
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(database.connection_string())
        .await?;
    let (store, listener) = PgDocumentStore::new(pool).await?;

    let prefix = DocPath::parse("removeTransfers/uid");
    let mut watch = store.watch(&prefix);

    store
        .set(&DocPath::parse("transfers/uid/gdrive-to-mega/a"), json!({"name": "a"}))
        .await?;
    store
        .set(&DocPath::parse("transfers/uid/gdrive-to-mega/b"), json!({"name": "b"}))
        .await?;
    let listed = store.list(&DocPath::parse("transfers/uid")).await?;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].1["name"], "a");

    let signal = DocPath::parse("removeTransfers/uid/gdrive-to-mega/a");
    store.set(&signal, json!(true)).await?;
    let change = tokio::time::timeout(Duration::from_secs(5), watch.next())
        .await?
        .ok_or("watch closed")?;
    assert_eq!(change.path, signal);
    assert_eq!(change.kind, ChangeKind::Set);

    store.remove(&DocPath::parse("transfers/uid")).await?;
    assert!(store.list(&DocPath::parse("transfers/uid")).await?.is_empty());
    assert_eq!(store.get(&signal).await?, Some(json!(true)));

    listener.abort();
    Ok(())
}
