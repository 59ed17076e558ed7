//! `PostgreSQL` document store with LISTEN/NOTIFY change subscriptions.

use std::time::Duration;

use async_trait::async_trait;
use ferry_core::DocPath;
use serde_json::Value;
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::document::{CHANGE_CAPACITY, DocumentChange, DocumentStore, DocumentWatch};
use crate::error::{StoreError, StoreResult, query_err};

/// LISTEN/NOTIFY channel fed by the `ferry_documents` trigger.
pub const DOCUMENTS_CHANNEL: &str = "ferry_documents";

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

const SELECT_DOCUMENT_SQL: &str = r"
    SELECT value
    FROM ferry_documents
    WHERE path = $1
";

const UPSERT_DOCUMENT_SQL: &str = r"
    INSERT INTO ferry_documents (path, value, updated_at)
    VALUES ($1, $2, now())
    ON CONFLICT (path) DO UPDATE
    SET
        value = EXCLUDED.value,
        updated_at = EXCLUDED.updated_at
";

const DELETE_SUBTREE_SQL: &str = r"
    DELETE FROM ferry_documents
    WHERE path = $1 OR starts_with(path, $1 || '/')
";

const LIST_DESCENDANTS_SQL: &str = r"
    SELECT path, value
    FROM ferry_documents
    WHERE starts_with(path, $1 || '/')
    ORDER BY path
";

/// Apply the document schema migrations.
///
/// # Errors
///
/// Returns an error when migration execution fails.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
        .run(pool)
        .await
        .map_err(|source| StoreError::Migration { source })
}

/// Document store persisted in the `ferry_documents` table.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    changes: broadcast::Sender<DocumentChange>,
}

impl PgDocumentStore {
    /// Apply migrations and start the shared change listener.
    ///
    /// The returned handle owns the listener task; aborting it stops change delivery.
    ///
    /// # Errors
    ///
    /// Returns an error when migrations fail or the LISTEN connection cannot be opened.
    pub async fn new(pool: PgPool) -> StoreResult<(Self, JoinHandle<()>)> {
        run_migrations(&pool).await?;
        let listener = open_listener(&pool).await?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        let task = tokio::spawn(forward_notifications(
            pool.clone(),
            listener,
            changes.clone(),
        ));
        Ok((Self { pool, changes }, task))
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn open_listener(pool: &PgPool) -> StoreResult<PgListener> {
    let mut listener = PgListener::connect_with(pool)
        .await
        .map_err(|source| StoreError::Listener { source })?;
    listener
        .listen(DOCUMENTS_CHANNEL)
        .await
        .map_err(|source| StoreError::Listener { source })?;
    Ok(listener)
}

async fn forward_notifications(
    pool: PgPool,
    mut listener: PgListener,
    changes: broadcast::Sender<DocumentChange>,
) {
    loop {
        match listener.recv().await {
            Ok(notification) => {
                match serde_json::from_str::<DocumentChange>(notification.payload()) {
                    Ok(change) => {
                        let _ = changes.send(change);
                    }
                    Err(error) => {
                        warn!(%error, payload = notification.payload(), "ignoring malformed document notification");
                    }
                }
            }
            Err(error) => {
                warn!(%error, "document listener disconnected; reconnecting");
                tokio::time::sleep(RECONNECT_DELAY).await;
                match open_listener(&pool).await {
                    Ok(fresh) => {
                        debug!("document listener reconnected");
                        listener = fresh;
                    }
                    Err(error) => warn!(%error, "document listener reconnect failed"),
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Value>> {
        let row = sqlx::query(SELECT_DOCUMENT_SQL)
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err("documents.get"))?;
        row.map(|row| row.try_get::<Json<Value>, _>("value").map(|Json(value)| value))
            .transpose()
            .map_err(query_err("documents.decode"))
    }

    async fn set(&self, path: &DocPath, value: Value) -> StoreResult<()> {
        sqlx::query(UPSERT_DOCUMENT_SQL)
            .bind(path.as_str())
            .bind(Json(value))
            .execute(&self.pool)
            .await
            .map_err(query_err("documents.set"))?;
        Ok(())
    }

    async fn remove(&self, path: &DocPath) -> StoreResult<()> {
        sqlx::query(DELETE_SUBTREE_SQL)
            .bind(path.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_err("documents.remove"))?;
        Ok(())
    }

    async fn list(&self, prefix: &DocPath) -> StoreResult<Vec<(DocPath, Value)>> {
        let rows = sqlx::query(LIST_DESCENDANTS_SQL)
            .bind(prefix.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(query_err("documents.list"))?;
        rows.into_iter()
            .map(|row| {
                let path: String = row.try_get("path")?;
                let Json(value) = row.try_get::<Json<Value>, _>("value")?;
                Ok((DocPath::parse(&path), value))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(query_err("documents.decode"))
    }

    fn watch(&self, prefix: &DocPath) -> DocumentWatch {
        DocumentWatch::new(prefix.clone(), self.changes.subscribe())
    }
}
