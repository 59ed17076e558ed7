//! Backend-neutral document store contract and change subscriptions.

use async_trait::async_trait;
use ferry_core::DocPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::error::StoreResult;

/// Broadcast capacity shared by store backends.
pub(crate) const CHANGE_CAPACITY: usize = 1_024;

/// Kind of mutation observed on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Document was created or overwritten.
    Set,
    /// Document was deleted.
    Removed,
    /// The watcher fell behind and missed changes; its path is the watch prefix.
    /// Consumers re-read the state they care about.
    #[serde(skip)]
    Lagged,
}

/// Change notification delivered to watchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChange {
    /// Path of the mutated document.
    pub path: DocPath,
    /// Kind of mutation.
    #[serde(rename = "op")]
    pub kind: ChangeKind,
}

/// Shared key/value document store with push-style change subscriptions.
///
/// Documents live at slash-separated paths. Removing a path removes every
/// document below it.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document.
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Value>>;

    /// Create or overwrite a document.
    async fn set(&self, path: &DocPath, value: Value) -> StoreResult<()>;

    /// Remove a document and everything below it.
    async fn remove(&self, path: &DocPath) -> StoreResult<()>;

    /// List every document strictly below `prefix`, ordered by path.
    async fn list(&self, prefix: &DocPath) -> StoreResult<Vec<(DocPath, Value)>>;

    /// Subscribe to changes at or below `prefix`. Dropping the watch unsubscribes.
    fn watch(&self, prefix: &DocPath) -> DocumentWatch;

    /// Store a document under a generated child identifier and return its path.
    async fn push(&self, parent: &DocPath, value: Value) -> StoreResult<DocPath> {
        let path = parent.child(uuid::Uuid::new_v4().simple().to_string());
        self.set(&path, value).await?;
        Ok(path)
    }
}

/// Filtered view over a backend's change stream.
#[derive(Debug)]
pub struct DocumentWatch {
    prefix: DocPath,
    receiver: broadcast::Receiver<DocumentChange>,
}

impl DocumentWatch {
    pub(crate) fn new(prefix: DocPath, receiver: broadcast::Receiver<DocumentChange>) -> Self {
        Self { prefix, receiver }
    }

    /// Prefix this watch is scoped to.
    #[must_use]
    pub const fn prefix(&self) -> &DocPath {
        &self.prefix
    }

    /// Wait for the next change under the prefix. Returns `None` once the backend shuts down.
    ///
    /// A receiver that fell behind yields one [`ChangeKind::Lagged`] change.
    pub async fn next(&mut self) -> Option<DocumentChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.path.starts_with(&self.prefix) => return Some(change),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(prefix = %self.prefix, skipped, "document watch lagged");
                    return Some(DocumentChange {
                        path: self.prefix.clone(),
                        kind: ChangeKind::Lagged,
                    });
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
