//! In-process document store used by tests and single-host deployments.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::DocPath;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

use crate::document::{CHANGE_CAPACITY, ChangeKind, DocumentChange, DocumentStore, DocumentWatch};
use crate::error::StoreResult;

/// Document store held entirely in memory.
#[derive(Clone)]
pub struct MemoryStore {
    documents: Arc<RwLock<BTreeMap<DocPath, Value>>>,
    changes: broadcast::Sender<DocumentChange>,
}

impl MemoryStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            documents: Arc::new(RwLock::new(BTreeMap::new())),
            changes,
        }
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the store holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn notify(&self, path: DocPath, kind: ChangeKind) {
        let _ = self.changes.send(DocumentChange { path, kind });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Value>> {
        Ok(self.documents.read().await.get(path).cloned())
    }

    async fn set(&self, path: &DocPath, value: Value) -> StoreResult<()> {
        self.documents.write().await.insert(path.clone(), value);
        self.notify(path.clone(), ChangeKind::Set);
        Ok(())
    }

    async fn remove(&self, path: &DocPath) -> StoreResult<()> {
        let removed: Vec<DocPath> = {
            let mut documents = self.documents.write().await;
            let doomed: Vec<DocPath> = documents
                .keys()
                .filter(|candidate| candidate.starts_with(path))
                .cloned()
                .collect();
            for candidate in &doomed {
                documents.remove(candidate);
            }
            doomed
        };
        for path in removed {
            self.notify(path, ChangeKind::Removed);
        }
        Ok(())
    }

    async fn list(&self, prefix: &DocPath) -> StoreResult<Vec<(DocPath, Value)>> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .filter(|(path, _)| *path != prefix && path.starts_with(prefix))
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect())
    }

    fn watch(&self, prefix: &DocPath) -> DocumentWatch {
        DocumentWatch::new(prefix.clone(), self.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn remove_deletes_subtree_only() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.set(&DocPath::parse("transfers/a/r/1"), json!(1)).await?;
        store.set(&DocPath::parse("transfers/a/r/2"), json!(2)).await?;
        store.set(&DocPath::parse("transfers/ab/r/3"), json!(3)).await?;

        store.remove(&DocPath::parse("transfers/a")).await?;
        assert_eq!(store.len().await, 1);
        assert!(store.get(&DocPath::parse("transfers/ab/r/3")).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn list_returns_descendants_in_order() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let parent = DocPath::parse("fcmKeys/uid");
        store.push(&parent, json!("token-a")).await?;
        store.push(&parent, json!("token-b")).await?;
        store.set(&DocPath::parse("fcmKeys/other/x"), json!("nope")).await?;

        let listed = store.list(&parent).await?;
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|(path, _)| path.parent() == Some(parent.clone())));
        Ok(())
    }

    #[tokio::test]
    async fn watch_filters_by_prefix() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let mut watch = store.watch(&DocPath::parse("removeTransfers/uid"));

        store.set(&DocPath::parse("transferring/uid/r/1"), json!({})).await?;
        store.set(&DocPath::parse("removeTransfers/uid/r/1"), json!(true)).await?;

        let change = tokio::time::timeout(Duration::from_secs(1), watch.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("watch closed"))?;
        assert_eq!(change.path.as_str(), "removeTransfers/uid/r/1");
        assert_eq!(change.kind, ChangeKind::Set);
        Ok(())
    }

    #[tokio::test]
    async fn overflowing_watch_reports_a_lag() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let prefix = DocPath::parse("removeTransfers");
        let mut watch = store.watch(&prefix);
        for n in 0..=CHANGE_CAPACITY {
            store.set(&DocPath::parse(&format!("removeTransfers/uid/r/{n}")), json!(true)).await?;
        }

        let change = tokio::time::timeout(Duration::from_secs(1), watch.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("watch closed"))?;
        assert_eq!(change.kind, ChangeKind::Lagged);
        assert_eq!(change.path, prefix);
        let next = watch.next().await.ok_or_else(|| anyhow::anyhow!("watch closed"))?;
        assert_eq!(next.kind, ChangeKind::Set);
        Ok(())
    }
}
