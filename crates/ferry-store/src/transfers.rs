//! Typed facade over the document layout used by workers and the API.

use std::sync::Arc;

use ferry_core::paths::{DNS, REMOVE_TRANSFERS};
use ferry_core::{
    DirectLinkRecord, DnsRecord, DocPath, JobKey, OwnerId, ProgressRecord, TorrentStats,
    TransferRecord,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::document::{ChangeKind, DocumentStore, DocumentWatch};
use crate::error::{StoreResult, serde_err};

/// Typed accessors for transfer documents.
#[derive(Clone)]
pub struct TransferStore {
    documents: Arc<dyn DocumentStore>,
}

impl TransferStore {
    /// Wrap a document store backend.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Underlying backend.
    #[must_use]
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    async fn read<T: DeserializeOwned>(&self, path: &DocPath) -> StoreResult<Option<T>> {
        self.documents
            .get(path)
            .await?
            .map(|value| serde_json::from_value(value).map_err(serde_err("documents.decode", path)))
            .transpose()
    }

    async fn write<T: Serialize>(&self, path: &DocPath, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(serde_err("documents.encode", path))?;
        self.documents.set(path, value).await
    }

    /// Overwrite the job's transient progress record.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend write fails.
    pub async fn record_progress(&self, key: &JobKey, record: &ProgressRecord) -> StoreResult<()> {
        self.write(&DocPath::transferring(key), record).await
    }

    /// Current progress record, if the job is running.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend read or decode fails.
    pub async fn progress(&self, key: &JobKey) -> StoreResult<Option<ProgressRecord>> {
        self.read(&DocPath::transferring(key)).await
    }

    /// Delete the job's progress record.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend delete fails.
    pub async fn remove_progress(&self, key: &JobKey) -> StoreResult<()> {
        self.documents.remove(&DocPath::transferring(key)).await
    }

    /// Write the permanent transfer record.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend write fails.
    pub async fn record_transfer(&self, key: &JobKey, record: &TransferRecord) -> StoreResult<()> {
        self.write(&DocPath::transfers(key), record).await
    }

    /// Permanent transfer record, if one was written.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend read or decode fails.
    pub async fn transfer(&self, key: &JobKey) -> StoreResult<Option<TransferRecord>> {
        self.read(&DocPath::transfers(key)).await
    }

    /// Delete a permanent transfer record.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend delete fails.
    pub async fn remove_transfer(&self, key: &JobKey) -> StoreResult<()> {
        self.documents.remove(&DocPath::transfers(key)).await
    }

    /// Store a direct-link registry entry.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend write fails.
    pub async fn put_direct_link(&self, file_id: &str, record: &DirectLinkRecord) -> StoreResult<()> {
        self.write(&DocPath::direct_link(file_id), record).await
    }

    /// Look up a direct-link registry entry.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend read or decode fails.
    pub async fn direct_link(&self, file_id: &str) -> StoreResult<Option<DirectLinkRecord>> {
        self.read(&DocPath::direct_link(file_id)).await
    }

    /// Delete a direct-link registry entry.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend delete fails.
    pub async fn remove_direct_link(&self, file_id: &str) -> StoreResult<()> {
        self.documents.remove(&DocPath::direct_link(file_id)).await
    }

    /// Every registered host.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend list or decode fails.
    pub async fn dns_records(&self) -> StoreResult<Vec<DnsRecord>> {
        self.read_all(&DocPath::root(DNS)).await
    }

    /// Register a host under a generated identifier.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend write fails.
    pub async fn register_dns(&self, record: &DnsRecord) -> StoreResult<DocPath> {
        let parent = DocPath::root(DNS);
        let value = serde_json::to_value(record).map_err(serde_err("documents.encode", &parent))?;
        self.documents.push(&parent, value).await
    }

    /// Stored cloud-drive refresh credential for the owner.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend read or decode fails.
    pub async fn refresh_token(&self, owner_id: &OwnerId) -> StoreResult<Option<String>> {
        self.read(&DocPath::refresh_token(owner_id)).await
    }

    /// Store a cloud-drive refresh credential for the owner.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend write fails.
    pub async fn set_refresh_token(&self, owner_id: &OwnerId, token: &str) -> StoreResult<()> {
        self.write(&DocPath::refresh_token(owner_id), &token).await
    }

    /// Push-notification tokens registered by the owner.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend list or decode fails.
    pub async fn fcm_tokens(&self, owner_id: &OwnerId) -> StoreResult<Vec<String>> {
        self.read_all(&DocPath::fcm_keys(owner_id)).await
    }

    /// Register a push-notification token for the owner.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend write fails.
    pub async fn add_fcm_token(&self, owner_id: &OwnerId, token: &str) -> StoreResult<DocPath> {
        self.documents
            .push(&DocPath::fcm_keys(owner_id), Value::String(token.to_string()))
            .await
    }

    /// Overwrite the torrent statistics snapshot for a job.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend write fails.
    pub async fn record_torrent_stats(&self, key: &JobKey, stats: &TorrentStats) -> StoreResult<()> {
        self.write(&DocPath::torrents(key), stats).await
    }

    /// Latest torrent statistics snapshot for a job.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend read or decode fails.
    pub async fn torrent_stats(&self, key: &JobKey) -> StoreResult<Option<TorrentStats>> {
        self.read(&DocPath::torrents(key)).await
    }

    /// Delete the torrent statistics snapshot and the torrent cancellation signal.
    ///
    /// # Errors
    ///
    /// Returns an error when a backend delete fails.
    pub async fn remove_torrent_state(&self, key: &JobKey) -> StoreResult<()> {
        self.documents.remove(&DocPath::torrents(key)).await?;
        self.documents.remove(&DocPath::remove_torrents(key)).await
    }

    /// Write the cancellation/removal signal for a job.
    ///
    /// Torrent jobs are signalled on `removeTorrents`, every other route on
    /// `removeTransfers`.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend write fails.
    pub async fn request_removal(&self, key: &JobKey) -> StoreResult<()> {
        let path = if key.route.is_torrent() {
            DocPath::remove_torrents(key)
        } else {
            DocPath::remove_transfers(key)
        };
        self.documents.set(&path, json!(true)).await
    }

    /// Clear every cancellation signal for a job.
    ///
    /// # Errors
    ///
    /// Returns an error when a backend delete fails.
    pub async fn clear_removal(&self, key: &JobKey) -> StoreResult<()> {
        self.documents.remove(&DocPath::remove_transfers(key)).await?;
        self.documents.remove(&DocPath::remove_torrents(key)).await
    }

    /// Subscribe to the cancellation signals of exactly one job.
    ///
    /// The subscription is taken before the existing signals are checked, so a signal
    /// written at any point after this call is observed.
    #[must_use]
    pub fn cancellation(&self, key: &JobKey) -> CancellationWatch {
        let paths = vec![DocPath::remove_transfers(key), DocPath::remove_torrents(key)];
        let watches = paths.iter().map(|path| self.documents.watch(path)).collect();
        CancellationWatch {
            documents: Arc::clone(&self.documents),
            paths,
            watches,
        }
    }

    /// Subscribe to every transfer removal signal.
    #[must_use]
    pub fn removal_requests(&self) -> DocumentWatch {
        self.documents.watch(&DocPath::root(REMOVE_TRANSFERS))
    }

    /// Removal signals currently pending.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend list fails.
    pub async fn pending_removals(&self) -> StoreResult<Vec<DocPath>> {
        Ok(self
            .documents
            .list(&DocPath::root(REMOVE_TRANSFERS))
            .await?
            .into_iter()
            .map(|(path, _)| path)
            .collect())
    }

    async fn read_all<T: DeserializeOwned>(&self, prefix: &DocPath) -> StoreResult<Vec<T>> {
        self.documents
            .list(prefix)
            .await?
            .into_iter()
            .map(|(path, value)| {
                serde_json::from_value(value).map_err(serde_err("documents.decode", &path))
            })
            .collect()
    }
}

/// Per-job cancellation subscription. Dropping it unsubscribes.
pub struct CancellationWatch {
    documents: Arc<dyn DocumentStore>,
    paths: Vec<DocPath>,
    watches: Vec<DocumentWatch>,
}

impl CancellationWatch {
    /// Resolve once a cancellation signal exists for the job.
    ///
    /// Never resolves when the backend shuts down without a signal. A lagged
    /// subscription re-reads the signal paths before waiting again.
    pub async fn cancelled(&mut self) {
        while !self.signalled().await {
            let [first, second] = self.watches.as_mut_slice() else {
                return std::future::pending().await;
            };
            loop {
                let change = tokio::select! {
                    change = first.next() => change,
                    change = second.next() => change,
                };
                match change {
                    Some(change) if change.kind == ChangeKind::Set => return,
                    Some(change) if change.kind == ChangeKind::Lagged => break,
                    Some(_) => {}
                    None => return std::future::pending().await,
                }
            }
        }
    }

    async fn signalled(&self) -> bool {
        for path in &self.paths {
            if matches!(self.documents.get(path).await, Ok(Some(_))) {
                return true;
            }
        }
        false
    }
}
