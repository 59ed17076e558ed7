//! Removal requests for finished transfers.

use std::io::ErrorKind;
use std::path::PathBuf;

use ferry_core::DocPath;
use ferry_links::{DirectLinkRegistry, file_id_from_url};
use ferry_store::{ChangeKind, TransferStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};

/// What a removal request resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The transfer and its signal were deleted.
    Removed,
    /// The job is still running; its worker observes the signal itself.
    Running,
    /// The served file lives on another host; that host's janitor handles it.
    OtherHost,
    /// The path does not name a job.
    Ignored,
}

/// Watches `removeTransfers/` and deletes the records and files a request names.
pub struct RemovalHandler {
    store: TransferStore,
    registry: DirectLinkRegistry,
    served_root: PathBuf,
}

impl RemovalHandler {
    /// Handler deleting served files below `served_root`.
    #[must_use]
    pub fn new(
        store: TransferStore,
        registry: DirectLinkRegistry,
        served_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            registry,
            served_root: served_root.into(),
        }
    }

    /// Drain pending requests, then follow new ones until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error when the pending requests cannot be listed.
    pub async fn run(&self, shutdown: CancellationToken) -> WorkerResult<()> {
        let mut watch = self.store.removal_requests();
        let pending = self.drain().await?;
        info!(pending, "removal handler watching");

        loop {
            let change = tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                change = watch.next() => change,
            };
            match change {
                Some(change) if change.kind == ChangeKind::Set => {
                    self.handle_logged(&change.path).await;
                }
                Some(change) if change.kind == ChangeKind::Lagged => {
                    if let Err(error) = self.drain().await {
                        warn!(%error, "removal resync failed");
                    }
                }
                Some(_) => {}
                None => return Ok(()),
            }
        }
    }

    async fn drain(&self) -> WorkerResult<usize> {
        let pending = self
            .store
            .pending_removals()
            .await
            .map_err(WorkerError::store("removal.pending"))?;
        for path in &pending {
            self.handle_logged(path).await;
        }
        Ok(pending.len())
    }

    async fn handle_logged(&self, path: &DocPath) {
        match self.handle(path).await {
            Ok(removal) => debug!(%path, ?removal, "removal request handled"),
            Err(error) => warn!(%path, %error, "removal request failed"),
        }
    }

    /// Apply one removal request.
    ///
    /// For a `*-to-direct` transfer the served file tree and its direct-link record
    /// go first; the transfer record and the signal are deleted last. Requests
    /// for files served by another host are left pending for that host.
    ///
    /// # Errors
    ///
    /// Returns an error when a store, link or filesystem delete fails.
    pub async fn handle(&self, path: &DocPath) -> WorkerResult<Removal> {
        let Some(key) = path.job_key() else {
            return Ok(Removal::Ignored);
        };
        if self
            .store
            .progress(&key)
            .await
            .map_err(WorkerError::store("removal.progress"))?
            .is_some()
        {
            return Ok(Removal::Running);
        }

        let record = self
            .store
            .transfer(&key)
            .await
            .map_err(WorkerError::store("removal.transfer"))?;
        let file_id = record
            .as_ref()
            .and_then(|record| record.direct_link.as_deref())
            .filter(|_| key.route.is_direct_link())
            .and_then(file_id_from_url);
        if let Some(file_id) = file_id {
            let link = self
                .registry
                .resolve(file_id)
                .await
                .map_err(WorkerError::links("removal.direct_link"))?;
            let host = self
                .registry
                .host()
                .await
                .map_err(WorkerError::links("removal.host"))?;
            if let Some(link) = link.filter(|link| !link.is_served_by(host)) {
                debug!(%path, owner = %link.host, "removal belongs to another host");
                return Ok(Removal::OtherHost);
            }
            let served = self.served_root.join(file_id);
            match tokio::fs::remove_dir_all(&served).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(WorkerError::ServedIo {
                        path: served,
                        source,
                    });
                }
            }
            self.registry
                .remove(file_id)
                .await
                .map_err(WorkerError::links("removal.direct_link"))?;
        }

        self.store
            .remove_transfer(&key)
            .await
            .map_err(WorkerError::store("removal.record"))?;
        self.store
            .clear_removal(&key)
            .await
            .map_err(WorkerError::store("removal.signal"))?;
        info!(job_id = %key.job_id, route = key.route.name(), "transfer removed");
        Ok(Removal::Removed)
    }
}
