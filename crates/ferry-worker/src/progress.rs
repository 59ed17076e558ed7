//! Progress reporter writing to the shared store.

use async_trait::async_trait;
use ferry_core::{JobKey, ProgressRecord, ProgressReporter};
use ferry_store::TransferStore;
use ferry_telemetry::Metrics;
use tracing::warn;

/// Overwrites `transferring/{owner}/{route}/{job}`; failures are logged and counted.
pub struct StoreProgress {
    store: TransferStore,
    key: JobKey,
    metrics: Metrics,
}

impl StoreProgress {
    /// Reporter for one job.
    #[must_use]
    pub const fn new(store: TransferStore, key: JobKey, metrics: Metrics) -> Self {
        Self {
            store,
            key,
            metrics,
        }
    }
}

#[async_trait]
impl ProgressReporter for StoreProgress {
    async fn report(&self, record: ProgressRecord) {
        if let Err(error) = self.store.record_progress(&self.key, &record).await {
            self.metrics.inc_progress_write_failure();
            warn!(
                job_id = %self.key.job_id,
                route = self.key.route.name(),
                %error,
                "progress write failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::{JobId, OwnerId, Route};
    use ferry_store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn records_overwrite_the_progress_document() -> anyhow::Result<()> {
        let store = TransferStore::new(Arc::new(MemoryStore::new()));
        let key = JobKey {
            owner_id: OwnerId::from("uid"),
            route: Route::MegaToGDrive,
            job_id: JobId::new(),
        };
        let metrics = Metrics::new()?;
        let reporter = StoreProgress::new(store.clone(), key.clone(), metrics.clone());

        reporter
            .report(ProgressRecord::new("a.bin", "Transferring from source", 10))
            .await;
        reporter
            .report(ProgressRecord::new("a.bin", "Transferring to destination", 60))
            .await;

        let stored = store.progress(&key).await?.expect("progress record");
        assert_eq!(stored.percentage, 60);
        assert_eq!(stored.message, "Transferring to destination");
        assert_eq!(metrics.snapshot().progress_write_failures_total, 0);
        Ok(())
    }
}
