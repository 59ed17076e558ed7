//! Capabilities implemented by endpoint adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{TransferError, TransferResult};
use crate::model::{Job, ProgressRecord, StagedArtifact};
use crate::route::EndpointKind;

/// Receives progress updates for the running job.
///
/// Writes are fire-and-forget: implementations log failures and never surface them
/// to the adapter.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Overwrite the job's progress record.
    async fn report(&self, record: ProgressRecord);
}

/// Per-job state handed to adapters.
#[derive(Clone)]
pub struct TransferContext {
    /// Job being executed.
    pub job: Job,
    staging_dir: PathBuf,
    progress: Arc<dyn ProgressReporter>,
}

impl TransferContext {
    /// Build a context rooted at the job's private staging directory.
    #[must_use]
    pub fn new(job: Job, staging_dir: PathBuf, progress: Arc<dyn ProgressReporter>) -> Self {
        Self {
            job,
            staging_dir,
            progress,
        }
    }

    /// Path of the job's staging directory; it may not exist yet.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Create the staging directory on first write and return its path.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::StagingIo`] when the directory cannot be created.
    pub async fn ensure_staging(&self) -> TransferResult<&Path> {
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|err| TransferError::staging_io("staging.create", &self.staging_dir, err))?;
        Ok(&self.staging_dir)
    }

    /// Publish a progress update for the job.
    pub async fn report(&self, name: &str, message: impl Into<String>, percentage: u8) {
        self.progress
            .report(ProgressRecord::new(name, message, percentage))
            .await;
    }

    /// Shared progress reporter, for adapters that sample from background tasks.
    #[must_use]
    pub fn progress(&self) -> Arc<dyn ProgressReporter> {
        Arc::clone(&self.progress)
    }
}

/// Fetches an artifact from an origin into staging.
#[async_trait]
pub trait Source: Send + Sync {
    /// Endpoint class this source reads from.
    fn kind(&self) -> EndpointKind;

    /// Populate the job's staging directory with exactly one artifact.
    async fn fetch(&self, ctx: &TransferContext) -> TransferResult<StagedArtifact>;

    /// Release per-job resources held outside staging. Called on every exit path,
    /// including after the fetch future was dropped by cancellation.
    async fn release(&self, job: &Job) -> TransferResult<()> {
        let _ = job;
        Ok(())
    }
}

/// Publishes a staged artifact to a destination and returns its descriptor URL.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Endpoint class this sink writes to.
    fn kind(&self) -> EndpointKind;

    /// Whether the sink uploads directory trees itself; otherwise they are archived first.
    fn accepts_directories(&self) -> bool {
        false
    }

    /// Publish the artifact and return the destination URL.
    async fn publish(
        &self,
        ctx: &TransferContext,
        artifact: &StagedArtifact,
    ) -> TransferResult<String>;
}
