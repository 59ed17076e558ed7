//! Direct-link destination: the artifact stays on this host and is served over HTTP.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ferry_core::{
    EndpointKind, Sink, StagedArtifact, TransferContext, TransferError, TransferResult,
};
use ferry_links::{DirectLinkRegistry, file_id};
use tracing::{debug, info};

/// Moves the artifact under the served root and registers a public URL for it.
#[derive(Clone)]
pub struct DirectLinkSink {
    registry: DirectLinkRegistry,
    served_root: PathBuf,
}

impl DirectLinkSink {
    /// Sink serving files from `served_root`, which outlives job staging.
    #[must_use]
    pub fn new(registry: DirectLinkRegistry, served_root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            served_root: served_root.into(),
        }
    }
}

#[async_trait]
impl Sink for DirectLinkSink {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Direct
    }

    async fn publish(
        &self,
        ctx: &TransferContext,
        artifact: &StagedArtifact,
    ) -> TransferResult<String> {
        let job = &ctx.job;
        let id = file_id(&job.owner_id, job.route, &job.name);
        let slot = self.served_root.join(&id);
        let destination = slot.join(&artifact.name);
        if already_served(&destination, artifact).await {
            debug!(file_id = %id, "slot already serves this file; keeping it");
        } else {
            match tokio::fs::remove_dir_all(&slot).await {
                Ok(()) => debug!(file_id = %id, "replaced previously served file"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(TransferError::staging_io("direct_link.clear", &slot, err)),
            }
            tokio::fs::create_dir_all(&slot)
                .await
                .map_err(|err| TransferError::staging_io("direct_link.slot", &slot, err))?;
            ferry_staging::relocate(&artifact.path, &destination).await?;
        }
        let served = StagedArtifact {
            path: destination,
            ..artifact.clone()
        };

        let url = self
            .registry
            .register(job, &served)
            .await
            .map_err(|err| TransferError::publish_with("direct_link.register", err))?;
        info!(job_id = %job.id, file_id = %id, "direct link published");
        Ok(url)
    }
}

/// A duplicate job for the same source lands in the same slot; a regular file
/// with the artifact's name and size there is left in place.
async fn already_served(destination: &Path, artifact: &StagedArtifact) -> bool {
    !artifact.is_directory
        && tokio::fs::metadata(destination)
            .await
            .is_ok_and(|meta| meta.is_file() && meta.len() == artifact.size_bytes)
}
