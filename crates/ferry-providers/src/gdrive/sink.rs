use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ferry_core::{EndpointKind, Sink, StagedArtifact, TransferContext, TransferResult};
use ferry_staging::mime_for_path;
use tracing::{debug, info};

use super::client::{DriveClient, DriveSession};
use crate::error::{ProviderError, ProviderResult};
use crate::progress::ProgressPump;

const PUBLISH_MESSAGE: &str = "Transferring to Google Drive";

/// Uploads files or folder trees below the well-known folder and shares them.
#[derive(Clone)]
pub struct GDriveSink {
    client: DriveClient,
}

impl GDriveSink {
    /// Sink backed by a shared Drive client.
    #[must_use]
    pub const fn new(client: DriveClient) -> Self {
        Self { client }
    }

    async fn publish_with(
        &self,
        session: &DriveSession,
        ctx: &TransferContext,
        artifact: &StagedArtifact,
    ) -> ProviderResult<String> {
        let folder_name = &self.client.config().folder_name;
        let folder = match session.find_folder(folder_name, None).await? {
            Some(folder) => folder,
            None => {
                info!(folder = %folder_name, "creating drive upload folder");
                session.create_folder(folder_name, None).await?
            }
        };

        let published = if artifact.is_directory {
            upload_tree(session, ctx, &artifact.path, &artifact.name, &folder.id).await?
        } else {
            let pump = ProgressPump::start(ctx, &artifact.name, PUBLISH_MESSAGE);
            let uploaded = session
                .upload_file(
                    &artifact.path,
                    &artifact.name,
                    &artifact.mime_type,
                    &folder.id,
                    &pump,
                )
                .await;
            pump.finish().await;
            uploaded?.id
        };

        session.share(&published).await?;
        session.web_view_link(&published).await
    }
}

#[async_trait]
impl Sink for GDriveSink {
    fn kind(&self) -> EndpointKind {
        EndpointKind::GDrive
    }

    fn accepts_directories(&self) -> bool {
        true
    }

    async fn publish(
        &self,
        ctx: &TransferContext,
        artifact: &StagedArtifact,
    ) -> TransferResult<String> {
        let session = self
            .client
            .session(&ctx.job.owner_id, ProviderError::into_publish_failure)
            .await?;
        let link = self
            .publish_with(&session, ctx, artifact)
            .await
            .map_err(ProviderError::into_publish_failure)?;
        info!(job_id = %ctx.job.id, %link, "drive publish finished");
        Ok(link)
    }
}

/// Mirror a local tree below `parent_id`; returns the id of the created top folder.
async fn upload_tree(
    session: &DriveSession,
    ctx: &TransferContext,
    root: &Path,
    name: &str,
    parent_id: &str,
) -> ProviderResult<String> {
    let top = session.create_folder(name, Some(parent_id)).await?;
    let mut pending: Vec<(PathBuf, String)> = vec![(root.to_path_buf(), top.id.clone())];
    while let Some((directory, folder_id)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&directory)
            .await
            .map_err(ProviderError::io("drive.publish.read_dir", &directory))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(ProviderError::io("drive.publish.read_dir", &directory))?
        {
            let path = entry.path();
            let entry_name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry
                .file_type()
                .await
                .map_err(ProviderError::io("drive.publish.stat", &path))?;
            if file_type.is_dir() {
                let child = session.create_folder(&entry_name, Some(&folder_id)).await?;
                pending.push((path, child.id));
            } else if file_type.is_file() {
                let pump = ProgressPump::start(ctx, &entry_name, PUBLISH_MESSAGE);
                let uploaded = session
                    .upload_file(&path, &entry_name, mime_for_path(&path), &folder_id, &pump)
                    .await;
                pump.finish().await;
                debug!(name = %entry_name, "drive entry uploaded");
                uploaded?;
            }
        }
    }
    Ok(top.id)
}
