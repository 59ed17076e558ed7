use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ferry_core::{EndpointKind, Source, StagedArtifact, TransferContext, TransferError, TransferResult};
use tracing::{info, warn};

use super::client::{DriveClient, DriveFile, DriveSession};
use super::DriveTarget;
use crate::error::{ProviderError, ProviderResult};

const FETCH_MESSAGE: &str = "Transferring from Google Drive";

/// Fetches a shared file or folder tree into staging.
#[derive(Clone)]
pub struct GDriveSource {
    client: DriveClient,
}

impl GDriveSource {
    /// Source backed by a shared Drive client.
    #[must_use]
    pub const fn new(client: DriveClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Source for GDriveSource {
    fn kind(&self) -> EndpointKind {
        EndpointKind::GDrive
    }

    async fn fetch(&self, ctx: &TransferContext) -> TransferResult<StagedArtifact> {
        let url = &ctx.job.source_url;
        let target = DriveTarget::parse(url).ok_or_else(|| TransferError::unrecognized(url))?;
        let session = self
            .client
            .session(&ctx.job.owner_id, ProviderError::into_fetch_failure)
            .await?;
        let staging = ctx.ensure_staging().await?.to_path_buf();

        let path = match target {
            DriveTarget::File(id) => fetch_file(&session, &id, &staging, ctx).await,
            DriveTarget::Folder(id) => fetch_folder(&session, &id, &staging, ctx).await,
        }
        .map_err(ProviderError::into_fetch_failure)?;
        info!(job_id = %ctx.job.id, path = %path.display(), "drive fetch finished");
        Ok(ferry_staging::inspect(&path).await?)
    }
}

async fn fetch_file(
    session: &DriveSession,
    id: &str,
    staging: &Path,
    ctx: &TransferContext,
) -> ProviderResult<PathBuf> {
    let file = session.metadata(id).await?;
    if file.is_folder() {
        return fetch_folder(session, id, staging, ctx).await;
    }
    let destination = staging.join(safe_name(&file));
    session.download_to(&file, &destination, ctx, FETCH_MESSAGE).await?;
    Ok(destination)
}

async fn fetch_folder(
    session: &DriveSession,
    id: &str,
    staging: &Path,
    ctx: &TransferContext,
) -> ProviderResult<PathBuf> {
    let folder = session.metadata(id).await?;
    let root = staging.join(safe_name(&folder));
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(ProviderError::io("drive.fetch.create_dir", &root))?;

    // Depth-first, one download at a time.
    let mut pending = vec![(folder.id.clone(), root.clone())];
    while let Some((parent_id, directory)) = pending.pop() {
        for child in session.children(&parent_id).await? {
            let path = directory.join(safe_name(&child));
            if child.is_folder() {
                tokio::fs::create_dir_all(&path)
                    .await
                    .map_err(ProviderError::io("drive.fetch.create_dir", &path))?;
                pending.push((child.id.clone(), path));
            } else if child.is_native_document() {
                warn!(file_id = %child.id, name = %child.name, "skipping native document without binary content");
            } else {
                session.download_to(&child, &path, ctx, FETCH_MESSAGE).await?;
            }
        }
    }
    Ok(root)
}

/// Local file name for a Drive object; path separators are not allowed through.
fn safe_name(file: &DriveFile) -> String {
    let cleaned: String = file
        .name
        .chars()
        .map(|ch| if matches!(ch, '/' | '\\' | '\0') { '_' } else { ch })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => file.id.clone(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> DriveFile {
        DriveFile {
            id: "fallback-id".into(),
            name: name.into(),
            mime_type: String::new(),
            size: None,
        }
    }

    #[test]
    fn names_cannot_escape_staging() {
        assert_eq!(safe_name(&named("../etc/passwd")), ".._etc_passwd");
        assert_eq!(safe_name(&named("..")), "fallback-id");
        assert_eq!(safe_name(&named("")), "fallback-id");
        assert_eq!(safe_name(&named("report.pdf")), "report.pdf");
    }
}
