//! Describe what an adapter left in staging.

use std::path::{Path, PathBuf};

use ferry_core::StagedArtifact;
use walkdir::WalkDir;

use crate::error::{StagingError, StagingResult};

/// MIME type reported for directory artifacts.
pub const DIRECTORY_MIME: &str = "inode/directory";
/// Fallback MIME type for unknown extensions.
pub const DEFAULT_MIME: &str = "application/octet-stream";

const MIME_TABLE: &[(&str, &str)] = &[
    ("7z", "application/x-7z-compressed"),
    ("aac", "audio/aac"),
    ("avi", "video/x-msvideo"),
    ("bz2", "application/x-bzip2"),
    ("csv", "text/csv"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("epub", "application/epub+zip"),
    ("flac", "audio/flac"),
    ("gif", "image/gif"),
    ("gz", "application/gzip"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("iso", "application/x-iso9660-image"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("json", "application/json"),
    ("mkv", "video/x-matroska"),
    ("mov", "video/quicktime"),
    ("mp3", "audio/mpeg"),
    ("mp4", "video/mp4"),
    ("ogg", "audio/ogg"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("rar", "application/vnd.rar"),
    ("srt", "application/x-subrip"),
    ("svg", "image/svg+xml"),
    ("tar", "application/x-tar"),
    ("torrent", "application/x-bittorrent"),
    ("txt", "text/plain"),
    ("wav", "audio/wav"),
    ("webm", "video/webm"),
    ("webp", "image/webp"),
    ("xml", "application/xml"),
    ("zip", "application/zip"),
];

/// MIME type for a file path, looked up by lowercase extension.
#[must_use]
pub fn mime_for_path(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return DEFAULT_MIME;
    };
    let extension = extension.to_ascii_lowercase();
    MIME_TABLE
        .binary_search_by(|(candidate, _)| candidate.cmp(&extension.as_str()))
        .map_or(DEFAULT_MIME, |index| MIME_TABLE[index].1)
}

/// Describe a file or directory on disk.
///
/// # Errors
///
/// Returns an error when the path cannot be read.
pub async fn inspect(path: &Path) -> StagingResult<StagedArtifact> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|err| StagingError::io("staging.inspect", path, err))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if metadata.is_dir() {
        let size_bytes = aggregate_size(path.to_path_buf()).await?;
        Ok(StagedArtifact {
            name,
            path: path.to_path_buf(),
            mime_type: DIRECTORY_MIME.to_string(),
            size_bytes,
            is_directory: true,
        })
    } else {
        Ok(StagedArtifact {
            name,
            path: path.to_path_buf(),
            mime_type: mime_for_path(path).to_string(),
            size_bytes: metadata.len(),
            is_directory: false,
        })
    }
}

/// Describe the single artifact an adapter placed in `staging_dir`.
///
/// # Errors
///
/// Returns [`StagingError::ArtifactCount`] when the directory is missing, empty
/// or holds more than one entry.
pub async fn single_artifact(staging_dir: &Path) -> StagingResult<StagedArtifact> {
    let mut entries = match tokio::fs::read_dir(staging_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(StagingError::ArtifactCount {
                path: staging_dir.to_path_buf(),
                found: 0,
            });
        }
        Err(err) => return Err(StagingError::io("staging.inspect", staging_dir, err)),
    };
    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| StagingError::io("staging.inspect", staging_dir, err))?
    {
        found.push(entry.path());
    }
    match found.as_slice() {
        [only] => inspect(only).await,
        _ => Err(StagingError::ArtifactCount {
            path: staging_dir.to_path_buf(),
            found: found.len(),
        }),
    }
}

/// Total size in bytes of all regular files below `root`.
///
/// # Errors
///
/// Returns an error when the tree cannot be walked.
pub async fn aggregate_size(root: PathBuf) -> StagingResult<u64> {
    tokio::task::spawn_blocking(move || {
        let mut total = 0_u64;
        for entry in WalkDir::new(&root) {
            let entry =
                entry.map_err(|err| StagingError::walkdir("staging.aggregate_size", &root, err))?;
            if entry.file_type().is_file() {
                let metadata = entry
                    .metadata()
                    .map_err(|err| StagingError::walkdir("staging.aggregate_size", &root, err))?;
                total = total.saturating_add(metadata.len());
            }
        }
        Ok(total)
    })
    .await
    .map_err(|_| StagingError::TaskAborted {
        operation: "staging.aggregate_size",
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_table_is_sorted_for_lookup() {
        assert!(MIME_TABLE.windows(2).all(|pair| pair[0].0 < pair[1].0));
    }

    #[test]
    fn mime_lookup_ignores_case_and_defaults() {
        assert_eq!(mime_for_path(Path::new("Movie.MKV")), "video/x-matroska");
        assert_eq!(mime_for_path(Path::new("a/b/report.pdf")), "application/pdf");
        assert_eq!(mime_for_path(Path::new("README")), DEFAULT_MIME);
        assert_eq!(mime_for_path(Path::new("blob.qqq")), DEFAULT_MIME);
    }

    #[tokio::test]
    async fn directories_report_aggregate_size() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("album");
        tokio::fs::create_dir_all(root.join("disc2")).await?;
        tokio::fs::write(root.join("one.mp3"), vec![0_u8; 10]).await?;
        tokio::fs::write(root.join("disc2/two.mp3"), vec![0_u8; 32]).await?;

        let artifact = single_artifact(temp.path()).await?;
        assert_eq!(artifact.name, "album");
        assert!(artifact.is_directory);
        assert_eq!(artifact.mime_type, DIRECTORY_MIME);
        assert_eq!(artifact.size_bytes, 42);
        Ok(())
    }

    #[tokio::test]
    async fn single_artifact_rejects_empty_and_crowded_staging() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let err = single_artifact(&temp.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, StagingError::ArtifactCount { found: 0, .. }));

        tokio::fs::write(temp.path().join("a.txt"), b"a").await?;
        let artifact = single_artifact(temp.path()).await?;
        assert_eq!(artifact.mime_type, "text/plain");
        assert_eq!(artifact.size_bytes, 1);

        tokio::fs::write(temp.path().join("b.txt"), b"b").await?;
        let err = single_artifact(temp.path()).await.unwrap_err();
        assert!(matches!(err, StagingError::ArtifactCount { found: 2, .. }));
        Ok(())
    }
}
