//! Directory archival for sinks that only accept single files.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use ferry_core::StagedArtifact;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{StagingError, StagingResult};

/// MIME type of produced archives.
pub const ARCHIVE_MIME: &str = "application/zip";

const PARTIAL_SUFFIX: &str = ".zip.partial";

/// Compress a staged directory into `<name>.zip` next to it.
///
/// The archive keeps the directory name as its top-level entry. `on_progress`
/// receives the percentage of bytes written each time it advances. The source
/// directory is removed once the archive is complete, so staging still holds a
/// single artifact.
///
/// # Errors
///
/// Returns an error when the tree cannot be read or the archive cannot be written.
pub async fn zip_directory<F>(artifact: &StagedArtifact, on_progress: F) -> StagingResult<StagedArtifact>
where
    F: FnMut(u8) + Send + 'static,
{
    let source = artifact.path.clone();
    let parent = source
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let partial = parent.join(format!("{}{PARTIAL_SUFFIX}", artifact.name));
    let archive = parent.join(format!("{}.zip", artifact.name));
    let total = artifact.size_bytes;
    let top = artifact.name.clone();

    let written = partial.clone();
    tokio::task::spawn_blocking(move || write_archive(&source, &top, &written, total, on_progress))
        .await
        .map_err(|_| StagingError::TaskAborted {
            operation: "archive.write",
        })??;

    tokio::fs::remove_dir_all(&artifact.path)
        .await
        .map_err(|err| StagingError::io("archive.remove_source", &artifact.path, err))?;
    tokio::fs::rename(&partial, &archive)
        .await
        .map_err(|err| StagingError::io("archive.finalize", &archive, err))?;
    let size_bytes = tokio::fs::metadata(&archive)
        .await
        .map_err(|err| StagingError::io("archive.stat", &archive, err))?
        .len();
    debug!(archive = %archive.display(), size_bytes, "directory archived");

    Ok(StagedArtifact {
        name: format!("{}.zip", artifact.name),
        path: archive,
        mime_type: ARCHIVE_MIME.to_string(),
        size_bytes,
        is_directory: false,
    })
}

fn write_archive<F>(
    source: &Path,
    top: &str,
    destination: &Path,
    total: u64,
    mut on_progress: F,
) -> StagingResult<()>
where
    F: FnMut(u8),
{
    let file = File::create(destination)
        .map_err(|err| StagingError::io("archive.create", destination, err))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    let mut tracker = ByteTracker::new(total);
    on_progress(0);

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|err| StagingError::walkdir("archive.walk", source, err))?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let name = entry_name(top, relative);
        if entry.file_type().is_dir() {
            zip.add_directory(name, options)
                .map_err(|err| StagingError::zip("archive.add_directory", entry.path(), err))?;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        zip.start_file(name, options)
            .map_err(|err| StagingError::zip("archive.start_file", entry.path(), err))?;
        let mut input = File::open(entry.path())
            .map_err(|err| StagingError::io("archive.open_entry", entry.path(), err))?;
        copy_counting(&mut input, &mut zip, &mut tracker, &mut on_progress)
            .map_err(|err| StagingError::io("archive.copy_entry", entry.path(), err))?;
    }

    zip.finish()
        .map_err(|err| StagingError::zip("archive.finish", destination, err))?
        .sync_all()
        .map_err(|err| StagingError::io("archive.sync", destination, err))?;
    on_progress(100);
    Ok(())
}

fn entry_name(top: &str, relative: &Path) -> String {
    let mut name = top.to_string();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

fn copy_counting<R, W, F>(
    input: &mut R,
    output: &mut W,
    tracker: &mut ByteTracker,
    on_progress: &mut F,
) -> io::Result<()>
where
    R: Read,
    W: Write,
    F: FnMut(u8),
{
    let mut buf = vec![0_u8; 64 * 1024];
    loop {
        let read = input.read(&mut buf)?;
        if read == 0 {
            return Ok(());
        }
        output.write_all(&buf[..read])?;
        if let Some(percentage) = tracker.advance(read as u64) {
            on_progress(percentage);
        }
    }
}

/// Converts written bytes into percentage steps, emitting only on change.
#[derive(Debug)]
struct ByteTracker {
    total: u64,
    done: u64,
    last: u8,
}

impl ByteTracker {
    const fn new(total: u64) -> Self {
        Self {
            total,
            done: 0,
            last: 0,
        }
    }

    fn advance(&mut self, bytes: u64) -> Option<u8> {
        self.done = self.done.saturating_add(bytes);
        let percentage = if self.total == 0 {
            100
        } else {
            let scaled = self.done.saturating_mul(100) / self.total;
            u8::try_from(scaled.min(99)).unwrap_or(99)
        };
        (percentage > self.last).then(|| {
            self.last = percentage;
            percentage
        })
    }
}

/// Move a file or tree into place, copying when a rename crosses filesystems.
///
/// # Errors
///
/// Returns an error when neither rename nor copy succeeds.
pub async fn relocate(source: &Path, destination: &Path) -> StagingResult<()> {
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || move_tree(&source, &destination))
        .await
        .map_err(|_| StagingError::TaskAborted {
            operation: "relocate",
        })?
}

fn move_tree(source: &Path, destination: &Path) -> StagingResult<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| StagingError::io("relocate.create_parent", parent, err))?;
    }
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    copy_tree(source, destination)?;
    let removed = if source.is_dir() {
        fs::remove_dir_all(source)
    } else {
        fs::remove_file(source)
    };
    match removed {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StagingError::io("relocate.cleanup", source, err)),
    }
}

fn copy_tree(source: &Path, destination: &Path) -> StagingResult<()> {
    if source.is_file() {
        fs::copy(source, destination)
            .map_err(|err| StagingError::io("relocate.copy_file", destination, err))?;
        return Ok(());
    }
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|err| StagingError::walkdir("relocate.walk", source, err))?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|err| StagingError::io("relocate.create_dir", &target, err))?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|err| StagingError::io("relocate.copy_entry", &target, err))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::inspect;

    #[test]
    fn tracker_emits_monotonic_steps() {
        let mut tracker = ByteTracker::new(200);
        assert_eq!(tracker.advance(1), None);
        assert_eq!(tracker.advance(99), Some(50));
        assert_eq!(tracker.advance(0), None);
        assert_eq!(tracker.advance(100), Some(99));

        let mut empty = ByteTracker::new(0);
        assert_eq!(empty.advance(0), Some(100));
    }

    #[tokio::test]
    async fn zipping_replaces_directory_with_archive() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("photos");
        tokio::fs::create_dir_all(root.join("2024")).await?;
        tokio::fs::write(root.join("a.jpg"), vec![1_u8; 4096]).await?;
        tokio::fs::write(root.join("2024/b.jpg"), vec![2_u8; 4096]).await?;
        let artifact = inspect::inspect(&root).await?;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let archived = zip_directory(&artifact, move |pct| {
            if let Ok(mut seen) = sink.lock() {
                seen.push(pct);
            }
        })
        .await?;

        assert_eq!(archived.name, "photos.zip");
        assert_eq!(archived.mime_type, ARCHIVE_MIME);
        assert!(!archived.is_directory);
        assert!(!root.exists());
        assert_eq!(archived.size_bytes, std::fs::metadata(&archived.path)?.len());
        let staged = inspect::single_artifact(temp.path()).await?;
        assert_eq!(staged.path, archived.path);

        let mut reader = zip::ZipArchive::new(File::open(&archived.path)?)?;
        let mut names: Vec<String> = (0..reader.len())
            .map(|index| reader.by_index(index).map(|entry| entry.name().to_string()))
            .collect::<Result<_, _>>()?;
        names.sort();
        assert!(names.contains(&"photos/a.jpg".to_string()));
        assert!(names.contains(&"photos/2024/b.jpg".to_string()));

        let seen = seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        Ok(())
    }

    #[tokio::test]
    async fn relocate_moves_files_and_trees() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let file = temp.path().join("movie.mkv");
        tokio::fs::write(&file, b"frames").await?;
        let target = temp.path().join("served/abc/movie.mkv");
        relocate(&file, &target).await?;
        assert!(!file.exists());
        assert_eq!(tokio::fs::read(&target).await?, b"frames");

        let tree = temp.path().join("season");
        tokio::fs::create_dir_all(tree.join("e1")).await?;
        tokio::fs::write(tree.join("e1/ep.mkv"), b"x").await?;
        let moved = temp.path().join("served/def/season");
        relocate(&tree, &moved).await?;
        assert!(moved.join("e1/ep.mkv").exists());
        assert!(!tree.exists());
        Ok(())
    }

    #[test]
    fn copy_fallback_duplicates_tree() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let tree = temp.path().join("src");
        std::fs::create_dir_all(tree.join("deep/er"))?;
        std::fs::write(tree.join("deep/er/f"), b"y")?;
        let copy = temp.path().join("dst");
        copy_tree(&tree, &copy)?;
        assert_eq!(std::fs::read(copy.join("deep/er/f"))?, b"y");
        Ok(())
    }
}
