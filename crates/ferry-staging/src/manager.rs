//! Per-job staging directory allocation and unconditional cleanup.
//!
//! Each live directory is guarded by an advisory lock on a sibling
//! `job-<id>.lock` file, so workers sharing a root never sweep each other.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use ferry_core::JobId;
use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::error::{StagingError, StagingResult};

/// Prefix shared by every job staging directory.
pub const JOB_DIR_PREFIX: &str = "job-";

const LOCK_SUFFIX: &str = ".lock";

/// Allocates private staging directories below a shared root.
#[derive(Debug, Clone)]
pub struct StagingManager {
    root: PathBuf,
}

impl StagingManager {
    /// Manage staging directories below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Staging root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic directory for a job, so redelivery lands in the same place.
    #[must_use]
    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(format!("{JOB_DIR_PREFIX}{job_id}"))
    }

    /// Reserve the job's directory, discarding anything a previous delivery left behind.
    ///
    /// The directory itself is created lazily by the first adapter write; the
    /// lock file is held until the returned handle is purged or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::Busy`] when another worker still holds the
    /// directory, or an IO error when locking or stale cleanup fails.
    pub async fn allocate(&self, job_id: JobId) -> StagingResult<StagingDir> {
        let path = self.job_dir(job_id);
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| StagingError::io("staging.allocate", &self.root, err))?;
        let lock_path = lock_path_for(&path);
        let lock = match try_lock(&lock_path).await? {
            Some(lock) => lock,
            None => return Err(StagingError::Busy { path }),
        };
        let dir = StagingDir {
            path,
            lock_path,
            _lock: lock,
            purged: false,
        };
        if remove_tree(&dir.path, "staging.allocate").await? {
            info!(path = %dir.path.display(), "discarded staging left by an earlier delivery");
        }
        Ok(dir)
    }

    /// Delete job directories under the root whose owner is gone. Run before
    /// a worker starts consuming.
    ///
    /// Directories whose lock is held by a live worker are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error when the root cannot be read or an entry cannot be removed.
    pub async fn sweep_stale(&self) -> StagingResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(StagingError::io("staging.sweep", &self.root, err)),
        };
        let mut jobs = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StagingError::io("staging.sweep", &self.root, err))?
        {
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str()
                && name.starts_with(JOB_DIR_PREFIX)
            {
                jobs.insert(name.strip_suffix(LOCK_SUFFIX).unwrap_or(name).to_string());
            }
        }

        let mut removed = 0;
        let mut held = 0;
        for name in jobs {
            let path = self.root.join(&name);
            let lock_path = lock_path_for(&path);
            let Some(lock) = try_lock(&lock_path).await? else {
                debug!(path = %path.display(), "staging held by a live worker");
                held += 1;
                continue;
            };
            if remove_tree(&path, "staging.sweep").await? {
                removed += 1;
            }
            remove_tree(&lock_path, "staging.sweep").await?;
            drop(lock);
        }
        if removed > 0 || held > 0 {
            info!(removed, held, root = %self.root.display(), "swept stale staging directories");
        }
        Ok(removed)
    }
}

/// A job's private staging directory. Holds at most one artifact.
///
/// Call [`StagingDir::purge`] on every terminal path; dropping an unpurged
/// directory removes it synchronously as a last resort.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    lock_path: PathBuf,
    _lock: File,
    purged: bool,
}

impl StagingDir {
    /// Directory path; it may not exist until the first write.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory tree and release its lock.
    ///
    /// # Errors
    ///
    /// Returns an error when the tree exists but cannot be removed.
    pub async fn purge(mut self) -> StagingResult<()> {
        remove_tree(&self.path, "staging.purge").await?;
        remove_tree(&self.lock_path, "staging.purge").await?;
        self.purged = true;
        debug!(path = %self.path.display(), "staging purged");
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.purged {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => warn!(path = %self.path.display(), "staging removed on drop"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!(path = %self.path.display(), %error, "staging leaked"),
        }
        if let Err(error) = std::fs::remove_file(&self.lock_path)
            && error.kind() != ErrorKind::NotFound
        {
            warn!(path = %self.lock_path.display(), %error, "staging lock leaked");
        }
    }
}

fn lock_path_for(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// Take the exclusive lock on `lock_path`, or `None` when a live holder has it.
async fn try_lock(lock_path: &Path) -> StagingResult<Option<File>> {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .await
        .map_err(|err| StagingError::io("staging.lock", lock_path, err))?
        .into_std()
        .await;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(Some(file)),
        Err(err) if is_contended(&err) => Ok(None),
        Err(err) => Err(StagingError::io("staging.lock", lock_path, err)),
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock || err.kind() == fs2::lock_contended_error().kind()
}

/// Remove a file or directory tree, returning whether anything existed.
pub(crate) async fn remove_tree(path: &Path, operation: &'static str) -> StagingResult<bool> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(StagingError::io(operation, path, err)),
    };
    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StagingError::io(operation, path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocate_is_lazy_and_purge_is_idempotent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let manager = StagingManager::new(temp.path());
        let job_id = JobId::new();

        let dir = manager.allocate(job_id).await?;
        assert!(!dir.path().exists());
        dir.purge().await?;

        let dir = manager.allocate(job_id).await?;
        tokio::fs::create_dir_all(dir.path().join("nested")).await?;
        tokio::fs::write(dir.path().join("nested/file.bin"), b"abc").await?;
        let path = dir.path().to_path_buf();
        dir.purge().await?;
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn redelivery_starts_from_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let manager = StagingManager::new(temp.path());
        let job_id = JobId::new();
        let leftover = manager.job_dir(job_id).join("partial.bin");
        tokio::fs::create_dir_all(manager.job_dir(job_id)).await?;
        tokio::fs::write(&leftover, b"half").await?;

        let dir = manager.allocate(job_id).await?;
        assert!(!leftover.exists());
        dir.purge().await?;
        Ok(())
    }

    #[tokio::test]
    async fn sweep_removes_only_unheld_job_directories() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let manager = StagingManager::new(temp.path());
        tokio::fs::create_dir_all(temp.path().join("job-a/x")).await?;
        tokio::fs::create_dir_all(temp.path().join("job-b")).await?;
        tokio::fs::write(temp.path().join("job-b.lock"), b"").await?;
        tokio::fs::write(temp.path().join("job-c.lock"), b"").await?;
        tokio::fs::create_dir_all(temp.path().join("keep")).await?;

        assert_eq!(manager.sweep_stale().await?, 2);
        assert!(temp.path().join("keep").exists());
        assert!(!temp.path().join("job-a").exists());
        assert!(!temp.path().join("job-b.lock").exists());
        assert!(!temp.path().join("job-c.lock").exists());

        let missing = StagingManager::new(temp.path().join("absent"));
        assert_eq!(missing.sweep_stale().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn sweep_keeps_directories_held_by_a_live_worker() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let running = StagingManager::new(temp.path());
        let restarted = StagingManager::new(temp.path());
        let dir = running.allocate(JobId::new()).await?;
        tokio::fs::create_dir_all(dir.path()).await?;
        tokio::fs::write(dir.path().join("movie.mkv"), b"frames").await?;

        assert_eq!(restarted.sweep_stale().await?, 0);
        assert!(dir.path().join("movie.mkv").exists());

        let path = dir.path().to_path_buf();
        dir.purge().await?;
        assert!(!path.exists());
        assert!(!lock_path_for(&path).exists());
        Ok(())
    }

    #[tokio::test]
    async fn held_directories_cannot_be_allocated_twice() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let first = StagingManager::new(temp.path());
        let second = StagingManager::new(temp.path());
        let job_id = JobId::new();
        let dir = first.allocate(job_id).await?;

        let err = second
            .allocate(job_id)
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("second allocation succeeded"))?;
        assert!(matches!(err, StagingError::Busy { .. }));

        dir.purge().await?;
        second.allocate(job_id).await?.purge().await?;
        Ok(())
    }

    #[tokio::test]
    async fn dropping_unpurged_directory_removes_it() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let manager = StagingManager::new(temp.path());
        let job_id = JobId::new();
        let dir = manager.allocate(job_id).await?;
        let path = dir.path().to_path_buf();
        tokio::fs::create_dir_all(&path).await?;
        drop(dir);
        assert!(!path.exists());
        assert!(!lock_path_for(&path).exists());
        manager.allocate(job_id).await?.purge().await?;
        Ok(())
    }
}
