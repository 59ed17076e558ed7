//! # Design
//!
//! - Constant-message errors for staging, inspection and archival.
//! - Operation and path travel as fields so failures are reproducible in tests.
//! - Conversion into `TransferError::StagingIo` happens at the adapter boundary.

use std::io;
use std::path::{Path, PathBuf};

use ferry_core::TransferError;
use thiserror::Error;

/// Result type for staging operations.
pub type StagingResult<T> = Result<T, StagingError>;

/// Errors produced while managing staged artifacts.
#[derive(Debug, Error)]
pub enum StagingError {
    /// IO failures while interacting with the filesystem.
    #[error("staging io failure")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Directory traversal failures.
    #[error("staging walk failure")]
    Walkdir {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Archive writer failures.
    #[error("staging archive failure")]
    Zip {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
    /// The staging directory does not hold exactly one artifact.
    #[error("staging directory does not hold exactly one artifact")]
    ArtifactCount {
        /// Staging directory.
        path: PathBuf,
        /// Entries found.
        found: usize,
    },
    /// Another live worker holds the job's staging lock.
    #[error("staging directory is held by another worker")]
    Busy {
        /// Staging directory.
        path: PathBuf,
    },
    /// A blocking filesystem task was cancelled or panicked.
    #[error("staging task aborted")]
    TaskAborted {
        /// Operation that was running.
        operation: &'static str,
    },
}

impl StagingError {
    pub(crate) fn io(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl AsRef<Path>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn zip(
        operation: &'static str,
        path: impl AsRef<Path>,
        source: zip::result::ZipError,
    ) -> Self {
        Self::Zip {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Operation identifier carried by the error.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Io { operation, .. }
            | Self::Walkdir { operation, .. }
            | Self::Zip { operation, .. }
            | Self::TaskAborted { operation } => operation,
            Self::ArtifactCount { .. } => "staging.inspect",
            Self::Busy { .. } => "staging.allocate",
        }
    }
}

impl From<StagingError> for TransferError {
    fn from(err: StagingError) -> Self {
        let operation = err.operation();
        let path = match &err {
            StagingError::Io { path, .. }
            | StagingError::Walkdir { path, .. }
            | StagingError::Zip { path, .. }
            | StagingError::ArtifactCount { path, .. }
            | StagingError::Busy { path } => Some(path.clone()),
            StagingError::TaskAborted { .. } => None,
        };
        let detail = match &err {
            StagingError::Io { source, .. } => source.to_string(),
            StagingError::Walkdir { source, .. } => source.to_string(),
            StagingError::Zip { source, .. } => format!("archive: {source}"),
            StagingError::ArtifactCount { found, .. } => {
                format!("expected one staged artifact, found {found}")
            }
            StagingError::Busy { .. } | StagingError::TaskAborted { .. } => err.to_string(),
        };
        Self::StagingIo {
            operation,
            path,
            detail,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_staging_transfer_error() {
        let err = StagingError::io("staging.purge", "/tmp/job-x", io::Error::other("busy"));
        let transfer: TransferError = err.into();
        assert_eq!(transfer.kind(), "staging_io");
        assert_eq!(transfer.to_string(), "staging io failure: busy");
    }

    #[test]
    fn busy_directories_report_the_allocation() {
        let err = StagingError::Busy {
            path: PathBuf::from("/tmp/job-y"),
        };
        assert_eq!(err.operation(), "staging.allocate");
        let transfer: TransferError = err.into();
        assert_eq!(
            transfer.to_string(),
            "staging io failure: staging directory is held by another worker"
        );
    }
}
