//! Job-level failure taxonomy shared by every adapter.
//!
//! # Design
//! - Every variant is fatal to the individual job; retries belong to queue redelivery.
//! - Messages carry the adapter-supplied detail so owner notifications read naturally.
//! - `kind()` yields a stable label for logs and metrics.

use std::error::Error;
use std::path::PathBuf;

use thiserror::Error;

/// Failure raised while executing a single transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network or API failure while fetching from the origin.
    #[error("source unreachable: {detail}")]
    SourceUnreachable {
        /// Operation identifier.
        operation: &'static str,
        /// Human-readable failure detail.
        detail: String,
        /// Underlying failure when available.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    /// None of the route's accepted URL shapes matched.
    #[error("unrecognized url: {url}")]
    UnrecognizedUrl {
        /// Offending URL.
        url: String,
    },
    /// No stored credential exists for the owner.
    #[error("no stored credential for owner {owner_id}")]
    AuthMissing {
        /// Owner lacking a credential.
        owner_id: String,
    },
    /// Origin-specific quota (for example a daily transfer cap) was exhausted.
    #[error("transfer quota exceeded: {detail}")]
    QuotaExceeded {
        /// Human-readable failure detail.
        detail: String,
    },
    /// Local disk failure while staging or archiving.
    #[error("staging io failure: {detail}")]
    StagingIo {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved when available.
        path: Option<PathBuf>,
        /// Human-readable failure detail.
        detail: String,
        /// Underlying failure when available.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    /// Destination rejected the upload or share request.
    #[error("publish failed: {detail}")]
    PublishFailure {
        /// Operation identifier.
        operation: &'static str,
        /// Human-readable failure detail.
        detail: String,
        /// Underlying failure when available.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    /// The owner requested cancellation while the job was in flight.
    #[error("cancelled by user")]
    UserCancelled,
}

impl TransferError {
    /// Stable label describing the failure class.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnreachable { .. } => "source_unreachable",
            Self::UnrecognizedUrl { .. } => "unrecognized_url",
            Self::AuthMissing { .. } => "auth_missing",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::StagingIo { .. } => "staging_io",
            Self::PublishFailure { .. } => "publish_failure",
            Self::UserCancelled => "user_cancelled",
        }
    }

    /// Whether the failure is an observed cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }

    /// Origin failure without an underlying error value.
    #[must_use]
    pub fn unreachable(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::SourceUnreachable {
            operation,
            detail: detail.into(),
            source: None,
        }
    }

    /// Origin failure wrapping the underlying error.
    #[must_use]
    pub fn unreachable_with<E>(operation: &'static str, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::SourceUnreachable {
            operation,
            detail: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Unrecognized URL for the active route.
    #[must_use]
    pub fn unrecognized(url: impl Into<String>) -> Self {
        Self::UnrecognizedUrl { url: url.into() }
    }

    /// Local disk failure for the given path.
    #[must_use]
    pub fn staging_io<E>(operation: &'static str, path: impl Into<PathBuf>, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::StagingIo {
            operation,
            path: Some(path.into()),
            detail: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Local failure without an underlying error value (for example an archiver exit code).
    #[must_use]
    pub fn staging(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::StagingIo {
            operation,
            path: None,
            detail: detail.into(),
            source: None,
        }
    }

    /// Destination rejection without an underlying error value.
    #[must_use]
    pub fn publish(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::PublishFailure {
            operation,
            detail: detail.into(),
            source: None,
        }
    }

    /// Destination rejection wrapping the underlying error.
    #[must_use]
    pub fn publish_with<E>(operation: &'static str, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::PublishFailure {
            operation,
            detail: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

/// Convenience alias for transfer results.
pub type TransferResult<T> = Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn messages_carry_detail() {
        let err = TransferError::unrecognized("https://example.com/not-mega");
        assert_eq!(err.to_string(), "unrecognized url: https://example.com/not-mega");
        assert_eq!(err.kind(), "unrecognized_url");

        let err = TransferError::staging_io(
            "staging.create",
            "/tmp/job-1",
            io::Error::other("disk full"),
        );
        assert_eq!(err.to_string(), "staging io failure: disk full");
        assert!(err.source().is_some());
    }

    #[test]
    fn cancellation_is_distinguished() {
        assert!(TransferError::UserCancelled.is_cancelled());
        assert_eq!(TransferError::UserCancelled.to_string(), "cancelled by user");
        assert!(!TransferError::publish("gdrive.upload", "403").is_cancelled());
    }
}
