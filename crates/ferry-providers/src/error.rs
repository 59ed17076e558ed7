//! # Design
//!
//! - Adapter-local failures keep their operation and HTTP status for logs.
//! - The same failure maps to `SourceUnreachable` on fetch and `PublishFailure`
//!   on publish; local disk errors map to `StagingIo` on either side.

use std::io;
use std::path::{Path, PathBuf};

use ferry_core::TransferError;
use thiserror::Error;

const BODY_EXCERPT: usize = 200;

/// Result alias for adapter internals.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failures raised inside endpoint adapters before conversion to [`TransferError`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level HTTP failure.
    #[error("provider request failed")]
    Http {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// Provider answered with a non-success status.
    #[error("provider rejected request")]
    Status {
        /// Operation identifier.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },
    /// Provider answered with an unexpected shape.
    #[error("provider protocol violation")]
    Protocol {
        /// Operation identifier.
        operation: &'static str,
        /// What was wrong.
        detail: String,
    },
    /// Local filesystem failure.
    #[error("provider io failure")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// External command could not be started or awaited.
    #[error("provider command failed to run")]
    Process {
        /// Operation identifier.
        operation: &'static str,
        /// Program name.
        program: String,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl ProviderError {
    pub(crate) fn http(operation: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Http { operation, source }
    }

    pub(crate) fn io<'a>(operation: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn protocol(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Protocol {
            operation,
            detail: detail.into(),
        }
    }

    /// Operation identifier carried by the error.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Http { operation, .. }
            | Self::Status { operation, .. }
            | Self::Protocol { operation, .. }
            | Self::Io { operation, .. }
            | Self::Process { operation, .. } => operation,
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Http { source, .. } => source.to_string(),
            Self::Status { status, body, .. } if body.is_empty() => format!("http status {status}"),
            Self::Status { status, body, .. } => format!("http status {status}: {body}"),
            Self::Protocol { detail, .. } => detail.clone(),
            Self::Io { source, .. } => source.to_string(),
            Self::Process {
                program, source, ..
            } => format!("{program}: {source}"),
        }
    }

    fn into_staging(self) -> Result<TransferError, Self> {
        match self {
            Self::Io {
                operation,
                path,
                source,
            } => Ok(TransferError::staging_io(operation, path, source)),
            other => Err(other),
        }
    }

    /// Convert a failure raised while fetching from an origin.
    #[must_use]
    pub fn into_fetch_failure(self) -> TransferError {
        self.into_staging().unwrap_or_else(|err| TransferError::SourceUnreachable {
            operation: err.operation(),
            detail: err.detail(),
            source: Some(Box::new(err)),
        })
    }

    /// Convert a failure raised while publishing to a destination.
    #[must_use]
    pub fn into_publish_failure(self) -> TransferError {
        self.into_staging().unwrap_or_else(|err| TransferError::PublishFailure {
            operation: err.operation(),
            detail: err.detail(),
            source: Some(Box::new(err)),
        })
    }
}

/// Fail with [`ProviderError::Status`] unless the response succeeded.
pub(crate) async fn check_status(
    operation: &'static str,
    response: reqwest::Response,
) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = body.chars().take(BODY_EXCERPT).collect::<String>();
    Err(ProviderError::Status {
        operation,
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}
