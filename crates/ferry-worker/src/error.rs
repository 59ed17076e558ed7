//! Error types for the worker runtime.
//!
//! # Design
//! - Job-level failures stay `TransferError`; these variants cover the machinery around jobs.
//! - Backend errors are kept as `source` with the failing operation alongside.

use ferry_core::{EndpointKind, Route};
use ferry_queue::QueueError;
use ferry_store::StoreError;
use thiserror::Error;

/// Result alias for worker runtime operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors raised by the worker runtime.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// An adapter was registered for a route whose endpoint class it does not serve.
    #[error("adapter does not match route endpoint")]
    AdapterMismatch {
        /// Route being registered.
        route: Route,
        /// Endpoint class the route requires.
        expected: EndpointKind,
        /// Endpoint class the adapter serves.
        actual: EndpointKind,
    },
    /// The route table has no entries for this worker to consume.
    #[error("route table is empty")]
    NoRoutes,
    /// A queue call failed.
    #[error("queue operation failed")]
    Queue {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying queue error.
        #[source]
        source: QueueError,
    },
    /// A store call failed.
    #[error("store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
    /// Direct-link bookkeeping failed.
    #[error("direct-link operation failed")]
    Links {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying link error.
        #[source]
        source: ferry_links::LinkError,
    },
    /// Removing a served file tree failed.
    #[error("served file removal failed")]
    ServedIo {
        /// Path being removed.
        path: std::path::PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl WorkerError {
    pub(crate) fn queue(operation: &'static str) -> impl FnOnce(QueueError) -> Self {
        move |source| Self::Queue { operation, source }
    }

    pub(crate) fn store(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { operation, source }
    }

    pub(crate) fn links(operation: &'static str) -> impl FnOnce(ferry_links::LinkError) -> Self {
        move |source| Self::Links { operation, source }
    }
}

/// Result alias for notification delivery.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors raised while delivering push notifications.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Destination tokens could not be read.
    #[error("notification tokens unavailable")]
    Tokens {
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
    /// The push request could not be sent.
    #[error("notification request failed")]
    Request {
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },
    /// The push service rejected the message.
    #[error("notification rejected")]
    Rejected {
        /// HTTP status returned.
        status: u16,
        /// Response body excerpt.
        detail: String,
    },
}
