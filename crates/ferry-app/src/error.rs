//! # Design
//!
//! - Centralize process-level errors raised while wiring and running roles.
//! - Keep error messages constant while carrying the failing operation.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: ferry_config::ConfigError,
    },
    /// Logging or metrics setup failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: ferry_telemetry::TelemetryError,
    },
    /// The database pool could not be opened.
    #[error("database connection failed")]
    Database {
        /// Operation identifier.
        operation: &'static str,
        /// Source driver error.
        source: sqlx::Error,
    },
    /// Document store setup failed.
    #[error("document store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: ferry_store::StoreError,
    },
    /// Job queue setup failed.
    #[error("job queue operation failed")]
    Queue {
        /// Operation identifier.
        operation: &'static str,
        /// Source queue error.
        source: ferry_queue::QueueError,
    },
    /// A worker role failed.
    #[error("worker operation failed")]
    Worker {
        /// Operation identifier.
        operation: &'static str,
        /// Source worker error.
        source: ferry_worker::WorkerError,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        source: ferry_api::ApiServerError,
    },
    /// The shared HTTP client could not be built.
    #[error("http client construction failed")]
    HttpClient {
        /// Source HTTP client error.
        source: reqwest::Error,
    },
    /// An owner cancelled a running job; the process exits so it restarts clean.
    #[error("job cancelled by owner; process must restart")]
    Cancelled {
        /// Role that observed the cancellation.
        role: &'static str,
    },
    /// A role task panicked or was aborted.
    #[error("role task terminated abnormally")]
    Join {
        /// Source join error.
        source: tokio::task::JoinError,
    },
}

impl AppError {
    pub(crate) fn config(operation: &'static str) -> impl FnOnce(ferry_config::ConfigError) -> Self {
        move |source| Self::Config { operation, source }
    }

    pub(crate) fn telemetry(
        operation: &'static str,
    ) -> impl FnOnce(ferry_telemetry::TelemetryError) -> Self {
        move |source| Self::Telemetry { operation, source }
    }

    pub(crate) fn database(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Database { operation, source }
    }

    pub(crate) fn store(operation: &'static str) -> impl FnOnce(ferry_store::StoreError) -> Self {
        move |source| Self::Store { operation, source }
    }

    pub(crate) fn queue(operation: &'static str) -> impl FnOnce(ferry_queue::QueueError) -> Self {
        move |source| Self::Queue { operation, source }
    }

    pub(crate) fn worker(operation: &'static str) -> impl FnOnce(ferry_worker::WorkerError) -> Self {
        move |source| Self::Worker { operation, source }
    }

    pub(crate) fn api_server(
        operation: &'static str,
    ) -> impl FnOnce(ferry_api::ApiServerError) -> Self {
        move |source| Self::ApiServer { operation, source }
    }
}
