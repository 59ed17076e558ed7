//! Error types for queue operations.

use ferry_core::{JobId, UnknownRoute};
use thiserror::Error;

/// Result alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The route name is not part of the route table.
    #[error("unknown transfer route")]
    UnknownRoute {
        /// Offending route name.
        name: String,
    },
    /// The job is not currently leased by a consumer.
    #[error("job is not active")]
    NotActive {
        /// Job identifier.
        job_id: JobId,
    },
    /// Applying the schema migrations failed.
    #[error("queue migration failed")]
    Migration {
        /// Underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },
    /// A database statement failed.
    #[error("queue query failed")]
    Query {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        #[source]
        source: sqlx::Error,
    },
    /// A stored row could not be mapped back to a job.
    #[error("queued job is corrupt")]
    Corrupt {
        /// Job identifier.
        job_id: JobId,
        /// Field that failed to decode.
        field: &'static str,
    },
}

impl From<UnknownRoute> for QueueError {
    fn from(err: UnknownRoute) -> Self {
        Self::UnknownRoute { name: err.name }
    }
}

pub(crate) fn query_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> QueueError {
    move |source| QueueError::Query { operation, source }
}
