//! Error types for document store operations.
//!
//! # Design
//! - Messages are constant; the failing path and operation travel as fields.
//! - Backend errors are kept as `source` for log correlation.

use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by document store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Applying the schema migrations failed.
    #[error("document store migration failed")]
    Migration {
        /// Underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },
    /// A database statement failed.
    #[error("document store query failed")]
    Query {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        #[source]
        source: sqlx::Error,
    },
    /// A document could not be encoded or decoded.
    #[error("document serialization failed")]
    Serialization {
        /// Operation identifier.
        operation: &'static str,
        /// Document path.
        path: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The change-notification listener could not be established.
    #[error("document change listener failed")]
    Listener {
        /// Underlying SQL error.
        #[source]
        source: sqlx::Error,
    },
}

pub(crate) fn query_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |source| StoreError::Query { operation, source }
}

pub(crate) fn serde_err(
    operation: &'static str,
    path: &ferry_core::DocPath,
) -> impl FnOnce(serde_json::Error) -> StoreError {
    let path = path.to_string();
    move |source| StoreError::Serialization {
        operation,
        path,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_are_constant_with_sources() {
        let err = query_err("documents.get")(sqlx::Error::RowNotFound);
        assert_eq!(err.to_string(), "document store query failed");
        assert!(err.source().is_some());

        let decode = serde_json::from_str::<u8>("x").unwrap_err();
        let err = serde_err("documents.decode", &ferry_core::DocPath::parse("a/b"))(decode);
        assert!(matches!(err, StoreError::Serialization { ref path, .. } if path == "a/b"));
    }
}
