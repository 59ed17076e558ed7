//! # Design
//!
//! - Registry failures carry the file identifier or lookup URL they concern.
//! - Store errors are wrapped rather than flattened so callers keep the operation.

use ferry_store::StoreError;
use thiserror::Error;

/// Result alias for registry operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Errors raised by the direct-link registry.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Backing document store failed.
    #[error("direct-link store failure")]
    Store {
        /// Underlying store error.
        #[from]
        source: StoreError,
    },
    /// Public IP discovery request failed.
    #[error("public ip lookup failed")]
    IpLookup {
        /// Lookup endpoint.
        url: String,
        /// Underlying HTTP error.
        source: reqwest::Error,
    },
    /// Public IP discovery returned something that is not an address.
    #[error("public ip lookup returned an invalid address")]
    InvalidAddress {
        /// Returned value.
        value: String,
    },
}

impl LinkError {
    pub(crate) fn ip_lookup(url: &str) -> impl FnOnce(reqwest::Error) -> Self + '_ {
        move |source| Self::IpLookup {
            url: url.to_string(),
            source,
        }
    }
}
