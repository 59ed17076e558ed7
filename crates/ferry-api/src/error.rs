//! # Design
//!
//! - One crate-level error for bootstrap and serve failures.
//! - Messages are constant; the address travels as a field.

use std::net::SocketAddr;

use thiserror::Error;

/// Result alias for API server operations.
pub type ApiServerResult<T> = std::result::Result<T, ApiServerError>;

/// Errors raised while binding or serving the API.
#[derive(Debug, Error)]
pub enum ApiServerError {
    /// Binding the listener failed.
    #[error("failed to bind api listener")]
    Bind {
        /// Address attempted.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Serving stopped with an IO error.
    #[error("api server terminated unexpectedly")]
    Serve {
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn messages_are_constant_and_sources_kept() {
        let err = ApiServerError::Bind {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind api listener");
        assert!(err.source().is_some());
    }
}
