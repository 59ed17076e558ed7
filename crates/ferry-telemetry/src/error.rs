//! # Design
//!
//! - Telemetry failures are startup failures; callers surface them and exit.
//! - Metric errors carry the collector name they concern.

use thiserror::Error;

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// Configured log format is not recognised.
    #[error("unknown log format")]
    UnknownLogFormat {
        /// Offending value.
        value: String,
    },
    /// Building or registering a Prometheus collector failed.
    #[error("failed to register metrics collector")]
    MetricsRegister {
        /// Collector name.
        name: &'static str,
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// Encoding the registry failed.
    #[error("failed to encode metrics")]
    MetricsEncode {
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// Encoded output was not valid UTF-8.
    #[error("metrics output was not valid utf-8")]
    MetricsUtf8 {
        /// Underlying conversion error.
        source: std::string::FromUtf8Error,
    },
}

impl TelemetryError {
    pub(crate) fn register(name: &'static str) -> impl FnOnce(prometheus::Error) -> Self {
        move |source| Self::MetricsRegister { name, source }
    }
}
