//! Error types for configuration loading.

use thiserror::Error;

/// Errors raised while reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation.
        section: &'static str,
        /// Environment variable carrying the field.
        field: String,
        /// Offending value when it is safe to echo.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Application mode value was not recognised.
    #[error("invalid app mode")]
    InvalidAppMode {
        /// Mode provided by the caller.
        value: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: &'static str,
        field: &str,
        value: Option<&str>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field: field.to_string(),
            value: value.map(str::to_string),
            reason,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
