//! Registry error types
//!
//! Errors are split into connectivity, protocol and rejection classes so the
//! engine can decide between retry, skip and failure.

use thiserror::Error;

/// Error raised by a destination registry call.
#[derive(Debug, Error)]
pub enum RegistryError {
    // Connectivity (transient)
    /// The registry could not be reached at all.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The call did not complete within the configured timeout.
    #[error("registry call timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The registry answered with a temporary unavailability status.
    #[error("registry unavailable: {message}")]
    Unavailable { message: String },

    // Protocol (permanent for the call)
    /// The response could not be decoded.
    #[error("invalid response from registry: {message}")]
    Protocol { message: String },

    /// Credentials were rejected.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // Business rejections
    /// The registry reported a non-benign failure status.
    #[error("{operation} rejected by registry: {message}")]
    Rejected { operation: String, message: String },

    /// The client was built with an unusable configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl RegistryError {
    /// Create a connection error from a message.
    pub fn connection(message: impl Into<String>) -> Self {
        RegistryError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error wrapping the underlying cause.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RegistryError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol (decode) error.
    pub fn protocol(message: impl Into<String>) -> Self {
        RegistryError::Protocol {
            message: message.into(),
        }
    }

    /// Create a rejection for the named operation.
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        RegistryError::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        RegistryError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::ConnectionFailed { .. }
                | RegistryError::Timeout { .. }
                | RegistryError::Unavailable { .. }
        )
    }

    /// Whether the registry was reached and answered with a failure status.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, RegistryError::Rejected { .. })
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
