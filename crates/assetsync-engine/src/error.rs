//! Sync engine error types.

use assetsync_registry::error::RegistryError;
use thiserror::Error;

/// Errors raised by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A registry call failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration is invalid.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// A field mapping template could not be parsed.
    #[error("template error in '{field}': {message}")]
    Template { field: String, message: String },

    /// Source data could not be read.
    #[error("source error: {message}")]
    Source { message: String },

    /// A worker task ended abnormally.
    #[error("worker task failed: {message}")]
    Task { message: String },
}

impl SyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SyncError::Configuration {
            message: message.into(),
        }
    }

    pub fn template(field: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Template {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn source(message: impl Into<String>) -> Self {
        SyncError::Source {
            message: message.into(),
        }
    }

    /// Whether the failure came from an unreachable registry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Registry(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for sync engine operations.
pub type SyncResult<T> = Result<T, SyncError>;
