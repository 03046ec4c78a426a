//! Source acquisition errors.

use assetsync_engine::error::SyncError;
use thiserror::Error;

/// Errors raised while reading source data.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source file could not be opened or read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid CSV under the configured dialect.
    #[error("invalid CSV in {path}: {message}")]
    Csv { path: String, message: String },

    /// A required column is not in the header row.
    #[error("column '{column}' not found in {path}")]
    MissingColumn { path: String, column: String },

    #[error("invalid source configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl SourceError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        SourceError::Csv {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn missing_column(path: impl Into<String>, column: impl Into<String>) -> Self {
        SourceError::MissingColumn {
            path: path.into(),
            column: column.into(),
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        SourceError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        SyncError::source(err.to_string())
    }
}

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;
