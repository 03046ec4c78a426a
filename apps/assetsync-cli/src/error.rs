//! CLI error types and exit codes

use assetsync_engine::error::SyncError;
use assetsync_registry::error::RegistryError;
use assetsync_source::SourceError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 3: Registry unreachable
/// - 4: Invalid configuration
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration:\n{0}")]
    Validation(String),

    #[error("Cannot reach the registry: {0}")]
    ConnectionFailed(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ConnectionFailed(_) => 3,
            CliError::Validation(_) | CliError::Config(_) => 4,
            CliError::Registry(_) | CliError::Source(_) | CliError::Sync(_) | CliError::Io(_) => 1,
        }
    }

    /// Print the error to stderr.
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();
        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }
        if let Some(suggestion) = self.suggestion() {
            eprintln!("\nSuggestion: {suggestion}");
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::ConnectionFailed(_) => {
                Some("Check registry.base_url, the API key and your network connection.")
            }
            CliError::Validation(_) => {
                Some("Square-bracket mappings are no longer supported; use {{.column}} templates.")
            }
            _ => None,
        }
    }
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidConfiguration { message } => CliError::Config(message),
            e @ RegistryError::AuthenticationFailed { .. } => {
                CliError::ConnectionFailed(e.to_string())
            }
            e if e.is_transient() => CliError::ConnectionFailed(e.to_string()),
            e => CliError::Registry(e.to_string()),
        }
    }
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Registry(inner) => inner.into(),
            SyncError::Configuration { message } => CliError::Config(message),
            e => CliError::Sync(e.to_string()),
        }
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::InvalidConfiguration { message } => CliError::Config(message),
            e => CliError::Source(e.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(e: serde_yaml::Error) -> Self {
        CliError::Config(format!("cannot parse configuration: {e}"))
    }
}
