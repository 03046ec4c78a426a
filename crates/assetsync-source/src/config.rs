//! CSV dialect configuration.

use serde::{Deserialize, Serialize};

use crate::error::{SourceError, SourceResult};

/// How source CSV files are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvSourceConfig {
    /// Default asset file for types that do not name their own.
    #[serde(default)]
    pub file: Option<String>,

    /// Field delimiter, a single ASCII character (default: `,`).
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Treat bare carriage returns as line breaks.
    #[serde(default)]
    pub carriage_return_removal: bool,

    /// Accept rows whose field count differs from the header.
    #[serde(default)]
    pub flexible: bool,

    /// Trim surrounding whitespace from every field.
    #[serde(default)]
    pub trim: bool,
}

fn default_delimiter() -> String {
    ",".to_string()
}

impl Default for CsvSourceConfig {
    fn default() -> Self {
        Self {
            file: None,
            delimiter: default_delimiter(),
            carriage_return_removal: false,
            flexible: false,
            trim: false,
        }
    }
}

impl CsvSourceConfig {
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Delimiter as the byte the CSV reader expects.
    pub fn delimiter_byte(&self) -> SourceResult<u8> {
        match self.delimiter.as_str() {
            "" => Ok(b','),
            "\\t" | "tab" => Ok(b'\t'),
            d if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes()[0]),
            d => Err(SourceError::invalid_configuration(format!(
                "delimiter must be a single ASCII character, got {d:?}"
            ))),
        }
    }

    pub fn validate(&self) -> SourceResult<()> {
        self.delimiter_byte().map(|_| ())
    }
}
