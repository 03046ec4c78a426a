//! CSV parsing into records.
//!
//! The first row is the header. Every data row becomes a [`Record`] of text
//! values keyed by header name. A UTF-8 byte order mark is stripped.

use assetsync_registry::value::Record;

use crate::config::CsvSourceConfig;
use crate::error::{SourceError, SourceResult};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Parsed CSV content.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

impl CsvTable {
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Fail with [`SourceError::MissingColumn`] unless `column` is a header.
    pub fn require_column(&self, path: &str, column: &str) -> SourceResult<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(SourceError::missing_column(path, column))
        }
    }
}

fn strip_utf8_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(UTF8_BOM).unwrap_or(data)
}

/// Parse CSV bytes. `path` is only used in error messages.
pub fn parse_csv(path: &str, data: &[u8], config: &CsvSourceConfig) -> SourceResult<CsvTable> {
    let data = strip_utf8_bom(data);
    let normalized;
    let data = if config.carriage_return_removal {
        normalized = normalize_line_breaks(data);
        normalized.as_slice()
    } else {
        data
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter_byte()?)
        .flexible(config.flexible)
        .trim(if config.trim { csv::Trim::All } else { csv::Trim::None })
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| SourceError::csv(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| SourceError::csv(path, e))?;
        let row = headers
            .iter()
            .zip(record.iter())
            .fold(Record::new(), |row, (name, value)| row.with(name.as_str(), value));
        rows.push(row);
    }

    Ok(CsvTable { headers, rows })
}

/// Read and parse a CSV file.
pub async fn read_csv_file(path: &str, config: &CsvSourceConfig) -> SourceResult<CsvTable> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| SourceError::io(path, e))?;
    parse_csv(path, &data, config)
}

/// Turn lone `\r` into `\n`, leaving `\r\n` pairs alone.
fn normalize_line_breaks(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' && iter.peek() != Some(&&b'\n') {
            out.push(b'\n');
        } else {
            out.push(b);
        }
    }
    out
}
