//! # Asset Sources
//!
//! Acquisition of source data for the sync engine. CSV is bundled; other
//! acquisition paths plug in through [`AssetSource`] and the engine's
//! `SoftwareSource` trait.
//!
//! - [`asset`] - Source asset records keyed by identifier
//! - [`software`] - Per-asset software inventory rows
//! - [`csv_reader`] - Dialect-aware CSV parsing with BOM handling

pub mod asset;
pub mod config;
pub mod csv_reader;
pub mod error;
pub mod software;

pub use asset::{AssetSource, CsvAssetSource};
pub use config::CsvSourceConfig;
pub use error::{SourceError, SourceResult};
pub use software::CsvSoftwareSource;
