//! Software inventory rows from CSV.

use assetsync_engine::config::SoftwareInventoryConfig;
use assetsync_engine::error::SyncResult;
use assetsync_engine::software::SoftwareSource;
use assetsync_registry::value::Record;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use crate::config::CsvSourceConfig;
use crate::csv_reader::read_csv_file;
use crate::error::{SourceError, SourceResult};

/// Software rows of every asset, loaded once and grouped by asset.
///
/// A row belongs to the source asset whose `source_column` value equals the
/// row's `asset_id_column` value.
#[derive(Debug, Clone, Default)]
pub struct CsvSoftwareSource {
    source_column: String,
    by_asset: HashMap<String, Vec<Record>>,
}

impl CsvSoftwareSource {
    /// Load the software file named by `inventory`, falling back to `path`.
    pub async fn load(
        config: &CsvSourceConfig,
        inventory: &SoftwareInventoryConfig,
        source_column: impl Into<String>,
    ) -> SourceResult<Self> {
        let path = inventory
            .csv_file
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| {
                SourceError::invalid_configuration("software_inventory.csv_file is required")
            })?;

        let table = read_csv_file(path, config).await?;
        table.require_column(path, &inventory.asset_id_column)?;
        table.require_column(path, &inventory.app_id_column)?;

        let mut by_asset: HashMap<String, Vec<Record>> = HashMap::new();
        for row in table.rows {
            let asset_id = row.text(&inventory.asset_id_column);
            if !asset_id.is_empty() {
                by_asset.entry(asset_id).or_default().push(row);
            }
        }

        info!(file = %path, assets = by_asset.len(), "Software inventory loaded");
        Ok(Self::from_groups(source_column, by_asset))
    }

    #[must_use]
    pub fn from_groups(
        source_column: impl Into<String>,
        by_asset: HashMap<String, Vec<Record>>,
    ) -> Self {
        Self {
            source_column: source_column.into(),
            by_asset,
        }
    }

    /// Number of assets with at least one software row.
    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.by_asset.len()
    }
}

#[async_trait]
impl SoftwareSource for CsvSoftwareSource {
    async fn software_for(&self, asset: &Record) -> SyncResult<Vec<Record>> {
        let key = asset.text(&self.source_column);
        Ok(self.by_asset.get(&key).cloned().unwrap_or_default())
    }
}
