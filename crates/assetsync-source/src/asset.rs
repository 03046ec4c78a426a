//! Source asset acquisition.

use assetsync_engine::config::AssetTypeConfig;
use assetsync_registry::value::Record;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use crate::config::CsvSourceConfig;
use crate::csv_reader::read_csv_file;
use crate::error::{SourceError, SourceResult};

/// Produces the source records of one asset type, keyed by identifier.
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch_assets(
        &self,
        asset_type: &AssetTypeConfig,
    ) -> SourceResult<HashMap<String, Record>>;
}

/// Reads asset records from a CSV file per asset type.
#[derive(Debug, Clone)]
pub struct CsvAssetSource {
    config: CsvSourceConfig,
}

impl CsvAssetSource {
    pub fn new(config: CsvSourceConfig) -> SourceResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &CsvSourceConfig {
        &self.config
    }

    fn file_for<'a>(&'a self, asset_type: &'a AssetTypeConfig) -> SourceResult<&'a str> {
        asset_type
            .csv_file
            .as_deref()
            .or(self.config.file.as_deref())
            .filter(|f| !f.is_empty())
            .ok_or_else(|| {
                SourceError::invalid_configuration(format!(
                    "no CSV file configured for asset type {}",
                    asset_type.asset_type
                ))
            })
    }
}

#[async_trait]
impl AssetSource for CsvAssetSource {
    #[instrument(skip(self, asset_type), fields(asset_type = %asset_type.asset_type))]
    async fn fetch_assets(
        &self,
        asset_type: &AssetTypeConfig,
    ) -> SourceResult<HashMap<String, Record>> {
        let path = self.file_for(asset_type)?;
        let column = asset_type.identifier.source_column.as_str();

        let table = read_csv_file(path, &self.config).await?;
        table.require_column(path, column)?;

        let total = table.rows.len();
        let mut assets = HashMap::with_capacity(total);
        for row in table.rows {
            let key = row.text(column);
            if key.is_empty() {
                warn!(column = %column, "Skipping source row without identifier");
                continue;
            }
            if assets.insert(key.clone(), row).is_some() {
                warn!(identifier = %key, "Duplicate source identifier, keeping the last row");
            }
        }

        info!(
            file = %path,
            retrieved = assets.len(),
            total = total,
            "Source assets loaded"
        );
        Ok(assets)
    }
}
