//! Cached destination records.

use assetsync_registry::traits::InventoryQuery;
use assetsync_registry::types::AssetFilter;
use assetsync_registry::value::Record;
use std::collections::HashMap;
use tracing::{info, instrument};

use crate::config::{AssetClass, ASSET_PRIMARY_KEY, SOFTWARE_FINGERPRINT_FIELD};
use crate::error::SyncResult;

const PAGE_SIZE: u64 = 1000;

/// The registry's state of one asset as mirrored at the start of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationRecord {
    record: Record,
}

impl DestinationRecord {
    #[must_use]
    pub fn new(record: Record) -> Self {
        Self { record }
    }

    #[must_use]
    pub fn record(&self) -> &Record {
        &self.record
    }

    #[must_use]
    pub fn asset_id(&self) -> String {
        self.record.text(ASSET_PRIMARY_KEY)
    }

    /// Stored primary fingerprint for an asset of `class`.
    #[must_use]
    pub fn fingerprint(&self, class: &AssetClass) -> String {
        self.record.text(class.fingerprint_field())
    }

    #[must_use]
    pub fn software_fingerprint(&self) -> String {
        self.record.text(SOFTWARE_FINGERPRINT_FIELD)
    }

    /// Id of the asset's in-policy record, if it has one.
    #[must_use]
    pub fn in_policy_id(&self) -> Option<String> {
        let id = self.record.text("h_pk_confiteminpolicyid");
        (!id.is_empty() && id != "0").then_some(id)
    }
}

impl From<Record> for DestinationRecord {
    fn from(record: Record) -> Self {
        Self::new(record)
    }
}

/// Page every registry asset matching `filter` into a map keyed by the
/// identifier column. Rows without an identifier are dropped.
#[instrument(skip(client), fields(class = %filter.class, type_id = filter.type_id))]
pub async fn load_destination_cache<C>(
    client: &C,
    filter: &AssetFilter,
) -> SyncResult<HashMap<String, DestinationRecord>>
where
    C: InventoryQuery + ?Sized,
{
    let total = client.count_assets(filter).await?;
    // The count comes from the registry; never trust it for an allocation.
    let mut cache = HashMap::with_capacity(total.min(PAGE_SIZE) as usize);
    let mut offset = 0u64;

    while offset < total {
        let page = client.fetch_assets(filter, offset, PAGE_SIZE).await?;
        if page.is_empty() {
            break;
        }
        for record in page {
            let key = record.text(&filter.identifier_column);
            if key.is_empty() {
                continue;
            }
            cache.insert(key, DestinationRecord::new(record));
        }
        offset += PAGE_SIZE;
    }

    info!(total, cached = cache.len(), "destination cache loaded");
    Ok(cache)
}
