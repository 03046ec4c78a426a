//! Software inventory reconciliation.
//!
//! Installed software is compared by application id only:
//!
//! ```text
//!   destination D (paged from registry)     source S (from SoftwareSource)
//!
//!   D empty            -> create every row of S
//!   otherwise          -> delete D \ S, create S \ D, leave D ∩ S alone
//!
//!   every call succeeded -> write fingerprint(S) to the asset
//!   any call failed      -> keep the old fingerprint so the next run retries
//! ```

use assetsync_registry::error::RegistryResult;
use assetsync_registry::operation::{AttributeSet, EntityWrite};
use assetsync_registry::traits::AssetRegistry;
use assetsync_registry::types::InstalledSoftware;
use assetsync_registry::value::Record;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

use crate::config::{AssetClass, ASSET_PRIMARY_KEY, SOFTWARE_FINGERPRINT_FIELD};
use crate::error::SyncResult;
use crate::fingerprint::fingerprint;
use crate::log_sink::AssetLog;
use crate::mapping::{FieldResolver, ResolvedValue};
use crate::statistics::{Counter, StatisticsTracker};

/// Registry entity holding installed-software rows.
pub const INSTALLED_SOFTWARE_ENTITY: &str = "AssetsInstalledSoftware";

const PAGE_SIZE: u64 = 1000;
const NO_VALUE_DEFAULT: &str = "No Value";
const DEFAULTED_FIELDS: [&str; 2] = ["h_app_vendor", "h_app_version"];

/// Supplies the software rows of one source asset.
#[async_trait]
pub trait SoftwareSource: Send + Sync {
    async fn software_for(&self, asset: &Record) -> SyncResult<Vec<Record>>;
}

/// Source software of one asset, keyed and ordered by application id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoftwareSet {
    rows: BTreeMap<String, Record>,
}

impl SoftwareSet {
    /// Key rows by `app_id_column`; rows without an id are ignored and a
    /// repeated id keeps the last row.
    pub fn from_records(records: impl IntoIterator<Item = Record>, app_id_column: &str) -> Self {
        let rows = records
            .into_iter()
            .filter_map(|r| {
                let key = r.text(app_id_column);
                (!key.is_empty()).then_some((key, r))
            })
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, app_id: &str) -> bool {
        self.rows.contains_key(app_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Record)> {
        self.rows.iter()
    }

    /// Digest of the rows in application-id order, so the acquisition order
    /// of the rows never changes the result.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(self.rows.values())
    }
}

/// What one software pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftwareReport {
    pub created: u64,
    pub create_failed: u64,
    pub removed: u64,
    pub remove_failed: u64,
    pub fingerprint_written: bool,
    /// The destination inventory could not be read; nothing was written.
    pub aborted: bool,
}

impl SoftwareReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.aborted && self.create_failed == 0 && self.remove_failed == 0
    }
}

/// Applies a source software set to one registry asset.
pub struct SoftwareReconciler<'a> {
    client: &'a dyn AssetRegistry,
    resolver: &'a FieldResolver,
    mapping: &'a BTreeMap<String, String>,
    stats: &'a StatisticsTracker,
}

impl<'a> SoftwareReconciler<'a> {
    #[must_use]
    pub fn new(
        client: &'a dyn AssetRegistry,
        resolver: &'a FieldResolver,
        mapping: &'a BTreeMap<String, String>,
        stats: &'a StatisticsTracker,
    ) -> Self {
        Self {
            client,
            resolver,
            mapping,
            stats,
        }
    }

    /// Diff `source` against the asset's current inventory.
    pub async fn reconcile(
        &self,
        asset_id: &str,
        source: &SoftwareSet,
        class: &AssetClass,
        log: &mut AssetLog,
    ) -> SoftwareReport {
        let mut report = SoftwareReport::default();

        let current = match self.destination_inventory(asset_id).await {
            Ok(current) => current,
            Err(e) => {
                log.error(format!(
                    "Unable to read installed software for asset {asset_id}: {e}"
                ));
                self.stats.increment(Counter::SoftwareCreateFailed);
                report.aborted = true;
                return report;
            }
        };
        log.debug(format!(
            "Software inventory: {} in registry, {} in source",
            current.len(),
            source.len()
        ));

        if current.is_empty() {
            self.create_rows(asset_id, source.iter(), &mut report, log).await;
        } else {
            for (app_id, row) in &current {
                if source.contains(app_id) {
                    continue;
                }
                if self.remove_row(row, log).await {
                    report.removed += 1;
                } else {
                    report.remove_failed += 1;
                }
            }
            let missing = source.iter().filter(|(k, _)| !current.contains_key(*k));
            self.create_rows(asset_id, missing, &mut report, log).await;
        }

        if report.is_clean() {
            report.fingerprint_written = self
                .write_fingerprint(asset_id, class, &source.fingerprint(), log)
                .await;
        } else {
            log.warn(format!(
                "Software inventory for asset {asset_id} only partly applied; fingerprint left unchanged"
            ));
        }
        report
    }

    /// Create every row of `source` on a freshly created asset, writing the
    /// fingerprint only when all rows were created.
    pub async fn create_all(
        &self,
        asset_id: &str,
        source: &SoftwareSet,
        class: &AssetClass,
        log: &mut AssetLog,
    ) -> SoftwareReport {
        let mut report = SoftwareReport::default();
        self.create_rows(asset_id, source.iter(), &mut report, log).await;
        if report.is_clean() {
            report.fingerprint_written = self
                .write_fingerprint(asset_id, class, &source.fingerprint(), log)
                .await;
        }
        report
    }

    async fn destination_inventory(
        &self,
        asset_id: &str,
    ) -> RegistryResult<HashMap<String, InstalledSoftware>> {
        let total = self.client.count_installed_software(asset_id).await?;
        let mut rows = HashMap::new();
        let mut offset = 0u64;
        while offset < total {
            let page = self
                .client
                .fetch_installed_software(asset_id, offset, PAGE_SIZE)
                .await?;
            if page.is_empty() {
                break;
            }
            for row in page {
                if !row.app_id.is_empty() {
                    rows.insert(row.app_id.clone(), row);
                }
            }
            offset += PAGE_SIZE;
        }
        Ok(rows)
    }

    async fn create_rows<'r>(
        &self,
        asset_id: &str,
        rows: impl Iterator<Item = (&'r String, &'r Record)>,
        report: &mut SoftwareReport,
        log: &mut AssetLog,
    ) {
        for (app_id, row) in rows {
            let write = EntityWrite::new(INSTALLED_SOFTWARE_ENTITY, self.software_attributes(asset_id, row));
            match self.client.add_record(&write).await {
                Ok(pk) => {
                    log.debug(format!("Software record {pk} created for application {app_id}"));
                    self.stats.increment(Counter::SoftwareCreated);
                    report.created += 1;
                }
                Err(e) => {
                    log.error(format!("Unable to create software record {app_id}: {e}"));
                    self.stats.increment(Counter::SoftwareCreateFailed);
                    report.create_failed += 1;
                }
            }
        }
    }

    async fn remove_row(&self, row: &InstalledSoftware, log: &mut AssetLog) -> bool {
        match self
            .client
            .delete_record(INSTALLED_SOFTWARE_ENTITY, &row.pk_id.to_string())
            .await
        {
            Ok(()) => {
                log.debug(format!(
                    "Software record {} removed ({})",
                    row.pk_id, row.app_name
                ));
                self.stats.increment(Counter::SoftwareRemoved);
                true
            }
            Err(e) => {
                log.error(format!("Unable to remove software record {}: {e}", row.pk_id));
                self.stats.increment(Counter::SoftwareRemoveFailed);
                false
            }
        }
    }

    fn software_attributes(&self, asset_id: &str, row: &Record) -> AttributeSet {
        let mut attrs = AttributeSet::new().with("h_fk_asset_id", asset_id);
        for (key, template) in self.mapping {
            match self.resolver.resolve(key, template, row) {
                ResolvedValue::Value(value) => attrs.set(key.as_str(), value),
                _ if DEFAULTED_FIELDS.contains(&key.as_str()) => {
                    attrs.set(key.as_str(), NO_VALUE_DEFAULT);
                }
                _ => {}
            }
        }
        attrs
    }

    async fn write_fingerprint(
        &self,
        asset_id: &str,
        class: &AssetClass,
        hash: &str,
        log: &mut AssetLog,
    ) -> bool {
        let Some(entity) = class.software_entity() else {
            return false;
        };
        let attrs = AttributeSet::new()
            .with(ASSET_PRIMARY_KEY, asset_id)
            .with(SOFTWARE_FINGERPRINT_FIELD, hash);
        match self.client.update_record(&EntityWrite::new(entity, attrs)).await {
            Ok(_) => true,
            Err(e) => {
                log.error(format!(
                    "Unable to store software fingerprint for asset {asset_id}: {e}"
                ));
                false
            }
        }
    }
}
