//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use assetsync_engine::prelude::*;
use assetsync_registry::prelude::*;
use assetsync_registry::operation::NO_VALUES_TO_UPDATE;
use assetsync_registry::types::{
    AssetFilter, AssetTypeInfo, InstalledSoftware, ReferenceEntry, ReferenceKind, UserIdColumn,
};
use assetsync_registry::value::Record;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Recording registry
// =============================================================================

/// In-memory registry that records every call and can be scripted to fail.
#[derive(Default)]
pub struct MockRegistry {
    pub adds: Mutex<Vec<EntityWrite>>,
    pub updates: Mutex<Vec<EntityWrite>>,
    pub deletes: Mutex<Vec<(String, String)>>,
    pub supplier_calls: Mutex<Vec<(String, String)>>,
    pub contract_calls: Mutex<Vec<(String, String)>>,
    pub references: Mutex<Vec<ReferenceEntry>>,
    pub installed: Mutex<Vec<InstalledSoftware>>,
    pub assets: Mutex<Vec<Record>>,
    /// Overrides the asset count reported to callers.
    pub reported_asset_count: Mutex<Option<u64>>,
    pub asset_fetches: AtomicUsize,
    pub searches: AtomicUsize,
    next_id: AtomicU64,

    pub fail_add_entities: Mutex<HashSet<String>>,
    pub fail_update: AtomicBool,
    /// Fail only updates that carry a related (extended) record.
    pub fail_related_update: AtomicBool,
    pub no_change: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_inventory: AtomicBool,
    pub supplier_exists: AtomicBool,

    pub write_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(100),
            ..Default::default()
        }
    }

    pub fn with_reference(self, entry: ReferenceEntry) -> Self {
        self.references.lock().unwrap().push(entry);
        self
    }

    pub fn with_installed(self, rows: Vec<InstalledSoftware>) -> Self {
        *self.installed.lock().unwrap() = rows;
        self
    }

    pub fn with_assets(self, rows: Vec<Record>) -> Self {
        *self.assets.lock().unwrap() = rows;
        self
    }

    pub fn reporting_asset_count(self, count: u64) -> Self {
        *self.reported_asset_count.lock().unwrap() = Some(count);
        self
    }

    pub fn add_count(&self) -> usize {
        self.adds.lock().unwrap().len()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    /// Every write call issued so far.
    pub fn write_count(&self) -> usize {
        self.add_count()
            + self.update_count()
            + self.delete_count()
            + self.supplier_calls.lock().unwrap().len()
            + self.contract_calls.lock().unwrap().len()
    }

    pub fn add(&self, index: usize) -> EntityWrite {
        self.adds.lock().unwrap()[index].clone()
    }

    pub fn update(&self, index: usize) -> EntityWrite {
        self.updates.lock().unwrap()[index].clone()
    }

    pub fn adds_for(&self, entity: &str) -> Vec<EntityWrite> {
        self.adds
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.entity == entity)
            .cloned()
            .collect()
    }

    async fn simulate_latency(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Registry for MockRegistry {
    fn display_name(&self) -> &str {
        "mock-registry"
    }

    async fn test_connection(&self) -> RegistryResult<()> {
        Ok(())
    }

    async fn installed_applications(&self) -> RegistryResult<Vec<String>> {
        Ok(vec!["com.hornbill.servicemanager".to_string()])
    }
}

#[async_trait]
impl RecordOp for MockRegistry {
    async fn add_record(&self, write: &EntityWrite) -> RegistryResult<String> {
        self.simulate_latency().await;
        self.adds.lock().unwrap().push(write.clone());
        if self.fail_add_entities.lock().unwrap().contains(&write.entity) {
            return Err(RegistryError::rejected("entityAddRecord", "scripted failure"));
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }

    async fn update_record(&self, write: &EntityWrite) -> RegistryResult<WriteOutcome> {
        self.simulate_latency().await;
        self.updates.lock().unwrap().push(write.clone());
        if self.fail_update.load(Ordering::SeqCst)
            || (write.related.is_some() && self.fail_related_update.load(Ordering::SeqCst))
        {
            return Err(RegistryError::rejected("entityUpdateRecord", "scripted failure"));
        }
        if self.no_change.load(Ordering::SeqCst) {
            return Ok(WriteOutcome::NoChange {
                message: NO_VALUES_TO_UPDATE.to_string(),
            });
        }
        Ok(WriteOutcome::Applied)
    }

    async fn delete_record(&self, entity: &str, key: &str) -> RegistryResult<()> {
        self.deletes
            .lock()
            .unwrap()
            .push((entity.to_string(), key.to_string()));
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(RegistryError::connection("scripted failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ReferenceLookup for MockRegistry {
    async fn search_reference(
        &self,
        kind: ReferenceKind,
        value: &str,
        _user_column: UserIdColumn,
    ) -> RegistryResult<Option<ReferenceEntry>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .references
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.kind == kind && e.key.eq_ignore_ascii_case(value))
            .cloned())
    }

    async fn count_references(&self, kind: ReferenceKind) -> RegistryResult<u64> {
        Ok(self
            .references
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count() as u64)
    }

    async fn fetch_references(
        &self,
        kind: ReferenceKind,
        _user_column: UserIdColumn,
        offset: u64,
        limit: u64,
    ) -> RegistryResult<Vec<ReferenceEntry>> {
        Ok(self
            .references
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InventoryQuery for MockRegistry {
    async fn asset_type_info(&self, asset_type: &str) -> RegistryResult<Option<AssetTypeInfo>> {
        Ok(Some(AssetTypeInfo {
            name: asset_type.to_string(),
            class: "computer".to_string(),
            type_id: 3,
        }))
    }

    async fn count_assets(&self, _filter: &AssetFilter) -> RegistryResult<u64> {
        let reported = *self.reported_asset_count.lock().unwrap();
        Ok(reported.unwrap_or(self.assets.lock().unwrap().len() as u64))
    }

    async fn fetch_assets(
        &self,
        _filter: &AssetFilter,
        offset: u64,
        limit: u64,
    ) -> RegistryResult<Vec<Record>> {
        self.asset_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .assets
            .lock()
            .unwrap()
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_installed_software(&self, _asset_id: &str) -> RegistryResult<u64> {
        if self.fail_inventory.load(Ordering::SeqCst) {
            return Err(RegistryError::connection("scripted failure"));
        }
        Ok(self.installed.lock().unwrap().len() as u64)
    }

    async fn fetch_installed_software(
        &self,
        _asset_id: &str,
        offset: u64,
        limit: u64,
    ) -> RegistryResult<Vec<InstalledSoftware>> {
        Ok(self
            .installed
            .lock()
            .unwrap()
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SupplierOp for MockRegistry {
    async fn associate_supplier(
        &self,
        asset_id: &str,
        supplier_id: &str,
    ) -> RegistryResult<AssociationOutcome> {
        self.supplier_calls
            .lock()
            .unwrap()
            .push((asset_id.to_string(), supplier_id.to_string()));
        if self.supplier_exists.load(Ordering::SeqCst) {
            return Ok(AssociationOutcome::AlreadyExists);
        }
        Ok(AssociationOutcome::Associated)
    }

    async fn associate_contract(
        &self,
        asset_id: &str,
        contract_id: &str,
    ) -> RegistryResult<AssociationOutcome> {
        self.contract_calls
            .lock()
            .unwrap()
            .push((asset_id.to_string(), contract_id.to_string()));
        Ok(AssociationOutcome::Associated)
    }
}

/// Hands out the same registry to every task and counts connections.
pub struct MockFactory {
    pub registry: Arc<MockRegistry>,
    pub connects: AtomicUsize,
    pub fail: bool,
}

impl MockFactory {
    pub fn new(registry: Arc<MockRegistry>) -> Self {
        Self {
            registry,
            connects: AtomicUsize::new(0),
            fail: false,
        }
    }
}

impl RegistryFactory for MockFactory {
    fn connect(&self) -> RegistryResult<Arc<dyn AssetRegistry>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RegistryError::connection("registry unreachable"));
        }
        Ok(Arc::clone(&self.registry) as Arc<dyn AssetRegistry>)
    }
}

// =============================================================================
// Software source
// =============================================================================

/// Software rows keyed by the source asset id column.
pub struct StaticSoftware {
    pub column: String,
    pub rows: HashMap<String, Vec<Record>>,
}

#[async_trait]
impl SoftwareSource for StaticSoftware {
    async fn software_for(&self, asset: &Record) -> SyncResult<Vec<Record>> {
        Ok(self
            .rows
            .get(&asset.text(&self.column))
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// Configuration helpers
// =============================================================================

pub fn hq() -> ReferenceEntry {
    ReferenceEntry::new(ReferenceKind::Site, "HQ", "7", "HQ")
}

pub fn laptop() -> Record {
    Record::new()
        .with("id", "A1")
        .with("name", "Laptop-1")
        .with("site", "HQ")
}

pub fn mapping() -> FieldMappingConfig {
    let mut generic = BTreeMap::new();
    generic.insert("h_name".to_string(), "{{.name}}".to_string());
    generic.insert("h_site".to_string(), "{{.site}}".to_string());
    FieldMappingConfig {
        generic,
        type_specific: BTreeMap::new(),
    }
}

pub fn asset_type(class: AssetClass) -> AssetTypeConfig {
    AssetTypeConfig::new(
        "Laptop",
        AssetIdentifier {
            entity: "Asset".to_string(),
            entity_column: "h_name".to_string(),
            source_column: "id".to_string(),
            source_supplier_column: None,
            source_contract_column: None,
        },
    )
    .with_class(class, 3)
}

pub fn context(options: SyncOptions, mapping: FieldMappingConfig) -> SyncContext {
    SyncContext {
        options,
        mapping,
        mapper: Arc::new(TemplateMapper::new()),
        references: Arc::new(ReferenceCache::default()),
        supplier_manager: false,
    }
}

/// Cached destination record carrying `hash` as the class fingerprint.
pub fn destination(asset_id: &str, class: &AssetClass, hash: &str) -> DestinationRecord {
    DestinationRecord::new(
        Record::new()
            .with("h_pk_asset_id", asset_id)
            .with("h_name", "A1")
            .with(class.fingerprint_field(), hash),
    )
}
