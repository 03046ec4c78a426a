//! Registry capability traits
//!
//! Capability-based definitions for the destination asset registry. Clients
//! implement the pieces they support; the engine requires [`AssetRegistry`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::RegistryResult;
use crate::operation::{AssociationOutcome, EntityWrite, WriteOutcome};
use crate::types::{
    AssetFilter, AssetTypeInfo, InstalledSoftware, ReferenceEntry, ReferenceKind, UserIdColumn,
};
use crate::value::Record;

/// Base trait for all registry clients.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Get the display name for this client instance.
    fn display_name(&self) -> &str;

    /// Test the connection to the registry.
    async fn test_connection(&self) -> RegistryResult<()>;

    /// Names of the applications installed on the registry instance.
    async fn installed_applications(&self) -> RegistryResult<Vec<String>>;
}

/// Entity record writes.
#[async_trait]
pub trait RecordOp: Registry {
    /// Add a record, returning the new primary key.
    async fn add_record(&self, write: &EntityWrite) -> RegistryResult<String>;

    /// Update a record.
    ///
    /// A benign "nothing changed" answer is returned as
    /// [`WriteOutcome::NoChange`], never as an error.
    async fn update_record(&self, write: &EntityWrite) -> RegistryResult<WriteOutcome>;

    /// Delete a record by primary key.
    async fn delete_record(&self, entity: &str, key: &str) -> RegistryResult<()>;
}

/// Reference entity lookups (sites, users, groups).
#[async_trait]
pub trait ReferenceLookup: Registry {
    /// Search a single reference by its human-readable value.
    async fn search_reference(
        &self,
        kind: ReferenceKind,
        value: &str,
        user_column: UserIdColumn,
    ) -> RegistryResult<Option<ReferenceEntry>>;

    /// Count reference entities of a kind.
    async fn count_references(&self, kind: ReferenceKind) -> RegistryResult<u64>;

    /// Fetch one page of reference entities.
    async fn fetch_references(
        &self,
        kind: ReferenceKind,
        user_column: UserIdColumn,
        offset: u64,
        limit: u64,
    ) -> RegistryResult<Vec<ReferenceEntry>>;
}

/// Asset and installed-software queries.
#[async_trait]
pub trait InventoryQuery: Registry {
    /// Resolve class and type id of an asset type by name.
    async fn asset_type_info(&self, asset_type: &str) -> RegistryResult<Option<AssetTypeInfo>>;

    async fn count_assets(&self, filter: &AssetFilter) -> RegistryResult<u64>;

    async fn fetch_assets(
        &self,
        filter: &AssetFilter,
        offset: u64,
        limit: u64,
    ) -> RegistryResult<Vec<Record>>;

    async fn count_installed_software(&self, asset_id: &str) -> RegistryResult<u64>;

    async fn fetch_installed_software(
        &self,
        asset_id: &str,
        offset: u64,
        limit: u64,
    ) -> RegistryResult<Vec<InstalledSoftware>>;
}

/// Supplier relationship management.
#[async_trait]
pub trait SupplierOp: Registry {
    async fn associate_supplier(
        &self,
        asset_id: &str,
        supplier_id: &str,
    ) -> RegistryResult<AssociationOutcome>;

    async fn associate_contract(
        &self,
        asset_id: &str,
        contract_id: &str,
    ) -> RegistryResult<AssociationOutcome>;
}

/// Everything the sync engine needs from a registry.
pub trait AssetRegistry: RecordOp + ReferenceLookup + InventoryQuery + SupplierOp {}

impl<T> AssetRegistry for T where T: RecordOp + ReferenceLookup + InventoryQuery + SupplierOp {}

/// Builds a fresh client for each worker task.
pub trait RegistryFactory: Send + Sync {
    fn connect(&self) -> RegistryResult<Arc<dyn AssetRegistry>>;
}
