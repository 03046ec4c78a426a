//! # Asset Registry Framework
//!
//! Abstractions over the destination asset registry that the sync engine
//! drives toward convergence.
//!
//! ## Crate Organization
//!
//! - [`value`] - Loosely typed field values and records with one canonical form
//! - [`operation`] - Write payloads (null marker included) and write outcomes
//! - [`types`] - Reference kinds, asset type info, installed software rows
//! - [`traits`] - Capability traits implemented by registry clients
//! - [`error`] - Error taxonomy with transient classification

pub mod error;
pub mod operation;
pub mod traits;
pub mod types;
pub mod value;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{RegistryError, RegistryResult};
    pub use crate::operation::{
        is_benign_no_change, AssociationOutcome, AttributeSet, AttributeValue, EntityWrite,
        RelatedAction, RelatedRecord, WriteOutcome,
    };
    pub use crate::traits::{
        AssetRegistry, InventoryQuery, RecordOp, ReferenceLookup, Registry, RegistryFactory,
        SupplierOp,
    };
    pub use crate::types::{
        AssetFilter, AssetTypeInfo, InstalledSoftware, ReferenceEntry, ReferenceKind,
        UserIdColumn,
    };
    pub use crate::value::{FieldValue, Record};
}
