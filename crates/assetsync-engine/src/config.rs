//! Asset type and run configuration.
//!
//! These structures are deserialized straight from the `asset_types` and
//! mapping sections of the YAML configuration, then completed at runtime with
//! the class and type id the registry reports for each asset type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{SyncError, SyncResult};
use crate::mapping::CLEAR_SENTINEL;

/// Upper bound for parallel worker tasks.
pub const MAX_CONCURRENCY: usize = 10;

/// Prefix marking an asset type that targets every type of one class.
pub const ALL_TYPES_PREFIX: &str = "__all__:";

/// Registry entity holding assets.
pub const ASSET_ENTITY: &str = "Asset";

/// Primary key column of the asset entity.
pub const ASSET_PRIMARY_KEY: &str = "h_pk_asset_id";

/// Column holding the software-inventory fingerprint.
pub const SOFTWARE_FINGERPRINT_FIELD: &str = "h_dsc_sw_fingerprint";

/// Run-wide switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force_updates: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    1
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            force_updates: false,
            concurrency: default_concurrency(),
        }
    }
}

impl SyncOptions {
    pub fn validate(&self) -> SyncResult<()> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(SyncError::configuration(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        Ok(())
    }
}

/// Field mappings shared by every asset type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMappingConfig {
    /// Columns of the primary asset entity.
    #[serde(default)]
    pub generic: BTreeMap<String, String>,
    /// Columns of the class-specific extended record.
    #[serde(default)]
    pub type_specific: BTreeMap<String, String>,
}

/// Which sync directions an asset type allows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    #[default]
    Both,
    Create,
    Update,
}

impl OperationType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Both => "both",
            OperationType::Create => "create",
            OperationType::Update => "update",
        }
    }

    #[must_use]
    pub fn allows_create(&self) -> bool {
        matches!(self, OperationType::Both | OperationType::Create)
    }

    #[must_use]
    pub fn allows_update(&self) -> bool {
        matches!(self, OperationType::Both | OperationType::Update)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "both" => Ok(OperationType::Both),
            "create" => Ok(OperationType::Create),
            "update" => Ok(OperationType::Update),
            other => Err(format!("unknown operation type: {other}")),
        }
    }
}

/// Configuration-item policy handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InPolicy {
    #[default]
    #[serde(rename = "")]
    Unchanged,
    #[serde(rename = "yes", alias = "Yes", alias = "YES")]
    Yes,
    #[serde(rename = "__clear__")]
    Clear,
}

impl InPolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InPolicy::Unchanged => "",
            InPolicy::Yes => "yes",
            InPolicy::Clear => CLEAR_SENTINEL,
        }
    }
}

/// Fields an update must never touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreserveFlags {
    #[serde(default)]
    pub operational_state: bool,
    #[serde(default)]
    pub state: bool,
    #[serde(default)]
    pub sub_state: bool,
    /// Keep the current "used by" assignment.
    #[serde(default)]
    pub shared: bool,
}

impl PreserveFlags {
    /// Whether `field` is withheld from update writes.
    #[must_use]
    pub fn preserves(&self, field: &str) -> bool {
        match field {
            "h_operational_state" => self.operational_state,
            "h_record_state" => self.state,
            "h_substate_id" | "h_substate_name" => self.sub_state,
            "h_used_by" | "h_used_by_name" => self.shared,
            _ => false,
        }
    }
}

/// How source assets are matched to registry assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetIdentifier {
    #[serde(default = "default_identifier_entity")]
    pub entity: String,
    /// Registry column holding the identifier.
    pub entity_column: String,
    /// Source column holding the identifier.
    pub source_column: String,
    #[serde(default)]
    pub source_supplier_column: Option<String>,
    #[serde(default)]
    pub source_contract_column: Option<String>,
}

fn default_identifier_entity() -> String {
    ASSET_ENTITY.to_string()
}

/// Software inventory import for one asset type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareInventoryConfig {
    /// Column linking software rows to the asset's source identifier.
    pub asset_id_column: String,
    /// Column identifying the application within one asset.
    pub app_id_column: String,
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub csv_file: Option<String>,
}

/// Asset class as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetClass {
    Computer,
    MobileDevice,
    Printer,
    Other(String),
}

impl AssetClass {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            AssetClass::Computer => "computer",
            AssetClass::MobileDevice => "mobileDevice",
            AssetClass::Printer => "printer",
            AssetClass::Other(name) => name,
        }
    }

    /// Destination column holding the primary fingerprint. Reads and
    /// writes use the same column so an unchanged asset compares equal.
    #[must_use]
    pub fn fingerprint_field(&self) -> &'static str {
        match self {
            AssetClass::Computer | AssetClass::Printer => "h_dsc_cf_fingerprint",
            AssetClass::MobileDevice | AssetClass::Other(_) => "h_dsc_fingerprint",
        }
    }

    #[must_use]
    pub fn carries_software(&self) -> bool {
        self.software_entity().is_some()
    }

    /// Extended entity holding the software fingerprint.
    #[must_use]
    pub fn software_entity(&self) -> Option<&'static str> {
        match self {
            AssetClass::Computer => Some("AssetsComputer"),
            AssetClass::MobileDevice => Some("AssetsMobileDevice"),
            _ => None,
        }
    }
}

impl From<String> for AssetClass {
    fn from(s: String) -> Self {
        match s.as_str() {
            "computer" => AssetClass::Computer,
            "mobileDevice" => AssetClass::MobileDevice,
            "printer" => AssetClass::Printer,
            _ => AssetClass::Other(s),
        }
    }
}

impl From<AssetClass> for String {
    fn from(class: AssetClass) -> Self {
        class.as_str().to_string()
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One asset type to synchronise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTypeConfig {
    pub asset_type: String,
    pub identifier: AssetIdentifier,
    #[serde(default)]
    pub operation_type: OperationType,
    #[serde(default)]
    pub in_policy: InPolicy,
    #[serde(default)]
    pub preserve: PreserveFlags,
    #[serde(default)]
    pub software_inventory: Option<SoftwareInventoryConfig>,
    /// Source file; falls back to the run-wide source when unset.
    #[serde(default)]
    pub csv_file: Option<String>,
    /// Resolved from the registry before the type is processed.
    #[serde(skip)]
    pub class: Option<AssetClass>,
    #[serde(skip)]
    pub type_id: i64,
}

impl AssetTypeConfig {
    #[must_use]
    pub fn new(asset_type: impl Into<String>, identifier: AssetIdentifier) -> Self {
        Self {
            asset_type: asset_type.into(),
            identifier,
            operation_type: OperationType::default(),
            in_policy: InPolicy::default(),
            preserve: PreserveFlags::default(),
            software_inventory: None,
            csv_file: None,
            class: None,
            type_id: 0,
        }
    }

    #[must_use]
    pub fn with_class(mut self, class: AssetClass, type_id: i64) -> Self {
        self.class = Some(class);
        self.type_id = type_id;
        self
    }

    /// Class named by an `__all__:<class>` asset type.
    #[must_use]
    pub fn all_types_class(&self) -> Option<AssetClass> {
        self.asset_type
            .strip_prefix(ALL_TYPES_PREFIX)
            .map(|class| AssetClass::from(class.to_string()))
    }

    /// Resolved class; defaults to a generic class when unresolved.
    #[must_use]
    pub fn resolved_class(&self) -> AssetClass {
        self.class
            .clone()
            .unwrap_or_else(|| AssetClass::Other(String::new()))
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.asset_type.trim().is_empty() {
            return Err(SyncError::configuration("asset type name is empty"));
        }
        if self.identifier.source_column.is_empty() || self.identifier.entity_column.is_empty() {
            return Err(SyncError::configuration(format!(
                "{}: identifier needs both source_column and entity_column",
                self.asset_type
            )));
        }
        if self.all_types_class().is_some() && self.operation_type != OperationType::Update {
            return Err(SyncError::configuration(format!(
                "{}: {ALL_TYPES_PREFIX} asset types must use operation type update",
                self.asset_type
            )));
        }
        if let Some(software) = &self.software_inventory {
            if software.asset_id_column.is_empty() || software.app_id_column.is_empty() {
                return Err(SyncError::configuration(format!(
                    "{}: software inventory needs asset_id_column and app_id_column",
                    self.asset_type
                )));
            }
        }
        Ok(())
    }
}
