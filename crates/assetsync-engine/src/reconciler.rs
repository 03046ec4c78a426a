//! Per-asset reconciliation.
//!
//! Turns one (source record, cached destination record) pair into registry
//! writes:
//!
//! ```text
//!   no destination ──► create?  ── add Asset + AssetClass
//!                                  ├─ write URN
//!                                  ├─ bring into policy
//!                                  └─ create software rows
//!
//!   destination ──► fingerprint equal and not forced ──► skip
//!              └──► update?  ── update Asset
//!                               ├─ update AssetClass (new fingerprint)
//!                               ├─ stamp last updated (if anything changed)
//!                               └─ in-policy add/remove
//!                    then software diff when the software fingerprint moved
//!
//!   created or updated ──► supplier / contract associations
//! ```
//!
//! Failures stay local to the asset: they are logged, counted and turned into
//! [`ReconcileOutcome::Failed`]; nothing is propagated to the caller.

use assetsync_registry::operation::{
    AssociationOutcome, AttributeSet, EntityWrite, RelatedAction, RelatedRecord, WriteOutcome,
};
use assetsync_registry::traits::AssetRegistry;
use assetsync_registry::types::{ReferenceEntry, ReferenceKind};
use assetsync_registry::value::Record;
use chrono::Local;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

use crate::config::{
    AssetClass, AssetTypeConfig, FieldMappingConfig, InPolicy, SyncOptions, ASSET_ENTITY,
    ASSET_PRIMARY_KEY,
};
use crate::destination::DestinationRecord;
use crate::fingerprint::fingerprint_record;
use crate::log_sink::AssetLog;
use crate::mapping::{FieldMapper, FieldResolver, ResolvedValue, DATE_FORMAT};
use crate::reference_cache::ReferenceCache;
use crate::software::{SoftwareReconciler, SoftwareSet, SoftwareSource};
use crate::statistics::{Counter, StatisticsTracker};

/// Relationship name of the class-specific extended record.
pub const ASSET_CLASS_RELATIONSHIP: &str = "AssetClass";

/// Registry entity tracking configuration items under policy.
pub const IN_POLICY_ENTITY: &str = "ConfigurationItemsInPolicy";

const CREATED_BY: &str = "Import - Add";
const UPDATED_BY: &str = "Import - Update";
const LAST_LOGGED_ON_USER: &str = "h_last_logged_on_user";

/// Build the URN of a registry asset.
#[must_use]
pub fn asset_urn(asset_id: &str) -> String {
    format!("urn:sys:entity:com.hornbill.servicemanager:Asset:{asset_id}")
}

/// Build the URN of a registry user.
#[must_use]
pub fn user_urn(display_name: &str, user_id: &str) -> String {
    format!("urn:sys:0:{display_name}:{user_id}")
}

/// A mapped field resolved through the reference cache.
struct ReferenceField {
    key: &'static str,
    id_field: &'static str,
    name_field: &'static str,
    kind: ReferenceKind,
}

static REFERENCE_FIELDS: [ReferenceField; 5] = [
    ReferenceField {
        key: "h_site",
        id_field: "h_site_id",
        name_field: "h_site",
        kind: ReferenceKind::Site,
    },
    ReferenceField {
        key: "h_company_name",
        id_field: "h_company_id",
        name_field: "h_company_name",
        kind: ReferenceKind::Company,
    },
    ReferenceField {
        key: "h_department_name",
        id_field: "h_department_id",
        name_field: "h_department_name",
        kind: ReferenceKind::Department,
    },
    ReferenceField {
        key: "h_owned_by",
        id_field: "h_owned_by",
        name_field: "h_owned_by_name",
        kind: ReferenceKind::User,
    },
    ReferenceField {
        key: "h_used_by",
        id_field: "h_used_by",
        name_field: "h_used_by_name",
        kind: ReferenceKind::User,
    },
];

/// Whether a generic mapping key is handled as a reference.
#[must_use]
pub fn is_reference_key(key: &str) -> bool {
    REFERENCE_FIELDS.iter().any(|r| r.key == key)
}

/// Reference kinds that a mapping configuration needs resolved.
#[must_use]
pub fn required_reference_kinds(mapping: &FieldMappingConfig) -> Vec<ReferenceKind> {
    let mut kinds = Vec::new();
    for field in &REFERENCE_FIELDS {
        let mapped = mapping.generic.get(field.key).is_some_and(|t| !t.is_empty());
        if mapped && !kinds.contains(&field.kind) {
            kinds.push(field.kind);
        }
    }
    let user_in_type = mapping
        .type_specific
        .get(LAST_LOGGED_ON_USER)
        .is_some_and(|t| !t.is_empty());
    if user_in_type && !kinds.contains(&ReferenceKind::User) {
        kinds.push(ReferenceKind::User);
    }
    kinds
}

/// Shared, read-only state for every worker of a run.
pub struct SyncContext {
    pub options: SyncOptions,
    pub mapping: FieldMappingConfig,
    pub mapper: Arc<dyn FieldMapper>,
    pub references: Arc<ReferenceCache>,
    /// Supplier relationships can be managed on the registry.
    pub supplier_manager: bool,
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("options", &self.options)
            .field("mapping", &self.mapping)
            .field("supplier_manager", &self.supplier_manager)
            .finish_non_exhaustive()
    }
}

/// Why an asset was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Stored fingerprint matches the source.
    Unchanged,
    /// The asset type's operation type forbids the needed write.
    NotAllowed,
    DryRun,
    /// The registry reported nothing to change.
    NoChange,
}

/// Result of reconciling one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created { asset_id: String },
    Updated { asset_id: String },
    Skipped { reason: SkipReason },
    Failed { reason: String },
}

impl ReconcileOutcome {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, ReconcileOutcome::Failed { .. })
    }

    /// Registry id of an asset that was written.
    #[must_use]
    pub fn actioned_asset(&self) -> Option<&str> {
        match self {
            ReconcileOutcome::Created { asset_id } | ReconcileOutcome::Updated { asset_id } => {
                Some(asset_id)
            }
            _ => None,
        }
    }
}

/// How a "clear" mapping result is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// New records have nothing to clear.
    Create,
    /// Existing records get a null marker, except for preserved fields.
    Update,
}

/// Reconciles assets of one asset type over one registry connection.
pub struct RecordReconciler<'a> {
    ctx: &'a SyncContext,
    client: &'a dyn AssetRegistry,
    asset_type: &'a AssetTypeConfig,
    stats: &'a StatisticsTracker,
    software: Option<&'a dyn SoftwareSource>,
    class: AssetClass,
    resolver: FieldResolver,
}

impl<'a> RecordReconciler<'a> {
    #[must_use]
    pub fn new(
        ctx: &'a SyncContext,
        client: &'a dyn AssetRegistry,
        asset_type: &'a AssetTypeConfig,
        stats: &'a StatisticsTracker,
    ) -> Self {
        Self {
            ctx,
            client,
            asset_type,
            stats,
            software: None,
            class: asset_type.resolved_class(),
            resolver: FieldResolver::new(Arc::clone(&ctx.mapper), asset_type.asset_type.clone()),
        }
    }

    #[must_use]
    pub fn with_software_source(mut self, software: Option<&'a dyn SoftwareSource>) -> Self {
        self.software = software;
        self
    }

    /// Reconcile one source record against its cached registry state.
    #[instrument(skip_all, fields(asset_type = %self.asset_type.asset_type))]
    pub async fn reconcile(
        &self,
        source: &Record,
        destination: Option<&DestinationRecord>,
        log: &mut AssetLog,
    ) -> ReconcileOutcome {
        let hash = fingerprint_record(source);
        let outcome = match destination {
            None => self.create_path(source, &hash, log).await,
            Some(dest) => self.update_path(source, dest, &hash, log).await,
        };

        if let Some(asset_id) = outcome.actioned_asset() {
            self.associate_suppliers(asset_id, source, log).await;
        }
        outcome
    }

    async fn create_path(&self, source: &Record, hash: &str, log: &mut AssetLog) -> ReconcileOutcome {
        if !self.asset_type.operation_type.allows_create() {
            log.info("Asset match not found, but operation type does not allow create");
            return ReconcileOutcome::Skipped {
                reason: SkipReason::NotAllowed,
            };
        }
        log.info("Asset match not found - create");

        let software = self.source_software(source, log).await;
        let primary = self.create_attributes(source, log).await;
        let related = self.class_attributes(source, hash, WriteMode::Create, log).await;
        let write = EntityWrite::new(ASSET_ENTITY, primary).with_related(RelatedRecord::new(
            ASSET_CLASS_RELATIONSHIP,
            RelatedAction::Insert,
            related,
        ));

        if self.ctx.options.dry_run {
            log.info(format!("[DRYRUN] Create payload: {}", payload(&write)));
            self.stats.increment(Counter::CreateSkipped);
            return ReconcileOutcome::Skipped {
                reason: SkipReason::DryRun,
            };
        }

        let asset_id = match self.client.add_record(&write).await {
            Ok(id) => id,
            Err(e) => {
                log.error(format!("Unable to create asset: {e}"));
                log.debug(format!("Create payload: {}", payload(&write)));
                self.stats.increment(Counter::CreateFailed);
                return ReconcileOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };
        self.stats.increment(Counter::Created);
        log.info(format!("Asset created: {asset_id}"));

        let urn = AttributeSet::new()
            .with(ASSET_PRIMARY_KEY, asset_id.as_str())
            .with("h_asset_urn", asset_urn(&asset_id));
        if let Err(e) = self.client.update_record(&EntityWrite::new(ASSET_ENTITY, urn)).await {
            log.error(format!("Unable to assign URN to asset {asset_id}: {e}"));
        }

        if self.asset_type.in_policy == InPolicy::Yes {
            self.add_in_policy(&asset_id, log).await;
        }

        let reconciler = self.software_reconciler();
        if let (Some(set), Some(reconciler)) = (software.filter(|s| !s.is_empty()), reconciler) {
            let report = reconciler.create_all(&asset_id, &set, &self.class, log).await;
            log.debug(format!(
                "Software created: {}, failed: {}",
                report.created, report.create_failed
            ));
        }

        ReconcileOutcome::Created { asset_id }
    }

    async fn update_path(
        &self,
        source: &Record,
        dest: &DestinationRecord,
        hash: &str,
        log: &mut AssetLog,
    ) -> ReconcileOutcome {
        if !self.asset_type.operation_type.allows_update() {
            log.info("Asset match found, but operation type does not allow update");
            return ReconcileOutcome::Skipped {
                reason: SkipReason::NotAllowed,
            };
        }

        let asset_id = dest.asset_id();
        let unchanged = dest.fingerprint(&self.class) == hash && !self.ctx.options.force_updates;

        let outcome = if unchanged {
            log.debug(format!("Asset {asset_id} unchanged"));
            self.stats.increment(Counter::UpdateSkipped);
            ReconcileOutcome::Skipped {
                reason: SkipReason::Unchanged,
            }
        } else {
            log.info(format!("Update asset: {asset_id}"));
            let outcome = self.update(source, &asset_id, hash, log).await;
            if !outcome.is_failed() {
                self.apply_in_policy(&asset_id, dest, log).await;
            }
            outcome
        };

        self.update_software(source, dest, &asset_id, log).await;
        outcome
    }

    async fn update(
        &self,
        source: &Record,
        asset_id: &str,
        hash: &str,
        log: &mut AssetLog,
    ) -> ReconcileOutcome {
        let mut primary = AttributeSet::new()
            .with(ASSET_PRIMARY_KEY, asset_id)
            .with("h_asset_urn", asset_urn(asset_id));
        self.map_references(source, WriteMode::Update, &mut primary, log).await;
        self.map_generic(source, WriteMode::Update, &mut primary);
        let primary_write = EntityWrite::new(ASSET_ENTITY, primary);

        let related = self.class_attributes(source, hash, WriteMode::Update, log).await;
        let related_write = EntityWrite::new(
            ASSET_ENTITY,
            AttributeSet::new().with(ASSET_PRIMARY_KEY, asset_id),
        )
        .with_related(RelatedRecord::new(
            ASSET_CLASS_RELATIONSHIP,
            RelatedAction::Update,
            related,
        ));

        if self.ctx.options.dry_run {
            log.info(format!("[DRYRUN] Update payload: {}", payload(&primary_write)));
            log.info(format!("[DRYRUN] Extended payload: {}", payload(&related_write)));
            self.stats.increment(Counter::UpdateSkipped);
            return ReconcileOutcome::Skipped {
                reason: SkipReason::DryRun,
            };
        }

        let mut changed = false;
        match self.client.update_record(&primary_write).await {
            Ok(WriteOutcome::Applied) => changed = true,
            Ok(WriteOutcome::NoChange { message }) => {
                log.debug(format!("Asset {asset_id}: {message}"));
            }
            Err(e) => {
                log.error(format!("Unable to update asset {asset_id}: {e}"));
                log.debug(format!("Update payload: {}", payload(&primary_write)));
                self.stats.increment(Counter::UpdateFailed);
                return ReconcileOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        }

        match self.client.update_record(&related_write).await {
            Ok(WriteOutcome::Applied) => changed = true,
            Ok(WriteOutcome::NoChange { message }) => {
                log.debug(format!("Asset {asset_id} extended record: {message}"));
                self.stats.increment(Counter::UpdateRelatedSkipped);
            }
            Err(e) => {
                log.error(format!("Unable to update extended record of asset {asset_id}: {e}"));
                log.debug(format!("Extended payload: {}", payload(&related_write)));
                self.stats.increment(Counter::UpdateRelatedFailed);
                return ReconcileOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        }

        if !changed {
            self.stats.increment(Counter::UpdateSkipped);
            return ReconcileOutcome::Skipped {
                reason: SkipReason::NoChange,
            };
        }

        let stamp = AttributeSet::new()
            .with(ASSET_PRIMARY_KEY, asset_id)
            .with("h_last_updated", Local::now().format(DATE_FORMAT).to_string())
            .with("h_last_updated_by", UPDATED_BY);
        if let Err(e) = self.client.update_record(&EntityWrite::new(ASSET_ENTITY, stamp)).await {
            log.warn(format!("Unable to stamp last updated on asset {asset_id}: {e}"));
        }

        self.stats.increment(Counter::Updated);
        log.info(format!("Asset updated: {asset_id}"));
        ReconcileOutcome::Updated {
            asset_id: asset_id.to_string(),
        }
    }

    async fn update_software(
        &self,
        source: &Record,
        dest: &DestinationRecord,
        asset_id: &str,
        log: &mut AssetLog,
    ) {
        if !self.software_enabled() {
            return;
        }
        let Some(set) = self.source_software(source, log).await else {
            self.stats.increment(Counter::SoftwareSkipped);
            return;
        };
        let hash = set.fingerprint();
        if self.ctx.options.dry_run || set.is_empty() || hash == dest.software_fingerprint() {
            log.debug("Software inventory unchanged or not applicable");
            self.stats.increment(Counter::SoftwareSkipped);
            return;
        }

        let Some(reconciler) = self.software_reconciler() else {
            return;
        };
        let report = reconciler.reconcile(asset_id, &set, &self.class, log).await;
        log.debug(format!(
            "Software created: {}, removed: {}, failed: {}",
            report.created,
            report.removed,
            report.create_failed + report.remove_failed
        ));
    }

    fn software_enabled(&self) -> bool {
        self.class.carries_software()
            && self.asset_type.software_inventory.is_some()
            && self.software.is_some()
    }

    fn software_reconciler(&self) -> Option<SoftwareReconciler<'_>> {
        let config = self.asset_type.software_inventory.as_ref()?;
        Some(SoftwareReconciler::new(
            self.client,
            &self.resolver,
            &config.mapping,
            self.stats,
        ))
    }

    async fn source_software(&self, source: &Record, log: &mut AssetLog) -> Option<SoftwareSet> {
        if !self.software_enabled() {
            return None;
        }
        let config = self.asset_type.software_inventory.as_ref()?;
        let software = self.software?;
        match software.software_for(source).await {
            Ok(rows) => Some(SoftwareSet::from_records(rows, &config.app_id_column)),
            Err(e) => {
                log.error(format!("Unable to read source software inventory: {e}"));
                self.stats.increment(Counter::SoftwareCreateFailed);
                None
            }
        }
    }

    async fn create_attributes(&self, source: &Record, log: &mut AssetLog) -> AttributeSet {
        let mut attrs = AttributeSet::new()
            .with("h_class", self.class.as_str())
            .with("h_type", self.asset_type.type_id.to_string())
            .with("h_last_updated", Local::now().format(DATE_FORMAT).to_string())
            .with("h_last_updated_by", CREATED_BY);
        self.map_references(source, WriteMode::Create, &mut attrs, log).await;
        self.map_generic(source, WriteMode::Create, &mut attrs);
        attrs
    }

    /// Extended record: type, fingerprint and the type-specific mapping.
    async fn class_attributes(
        &self,
        source: &Record,
        hash: &str,
        mode: WriteMode,
        log: &mut AssetLog,
    ) -> AttributeSet {
        let mut attrs = AttributeSet::new().with(self.class.fingerprint_field(), hash);
        if mode == WriteMode::Create {
            attrs.set("h_type", self.asset_type.type_id.to_string());
        }

        for (key, template) in &self.ctx.mapping.type_specific {
            let resolved = self.resolver.resolve(key, template, source);
            if key == LAST_LOGGED_ON_USER {
                match resolved {
                    ResolvedValue::Value(value) => {
                        match self.lookup(ReferenceKind::User, &value, log).await {
                            Some(user) => attrs.set(key.as_str(), user_urn(&user.name, &user.id)),
                            None => log.warn(format!("Unable to find user {value} for {key}")),
                        }
                    }
                    ResolvedValue::Clear if mode == WriteMode::Update => attrs.set_null(key.as_str()),
                    _ => {}
                }
                continue;
            }
            apply_resolved(&mut attrs, key, resolved, mode);
        }
        attrs
    }

    async fn map_references(
        &self,
        source: &Record,
        mode: WriteMode,
        attrs: &mut AttributeSet,
        log: &mut AssetLog,
    ) {
        for field in &REFERENCE_FIELDS {
            let Some(template) = self.ctx.mapping.generic.get(field.key) else {
                continue;
            };
            let preserved = mode == WriteMode::Update
                && (self.asset_type.preserve.preserves(field.id_field)
                    || self.asset_type.preserve.preserves(field.name_field));
            if preserved {
                continue;
            }

            match self.resolver.resolve(field.key, template, source) {
                ResolvedValue::Value(value) => match self.lookup(field.kind, &value, log).await {
                    Some(entry) => {
                        let id = if field.kind == ReferenceKind::User {
                            user_urn(&entry.name, &entry.id)
                        } else {
                            entry.id.clone()
                        };
                        attrs.set(field.id_field, id);
                        attrs.set(field.name_field, entry.name);
                    }
                    None => log.warn(format!("Unable to find {} {value}", field.kind)),
                },
                ResolvedValue::Clear if mode == WriteMode::Update => {
                    attrs.set_null(field.id_field);
                    attrs.set_null(field.name_field);
                }
                _ => {}
            }
        }
    }

    fn map_generic(&self, source: &Record, mode: WriteMode, attrs: &mut AttributeSet) {
        for (key, template) in &self.ctx.mapping.generic {
            if is_reference_key(key) {
                continue;
            }
            if mode == WriteMode::Update && self.asset_type.preserve.preserves(key) {
                continue;
            }
            apply_resolved(attrs, key, self.resolver.resolve(key, template, source), mode);
        }
    }

    async fn lookup(&self, kind: ReferenceKind, value: &str, log: &mut AssetLog) -> Option<ReferenceEntry> {
        let entry = self.ctx.references.resolve(self.client, kind, value).await;
        if let Some(e) = &entry {
            log.debug(format!("{kind} '{value}' resolved to {}", e.id));
        }
        entry
    }

    async fn apply_in_policy(&self, asset_id: &str, dest: &DestinationRecord, log: &mut AssetLog) {
        if self.ctx.options.dry_run {
            return;
        }
        match self.asset_type.in_policy {
            InPolicy::Yes if dest.in_policy_id().is_none() => {
                self.add_in_policy(asset_id, log).await;
            }
            InPolicy::Clear => {
                if let Some(id) = dest.in_policy_id() {
                    match self.client.delete_record(IN_POLICY_ENTITY, &id).await {
                        Ok(()) => log.info(format!("Asset {asset_id} taken out of policy")),
                        Err(e) => log.error(format!(
                            "Unable to take asset {asset_id} out of policy: {e}"
                        )),
                    }
                }
            }
            _ => {}
        }
    }

    async fn add_in_policy(&self, asset_id: &str, log: &mut AssetLog) {
        let attrs = AttributeSet::new()
            .with("h_entity_id", asset_id)
            .with("h_entity_name", "asset");
        match self.client.add_record(&EntityWrite::new(IN_POLICY_ENTITY, attrs)).await {
            Ok(_) => log.info(format!("Asset {asset_id} brought into policy")),
            Err(e) => log.error(format!("Unable to bring asset {asset_id} into policy: {e}")),
        }
    }

    async fn associate_suppliers(&self, asset_id: &str, source: &Record, log: &mut AssetLog) {
        if !self.ctx.supplier_manager {
            return;
        }
        let identifier = &self.asset_type.identifier;

        if let Some(value) = column_value(source, identifier.source_supplier_column.as_deref()) {
            let result = self.client.associate_supplier(asset_id, &value).await;
            self.count_association(
                result,
                "supplier",
                &value,
                [
                    Counter::SuppliersAssociatedSuccess,
                    Counter::SuppliersAssociatedSkipped,
                    Counter::SuppliersAssociatedFailed,
                ],
                log,
            );
        }
        if let Some(value) = column_value(source, identifier.source_contract_column.as_deref()) {
            let result = self.client.associate_contract(asset_id, &value).await;
            self.count_association(
                result,
                "contract",
                &value,
                [
                    Counter::ContractsAssociatedSuccess,
                    Counter::ContractsAssociatedSkipped,
                    Counter::ContractsAssociatedFailed,
                ],
                log,
            );
        }
    }

    fn count_association(
        &self,
        result: assetsync_registry::error::RegistryResult<AssociationOutcome>,
        what: &str,
        value: &str,
        [success, skipped, failed]: [Counter; 3],
        log: &mut AssetLog,
    ) {
        match result {
            Ok(AssociationOutcome::Associated) => {
                log.info(format!("Associated {what} {value}"));
                self.stats.increment(success);
            }
            Ok(AssociationOutcome::AlreadyExists) => {
                log.debug(format!("{what} {value} already associated"));
                self.stats.increment(skipped);
            }
            Err(e) => {
                log.error(format!("Unable to associate {what} {value}: {e}"));
                self.stats.increment(failed);
            }
        }
    }
}

fn apply_resolved(attrs: &mut AttributeSet, key: &str, resolved: ResolvedValue, mode: WriteMode) {
    match resolved {
        ResolvedValue::Value(value) => attrs.set(key, value),
        ResolvedValue::Clear if mode == WriteMode::Update => attrs.set_null(key),
        _ => {}
    }
}

fn column_value(source: &Record, column: Option<&str>) -> Option<String> {
    let column = column.filter(|c| !c.is_empty())?;
    let value = source.text(column);
    (!value.is_empty()).then_some(value)
}

fn payload(write: &EntityWrite) -> String {
    serde_json::to_string(write).unwrap_or_default()
}
