//! Record reconciler scenarios against the recording registry.

mod common;

use assetsync_engine::prelude::*;
use assetsync_engine::reconciler::{asset_urn, IN_POLICY_ENTITY};
use assetsync_registry::operation::{EntityWrite, RelatedAction};
use assetsync_registry::types::{ReferenceEntry, ReferenceKind};
use assetsync_registry::value::Record;
use common::*;
use std::sync::atomic::Ordering;

async fn reconcile(
    ctx: &SyncContext,
    registry: &MockRegistry,
    config: &AssetTypeConfig,
    stats: &StatisticsTracker,
    source: &Record,
    dest: Option<&DestinationRecord>,
) -> (ReconcileOutcome, AssetLog) {
    let mut log = AssetLog::new(source.text("id"));
    let outcome = RecordReconciler::new(ctx, registry, config, stats)
        .reconcile(source, dest, &mut log)
        .await;
    (outcome, log)
}

// =============================================================================
// Create path
// =============================================================================

#[tokio::test]
async fn test_create_resolves_site_and_assigns_urn() {
    let registry = MockRegistry::new().with_reference(hq());
    let ctx = context(SyncOptions::default(), mapping());
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();
    let source = laptop();

    let (outcome, _) = reconcile(&ctx, &registry, &config, &stats, &source, None).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Created {
            asset_id: "100".to_string()
        }
    );

    let create = registry.add(0);
    assert_eq!(create.entity, "Asset");
    assert_eq!(create.primary.text("h_site_id"), Some("7"));
    assert_eq!(create.primary.text("h_site"), Some("HQ"));
    assert_eq!(create.primary.text("h_name"), Some("Laptop-1"));
    assert_eq!(create.primary.text("h_class"), Some("computer"));
    assert_eq!(create.primary.text("h_type"), Some("3"));
    assert_eq!(create.primary.text("h_last_updated_by"), Some("Import - Add"));

    let related = create.related.expect("class record");
    assert_eq!(related.relationship, "AssetClass");
    assert_eq!(related.action, RelatedAction::Insert);
    assert_eq!(
        related.record.text("h_dsc_cf_fingerprint"),
        Some(fingerprint_record(&source).as_str())
    );

    // The URN write follows the create.
    assert_eq!(registry.update_count(), 1);
    assert_eq!(
        registry.update(0).primary.text("h_asset_urn"),
        Some(asset_urn("100").as_str())
    );
    assert_eq!(stats.get(Counter::Created), 1);
}

#[tokio::test]
async fn test_create_omits_cleared_and_empty_fields() {
    let registry = MockRegistry::new();
    let mut mapping = mapping();
    mapping
        .generic
        .insert("h_description".to_string(), "__clear__".to_string());
    mapping
        .generic
        .insert("h_notes".to_string(), "{{.missing}}".to_string());
    let ctx = context(SyncOptions::default(), mapping);
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();

    reconcile(&ctx, &registry, &config, &stats, &laptop(), None).await;

    let create = registry.add(0);
    assert!(!create.primary.contains("h_description"));
    assert!(!create.primary.contains("h_notes"));
}

#[tokio::test]
async fn test_create_writes_user_reference_as_urn() {
    let registry = MockRegistry::new().with_reference(ReferenceEntry::new(
        ReferenceKind::User,
        "jdoe",
        "jdoe",
        "Jane Doe",
    ));
    let mut mapping = mapping();
    mapping
        .generic
        .insert("h_owned_by".to_string(), "{{.owner}}".to_string());
    let ctx = context(SyncOptions::default(), mapping);
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();
    let source = laptop().with("owner", "JDOE");

    reconcile(&ctx, &registry, &config, &stats, &source, None).await;

    let create = registry.add(0);
    assert_eq!(create.primary.text("h_owned_by"), Some("urn:sys:0:Jane Doe:jdoe"));
    assert_eq!(create.primary.text("h_owned_by_name"), Some("Jane Doe"));
}

#[tokio::test]
async fn test_create_failure_is_local() {
    let registry = MockRegistry::new();
    registry
        .fail_add_entities
        .lock()
        .unwrap()
        .insert("Asset".to_string());
    let ctx = context(SyncOptions::default(), mapping());
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();

    let (outcome, log) = reconcile(&ctx, &registry, &config, &stats, &laptop(), None).await;

    assert!(outcome.is_failed());
    assert_eq!(registry.update_count(), 0);
    assert_eq!(stats.get(Counter::CreateFailed), 1);
    assert!(log.contains("Unable to create asset"));
}

#[tokio::test]
async fn test_create_brings_asset_into_policy() {
    let registry = MockRegistry::new();
    let ctx = context(SyncOptions::default(), mapping());
    let mut config = asset_type(AssetClass::Computer);
    config.in_policy = InPolicy::Yes;
    let stats = StatisticsTracker::new();

    reconcile(&ctx, &registry, &config, &stats, &laptop(), None).await;

    let policy = registry.adds_for(IN_POLICY_ENTITY);
    assert_eq!(policy.len(), 1);
    assert_eq!(policy[0].primary.text("h_entity_id"), Some("100"));
}

// =============================================================================
// Idempotence and convergence
// =============================================================================

#[tokio::test]
async fn test_unchanged_record_skips_without_writes() {
    let registry = MockRegistry::new().with_reference(hq());
    let ctx = context(SyncOptions::default(), mapping());
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();
    let source = laptop();
    let dest = destination("5", &AssetClass::Computer, &fingerprint_record(&source));

    let (outcome, _) = reconcile(&ctx, &registry, &config, &stats, &source, Some(&dest)).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Skipped {
            reason: SkipReason::Unchanged
        }
    );
    assert_eq!(registry.write_count(), 0);
    assert_eq!(stats.get(Counter::UpdateSkipped), 1);
}

#[tokio::test]
async fn test_skip_matches_single_record_fingerprint() {
    let registry = MockRegistry::new();
    let ctx = context(SyncOptions::default(), mapping());
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();
    let expected = fingerprint([&Record::new()
        .with("id", "A1")
        .with("name", "Laptop-1")
        .with("site", "HQ")]);
    let dest = destination("5", &AssetClass::Computer, &expected);

    let (outcome, _) = reconcile(&ctx, &registry, &config, &stats, &laptop(), Some(&dest)).await;

    assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));
    assert_eq!(registry.write_count(), 0);
}

/// Mirror what a create wrote back as the registry row the next run reads.
fn stored_row(asset_id: &str, write: &EntityWrite) -> DestinationRecord {
    let mut row = Record::new().with("h_pk_asset_id", asset_id);
    let related = write.related.iter().map(|r| &r.record);
    for attrs in std::iter::once(&write.primary).chain(related) {
        for (name, value) in attrs.iter() {
            if let Some(text) = value.as_text() {
                row.insert(name.as_str(), text);
            }
        }
    }
    DestinationRecord::new(row)
}

async fn assert_create_then_skip(class: AssetClass) {
    let registry = MockRegistry::new().with_reference(hq());
    let ctx = context(SyncOptions::default(), mapping());
    let config = asset_type(class.clone());
    let stats = StatisticsTracker::new();
    let source = laptop();

    let (first, _) = reconcile(&ctx, &registry, &config, &stats, &source, None).await;
    let ReconcileOutcome::Created { asset_id } = first else {
        panic!("{class}: expected create, got {first:?}");
    };

    let dest = stored_row(&asset_id, &registry.add(0));
    let writes_before = registry.write_count();

    let (second, _) = reconcile(&ctx, &registry, &config, &stats, &source, Some(&dest)).await;
    assert_eq!(
        second,
        ReconcileOutcome::Skipped {
            reason: SkipReason::Unchanged
        },
        "{class} did not converge"
    );
    assert_eq!(registry.write_count(), writes_before, "{class} wrote again");
}

#[tokio::test]
async fn test_computer_create_then_skip_converges() {
    assert_create_then_skip(AssetClass::Computer).await;
}

#[tokio::test]
async fn test_mobile_device_create_then_skip_converges() {
    assert_create_then_skip(AssetClass::MobileDevice).await;
}

#[tokio::test]
async fn test_printer_create_then_skip_converges() {
    assert_create_then_skip(AssetClass::Printer).await;
}

#[tokio::test]
async fn test_other_class_create_then_skip_converges() {
    assert_create_then_skip(AssetClass::from("server".to_string())).await;
}

#[tokio::test]
async fn test_printer_ignores_siid_column() {
    let registry = MockRegistry::new().with_reference(hq());
    let ctx = context(SyncOptions::default(), mapping());
    let config = asset_type(AssetClass::Printer);
    let stats = StatisticsTracker::new();
    let source = laptop();
    let dest = DestinationRecord::new(
        Record::new()
            .with("h_pk_asset_id", "5")
            .with("h_dsc_siid", fingerprint_record(&source)),
    );

    let (outcome, _) = reconcile(&ctx, &registry, &config, &stats, &source, Some(&dest)).await;
    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            asset_id: "5".to_string()
        }
    );
}

// =============================================================================
// Update path
// =============================================================================

#[tokio::test]
async fn test_changed_record_updates_in_order() {
    let registry = MockRegistry::new().with_reference(hq());
    let ctx = context(SyncOptions::default(), mapping());
    let config = asset_type(AssetClass::MobileDevice);
    let stats = StatisticsTracker::new();
    let source = laptop();
    let dest = destination("5", &AssetClass::MobileDevice, "stale");

    let (outcome, _) = reconcile(&ctx, &registry, &config, &stats, &source, Some(&dest)).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            asset_id: "5".to_string()
        }
    );
    assert_eq!(registry.update_count(), 3);

    let primary = registry.update(0);
    assert_eq!(primary.primary.text("h_pk_asset_id"), Some("5"));
    assert_eq!(primary.primary.text("h_site_id"), Some("7"));
    assert!(primary.related.is_none());

    let extended = registry.update(1).related.unwrap();
    assert_eq!(extended.action, RelatedAction::Update);
    assert_eq!(
        extended.record.text("h_dsc_fingerprint"),
        Some(fingerprint_record(&source).as_str())
    );

    let stamp = registry.update(2);
    assert_eq!(stamp.primary.text("h_last_updated_by"), Some("Import - Update"));
    assert_eq!(stats.get(Counter::Updated), 1);
}

#[tokio::test]
async fn test_force_updates_bypass_fingerprint() {
    let registry = MockRegistry::new();
    let options = SyncOptions {
        force_updates: true,
        ..Default::default()
    };
    let ctx = context(options, mapping());
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();
    let source = laptop();
    let dest = destination("5", &AssetClass::Computer, &fingerprint_record(&source));

    let (outcome, _) = reconcile(&ctx, &registry, &config, &stats, &source, Some(&dest)).await;
    assert!(matches!(outcome, ReconcileOutcome::Updated { .. }));
}

#[tokio::test]
async fn test_clear_sentinel_writes_null_marker() {
    let registry = MockRegistry::new();
    let mut mapping = mapping();
    mapping
        .generic
        .insert("h_description".to_string(), "{{.desc}}".to_string());
    mapping
        .generic
        .insert("h_notes".to_string(), "{{.missing}}".to_string());
    let ctx = context(SyncOptions::default(), mapping);
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();
    let source = laptop()
        .with("desc", "__clear__")
        .with("site", "__clear__");
    let dest = destination("5", &AssetClass::Computer, "stale");

    reconcile(&ctx, &registry, &config, &stats, &source, Some(&dest)).await;

    let primary = registry.update(0).primary;
    assert!(primary.is_null("h_description"));
    assert!(!primary.contains("h_notes"));
    assert!(primary.is_null("h_site"));
    assert!(primary.is_null("h_site_id"));
    assert_eq!(registry.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_preserved_operational_state_never_written() {
    let registry = MockRegistry::new();
    let mut mapping = mapping();
    mapping
        .generic
        .insert("h_operational_state".to_string(), "{{.state}}".to_string());
    mapping
        .generic
        .insert("h_record_state".to_string(), "__clear__".to_string());
    let ctx = context(SyncOptions::default(), mapping);
    let mut config = asset_type(AssetClass::Computer);
    config.preserve.operational_state = true;
    config.preserve.state = true;
    let stats = StatisticsTracker::new();
    let dest = destination("5", &AssetClass::Computer, "stale");

    for state in ["1", "__clear__"] {
        let source = laptop().with("state", state);
        reconcile(&ctx, &registry, &config, &stats, &source, Some(&dest)).await;
    }

    for write in registry.updates.lock().unwrap().iter() {
        assert!(!write.primary.contains("h_operational_state"));
        assert!(!write.primary.contains("h_record_state"));
    }
}

#[tokio::test]
async fn test_preserved_shared_keeps_used_by() {
    let registry = MockRegistry::new().with_reference(ReferenceEntry::new(
        ReferenceKind::User,
        "jdoe",
        "jdoe",
        "Jane Doe",
    ));
    let mut mapping = mapping();
    mapping
        .generic
        .insert("h_used_by".to_string(), "{{.user}}".to_string());
    let ctx = context(SyncOptions::default(), mapping);
    let mut config = asset_type(AssetClass::Computer);
    config.preserve.shared = true;
    let stats = StatisticsTracker::new();
    let source = laptop().with("user", "jdoe");
    let dest = destination("5", &AssetClass::Computer, "stale");

    reconcile(&ctx, &registry, &config, &stats, &source, Some(&dest)).await;

    let primary = registry.update(0).primary;
    assert!(!primary.contains("h_used_by"));
    assert!(!primary.contains("h_used_by_name"));
}

#[tokio::test]
async fn test_benign_no_change_is_skip() {
    let registry = MockRegistry::new();
    registry.no_change.store(true, Ordering::SeqCst);
    let ctx = context(SyncOptions::default(), mapping());
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();
    let dest = destination("5", &AssetClass::Computer, "stale");

    let (outcome, _) = reconcile(&ctx, &registry, &config, &stats, &laptop(), Some(&dest)).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Skipped {
            reason: SkipReason::NoChange
        }
    );
    // No last-updated stamp when nothing changed.
    assert_eq!(registry.update_count(), 2);
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.update_skipped, 1);
    assert_eq!(snapshot.update_related_skipped, 1);
    assert_eq!(snapshot.updated, 0);
    assert_eq!(snapshot.failures(), 0);
}

#[tokio::test]
async fn test_update_failure_marks_failed() {
    let registry = MockRegistry::new();
    registry.fail_update.store(true, Ordering::SeqCst);
    let ctx = context(SyncOptions::default(), mapping());
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();
    let dest = destination("5", &AssetClass::Computer, "stale");

    let (outcome, _) = reconcile(&ctx, &registry, &config, &stats, &laptop(), Some(&dest)).await;

    assert!(outcome.is_failed());
    assert_eq!(registry.update_count(), 1);
    assert_eq!(stats.get(Counter::UpdateFailed), 1);
}

#[tokio::test]
async fn test_extended_record_failure_fails_asset() {
    let registry = MockRegistry::new();
    registry.fail_related_update.store(true, Ordering::SeqCst);
    let ctx = context(SyncOptions::default(), mapping());
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();
    let dest = destination("5", &AssetClass::Computer, "stale");

    let (outcome, _) = reconcile(&ctx, &registry, &config, &stats, &laptop(), Some(&dest)).await;

    assert!(outcome.is_failed());
    // Primary and extended writes only; no last-updated stamp follows.
    assert_eq!(registry.update_count(), 2);
    assert!(registry.update(1).related.is_some());
    assert_eq!(stats.get(Counter::UpdateRelatedFailed), 1);
    assert_eq!(stats.get(Counter::Updated), 0);
}

#[tokio::test]
async fn test_in_policy_on_update() {
    let ctx = context(SyncOptions::default(), mapping());
    let stats = StatisticsTracker::new();

    let registry = MockRegistry::new();
    let mut config = asset_type(AssetClass::Computer);
    config.in_policy = InPolicy::Yes;
    let dest = destination("5", &AssetClass::Computer, "stale");
    reconcile(&ctx, &registry, &config, &stats, &laptop(), Some(&dest)).await;
    assert_eq!(registry.adds_for(IN_POLICY_ENTITY).len(), 1);

    let registry = MockRegistry::new();
    let in_policy = DestinationRecord::new(
        dest.record().clone().with("h_pk_confiteminpolicyid", "9"),
    );
    reconcile(&ctx, &registry, &config, &stats, &laptop(), Some(&in_policy)).await;
    assert!(registry.adds_for(IN_POLICY_ENTITY).is_empty());

    let registry = MockRegistry::new();
    config.in_policy = InPolicy::Clear;
    reconcile(&ctx, &registry, &config, &stats, &laptop(), Some(&in_policy)).await;
    assert_eq!(
        registry.deletes.lock().unwrap().clone(),
        vec![(IN_POLICY_ENTITY.to_string(), "9".to_string())]
    );
}

// =============================================================================
// Gating and dry run
// =============================================================================

#[tokio::test]
async fn test_operation_type_gates_writes() {
    let registry = MockRegistry::new();
    let ctx = context(SyncOptions::default(), mapping());
    let stats = StatisticsTracker::new();

    let mut update_only = asset_type(AssetClass::Computer);
    update_only.operation_type = OperationType::Update;
    let (outcome, _) = reconcile(&ctx, &registry, &update_only, &stats, &laptop(), None).await;
    assert_eq!(
        outcome,
        ReconcileOutcome::Skipped {
            reason: SkipReason::NotAllowed
        }
    );

    let mut create_only = asset_type(AssetClass::Computer);
    create_only.operation_type = OperationType::Create;
    let dest = destination("5", &AssetClass::Computer, "stale");
    let (outcome, _) =
        reconcile(&ctx, &registry, &create_only, &stats, &laptop(), Some(&dest)).await;
    assert_eq!(
        outcome,
        ReconcileOutcome::Skipped {
            reason: SkipReason::NotAllowed
        }
    );
    assert_eq!(registry.write_count(), 0);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let registry = MockRegistry::new().with_reference(hq());
    let options = SyncOptions {
        dry_run: true,
        ..Default::default()
    };
    let ctx = context(options, mapping());
    let config = asset_type(AssetClass::Computer);
    let stats = StatisticsTracker::new();

    let (created, log) = reconcile(&ctx, &registry, &config, &stats, &laptop(), None).await;
    assert_eq!(
        created,
        ReconcileOutcome::Skipped {
            reason: SkipReason::DryRun
        }
    );
    assert!(log.contains("[DRYRUN] Create payload"));

    let dest = destination("5", &AssetClass::Computer, "stale");
    let (updated, _) = reconcile(&ctx, &registry, &config, &stats, &laptop(), Some(&dest)).await;
    assert_eq!(
        updated,
        ReconcileOutcome::Skipped {
            reason: SkipReason::DryRun
        }
    );

    assert_eq!(registry.write_count(), 0);
    assert_eq!(stats.get(Counter::CreateSkipped), 1);
    assert_eq!(stats.get(Counter::UpdateSkipped), 1);
}

// =============================================================================
// Supplier associations
// =============================================================================

#[tokio::test]
async fn test_supplier_and_contract_associated_after_create() {
    let registry = MockRegistry::new();
    let mut ctx = context(SyncOptions::default(), mapping());
    ctx.supplier_manager = true;
    let mut config = asset_type(AssetClass::Computer);
    config.identifier.source_supplier_column = Some("supplier".to_string());
    config.identifier.source_contract_column = Some("contract".to_string());
    let stats = StatisticsTracker::new();
    let source = laptop().with("supplier", "SUP-1").with("contract", "");

    reconcile(&ctx, &registry, &config, &stats, &source, None).await;

    assert_eq!(
        registry.supplier_calls.lock().unwrap().clone(),
        vec![("100".to_string(), "SUP-1".to_string())]
    );
    assert!(registry.contract_calls.lock().unwrap().is_empty());
    assert_eq!(stats.get(Counter::SuppliersAssociatedSuccess), 1);
}

#[tokio::test]
async fn test_existing_supplier_counts_as_skipped() {
    let registry = MockRegistry::new();
    registry.supplier_exists.store(true, Ordering::SeqCst);
    let mut ctx = context(SyncOptions::default(), mapping());
    ctx.supplier_manager = true;
    let mut config = asset_type(AssetClass::Computer);
    config.identifier.source_supplier_column = Some("supplier".to_string());
    let stats = StatisticsTracker::new();
    let source = laptop().with("supplier", "SUP-1");

    reconcile(&ctx, &registry, &config, &stats, &source, None).await;

    assert_eq!(stats.get(Counter::SuppliersAssociatedSkipped), 1);
    assert_eq!(stats.get(Counter::SuppliersAssociatedFailed), 0);
}

#[tokio::test]
async fn test_no_supplier_calls_without_supplier_manager() {
    let registry = MockRegistry::new();
    let ctx = context(SyncOptions::default(), mapping());
    let mut config = asset_type(AssetClass::Computer);
    config.identifier.source_supplier_column = Some("supplier".to_string());
    let stats = StatisticsTracker::new();
    let source = laptop().with("supplier", "SUP-1");

    reconcile(&ctx, &registry, &config, &stats, &source, None).await;
    assert!(registry.supplier_calls.lock().unwrap().is_empty());
}
