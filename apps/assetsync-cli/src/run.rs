//! One import run: connect, preload caches, then process each asset type.

use assetsync_engine::config::{AssetTypeConfig, SyncOptions};
use assetsync_engine::destination::load_destination_cache;
use assetsync_engine::log_sink::{LogSink, LogSinkConfig};
use assetsync_engine::mapping::{FieldMapper, TemplateMapper};
use assetsync_engine::reconciler::{required_reference_kinds, SyncContext};
use assetsync_engine::reference_cache::ReferenceCache;
use assetsync_engine::scheduler::Scheduler;
use assetsync_engine::software::SoftwareSource;
use assetsync_engine::statistics::RunStatistics;
use assetsync_registry::prelude::*;
use assetsync_registry_rest::{RestRegistryClient, RestRegistryFactory};
use assetsync_source::{AssetSource, CsvAssetSource, CsvSoftwareSource};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{CliError, CliResult};

/// Registry application that enables supplier associations.
const SUPPLIER_MANAGER_APP: &str = "com.hornbill.suppliermanager";

/// Run switches taken from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub dry_run: bool,
    pub force_updates: bool,
}

/// Executes a complete import described by an [`AppConfig`].
pub struct ImportRun {
    run_id: Uuid,
    config: AppConfig,
    flags: RunFlags,
    mapper: Arc<dyn FieldMapper>,
}

impl ImportRun {
    #[must_use]
    pub fn new(config: AppConfig, flags: RunFlags) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            flags,
            mapper: Arc::new(TemplateMapper::new()),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn options(&self) -> SyncOptions {
        SyncOptions {
            dry_run: self.flags.dry_run,
            force_updates: self.flags.force_updates,
            concurrency: self.config.concurrency,
        }
    }

    /// Validate, connect and process every configured asset type.
    #[instrument(skip(self), fields(run_id = %self.run_id, dry_run = self.flags.dry_run))]
    pub async fn execute(&self) -> CliResult<RunStatistics> {
        let started = Instant::now();
        self.config.validate(self.mapper.as_ref())?;

        let factory = Arc::new(RestRegistryFactory::new(self.config.registry.clone())?);
        let client = factory.client();
        client.test_connection().await?;
        info!(registry = %self.config.registry.base_url, "connected to registry");

        let supplier_manager = detect_supplier_manager(&client).await;
        let mapping = self.config.field_mapping();
        let references = Arc::new(ReferenceCache::new(self.config.user_id_column));
        for kind in required_reference_kinds(&mapping) {
            match references.preload(&client, kind).await {
                Ok(count) => info!(kind = %kind, count, "reference cache loaded"),
                Err(e) => warn!(kind = %kind, error = %e, "reference preload failed"),
            }
        }

        let options = self.options();
        let sink = LogSink::start(LogSinkConfig {
            file: self.config.log_file.clone(),
            dry_run: options.dry_run,
        })
        .await?;

        let ctx = Arc::new(SyncContext {
            options,
            mapping,
            mapper: Arc::clone(&self.mapper),
            references,
            supplier_manager,
        });
        let assets = CsvAssetSource::new(self.config.source.clone())?;

        let mut totals = RunStatistics::new();
        {
            // The scheduler holds a sink handle; it must be gone before shutdown.
            let scheduler = Scheduler::new(ctx, factory, sink.handle());
            for asset_type in &self.config.asset_types {
                match self
                    .process_asset_type(&client, &scheduler, &assets, asset_type)
                    .await
                {
                    Ok(stats) => totals.merge(&stats),
                    Err(e) => {
                        error!(asset_type = %asset_type.asset_type, error = %e, "asset type skipped")
                    }
                }
            }
        }

        sink.shutdown().await?;
        totals.duration_seconds = started.elapsed().as_secs();
        Ok(totals)
    }

    #[instrument(skip_all, fields(asset_type = %asset_type.asset_type))]
    async fn process_asset_type(
        &self,
        client: &RestRegistryClient,
        scheduler: &Scheduler,
        assets: &CsvAssetSource,
        asset_type: &AssetTypeConfig,
    ) -> CliResult<RunStatistics> {
        asset_type.validate()?;
        let resolved = Arc::new(resolve_class(client, asset_type).await?);
        let class = resolved.resolved_class();
        info!(class = %class, type_id = resolved.type_id, "processing asset type");

        let source = assets.fetch_assets(&resolved).await?;
        if source.is_empty() {
            warn!("no source assets found");
            return Ok(RunStatistics::new());
        }

        let filter = AssetFilter {
            class: class.as_str().to_string(),
            type_id: resolved.type_id,
            identifier_column: resolved.identifier.entity_column.clone(),
        };
        let destination = load_destination_cache(client, &filter).await?;

        let software: Option<Arc<dyn SoftwareSource>> = match &resolved.software_inventory {
            Some(inventory) if class.carries_software() => {
                let loaded = CsvSoftwareSource::load(
                    &self.config.source,
                    inventory,
                    &resolved.identifier.source_column,
                )
                .await?;
                info!(assets = loaded.asset_count(), "software inventory loaded");
                Some(Arc::new(loaded) as Arc<dyn SoftwareSource>)
            }
            _ => None,
        };

        info!(
            source = source.len(),
            destination = destination.len(),
            "starting reconciliation"
        );
        Ok(scheduler.run(source, destination, resolved, software).await)
    }
}

async fn detect_supplier_manager(client: &RestRegistryClient) -> bool {
    match client.installed_applications().await {
        Ok(apps) => {
            let installed = apps.iter().any(|app| app == SUPPLIER_MANAGER_APP);
            info!(installed, "supplier manager detection");
            installed
        }
        Err(e) => {
            warn!(error = %e, "unable to list installed applications");
            false
        }
    }
}

/// Fill in the class and type id an asset type maps to.
async fn resolve_class(
    client: &RestRegistryClient,
    asset_type: &AssetTypeConfig,
) -> CliResult<AssetTypeConfig> {
    if let Some(class) = asset_type.all_types_class() {
        return Ok(asset_type.clone().with_class(class, 0));
    }
    let info = client
        .asset_type_info(&asset_type.asset_type)
        .await?
        .ok_or_else(|| {
            CliError::Registry(format!("asset type {} not found", asset_type.asset_type))
        })?;
    Ok(asset_type
        .clone()
        .with_class(info.class.into(), info.type_id))
}
