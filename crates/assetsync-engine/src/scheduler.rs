//! Bounded-concurrency execution of one asset type.
//!
//! One task per source asset, at most `concurrency` in flight. Each task
//! opens its own registry connection, reconciles its asset, hands its log
//! block to the sink and reports into the shared counters.

use assetsync_registry::traits::RegistryFactory;
use assetsync_registry::value::Record;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

use crate::config::{AssetTypeConfig, MAX_CONCURRENCY};
use crate::destination::DestinationRecord;
use crate::log_sink::{AssetLog, LogHandle};
use crate::reconciler::{RecordReconciler, SyncContext};
use crate::software::SoftwareSource;
use crate::statistics::{Counter, RunStatistics, StatisticsTracker};

/// Drives reconciliation of every asset of an asset type.
pub struct Scheduler {
    ctx: Arc<SyncContext>,
    factory: Arc<dyn RegistryFactory>,
    log: LogHandle,
    concurrency: usize,
}

impl Scheduler {
    #[must_use]
    pub fn new(ctx: Arc<SyncContext>, factory: Arc<dyn RegistryFactory>, log: LogHandle) -> Self {
        let concurrency = ctx.options.concurrency.clamp(1, MAX_CONCURRENCY);
        Self {
            ctx,
            factory,
            log,
            concurrency,
        }
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Reconcile every source record and wait for all tasks to finish.
    #[instrument(skip_all, fields(asset_type = %asset_type.asset_type, assets = source.len()))]
    pub async fn run(
        &self,
        source: HashMap<String, Record>,
        mut destination: HashMap<String, DestinationRecord>,
        asset_type: Arc<AssetTypeConfig>,
        software: Option<Arc<dyn SoftwareSource>>,
    ) -> RunStatistics {
        let stats = Arc::new(StatisticsTracker::new());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        let mut assets: Vec<_> = source.into_iter().collect();
        assets.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, record) in assets {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let cached = destination.remove(&key);
            let ctx = Arc::clone(&self.ctx);
            let factory = Arc::clone(&self.factory);
            let asset_type = Arc::clone(&asset_type);
            let software = software.clone();
            let stats = Arc::clone(&stats);
            let log_handle = self.log.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let mut log = AssetLog::new(key.clone());
                log.info(format!("Processing asset {key}"));

                match factory.connect() {
                    Ok(client) => {
                        let outcome = RecordReconciler::new(&ctx, client.as_ref(), &asset_type, &stats)
                            .with_software_source(software.as_deref())
                            .reconcile(&record, cached.as_ref(), &mut log)
                            .await;
                        log.debug(format!("Outcome: {outcome:?}"));
                    }
                    Err(e) => {
                        log.error(format!("Unable to connect to registry: {e}"));
                        let counter = if cached.is_some() {
                            Counter::UpdateFailed
                        } else {
                            Counter::CreateFailed
                        };
                        stats.increment(counter);
                    }
                }

                log_handle.flush(log);
                stats.asset_done();
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "asset task ended abnormally");
            }
        }

        let snapshot = stats.snapshot();
        info!(
            processed = snapshot.assets_processed,
            created = snapshot.created,
            updated = snapshot.updated,
            failures = snapshot.failures(),
            "asset type processing complete"
        );
        snapshot
    }
}
