//! # Asset Sync Engine
//!
//! Reconciles source asset records against a cached snapshot of a
//! destination registry and drives the registry toward convergence.
//!
//! ## Crate Organization
//!
//! - [`fingerprint`] - Content hashes used to detect unchanged records
//! - [`mapping`] - Template evaluation and field resolution
//! - [`reference_cache`] - Site, user and group lookups shared by all workers
//! - [`reconciler`] - Create / update / skip decision per asset
//! - [`software`] - Installed-software set difference per asset
//! - [`scheduler`] - Bounded-concurrency driver for one asset type
//! - [`destination`] - Cached registry state
//! - [`statistics`] - Run counters
//! - [`log_sink`] - Per-asset buffered logging
//! - [`config`] - Asset type configuration
//!
//! ## Example
//!
//! ```ignore
//! use assetsync_engine::prelude::*;
//!
//! let scheduler = Scheduler::new(ctx, factory, sink.handle());
//! let stats = scheduler.run(source, destination, asset_type, None).await;
//! println!("created {} updated {}", stats.created, stats.updated);
//! ```

pub mod config;
pub mod destination;
pub mod error;
pub mod fingerprint;
pub mod log_sink;
pub mod mapping;
pub mod reconciler;
pub mod reference_cache;
pub mod scheduler;
pub mod software;
pub mod statistics;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{
        AssetClass, AssetIdentifier, AssetTypeConfig, FieldMappingConfig, InPolicy,
        OperationType, PreserveFlags, SoftwareInventoryConfig, SyncOptions, MAX_CONCURRENCY,
    };
    pub use crate::destination::{load_destination_cache, DestinationRecord};
    pub use crate::error::{SyncError, SyncResult};
    pub use crate::fingerprint::{fingerprint, fingerprint_record};
    pub use crate::log_sink::{AssetLog, LogHandle, LogSink, LogSinkConfig};
    pub use crate::mapping::{FieldMapper, FieldResolver, ResolvedValue, TemplateMapper};
    pub use crate::reconciler::{ReconcileOutcome, RecordReconciler, SkipReason, SyncContext};
    pub use crate::reference_cache::ReferenceCache;
    pub use crate::scheduler::Scheduler;
    pub use crate::software::{SoftwareReconciler, SoftwareSet, SoftwareSource};
    pub use crate::statistics::{Counter, RunStatistics, StatisticsTracker};
}
