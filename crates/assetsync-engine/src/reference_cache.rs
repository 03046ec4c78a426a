//! Reference cache.
//!
//! Maps human-readable reference values (site names, user identifiers,
//! company and department names) to registry identifiers.
//!
//! ```text
//!   resolve(kind, "HQ")
//!      │
//!      ├─ "" or "__clear__" ──────────────► None
//!      ├─ read lock, case-insensitive hit ─► Some(entry)
//!      └─ miss: remote search (no lock held)
//!            ├─ found ─► write lock, insert ─► Some(entry)
//!            └─ not found / error ──────────► None   (not remembered)
//! ```
//!
//! Entries are append-only for the lifetime of the cache. Each kind has its
//! own lock; no lock is held across a registry call.

use assetsync_registry::error::RegistryResult;
use assetsync_registry::traits::ReferenceLookup;
use assetsync_registry::types::{ReferenceEntry, ReferenceKind, UserIdColumn};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::mapping::CLEAR_SENTINEL;

type Table = RwLock<HashMap<String, ReferenceEntry>>;

/// Shared lookup tables for every reference kind.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    sites: Table,
    users: Table,
    companies: Table,
    departments: Table,
    user_column: UserIdColumn,
}

impl ReferenceCache {
    #[must_use]
    pub fn new(user_column: UserIdColumn) -> Self {
        Self {
            user_column,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn user_column(&self) -> UserIdColumn {
        self.user_column
    }

    fn table(&self, kind: ReferenceKind) -> &Table {
        match kind {
            ReferenceKind::Site => &self.sites,
            ReferenceKind::User => &self.users,
            ReferenceKind::Company => &self.companies,
            ReferenceKind::Department => &self.departments,
        }
    }

    /// Cached entry for `value`, without consulting the registry.
    pub async fn lookup(&self, kind: ReferenceKind, value: &str) -> Option<ReferenceEntry> {
        self.table(kind).read().await.get(&value.to_lowercase()).cloned()
    }

    /// Add an entry; an existing entry for the same key is kept.
    pub async fn insert(&self, entry: ReferenceEntry) {
        let key = entry.key.to_lowercase();
        self.table(entry.kind)
            .write()
            .await
            .entry(key)
            .or_insert(entry);
    }

    pub async fn len(&self, kind: ReferenceKind) -> usize {
        self.table(kind).read().await.len()
    }

    /// Resolve `value`, searching the registry on a cache miss.
    pub async fn resolve<C>(
        &self,
        client: &C,
        kind: ReferenceKind,
        value: &str,
    ) -> Option<ReferenceEntry>
    where
        C: ReferenceLookup + ?Sized,
    {
        if value.is_empty() || value == CLEAR_SENTINEL {
            return None;
        }
        if let Some(entry) = self.lookup(kind, value).await {
            return Some(entry);
        }

        match client.search_reference(kind, value, self.user_column).await {
            Ok(Some(found)) => {
                // Index under the searched value so the next lookup hits.
                let entry = ReferenceEntry::new(kind, value, found.id, found.name);
                self.insert(entry.clone()).await;
                debug!(kind = %kind, value, id = %entry.id, "reference resolved remotely");
                Some(entry)
            }
            Ok(None) => {
                debug!(kind = %kind, value, "reference not found");
                None
            }
            Err(e) => {
                warn!(kind = %kind, value, error = %e, "reference search failed");
                None
            }
        }
    }

    /// Bulk-load every entity of `kind` from the registry.
    #[instrument(skip(self, client))]
    pub async fn preload<C>(&self, client: &C, kind: ReferenceKind) -> RegistryResult<usize>
    where
        C: ReferenceLookup + ?Sized,
    {
        let total = client.count_references(kind).await?;
        let page_size = preload_page_size(kind);
        let mut loaded = 0usize;
        let mut offset = 0u64;

        while offset < total {
            let page = client
                .fetch_references(kind, self.user_column, offset, page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            let mut table = self.table(kind).write().await;
            for entry in page {
                if entry.key.is_empty() {
                    continue;
                }
                table.entry(entry.key.to_lowercase()).or_insert(entry);
                loaded += 1;
            }
            drop(table);
            offset += page_size;
        }

        info!(kind = %kind, total, loaded, "reference cache preloaded");
        Ok(loaded)
    }
}

fn preload_page_size(kind: ReferenceKind) -> u64 {
    match kind {
        ReferenceKind::Site => 100,
        _ => 1000,
    }
}
