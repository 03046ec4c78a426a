//! Run counters.
//!
//! Workers report outcomes through a shared [`StatisticsTracker`]; the
//! caller reads a [`RunStatistics`] snapshot once every worker has joined.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

/// One outcome category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Created,
    CreateSkipped,
    CreateFailed,
    Updated,
    UpdateSkipped,
    UpdateFailed,
    UpdateRelatedSkipped,
    UpdateRelatedFailed,
    SoftwareSkipped,
    SoftwareCreated,
    SoftwareCreateFailed,
    SoftwareRemoved,
    SoftwareRemoveFailed,
    SuppliersAssociatedSuccess,
    SuppliersAssociatedFailed,
    SuppliersAssociatedSkipped,
    ContractsAssociatedSuccess,
    ContractsAssociatedFailed,
    ContractsAssociatedSkipped,
}

impl Counter {
    pub const ALL: [Counter; 19] = [
        Counter::Created,
        Counter::CreateSkipped,
        Counter::CreateFailed,
        Counter::Updated,
        Counter::UpdateSkipped,
        Counter::UpdateFailed,
        Counter::UpdateRelatedSkipped,
        Counter::UpdateRelatedFailed,
        Counter::SoftwareSkipped,
        Counter::SoftwareCreated,
        Counter::SoftwareCreateFailed,
        Counter::SoftwareRemoved,
        Counter::SoftwareRemoveFailed,
        Counter::SuppliersAssociatedSuccess,
        Counter::SuppliersAssociatedFailed,
        Counter::SuppliersAssociatedSkipped,
        Counter::ContractsAssociatedSuccess,
        Counter::ContractsAssociatedFailed,
        Counter::ContractsAssociatedSkipped,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::Created => "created",
            Counter::CreateSkipped => "create_skipped",
            Counter::CreateFailed => "create_failed",
            Counter::Updated => "updated",
            Counter::UpdateSkipped => "update_skipped",
            Counter::UpdateFailed => "update_failed",
            Counter::UpdateRelatedSkipped => "update_related_skipped",
            Counter::UpdateRelatedFailed => "update_related_failed",
            Counter::SoftwareSkipped => "software_skipped",
            Counter::SoftwareCreated => "software_created",
            Counter::SoftwareCreateFailed => "software_create_failed",
            Counter::SoftwareRemoved => "software_removed",
            Counter::SoftwareRemoveFailed => "software_remove_failed",
            Counter::SuppliersAssociatedSuccess => "suppliers_associated_success",
            Counter::SuppliersAssociatedFailed => "suppliers_associated_failed",
            Counter::SuppliersAssociatedSkipped => "suppliers_associated_skipped",
            Counter::ContractsAssociatedSuccess => "contracts_associated_success",
            Counter::ContractsAssociatedFailed => "contracts_associated_failed",
            Counter::ContractsAssociatedSkipped => "contracts_associated_skipped",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counter values for one asset type or a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    #[serde(default)]
    pub assets_processed: u64,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub create_skipped: u64,
    #[serde(default)]
    pub create_failed: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub update_skipped: u64,
    #[serde(default)]
    pub update_failed: u64,
    #[serde(default)]
    pub update_related_skipped: u64,
    #[serde(default)]
    pub update_related_failed: u64,
    #[serde(default)]
    pub software_skipped: u64,
    #[serde(default)]
    pub software_created: u64,
    #[serde(default)]
    pub software_create_failed: u64,
    #[serde(default)]
    pub software_removed: u64,
    #[serde(default)]
    pub software_remove_failed: u64,
    #[serde(default)]
    pub suppliers_associated_success: u64,
    #[serde(default)]
    pub suppliers_associated_failed: u64,
    #[serde(default)]
    pub suppliers_associated_skipped: u64,
    #[serde(default)]
    pub contracts_associated_success: u64,
    #[serde(default)]
    pub contracts_associated_failed: u64,
    #[serde(default)]
    pub contracts_associated_skipped: u64,
    #[serde(default)]
    pub duration_seconds: u64,
}

impl RunStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, counter: Counter) -> &mut u64 {
        match counter {
            Counter::Created => &mut self.created,
            Counter::CreateSkipped => &mut self.create_skipped,
            Counter::CreateFailed => &mut self.create_failed,
            Counter::Updated => &mut self.updated,
            Counter::UpdateSkipped => &mut self.update_skipped,
            Counter::UpdateFailed => &mut self.update_failed,
            Counter::UpdateRelatedSkipped => &mut self.update_related_skipped,
            Counter::UpdateRelatedFailed => &mut self.update_related_failed,
            Counter::SoftwareSkipped => &mut self.software_skipped,
            Counter::SoftwareCreated => &mut self.software_created,
            Counter::SoftwareCreateFailed => &mut self.software_create_failed,
            Counter::SoftwareRemoved => &mut self.software_removed,
            Counter::SoftwareRemoveFailed => &mut self.software_remove_failed,
            Counter::SuppliersAssociatedSuccess => &mut self.suppliers_associated_success,
            Counter::SuppliersAssociatedFailed => &mut self.suppliers_associated_failed,
            Counter::SuppliersAssociatedSkipped => &mut self.suppliers_associated_skipped,
            Counter::ContractsAssociatedSuccess => &mut self.contracts_associated_success,
            Counter::ContractsAssociatedFailed => &mut self.contracts_associated_failed,
            Counter::ContractsAssociatedSkipped => &mut self.contracts_associated_skipped,
        }
    }

    /// Value of one counter.
    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Created => self.created,
            Counter::CreateSkipped => self.create_skipped,
            Counter::CreateFailed => self.create_failed,
            Counter::Updated => self.updated,
            Counter::UpdateSkipped => self.update_skipped,
            Counter::UpdateFailed => self.update_failed,
            Counter::UpdateRelatedSkipped => self.update_related_skipped,
            Counter::UpdateRelatedFailed => self.update_related_failed,
            Counter::SoftwareSkipped => self.software_skipped,
            Counter::SoftwareCreated => self.software_created,
            Counter::SoftwareCreateFailed => self.software_create_failed,
            Counter::SoftwareRemoved => self.software_removed,
            Counter::SoftwareRemoveFailed => self.software_remove_failed,
            Counter::SuppliersAssociatedSuccess => self.suppliers_associated_success,
            Counter::SuppliersAssociatedFailed => self.suppliers_associated_failed,
            Counter::SuppliersAssociatedSkipped => self.suppliers_associated_skipped,
            Counter::ContractsAssociatedSuccess => self.contracts_associated_success,
            Counter::ContractsAssociatedFailed => self.contracts_associated_failed,
            Counter::ContractsAssociatedSkipped => self.contracts_associated_skipped,
        }
    }

    pub fn add(&mut self, counter: Counter, count: u64) {
        *self.slot(counter) += count;
    }

    /// Add another snapshot's counters into this one.
    pub fn merge(&mut self, other: &RunStatistics) {
        self.assets_processed += other.assets_processed;
        for counter in Counter::ALL {
            self.add(counter, other.get(counter));
        }
        self.duration_seconds += other.duration_seconds;
    }

    /// Non-zero counters in display order.
    #[must_use]
    pub fn non_zero(&self) -> Vec<(Counter, u64)> {
        Counter::ALL
            .iter()
            .map(|c| (*c, self.get(*c)))
            .filter(|(_, v)| *v > 0)
            .collect()
    }

    /// Total number of failure outcomes.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.create_failed
            + self.update_failed
            + self.update_related_failed
            + self.software_create_failed
            + self.software_remove_failed
            + self.suppliers_associated_failed
            + self.contracts_associated_failed
    }
}

/// Shared counter set guarded by a single lock.
pub struct StatisticsTracker {
    inner: Mutex<RunStatistics>,
    start_time: Instant,
}

impl StatisticsTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RunStatistics::new()),
            start_time: Instant::now(),
        }
    }

    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, count: u64) {
        if let Ok(mut stats) = self.inner.lock() {
            stats.add(counter, count);
        }
    }

    /// Mark one asset as fully processed.
    pub fn asset_done(&self) {
        if let Ok(mut stats) = self.inner.lock() {
            stats.assets_processed += 1;
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.inner.lock().map(|s| s.get(counter)).unwrap_or(0)
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> RunStatistics {
        let mut stats = self
            .inner
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        stats.duration_seconds = self.elapsed_seconds();
        stats
    }
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatisticsTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticsTracker")
            .field("stats", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counter_names_unique() {
        let mut names: Vec<_> = Counter::ALL.iter().map(Counter::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Counter::ALL.len());
    }

    #[test]
    fn test_increment_and_snapshot() {
        let tracker = StatisticsTracker::new();
        tracker.increment(Counter::Created);
        tracker.increment(Counter::Created);
        tracker.add(Counter::SoftwareRemoved, 3);
        tracker.asset_done();

        let stats = tracker.snapshot();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.software_removed, 3);
        assert_eq!(stats.assets_processed, 1);
        assert_eq!(stats.get(Counter::UpdateFailed), 0);
    }

    #[test]
    fn test_merge() {
        let mut total = RunStatistics::new();
        total.add(Counter::Updated, 1);
        let mut other = RunStatistics::new();
        other.add(Counter::Updated, 2);
        other.add(Counter::ContractsAssociatedSkipped, 1);
        other.assets_processed = 3;

        total.merge(&other);
        assert_eq!(total.updated, 3);
        assert_eq!(total.contracts_associated_skipped, 1);
        assert_eq!(total.assets_processed, 3);
        assert_eq!(
            total.non_zero(),
            vec![(Counter::Updated, 3), (Counter::ContractsAssociatedSkipped, 1)]
        );
    }

    #[test]
    fn test_failures_total() {
        let mut stats = RunStatistics::new();
        stats.add(Counter::CreateFailed, 1);
        stats.add(Counter::SoftwareRemoveFailed, 2);
        stats.add(Counter::UpdateSkipped, 5);
        assert_eq!(stats.failures(), 3);
    }

    #[test]
    fn test_concurrent_increments() {
        let tracker = Arc::new(StatisticsTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.increment(Counter::UpdateSkipped);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.get(Counter::UpdateSkipped), 800);
    }
}
