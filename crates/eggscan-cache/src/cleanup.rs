//! Disk tier maintenance: expiry and size-budget sweep

use std::time::{Duration, SystemTime};

use crate::entry::DiskEntry;
use crate::storage::CacheStorage;

const DAY_SECS: u64 = 24 * 60 * 60;
const MIB: u64 = 1_048_576;

/// How long an `.incoming-` file may sit before a sweep treats it as abandoned
pub const INCOMING_GRACE: Duration = Duration::from_secs(60 * 60);

/// Cleanup statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    /// Number of files removed, abandoned temporary files included
    pub removed_count: usize,
    /// Bytes freed
    pub freed_bytes: u64,
}

impl CleanupStats {
    fn record(&mut self, freed: u64) {
        self.removed_count += 1;
        self.freed_bytes += freed;
    }
}

/// Cleanup policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    /// Maximum age of a disk entry before it is stale
    pub max_age: Duration,

    /// Maximum total size of the disk tier in bytes
    pub max_size_bytes: u64,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * DAY_SECS),
            max_size_bytes: 200 * MIB,
        }
    }
}

impl CleanupPolicy {
    pub fn with_max_age_days(mut self, days: u64) -> Self {
        self.max_age = Duration::from_secs(days * DAY_SECS);
        self
    }

    pub fn with_max_size_mb(mut self, mb: u64) -> Self {
        self.max_size_bytes = mb * MIB;
        self
    }
}

/// Entries a sweep will delete, in deletion order
#[derive(Debug, Default)]
pub struct SweepPlan {
    /// Entries older than the TTL
    pub expired: Vec<DiskEntry>,
    /// Oldest surviving entries removed to get back under the size budget
    pub over_budget: Vec<DiskEntry>,
}

/// Decide which entries to delete at time `now`
pub fn plan_sweep(entries: Vec<DiskEntry>, policy: &CleanupPolicy, now: SystemTime) -> SweepPlan {
    let (expired, mut survivors): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| entry.is_expired_at(policy.max_age, now));

    let mut total: u64 = survivors.iter().map(|entry| entry.size).sum();
    let mut over_budget = Vec::new();

    if total > policy.max_size_bytes {
        // Oldest first
        survivors.sort_by_key(|entry| entry.modified);

        for entry in survivors {
            if total <= policy.max_size_bytes {
                break;
            }
            total -= entry.size;
            over_budget.push(entry);
        }
    }

    SweepPlan { expired, over_budget }
}

/// Run one sweep over the disk tier.
///
/// Safe to re-run: a second pass over an already swept directory deletes
/// nothing. Deletion failures are logged and skipped.
pub fn sweep(storage: &CacheStorage, policy: &CleanupPolicy) -> CleanupStats {
    let now = SystemTime::now();
    let (abandoned, abandoned_bytes) = storage.remove_abandoned_incoming(INCOMING_GRACE, now);
    let plan = plan_sweep(storage.entries(), policy, now);
    let mut stats = CleanupStats {
        removed_count: abandoned,
        freed_bytes: abandoned_bytes,
    };

    for entry in plan.expired.iter().chain(plan.over_budget.iter()) {
        match storage.remove(&entry.fingerprint) {
            Ok(0) => {}
            Ok(freed) => stats.record(freed),
            Err(e) => log::warn!("Sweep could not remove {}: {:#}", entry.path.display(), e),
        }
    }

    if stats.removed_count > 0 {
        log::info!(
            "Cache sweep removed {} files ({} expired, {} over budget, {} abandoned), freed {} bytes",
            stats.removed_count,
            plan.expired.len(),
            plan.over_budget.len(),
            abandoned,
            stats.freed_bytes
        );
    }

    stats
}
