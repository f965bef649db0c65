//! In-memory tier: LRU with an entry-count budget and a total-cost budget

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, SystemTime};

use crate::entry::age_at;
use crate::key::Fingerprint;
use crate::ImageBytes;

/// Budgets of the memory tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimits {
    /// Maximum summed byte size of all entries
    pub cost_limit_bytes: usize,

    /// Maximum number of entries
    pub count_limit: usize,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            cost_limit_bytes: 50 * 1024 * 1024, // 50 MiB
            count_limit: 50,
        }
    }
}

struct MemoryEntry {
    bytes: ImageBytes,

    /// When the bytes were fetched or written to disk
    produced_at: SystemTime,
}

pub(crate) struct MemoryTier {
    entries: LruCache<Fingerprint, MemoryEntry>,
    total_cost: usize,
    cost_limit: usize,
}

impl MemoryTier {
    pub fn new(limits: MemoryLimits) -> Self {
        let capacity = NonZeroUsize::new(limits.count_limit).unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: LruCache::new(capacity),
            total_cost: 0,
            cost_limit: limits.cost_limit_bytes,
        }
    }

    /// Look up an entry, promoting it to most recently used.
    ///
    /// Entries produced more than `ttl` ago are dropped so the memory tier
    /// never serves anything the disk tier would refuse.
    pub fn get(&mut self, fingerprint: &Fingerprint, ttl: Duration) -> Option<ImageBytes> {
        let now = SystemTime::now();
        let expired = match self.entries.get(fingerprint) {
            Some(entry) if age_at(entry.produced_at, now) <= ttl => {
                return Some(ImageBytes::clone(&entry.bytes));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.remove(fingerprint);
        }
        None
    }

    /// Insert or replace an entry. One larger than the whole cost budget
    /// evicts everything else and stays until the next insert.
    pub fn insert(&mut self, fingerprint: Fingerprint, bytes: ImageBytes, produced_at: SystemTime) {
        let cost = bytes.len();
        if cost > self.cost_limit {
            log::debug!("Memory tier sole entry: {} ({} bytes over budget)", fingerprint.short(), cost);
            self.entries.clear();
            self.entries.put(fingerprint, MemoryEntry { bytes, produced_at });
            self.total_cost = cost;
            return;
        }

        // push returns either the replaced value for this key or the LRU victim
        if let Some((_, displaced)) = self.entries.push(fingerprint, MemoryEntry { bytes, produced_at }) {
            self.total_cost -= displaced.bytes.len();
        }
        self.total_cost += cost;

        while self.total_cost > self.cost_limit {
            match self.entries.pop_lru() {
                Some((evicted, entry)) => {
                    self.total_cost -= entry.bytes.len();
                    log::debug!("Memory tier evicted: {}", evicted.short());
                }
                None => break,
            }
        }
    }

    pub fn remove(&mut self, fingerprint: &Fingerprint) {
        if let Some(entry) = self.entries.pop(fingerprint) {
            self.total_cost -= entry.bytes.len();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_cost = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_cost(&self) -> usize {
        self.total_cost
    }
}
