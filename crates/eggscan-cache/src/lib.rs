//! eggscan content cache for remote images
//!
//! This crate provides a two-tier, content-addressed cache: a bounded LRU
//! memory tier in front of a disk tier with a TTL and a size budget. Keys are
//! resource URLs; values are encoded image bytes.

pub mod cleanup;
pub mod entry;
pub mod key;
mod memory;
pub mod storage;
mod writer;

pub use cleanup::{CleanupPolicy, CleanupStats, SweepPlan};
pub use entry::DiskEntry;
pub use key::{Fingerprint, CACHE_FILE_EXTENSION};
pub use memory::MemoryLimits;
pub use storage::{looks_like_image, CacheStorage, DiskLookup};

use anyhow::{bail, Result};
use eggscan_core::Fetcher;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use memory::MemoryTier;
use writer::DiskWriter;

/// Shared, immutable image bytes
pub type ImageBytes = Arc<[u8]>;

/// Main cache interface
pub struct ContentCache {
    storage: Arc<CacheStorage>,
    memory: Mutex<MemoryTier>,
    writer: DiskWriter,
    policy: CleanupPolicy,
}

impl ContentCache {
    /// Create a cache with the default budgets (30 days, 200 MiB on disk;
    /// 50 entries, 50 MiB in memory).
    ///
    /// Must be called inside a tokio runtime. A startup sweep is queued.
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        Self::with_config(cache_dir, CleanupPolicy::default(), MemoryLimits::default())
    }

    /// Create a cache with custom budgets
    pub fn with_config<P: AsRef<Path>>(
        cache_dir: P,
        policy: CleanupPolicy,
        limits: MemoryLimits,
    ) -> Result<Self> {
        let storage = Arc::new(CacheStorage::new(cache_dir));
        let writer = DiskWriter::spawn(Arc::clone(&storage), policy)?;
        writer.schedule_sweep();

        Ok(Self {
            storage,
            memory: Mutex::new(MemoryTier::new(limits)),
            writer,
            policy,
        })
    }

    /// Get cached bytes for `key`, or `None` on a miss.
    ///
    /// Memory hits do no I/O. Disk hits are promoted into memory. Stale or
    /// corrupt disk files are queued for deletion and reported as a miss.
    /// While a `clear` is still resetting the disk tier, only memory is read.
    pub fn get(&self, key: &str) -> Option<ImageBytes> {
        let fingerprint = Fingerprint::of(key);

        if let Some(bytes) = self.memory().get(&fingerprint, self.policy.max_age) {
            log::debug!("Cache hit (memory): {}", fingerprint.short());
            return Some(bytes);
        }

        // Files on disk may predate a clear until its reset has run
        let resets = self.writer.resets();
        let epoch = resets.current();
        if resets.is_pending() {
            log::debug!("Cache miss (reset pending): {}", fingerprint.short());
            return None;
        }

        match self.storage.lookup(&fingerprint, self.policy.max_age) {
            DiskLookup::Fresh { bytes, modified } => {
                log::debug!("Cache hit (disk): {}", fingerprint.short());
                let bytes = ImageBytes::from(bytes);
                let mut memory = self.memory();
                // A clear since the lookup started must not see this promoted
                if resets.current() == epoch {
                    memory.insert(fingerprint, ImageBytes::clone(&bytes), modified);
                }
                Some(bytes)
            }
            DiskLookup::Stale => {
                log::debug!("Cache expired: {}", fingerprint.short());
                self.writer.evict(fingerprint);
                None
            }
            DiskLookup::Corrupt => {
                log::warn!("Cache file is not an image, discarding: {}", fingerprint.short());
                self.writer.evict(fingerprint);
                None
            }
            DiskLookup::Missing => {
                log::debug!("Cache miss: {}", fingerprint.short());
                None
            }
        }
    }

    /// Store bytes for `key` in memory now and on disk in the background
    pub fn set(&self, key: &str, bytes: impl Into<ImageBytes>) {
        let fingerprint = Fingerprint::of(key);
        let bytes = bytes.into();

        self.memory()
            .insert(fingerprint.clone(), ImageBytes::clone(&bytes), SystemTime::now());
        self.writer.write(fingerprint, bytes);
    }

    /// Return the cached bytes for `url`, fetching and caching them on a miss.
    ///
    /// Fetched bytes that are not a recognisable image are rejected and not
    /// cached.
    pub async fn get_or_fetch(&self, url: &str, fetcher: &dyn Fetcher) -> Result<ImageBytes> {
        if let Some(bytes) = self.get(url) {
            return Ok(bytes);
        }

        let fetched = fetcher.fetch(url).await?;
        if !looks_like_image(&fetched) {
            bail!("Response from {} is not an image ({} bytes)", url, fetched.len());
        }

        let bytes = ImageBytes::from(fetched);
        self.set(url, ImageBytes::clone(&bytes));
        Ok(bytes)
    }

    /// Empty the memory tier now and recreate the disk tier in the background
    pub fn clear(&self) {
        {
            // Request the reset under the lock so no disk hit is promoted after it
            let mut memory = self.memory();
            memory.clear();
            self.writer.reset();
        }
        log::info!("Cache cleared: {}", self.storage.cache_dir().display());
    }

    /// Queue a sweep of the disk tier without waiting for it
    pub fn schedule_sweep(&self) {
        self.writer.schedule_sweep();
    }

    /// Queue a sweep of the disk tier and wait for its result
    pub async fn sweep(&self) -> CleanupStats {
        self.writer.sweep().await
    }

    /// Wait until all queued disk operations have completed
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (memory_entries, memory_cost_bytes) = {
            let memory = self.memory();
            (memory.len(), memory.total_cost())
        };
        let disk = self.storage.entries();

        CacheStats {
            memory_entries,
            memory_cost_bytes,
            disk_entries: disk.len(),
            disk_size_bytes: disk.iter().map(|entry| entry.size).sum(),
        }
    }

    pub fn policy(&self) -> &CleanupPolicy {
        &self.policy
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> &Path {
        self.storage.cache_dir()
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_cost_bytes: usize,
    pub disk_entries: usize,
    pub disk_size_bytes: u64,
}
