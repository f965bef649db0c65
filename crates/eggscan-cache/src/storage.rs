//! Disk tier: one file per fingerprint under the cache directory

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::entry::{age_at, DiskEntry};
use crate::key::Fingerprint;

const INCOMING_PREFIX: &str = ".incoming-";

/// Result of probing the disk tier for one fingerprint
#[derive(Debug)]
pub enum DiskLookup {
    Fresh { bytes: Vec<u8>, modified: SystemTime },
    /// Present but older than the TTL
    Stale,
    /// Present but not a recognisable image
    Corrupt,
    Missing,
}

/// Whether `bytes` start with the signature of a known image format
pub fn looks_like_image(bytes: &[u8]) -> bool {
    image::guess_format(bytes).is_ok()
}

/// Cache storage manager
pub struct CacheStorage {
    /// Root cache directory
    cache_dir: PathBuf,
}

impl CacheStorage {
    /// Create a storage rooted at `cache_dir`.
    ///
    /// A directory that cannot be created is logged; every later operation on
    /// it then degrades to a miss or a skipped write.
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        let cache_dir = cache_dir.as_ref().to_path_buf();

        if let Err(e) = fs::create_dir_all(&cache_dir) {
            log::warn!("Failed to create cache directory {}: {}", cache_dir.display(), e);
        }

        Self { cache_dir }
    }

    /// Get the cache file path for a fingerprint
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.cache_dir.join(fingerprint.file_name())
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Probe the disk tier. I/O failures are reported as `Missing`.
    pub fn lookup(&self, fingerprint: &Fingerprint, ttl: Duration) -> DiskLookup {
        let path = self.path_for(fingerprint);

        let modified = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => match metadata.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    log::warn!("No modification time for {}: {}", path.display(), e);
                    return DiskLookup::Missing;
                }
            },
            Ok(_) => return DiskLookup::Missing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return DiskLookup::Missing,
            Err(e) => {
                log::warn!("Failed to stat cache file {}: {}", path.display(), e);
                return DiskLookup::Missing;
            }
        };

        if age_at(modified, SystemTime::now()) > ttl {
            return DiskLookup::Stale;
        }

        match fs::read(&path) {
            Ok(bytes) if looks_like_image(&bytes) => DiskLookup::Fresh { bytes, modified },
            Ok(_) => DiskLookup::Corrupt,
            Err(e) if e.kind() == io::ErrorKind::NotFound => DiskLookup::Missing,
            Err(e) => {
                log::warn!("Failed to read cache file {}: {}", path.display(), e);
                DiskLookup::Missing
            }
        }
    }

    /// Write an entry, atomically replacing any existing file.
    ///
    /// The bytes land in a temporary file in the same directory first, so a
    /// concurrent reader sees the old file, no file, or the new file.
    pub fn write(&self, fingerprint: &Fingerprint, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", self.cache_dir.display())
        })?;

        let mut incoming = tempfile::Builder::new()
            .prefix(INCOMING_PREFIX)
            .tempfile_in(&self.cache_dir)
            .context("Failed to create temporary cache file")?;
        incoming.write_all(bytes).context("Failed to write temporary cache file")?;

        let path = self.path_for(fingerprint);
        incoming
            .persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write cache file: {}", path.display()))?;

        log::debug!("Cache entry saved: {}", path.display());
        Ok(())
    }

    /// Delete the entry if it is stale or corrupt at the time of the call.
    ///
    /// Returns the number of bytes freed.
    pub fn remove_if_unusable(&self, fingerprint: &Fingerprint, ttl: Duration) -> Result<u64> {
        match self.lookup(fingerprint, ttl) {
            DiskLookup::Stale | DiskLookup::Corrupt => self.remove(fingerprint),
            DiskLookup::Fresh { .. } | DiskLookup::Missing => Ok(0),
        }
    }

    /// Delete a cache entry, returning the number of bytes freed
    pub fn remove(&self, fingerprint: &Fingerprint) -> Result<u64> {
        let path = self.path_for(fingerprint);
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Cache entry deleted: {}", path.display());
                Ok(size)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e).with_context(|| format!("Failed to delete cache file: {}", path.display())),
        }
    }

    /// Delete and recreate the whole cache directory
    pub fn reset(&self) -> Result<()> {
        match fs::remove_dir_all(&self.cache_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to remove cache directory: {}", self.cache_dir.display())
                })
            }
        }

        fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("Failed to recreate cache directory: {}", self.cache_dir.display())
        })
    }

    /// All cache files currently on disk. Unreadable files are skipped.
    pub fn entries(&self) -> Vec<DiskEntry> {
        walkdir::WalkDir::new(&self.cache_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| match DiskEntry::from_path(e.path()) {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Failed to stat cache file {}: {}", e.path().display(), err);
                    None
                }
            })
            .collect()
    }

    /// Delete `.incoming-` temporary files left behind by an interrupted
    /// write once they are older than `grace`.
    ///
    /// Returns the number of files deleted and the bytes freed.
    pub fn remove_abandoned_incoming(&self, grace: Duration, now: SystemTime) -> (usize, u64) {
        let mut removed = 0;
        let mut freed = 0;

        let candidates = walkdir::WalkDir::new(&self.cache_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.file_name().to_string_lossy().starts_with(INCOMING_PREFIX));

        for candidate in candidates {
            let path = candidate.path();
            let metadata = match candidate.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    log::warn!("Failed to stat temporary file {}: {}", path.display(), e);
                    continue;
                }
            };
            let modified = metadata.modified().unwrap_or(now);
            if age_at(modified, now) <= grace {
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => {
                    log::debug!("Abandoned temporary file deleted: {}", path.display());
                    removed += 1;
                    freed += metadata.len();
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to delete temporary file {}: {}", path.display(), e),
            }
        }

        (removed, freed)
    }

    /// Calculate total cache size in bytes
    pub fn total_size(&self) -> u64 {
        self.entries().iter().map(|entry| entry.size).sum()
    }

    /// Count total cache entries
    pub fn entry_count(&self) -> usize {
        self.entries().len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    pub(crate) const DAY: Duration = Duration::from_secs(24 * 60 * 60);
    const TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    /// Minimal bytes carrying a JPEG signature
    pub(crate) fn jpeg(tag: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.extend_from_slice(tag);
        bytes
    }

    pub(crate) fn set_age(path: &Path, age: Duration) {
        let stamp = FileTime::from_system_time(SystemTime::now() - age);
        filetime::set_file_mtime(path, stamp).unwrap();
    }

    #[test]
    fn test_storage_creation() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path().join("ImageCache"));

        assert!(storage.cache_dir().exists());
    }

    #[test]
    fn test_write_and_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path());
        let fp = Fingerprint::of("https://example.com/egg.jpg");

        storage.write(&fp, &jpeg(b"robin")).unwrap();

        match storage.lookup(&fp, TTL) {
            DiskLookup::Fresh { bytes, .. } => assert_eq!(bytes, jpeg(b"robin")),
            other => panic!("expected fresh entry, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_missing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path());

        assert!(matches!(storage.lookup(&Fingerprint::of("nope"), TTL), DiskLookup::Missing));
    }

    #[test]
    fn test_lookup_stale() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path());
        let fp = Fingerprint::of("old");

        storage.write(&fp, &jpeg(b"old")).unwrap();
        set_age(&storage.path_for(&fp), 31 * DAY);

        assert!(matches!(storage.lookup(&fp, TTL), DiskLookup::Stale));
    }

    #[test]
    fn test_lookup_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path());
        let fp = Fingerprint::of("garbage");

        fs::write(storage.path_for(&fp), b"definitely not an image").unwrap();

        assert!(matches!(storage.lookup(&fp, TTL), DiskLookup::Corrupt));
    }

    #[test]
    fn test_write_overwrites_and_refreshes_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path());
        let fp = Fingerprint::of("key");

        storage.write(&fp, &jpeg(b"v1")).unwrap();
        set_age(&storage.path_for(&fp), 31 * DAY);
        storage.write(&fp, &jpeg(b"v2")).unwrap();

        match storage.lookup(&fp, TTL) {
            DiskLookup::Fresh { bytes, .. } => assert_eq!(bytes, jpeg(b"v2")),
            other => panic!("expected fresh entry, got {:?}", other),
        }
        assert_eq!(storage.entry_count(), 1, "No temporary files should remain");
    }

    #[test]
    fn test_remove_if_unusable_keeps_fresh_entries() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path());
        let fresh = Fingerprint::of("fresh");
        let stale = Fingerprint::of("stale");

        storage.write(&fresh, &jpeg(b"fresh")).unwrap();
        storage.write(&stale, &jpeg(b"stale")).unwrap();
        set_age(&storage.path_for(&stale), 40 * DAY);

        assert_eq!(storage.remove_if_unusable(&fresh, TTL).unwrap(), 0);
        assert!(storage.remove_if_unusable(&stale, TTL).unwrap() > 0);
        assert!(storage.path_for(&fresh).exists());
        assert!(!storage.path_for(&stale).exists());
    }

    #[test]
    fn test_entries_total_size_and_count() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path());

        assert_eq!(storage.entry_count(), 0);

        storage.write(&Fingerprint::of("a"), &jpeg(b"12")).unwrap();
        storage.write(&Fingerprint::of("b"), &jpeg(b"3456")).unwrap();
        fs::write(temp_dir.path().join("README.txt"), b"ignored").unwrap();

        assert_eq!(storage.entry_count(), 2);
        assert_eq!(storage.total_size(), 6 + 8);
    }

    #[test]
    fn test_reset() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path().join("ImageCache"));

        storage.write(&Fingerprint::of("a"), &jpeg(b"a")).unwrap();
        storage.write(&Fingerprint::of("b"), &jpeg(b"b")).unwrap();

        storage.reset().unwrap();

        assert!(storage.cache_dir().exists());
        assert_eq!(storage.entry_count(), 0);
    }

    #[test]
    fn test_remove_abandoned_incoming() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path());
        let fp = Fingerprint::of("kept");
        storage.write(&fp, &jpeg(b"kept")).unwrap();
        set_age(&storage.path_for(&fp), 2 * DAY);

        let abandoned = temp_dir.path().join(".incoming-abandoned");
        let in_flight = temp_dir.path().join(".incoming-in-flight");
        fs::write(&abandoned, b"partial").unwrap();
        fs::write(&in_flight, b"partial").unwrap();
        set_age(&abandoned, Duration::from_secs(2 * 60 * 60));

        let (removed, freed) =
            storage.remove_abandoned_incoming(Duration::from_secs(60 * 60), SystemTime::now());

        assert_eq!((removed, freed), (1, 7));
        assert!(!abandoned.exists());
        assert!(in_flight.exists());
        assert!(storage.path_for(&fp).exists(), "Cache files are not temporary files");
    }
}
