//! Disk-tier entry metadata

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::key::Fingerprint;

/// A file in the disk tier, as seen by the file system
#[derive(Debug, Clone)]
pub struct DiskEntry {
    pub fingerprint: Fingerprint,

    pub path: PathBuf,

    /// Size of the encoded image in bytes
    pub size: u64,

    /// Last write time; the freshness signal of the disk tier
    pub modified: SystemTime,
}

impl DiskEntry {
    /// Stat a cache file. Returns `Ok(None)` for paths that are not cache files.
    pub fn from_path(path: &Path) -> io::Result<Option<Self>> {
        let Some(fingerprint) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(Fingerprint::from_file_name)
        else {
            return Ok(None);
        };

        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            fingerprint,
            path: path.to_path_buf(),
            size: metadata.len(),
            modified: metadata.modified()?,
        }))
    }

    /// Age relative to `now`; files stamped in the future count as brand new
    pub fn age_at(&self, now: SystemTime) -> Duration {
        age_at(self.modified, now)
    }

    pub fn is_expired_at(&self, ttl: Duration, now: SystemTime) -> bool {
        self.age_at(now) > ttl
    }
}

pub(crate) fn age_at(stamp: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(stamp).unwrap_or(Duration::ZERO)
}
