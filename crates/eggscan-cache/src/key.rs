//! Cache key fingerprinting using SHA256 hashing

use sha2::{Digest, Sha256};
use std::fmt;

/// Extension of every file in the disk tier
pub const CACHE_FILE_EXTENSION: &str = "jpg";

const FINGERPRINT_LEN: usize = 64;

/// Filesystem-safe identity of a cache key.
///
/// The fingerprint is the lowercase hex SHA256 digest of the key, so long
/// URLs and characters such as `/` or `?` never reach the file system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a resource key (usually a URL)
    pub fn of(key: &str) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        Self(format!("{:x}", digest))
    }

    /// Recover a fingerprint from a disk-tier file name such as `ab12...ef.jpg`
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(CACHE_FILE_EXTENSION)?.strip_suffix('.')?;

        let valid = stem.len() == FINGERPRINT_LEN
            && stem.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        valid.then(|| Self(stem.to_string()))
    }

    /// Name of the disk-tier file holding this entry
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, CACHE_FILE_EXTENSION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
