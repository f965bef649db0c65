//! Collaborator trait definitions.

use anyhow::Result;
use async_trait::async_trait;

use crate::identification::Identification;

/// Fetches the bytes behind a remote resource key.
///
/// Implementations must be idempotent and safe to retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Identifies the species that laid the egg shown in an image.
#[async_trait]
pub trait Identifier: Send + Sync {
    async fn identify(&self, image: &[u8]) -> Result<Identification>;
}
