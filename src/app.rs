//! Wiring of the cache, the history and the two remote collaborators

use anyhow::{Context, Result};
use eggscan_cache::ContentCache;
use eggscan_core::{Fetcher, Identifier};
use eggscan_history::HistoryStore;
use std::sync::Arc;

use crate::config::EggscanConfig;
use crate::fetch::HttpFetcher;
use crate::vision::OpenAiVision;

/// Everything a command needs, built once per process and passed down
pub struct AppContext {
    pub config: EggscanConfig,
    pub cache: ContentCache,
    pub history: HistoryStore,
    pub fetcher: Arc<dyn Fetcher>,
    pub identifier: Arc<dyn Identifier>,
}

impl AppContext {
    /// Build the context with the HTTP collaborators.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: EggscanConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let identifier = Arc::new(OpenAiVision::new(&config.identify).context("Failed to set up the vision client")?);

        Self::with_collaborators(config, fetcher, identifier)
    }

    /// Build the context around caller-supplied collaborators
    pub fn with_collaborators(
        config: EggscanConfig,
        fetcher: Arc<dyn Fetcher>,
        identifier: Arc<dyn Identifier>,
    ) -> Result<Self> {
        let cache = ContentCache::with_config(
            &config.cache.directory,
            config.cache.to_cleanup_policy(),
            config.cache.to_memory_limits(),
        )
        .with_context(|| format!("Failed to open image cache at {}", config.cache.directory.display()))?;

        let history = HistoryStore::with_capacity(&config.history.directory, config.history.max_items);

        log::debug!(
            "Cache at {}, history at {} ({} items)",
            config.cache.directory.display(),
            config.history.directory.display(),
            history.len()
        );

        Ok(Self {
            config,
            cache,
            history,
            fetcher,
            identifier,
        })
    }

    /// Wait for queued cache writes to reach the disk
    pub async fn shutdown(&self) {
        self.cache.flush().await;
    }
}
