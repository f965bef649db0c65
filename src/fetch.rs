//! HTTP implementation of the [`Fetcher`] collaborator

use anyhow::{Context, Result};
use async_trait::async_trait;
use eggscan_core::Fetcher;
use reqwest::Client;

use crate::config::FetchConfig;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("eggscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Request to {} was rejected", url))?;

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;

        Ok(bytes.to_vec())
    }
}
