use anyhow::{bail, Result};
use async_trait::async_trait;
use eggscan::app::AppContext;
use eggscan::config::EggscanConfig;
use eggscan::scan::record_scan;
use eggscan::{Confidence, Fetcher, Identification, Identifier};
use eggscan_history::HistoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const JPEG_MAGIC: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

fn jpeg(tag: &[u8]) -> Vec<u8> {
    let mut bytes = JPEG_MAGIC.to_vec();
    bytes.extend_from_slice(tag);
    bytes
}

fn test_config(temp_dir: &TempDir) -> EggscanConfig {
    let mut config = EggscanConfig::default();
    config.cache.directory = temp_dir.path().join("ImageCache");
    config.history.directory = temp_dir.path().join("history");
    config
}

/// Answers from a script, one reply per call; runs out as an error
struct ScriptedIdentifier {
    replies: Vec<Option<Identification>>,
    calls: AtomicUsize,
}

impl ScriptedIdentifier {
    fn new(replies: Vec<Option<Identification>>) -> Self {
        Self {
            replies,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Identifier for ScriptedIdentifier {
    async fn identify(&self, _image: &[u8]) -> Result<Identification> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.get(call).cloned().flatten() {
            Some(identification) => Ok(identification),
            None => bail!("no usable reply"),
        }
    }
}

struct CountingFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(jpeg(url.as_bytes()))
    }
}

fn robin() -> Identification {
    Identification::new("American Robin", "Turdus migratorius", Confidence::new(82))
}

#[tokio::test]
async fn test_unknown_then_robin_lists_newest_first() {
    let temp_dir = TempDir::new().unwrap();
    let identifier = ScriptedIdentifier::new(vec![None, Some(robin())]);
    let mut history = HistoryStore::open(temp_dir.path());

    record_scan(&identifier, &mut history, &jpeg(b"A")).await;
    record_scan(&identifier, &mut history, &jpeg(b"B")).await;

    let results: Vec<&str> = history.list().iter().map(|item| item.result.as_str()).collect();
    assert_eq!(results, vec!["American Robin", "Unknown"]);

    let newest = &history.list()[0];
    assert_eq!(newest.scientific_name, "Turdus migratorius");
    assert_eq!(history.image(newest).unwrap(), jpeg(b"B"));
}

#[tokio::test]
async fn test_history_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let identifier = ScriptedIdentifier::new(vec![Some(robin()); 3]);

    {
        let mut history = HistoryStore::open(temp_dir.path());
        for tag in [b"1", b"2", b"3"] {
            record_scan(&identifier, &mut history, &jpeg(tag)).await;
        }
    }

    let history = HistoryStore::open(temp_dir.path());
    assert_eq!(history.len(), 3);
    assert_eq!(history.image(&history.list()[0]).unwrap(), jpeg(b"3"));
}

#[tokio::test]
async fn test_app_context_wires_cache_and_history() {
    let temp_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(CountingFetcher {
        calls: AtomicUsize::new(0),
    });
    let identifier = Arc::new(ScriptedIdentifier::new(vec![Some(robin())]));

    let mut app = AppContext::with_collaborators(test_config(&temp_dir), fetcher.clone(), identifier).unwrap();

    let url = "https://example.com/eggs/robin.jpg";
    let first = app.cache.get_or_fetch(url, app.fetcher.as_ref()).await.unwrap();
    let second = app.cache.get_or_fetch(url, app.fetcher.as_ref()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    let outcome = record_scan(app.identifier.as_ref(), &mut app.history, &first).await;
    assert_eq!(outcome.identification, robin());
    assert_eq!(app.history.len(), 1);

    app.shutdown().await;
    assert_eq!(app.cache.stats().disk_entries, 1);
}

#[tokio::test]
async fn test_history_capacity_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.history.max_items = 2;

    let fetcher = Arc::new(CountingFetcher {
        calls: AtomicUsize::new(0),
    });
    let identifier = Arc::new(ScriptedIdentifier::new(Vec::new()));
    let mut app = AppContext::with_collaborators(config, fetcher, identifier).unwrap();

    for tag in [b"1", b"2", b"3"] {
        record_scan(app.identifier.as_ref(), &mut app.history, &jpeg(tag)).await;
    }

    assert_eq!(app.history.len(), 2);
    assert!(app.history.list().iter().all(|item| item.result == "Unknown"));
}
