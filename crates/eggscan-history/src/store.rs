//! History store: an index file plus one image blob per item

use anyhow::{Context, Result};
use eggscan_core::{Confidence, Identification};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::record::ScanHistoryItem;

/// Default number of items kept
pub const DEFAULT_MAX_ITEMS: usize = 50;

/// Index file name inside the history root
pub const INDEX_FILE_NAME: &str = "scan_history.json";

/// Blob directory name inside the history root
pub const IMAGES_DIR_NAME: &str = "ScannedImages";

const EVENT_CAPACITY: usize = 16;

/// Change notification for observers of the history list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    Appended { id: Uuid },
    /// Oldest items dropped to stay within capacity
    Evicted { ids: Vec<Uuid> },
    Cleared,
}

/// Capacity-bounded, newest-first log of scan results.
///
/// The list is loaded once by [`HistoryStore::open`]; afterwards every
/// mutation rewrites the whole index file.
pub struct HistoryStore {
    index_path: PathBuf,
    images_dir: PathBuf,
    max_items: usize,
    items: Vec<ScanHistoryItem>,
    events: broadcast::Sender<HistoryEvent>,
}

impl HistoryStore {
    /// Open the store rooted at `root` with the default capacity
    pub fn open<P: AsRef<Path>>(root: P) -> Self {
        Self::with_capacity(root, DEFAULT_MAX_ITEMS)
    }

    /// Open the store rooted at `root`, keeping at most `max_items` items
    pub fn with_capacity<P: AsRef<Path>>(root: P, max_items: usize) -> Self {
        let root = root.as_ref();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut store = Self {
            index_path: root.join(INDEX_FILE_NAME),
            images_dir: root.join(IMAGES_DIR_NAME),
            max_items: max_items.max(1),
            items: Vec::new(),
            events,
        };
        store.load();
        store
    }

    /// Record a scan result.
    ///
    /// Returns the new item, or `None` when its image could not be saved; an
    /// item is never listed without its blob.
    pub fn append(
        &mut self,
        image: &[u8],
        result: &str,
        scientific_name: &str,
        confidence: Confidence,
    ) -> Option<ScanHistoryItem> {
        let item = ScanHistoryItem::new(result, scientific_name, confidence);

        if let Err(e) = self.write_blob(&item, image) {
            log::warn!("Scan result not recorded: {:#}", e);
            return None;
        }

        self.items.insert(0, item.clone());
        let evicted = self.evict_overflow();
        self.persist();

        log::info!("Recorded scan {} ({}, {})", item.id, item.result, item.confidence);
        self.notify(HistoryEvent::Appended { id: item.id });
        if !evicted.is_empty() {
            self.notify(HistoryEvent::Evicted { ids: evicted });
        }

        Some(item)
    }

    /// Record an identification outcome
    pub fn record(&mut self, image: &[u8], identification: &Identification) -> Option<ScanHistoryItem> {
        self.append(
            image,
            &identification.label,
            &identification.scientific_name,
            identification.confidence,
        )
    }

    /// Items, newest first
    pub fn list(&self) -> &[ScanHistoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_items
    }

    /// Delete every item and its blob
    pub fn clear(&mut self) {
        for item in std::mem::take(&mut self.items) {
            self.remove_blob(&item);
        }
        // The blob directory belongs to this store; drop orphans as well
        self.remove_orphaned_blobs();
        self.persist();

        log::info!("Scan history cleared");
        self.notify(HistoryEvent::Cleared);
    }

    /// Read the image of an item
    pub fn image(&self, item: &ScanHistoryItem) -> Option<Vec<u8>> {
        match fs::read(self.blob_path(item)) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("Image for scan {} unavailable: {}", item.id, e);
                None
            }
        }
    }

    pub fn blob_path(&self, item: &ScanHistoryItem) -> PathBuf {
        self.images_dir.join(&item.image_file_name)
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }

    /// Rebuild the list from the index, dropping records without a blob
    fn load(&mut self) {
        if let Err(e) = fs::create_dir_all(&self.images_dir) {
            log::warn!("Failed to create {}: {}", self.images_dir.display(), e);
        }

        let content = match fs::read_to_string(&self.index_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                log::warn!("Failed to read scan history {}: {}", self.index_path.display(), e);
                return;
            }
        };

        let records: Vec<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Scan history index is corrupt, starting empty: {}", e);
                return;
            }
        };

        let total = records.len();
        self.items = records
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<ScanHistoryItem>(record) {
                Ok(item) => Some(item),
                Err(e) => {
                    log::warn!("Skipping unreadable history record: {}", e);
                    None
                }
            })
            .filter(|item| item.has_safe_file_name() && self.blob_is_readable(item))
            .collect();

        if self.items.len() < total {
            log::info!(
                "Dropped {} history records without a usable image",
                total - self.items.len()
            );
        }

        if !self.evict_overflow().is_empty() {
            self.persist();
        }

        log::debug!("Loaded {} history items", self.items.len());
    }

    /// Trim the tail beyond capacity, deleting the blobs of removed items
    fn evict_overflow(&mut self) -> Vec<Uuid> {
        if self.items.len() <= self.max_items {
            return Vec::new();
        }

        let evicted = self.items.split_off(self.max_items);
        for item in &evicted {
            self.remove_blob(item);
            log::debug!("Evicted history item {}", item.id);
        }
        evicted.into_iter().map(|item| item.id).collect()
    }

    /// Overwrite the index with the current list. Failures are logged only.
    fn persist(&self) {
        if let Err(e) = self.write_index() {
            log::warn!("Failed to save scan history: {:#}", e);
        }
    }

    fn write_index(&self) -> Result<()> {
        let dir = self.index_path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let content = serde_json::to_vec_pretty(&self.items).context("Failed to serialize scan history")?;

        let mut incoming = tempfile::Builder::new()
            .prefix(".scan_history-")
            .tempfile_in(dir)
            .context("Failed to create temporary index file")?;
        incoming.write_all(&content).context("Failed to write temporary index file")?;
        incoming
            .persist(&self.index_path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", self.index_path.display()))?;

        Ok(())
    }

    fn write_blob(&self, item: &ScanHistoryItem, image: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.images_dir)
            .with_context(|| format!("Failed to create {}", self.images_dir.display()))?;

        let path = self.blob_path(item);
        fs::write(&path, image).with_context(|| format!("Failed to write image {}", path.display()))
    }

    fn remove_blob(&self, item: &ScanHistoryItem) {
        if !item.has_safe_file_name() {
            return;
        }
        let path = self.blob_path(item);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to delete image {}: {}", path.display(), e),
        }
    }

    fn remove_orphaned_blobs(&self) {
        let Ok(entries) = fs::read_dir(&self.images_dir) else {
            return;
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("Failed to delete orphaned image {}: {}", path.display(), e);
                }
            }
        }
    }

    fn blob_is_readable(&self, item: &ScanHistoryItem) -> bool {
        fs::File::open(self.blob_path(item))
            .and_then(|file| file.metadata())
            .map(|metadata| metadata.is_file())
            .unwrap_or(false)
    }

    fn notify(&self, event: HistoryEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}
