//! Persistent scan history for eggscan
//!
//! A bounded, newest-first list of identification attempts. Each item owns
//! one image blob under `ScannedImages/`; the list itself is kept in
//! `scan_history.json` next to it.

mod record;
mod store;

pub use record::{blob_file_name, ScanHistoryItem, BLOB_EXTENSION};
pub use store::{HistoryEvent, HistoryStore, DEFAULT_MAX_ITEMS, IMAGES_DIR_NAME, INDEX_FILE_NAME};
