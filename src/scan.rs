//! Identify an image and record the outcome in the history

use eggscan_core::{Identification, Identifier};
use eggscan_history::{HistoryStore, ScanHistoryItem};

/// Result of one scan
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub identification: Identification,

    /// The recorded item, `None` when the image could not be persisted
    pub item: Option<ScanHistoryItem>,
}

/// Run `identifier` on `image` and append the result to `history`.
///
/// A failed identification is recorded as `"Unknown"` with zero confidence,
/// so every scan produces exactly one history item.
pub async fn record_scan(
    identifier: &dyn Identifier,
    history: &mut HistoryStore,
    image: &[u8],
) -> ScanOutcome {
    let identification = match identifier.identify(image).await {
        Ok(identification) => identification,
        Err(e) => {
            log::warn!("Identification failed: {:#}", e);
            Identification::unknown()
        }
    };

    let item = history.record(image, &identification);

    ScanOutcome { identification, item }
}
