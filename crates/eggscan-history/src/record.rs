//! Scan history records as kept in memory and in the index file

use chrono::{DateTime, Utc};
use eggscan_core::Confidence;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Extension of every image blob
pub const BLOB_EXTENSION: &str = "jpg";

/// One identification attempt.
///
/// Serialized as `{id, imageFileName, result, scientificName, date,
/// confidence}` with the date as an RFC 3339 timestamp in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryItem {
    pub id: Uuid,

    /// Blob file name inside the images directory
    pub image_file_name: String,

    /// Species name or `"Unknown"`
    pub result: String,

    pub scientific_name: String,

    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,

    pub confidence: Confidence,
}

impl ScanHistoryItem {
    pub fn new(
        result: impl Into<String>,
        scientific_name: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            image_file_name: blob_file_name(&id),
            result: result.into(),
            scientific_name: scientific_name.into(),
            date: Utc::now(),
            confidence,
        }
    }

    /// Whether the blob name is a bare file name that cannot escape the
    /// images directory
    pub fn has_safe_file_name(&self) -> bool {
        let name = self.image_file_name.as_str();
        !name.is_empty()
            && !name.starts_with('.')
            && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
    }
}

pub fn blob_file_name(id: &Uuid) -> String {
    format!("{}.{}", id, BLOB_EXTENSION)
}

/// ISO-8601 timestamps without fractional seconds
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|date| date.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_item_names_blob_after_id() {
        let item = ScanHistoryItem::new("American Robin", "Turdus migratorius", Confidence::new(82));

        assert_eq!(item.image_file_name, format!("{}.jpg", item.id));
        assert!(item.has_safe_file_name());
    }

    #[test]
    fn test_index_wire_format() {
        let item = ScanHistoryItem {
            id: Uuid::parse_str("6F9619FF-8B86-D011-B42D-00C04FC964FF").unwrap(),
            image_file_name: "6F9619FF-8B86-D011-B42D-00C04FC964FF.jpg".to_string(),
            result: "Killdeer".to_string(),
            scientific_name: "Charadrius vociferus".to_string(),
            date: Utc.with_ymd_and_hms(2025, 8, 11, 9, 30, 0).unwrap(),
            confidence: Confidence::new(64),
        };

        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["imageFileName"], "6F9619FF-8B86-D011-B42D-00C04FC964FF.jpg");
        assert_eq!(value["scientificName"], "Charadrius vociferus");
        assert_eq!(value["date"], "2025-08-11T09:30:00Z");
        assert_eq!(value["confidence"], 64);

        let parsed: ScanHistoryItem = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_reads_fractional_and_offset_dates() {
        let json = r#"{
            "id": "0b7c5e0e-5b8e-4c1c-9f57-3f1a2d4b6c7d",
            "imageFileName": "0b7c5e0e-5b8e-4c1c-9f57-3f1a2d4b6c7d.jpg",
            "result": "Unknown",
            "scientificName": "Unknown",
            "date": "2025-08-11T11:30:00.250+02:00",
            "confidence": 0
        }"#;

        let item: ScanHistoryItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.date.to_rfc3339_opts(chrono::SecondsFormat::Millis, true), "2025-08-11T09:30:00.250Z");
    }

    #[test]
    fn test_rejects_path_like_file_names() {
        let mut item = ScanHistoryItem::new("Unknown", "Unknown", Confidence::MIN);

        for name in ["../secrets.jpg", "nested/a.jpg", "", ".hidden.jpg", "/abs.jpg"] {
            item.image_file_name = name.to_string();
            assert!(!item.has_safe_file_name(), "{name} should be rejected");
        }
    }
}
