//! Identification result types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label recorded when the species could not be determined.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Confidence score in percent, always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Confidence(u8);

impl Confidence {
    pub const MIN: Confidence = Confidence(0);
    pub const MAX: Confidence = Confidence(100);

    /// Build a confidence score, clamping out-of-range values.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl From<i64> for Confidence {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<Confidence> for u8 {
    fn from(confidence: Confidence) -> Self {
        confidence.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Outcome of identifying one egg image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    /// Common species name, or [`UNKNOWN_LABEL`]
    pub label: String,

    /// Scientific name, or [`UNKNOWN_LABEL`]
    pub scientific_name: String,

    pub confidence: Confidence,
}

impl Identification {
    pub fn new(
        label: impl Into<String>,
        scientific_name: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        Self {
            label: label.into(),
            scientific_name: scientific_name.into(),
            confidence,
        }
    }

    /// The result recorded for a failed identification attempt.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_LABEL, UNKNOWN_LABEL, Confidence::MIN)
    }

    pub fn is_unknown(&self) -> bool {
        self.label.eq_ignore_ascii_case(UNKNOWN_LABEL)
    }
}
