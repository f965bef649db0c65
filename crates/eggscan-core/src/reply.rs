//! Parsing of the vision model's reply.
//!
//! The model answers in two labelled lines:
//!
//! ```text
//! Bird Name: American Robin (Turdus migratorius)
//! Confidence: 82%
//! ```

use crate::identification::{Confidence, Identification, UNKNOWN_LABEL};

const NAME_MARKER: &str = "Bird Name:";
const CONFIDENCE_MARKER: &str = "Confidence:";

/// Extract an [`Identification`] from a model reply.
///
/// Unlabelled or unparseable fields fall back to [`UNKNOWN_LABEL`] and a
/// confidence of zero.
pub fn parse_reply(reply: &str) -> Identification {
    let mut label = UNKNOWN_LABEL.to_string();
    let mut scientific_name = UNKNOWN_LABEL.to_string();
    let mut confidence = Confidence::MIN;

    for line in reply.lines() {
        if let Some(pos) = line.find(NAME_MARKER) {
            let value = line[pos + NAME_MARKER.len()..].trim();
            let (name, scientific) = split_scientific_name(value);
            if !name.is_empty() {
                label = name.to_string();
            }
            if let Some(scientific) = scientific {
                scientific_name = scientific.to_string();
            }
        } else if let Some(pos) = line.find(CONFIDENCE_MARKER) {
            let value = line[pos + CONFIDENCE_MARKER.len()..].replace('%', "");
            confidence = value
                .trim()
                .parse::<i64>()
                .map(Confidence::new)
                .unwrap_or(Confidence::MIN);
        }
    }

    Identification::new(label, scientific_name, confidence)
}

/// Split `"Name (Scientific name)"` into its two parts.
fn split_scientific_name(value: &str) -> (&str, Option<&str>) {
    match value.find('(') {
        Some(open) => {
            let name = value[..open].trim();
            let rest = &value[open + 1..];
            let scientific = rest.find(')').map_or(rest, |close| &rest[..close]).trim();
            (name, (!scientific.is_empty()).then_some(scientific))
        }
        None => (value, None),
    }
}
