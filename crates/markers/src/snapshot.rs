//! JSON snapshot codec for the marker collection.
//!
//! The stored value is a JSON array of `{id, lng, lat, label, note}` objects.
//! Decoding validates each record on its own: malformed records are dropped
//! and reported, well-formed ones survive.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::config::StoreConfig;
use crate::error::MarkerError;
use crate::model::{Marker, MarkerId};

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRecord {
    /// Position in the stored array.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub markers: Vec<Marker>,
    pub dropped: Vec<DroppedRecord>,
}

#[derive(Debug, Deserialize)]
struct StoredMarker {
    id: String,
    lng: f64,
    lat: f64,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

pub fn encode(markers: &[Marker]) -> Result<String, MarkerError> {
    serde_json::to_string(markers).map_err(|e| MarkerError::PersistenceWriteFailed(e.to_string()))
}

pub fn decode(raw: &str, config: &StoreConfig) -> Result<Decoded, MarkerError> {
    if raw.trim().is_empty() {
        return Ok(Decoded::default());
    }

    // Elements stay unparsed here so one bad number cannot sink the array.
    let doc: Box<RawValue> =
        serde_json::from_str(raw).map_err(|e| MarkerError::PersistenceReadCorrupt(e.to_string()))?;
    let text = doc.get().trim_start();
    if !text.starts_with('[') {
        return Err(MarkerError::PersistenceReadCorrupt(format!(
            "expected a JSON array, found {}",
            json_kind(text)
        )));
    }
    let items: Vec<Box<RawValue>> = serde_json::from_str(text)
        .map_err(|e| MarkerError::PersistenceReadCorrupt(e.to_string()))?;

    let mut out = Decoded::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match decode_record(&item, config) {
            Ok(marker) => {
                if !seen.insert(marker.id.as_str().to_string()) {
                    out.dropped.push(DroppedRecord {
                        index,
                        reason: format!("duplicate id {}", marker.id),
                    });
                    continue;
                }
                out.markers.push(marker);
            }
            Err(reason) => out.dropped.push(DroppedRecord { index, reason }),
        }
    }
    Ok(out)
}

fn decode_record(item: &RawValue, config: &StoreConfig) -> Result<Marker, String> {
    let stored: StoredMarker = serde_json::from_str(item.get()).map_err(|e| e.to_string())?;
    if stored.id.trim().is_empty() {
        return Err("empty id".to_string());
    }
    if !foundation::LngLat::is_valid(stored.lng, stored.lat) {
        return Err(format!(
            "coordinates out of range: lng={} lat={}",
            stored.lng, stored.lat
        ));
    }
    Ok(Marker {
        id: MarkerId::new(stored.id),
        lng: stored.lng,
        lat: stored.lat,
        label: config.normalize_label(stored.label.as_deref()),
        note: config.clamp_note(stored.note.as_deref().unwrap_or("")),
    })
}

/// Kind of a raw JSON value, judged by its first byte.
fn json_kind(raw: &str) -> &'static str {
    match raw.as_bytes().first() {
        Some(b'n') => "null",
        Some(b't' | b'f') => "a boolean",
        Some(b'"') => "a string",
        Some(b'[') => "an array",
        Some(b'{') => "an object",
        _ => "a number",
    }
}
