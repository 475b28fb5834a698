use crate::store::PlateStore;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{RawBox, SCHEMA_VERSION, TrackedPlate};

/// Serialized outcome of consolidating one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResultSet {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub fps: f64,
    pub plates: Vec<TrackedPlate>,
    /// Messages of recognitions the backend reported as failed.
    #[serde(default)]
    pub failures: Vec<String>,
    #[serde(default)]
    pub raw_boxes: Vec<RawBox>,
    #[serde(default)]
    pub skipped_records: usize,
}

impl ResultSet {
    pub fn from_store(store: &PlateStore, filename: Option<String>, fps: f64) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            filename,
            fps,
            plates: store.plates().cloned().collect(),
            failures: store.failures().to_vec(),
            raw_boxes: store.raw_boxes().to_vec(),
            skipped_records: store.skipped_records(),
        }
    }
}
