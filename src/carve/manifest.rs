//! Carve entries and the on-disk manifest (spec §3 "Carve entry", §6 "Carve
//! manifest"). Field names match spec §6 exactly so the manifest is a stable
//! interface for external report generators.

use crate::format::FormatId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One recovered file. Serialized field names are spec §6's exact contract;
/// `#[serde(rename)]` keeps Rust-idiomatic field names internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarveEntry {
    #[serde(rename = "fileType")]
    pub file_type: FormatId,
    pub offset: u64,
    #[serde(rename = "sizeInDump")]
    pub size_in_dump: u64,
    #[serde(rename = "sizeOutput")]
    pub size_output: u64,
    pub filename: String,
    #[serde(rename = "originalPath", skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,
    #[serde(rename = "isCompressed")]
    pub is_compressed: bool,
    #[serde(rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "isPartial")]
    pub is_partial: bool,
    /// Coverage ratio in `[0, 1]`; `1.0` unless reassembly hit a gap.
    pub coverage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// The full set of entries from one carve run, in ascending dump-offset
/// order (spec §5, "Ordering guarantees").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarveManifest {
    pub entries: Vec<CarveEntry>,
}

impl CarveManifest {
    pub fn new() -> Self {
        CarveManifest::default()
    }

    pub fn push(&mut self, entry: CarveEntry) {
        self.entries.push(entry);
    }

    /// Count of entries already emitted for `format`, used to enforce
    /// [`crate::carve::CarveOptions::per_type_cap`].
    pub fn count_for(&self, format: FormatId) -> u64 {
        self.entries.iter().filter(|e| e.file_type == format).count() as u64
    }

    /// Writes `manifest.json` under `output_root` (spec §6).
    pub fn write_to(&self, output_root: &Path) -> crate::Result<()> {
        let path = output_root.join("manifest.json");
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_json() {
        let mut m = CarveManifest::new();
        m.push(CarveEntry {
            file_type: "dds",
            offset: 0x4000,
            size_in_dump: 16512,
            size_output: 16512,
            filename: "00004000.dds".into(),
            original_path: None,
            is_compressed: false,
            content_type: None,
            is_partial: false,
            coverage: 1.0,
            notes: None,
            metadata: HashMap::new(),
        });
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"fileType\":\"dds\""));
        assert!(json.contains("\"sizeInDump\":16512"));
        let back: CarveManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entries.len(), 1);
        assert_eq!(back.entries[0].offset, 0x4000);
    }

    #[test]
    fn count_for_filters_by_format() {
        let mut m = CarveManifest::new();
        for ft in ["dds", "dds", "png"] {
            m.push(CarveEntry {
                file_type: ft,
                offset: 0,
                size_in_dump: 0,
                size_output: 0,
                filename: String::new(),
                original_path: None,
                is_compressed: false,
                content_type: None,
                is_partial: false,
                coverage: 1.0,
                notes: None,
                metadata: HashMap::new(),
            });
        }
        assert_eq!(m.count_for("dds"), 2);
        assert_eq!(m.count_for("png"), 1);
        assert_eq!(m.count_for("xma"), 0);
    }
}
