//! Versioned dump-struct offset tables (spec §4.8, §9): field offsets
//! within a runtime struct are never hard-coded in Rust source, since they
//! shift between game builds. Instead each known build publishes a named
//! version tag, and callers load the matching table at runtime.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One field's byte offset (and optional width, for fields narrower than a
/// pointer) within a runtime struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOffset {
    pub offset: u32,
    /// Field width in bytes; `0` means "caller already knows" (used for
    /// fixed-width reads like a `u32` form id where the width is implied by
    /// the accessor, not the table).
    #[serde(default)]
    pub width: u32,
}

impl FieldOffset {
    pub fn new(offset: u32) -> Self {
        FieldOffset { offset, width: 0 }
    }
}

/// The set of field offsets for one runtime struct (e.g. `"TESNPC"`,
/// `"TESObjectCELL"`), keyed by field name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructLayout {
    pub fields: HashMap<String, FieldOffset>,
}

impl StructLayout {
    pub fn offset_of(&self, field: &str) -> Option<u32> {
        self.fields.get(field).map(|f| f.offset)
    }
}

/// A table of [`StructLayout`]s for one named game-build version, loaded
/// externally rather than hard-coded (spec §9: runtime offsets must come
/// from a caller-supplied table, keyed by a version tag the caller
/// chooses, since this crate has no way to verify a given dump's build).
#[derive(Debug, Clone, Default)]
pub struct OffsetTable {
    version: String,
    structs: HashMap<String, StructLayout>,
}

impl OffsetTable {
    pub fn empty(version: impl Into<String>) -> Self {
        OffsetTable {
            version: version.into(),
            structs: HashMap::new(),
        }
    }

    /// Parses a JSON document shaped as `{"version": "...", "structs":
    /// {"TESNPC": {"fields": {"name": {"offset": 12}}}}}`.
    pub fn load_json(json: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Doc {
            version: String,
            structs: HashMap<String, StructLayout>,
        }
        let doc: Doc = serde_json::from_str(json).map_err(Error::from)?;
        Ok(OffsetTable {
            version: doc.version,
            structs: doc.structs,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn register(&mut self, struct_name: impl Into<String>, layout: StructLayout) {
        self.structs.insert(struct_name.into(), layout);
    }

    pub fn layout(&self, struct_name: &str) -> Option<&StructLayout> {
        self.structs.get(struct_name)
    }

    /// Looks up a single field's offset within a named struct.
    pub fn offset_of(&self, struct_name: &str, field: &str) -> Option<u32> {
        self.layout(struct_name)?.offset_of(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let json = r#"{
            "version": "retail-14699",
            "structs": {
                "TESNPC": { "fields": { "name": { "offset": 12, "width": 4 } } }
            }
        }"#;
        let table = OffsetTable::load_json(json).unwrap();
        assert_eq!(table.version(), "retail-14699");
        assert_eq!(table.offset_of("TESNPC", "name"), Some(12));
        assert_eq!(table.offset_of("TESNPC", "missing"), None);
        assert_eq!(table.offset_of("MISSING", "name"), None);
    }

    #[test]
    fn empty_table_resolves_nothing() {
        let table = OffsetTable::empty("unknown");
        assert_eq!(table.offset_of("TESNPC", "name"), None);
    }

    #[test]
    fn register_adds_a_struct_layout() {
        let mut table = OffsetTable::empty("custom");
        let mut layout = StructLayout::default();
        layout.fields.insert("formId".into(), FieldOffset::new(0));
        table.register("TESForm", layout);
        assert_eq!(table.offset_of("TESForm", "formId"), Some(0));
    }
}
