//! The conversion index (spec §3, "Conversion index"): the read-only model
//! built once by the scanner (C6) and consumed throughout transcoding (C7).

use std::collections::HashMap;

/// One `WRLD` record's location, in scan order.
#[derive(Debug, Clone, Copy)]
pub struct WorldEntry {
    pub form_id: u32,
    pub file_offset: u64,
}

/// One `CELL` record's location and classification.
#[derive(Debug, Clone, Copy)]
pub struct CellEntry {
    pub file_offset: u64,
    pub flags: u32,
    pub size: u64,
    pub exterior: bool,
    /// Grid coordinates, present only for exterior cells (from `XCLC`).
    pub grid: Option<(i32, i32)>,
    pub parent_world: Option<u32>,
}

/// A child-group kind attached under a cell record (spec §3, §4.7): a
/// persistent-reference, temporary-reference, or visible-when-distant
/// group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellGroupKind {
    Persistent,
    Temporary,
    VisibleDistant,
}

impl CellGroupKind {
    pub fn from_group_type(group_type: i32) -> Option<CellGroupKind> {
        match group_type {
            8 => Some(CellGroupKind::Persistent),
            9 => Some(CellGroupKind::Temporary),
            10 => Some(CellGroupKind::VisibleDistant),
            _ => None,
        }
    }

    pub fn group_type(self) -> i32 {
        match self {
            CellGroupKind::Persistent => 8,
            CellGroupKind::Temporary => 9,
            CellGroupKind::VisibleDistant => 10,
        }
    }
}

/// A source file range belonging to one cell's child group.
#[derive(Debug, Clone, Copy)]
pub struct FileRange {
    pub offset: u64,
    pub size: u64,
}

/// The full model the scanner builds in one pass and the transcoder
/// borrows for its lifetime (spec §3, "Conversion index").
#[derive(Debug, Clone, Default)]
pub struct ConversionIndex {
    pub worlds: Vec<WorldEntry>,
    pub cells: HashMap<u32, CellEntry>,
    pub exterior_cells_by_world: HashMap<u32, Vec<u32>>,
    pub world_persistent_cell_by_world: HashMap<u32, u32>,
    pub cell_child_groups: HashMap<(u32, CellGroupKind), Vec<FileRange>>,
}

impl ConversionIndex {
    pub fn new() -> Self {
        ConversionIndex::default()
    }

    pub fn world_by_form_id(&self, form_id: u32) -> Option<&WorldEntry> {
        self.worlds.iter().find(|w| w.form_id == form_id)
    }

    pub fn child_groups_for(&self, cell_form_id: u32, kind: CellGroupKind) -> &[FileRange] {
        self.cell_child_groups
            .get(&(cell_form_id, kind))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
