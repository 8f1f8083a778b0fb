//! World-cell offset table (`OFST`) rebuild (spec §4.7 "OFST rebuild", §8
//! scenario 6).
//!
//! Run once, after every record and group has been written to the output
//! buffer in target byte order: re-scans the output for `CELL` records to
//! build a `form_id → output_offset` map, then for each world recomputes
//! its `OFST` subrecord's 2-D offset array from its exterior cells' grid
//! coordinates and patches the bytes in place.

use crate::esm::header::{RecordHeader, RECORD_HEADER_LEN};
use crate::esm::index::ConversionIndex;
use crate::esm::subrecord::iter_subrecords;
use crate::primitives;
use log::warn;
use std::collections::HashMap;

/// Inclusive grid bounds of a world's exterior cells.
#[derive(Debug, Clone, Copy)]
struct WorldBounds {
    min_x: i32,
    max_x: i32,
    min_y: i32,
    max_y: i32,
}

impl WorldBounds {
    fn columns(&self) -> i64 {
        self.max_x as i64 - self.min_x as i64 + 1
    }
    fn rows(&self) -> i64 {
        self.max_y as i64 - self.min_y as i64 + 1
    }
}

/// Scans `output` (already fully written, in target byte order) for every
/// `CELL` record and returns `form_id → output_offset`. A byte-by-byte sweep
/// rather than a structural walk, in the same spirit as the scanner's stray
/// group sweep: cheap to get right, and this runs once per conversion.
fn index_cell_output_offsets(output: &[u8], big_endian: bool) -> HashMap<u32, u64> {
    let mut map = HashMap::new();
    let mut offset = 0usize;
    while offset + RECORD_HEADER_LEN <= output.len() {
        if let Ok(header) = RecordHeader::read(output, offset, big_endian) {
            if &header.signature == b"CELL" {
                map.insert(header.form_id, offset as u64);
            }
        }
        offset += 1;
    }
    map
}

fn world_bounds_from_aggregation(index: &ConversionIndex, world_form_id: u32) -> Option<WorldBounds> {
    let cell_ids = index.exterior_cells_by_world.get(&world_form_id)?;
    let mut bounds: Option<WorldBounds> = None;
    for id in cell_ids {
        let Some(grid) = index.cells.get(id).and_then(|c| c.grid) else {
            continue;
        };
        bounds = Some(match bounds {
            None => WorldBounds {
                min_x: grid.0,
                max_x: grid.0,
                min_y: grid.1,
                max_y: grid.1,
            },
            Some(b) => WorldBounds {
                min_x: b.min_x.min(grid.0),
                max_x: b.max_x.max(grid.0),
                min_y: b.min_y.min(grid.1),
                max_y: b.max_y.max(grid.1),
            },
        });
    }
    bounds
}

/// Reads `NAM0`/`NAM9` (each two little/big-endian floats) from a world
/// record's output payload, if present, and rounds them to integer grid
/// bounds. Per spec §4.7 these take precedence over aggregating observed
/// cell grids; this crate falls back to aggregation whenever either is
/// absent or the resulting span doesn't match the existing `OFST` size.
fn world_bounds_from_subrecords(payload: &[u8], big_endian: bool) -> Option<WorldBounds> {
    let subs = iter_subrecords(payload, big_endian);
    let nam0 = subs.iter().find(|s| &s.signature == b"NAM0" && s.body_len >= 8)?;
    let nam9 = subs.iter().find(|s| &s.signature == b"NAM9" && s.body_len >= 8)?;
    let min_x = primitives::read_f32(payload, nam0.body_offset, big_endian).ok()?;
    let min_y = primitives::read_f32(payload, nam0.body_offset + 4, big_endian).ok()?;
    let max_x = primitives::read_f32(payload, nam9.body_offset, big_endian).ok()?;
    let max_y = primitives::read_f32(payload, nam9.body_offset + 4, big_endian).ok()?;
    Some(WorldBounds {
        min_x: min_x.round() as i32,
        max_x: max_x.round() as i32,
        min_y: min_y.round() as i32,
        max_y: max_y.round() as i32,
    })
}

/// Rebuilds every world's `OFST` subrecord in `output`, patching bytes in
/// place. `world_output_offsets` gives each world's record position in
/// `output` (recorded by the transcoder as it writes each `WRLD` record).
pub fn rebuild_all(
    output: &mut [u8],
    big_endian: bool,
    index: &ConversionIndex,
    world_output_offsets: &HashMap<u32, u64>,
) {
    let cell_output_offsets = index_cell_output_offsets(output, big_endian);

    for world in &index.worlds {
        let Some(&world_offset) = world_output_offsets.get(&world.form_id) else {
            continue;
        };
        rebuild_one(output, big_endian, index, world.form_id, world_offset, &cell_output_offsets);
    }
}

fn rebuild_one(
    output: &mut [u8],
    big_endian: bool,
    index: &ConversionIndex,
    world_form_id: u32,
    world_offset: u64,
    cell_output_offsets: &HashMap<u32, u64>,
) -> Option<()> {
    let world_offset = world_offset as usize;
    let header = RecordHeader::read(output, world_offset, big_endian).ok()?;
    let payload_offset = world_offset + RECORD_HEADER_LEN;
    let payload_len = header.data_size as usize;
    if payload_offset + payload_len > output.len() {
        return None;
    }

    let (ofst_header_offset, ofst_body_offset, ofst_body_len) = {
        let payload = &output[payload_offset..payload_offset + payload_len];
        let sub = iter_subrecords(payload, big_endian).into_iter().find(|s| &s.signature == b"OFST")?;
        (payload_offset + sub.header_offset, payload_offset + sub.body_offset, sub.body_len)
    };

    let bounds = {
        let payload = &output[payload_offset..payload_offset + payload_len];
        world_bounds_from_subrecords(payload, big_endian)
    }
    .or_else(|| world_bounds_from_aggregation(index, world_form_id))?;

    let expected_len = (bounds.columns() * bounds.rows() * 4) as usize;
    if expected_len != ofst_body_len {
        warn!(
            "OFST size mismatch for world {world_form_id:#010x}: computed {expected_len} bytes from grid bounds, subrecord declares {ofst_body_len}; leaving table unpatched"
        );
        return None;
    }

    let columns = bounds.columns() as usize;
    let rows = bounds.rows() as usize;
    let mut table = vec![0u32; columns * rows];

    if let Some(cell_ids) = index.exterior_cells_by_world.get(&world_form_id) {
        for &cell_id in cell_ids {
            let (Some(&cell_offset), Some(grid)) = (
                cell_output_offsets.get(&cell_id),
                index.cells.get(&cell_id).and_then(|c| c.grid),
            ) else {
                continue;
            };
            let col = (grid.0 as i64 - bounds.min_x as i64) as usize;
            let row = (grid.1 as i64 - bounds.min_y as i64) as usize;
            if col >= columns || row >= rows {
                continue;
            }
            let slot = row * columns + col;
            let delta = cell_offset - world_offset as u64;
            let offset_value = delta as u32;
            // Tie-break: keep the smallest non-zero offset already present.
            if table[slot] == 0 || (offset_value != 0 && offset_value < table[slot]) {
                table[slot] = offset_value;
            }
        }
    }

    for (i, value) in table.iter().enumerate() {
        primitives::write_u32(output, ofst_body_offset + i * 4, *value, big_endian).ok()?;
    }
    let _ = ofst_header_offset; // header itself (signature/length) is unchanged; only the body is patched

    Some(())
}
