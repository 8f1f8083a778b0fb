//! Dump mapping (spec §4.2, component C2): parses the dump's table-of-streams
//! index and exposes VA↔file-offset translation and module byte ranges.

pub mod module;
pub mod region;
mod toc;

pub use module::ModuleEntry;
pub use region::MemoryRegion;

use log::{debug, warn};

/// Heap VA range on the Xbox 360: `[0x4000_0000, 0x5000_0000)` (spec §6).
pub const HEAP_VA_RANGE: core::ops::Range<u64> = 0x4000_0000..0x5000_0000;
/// Module/image VA range on the Xbox 360: `[0x8200_0000, 2^32)` (spec §6).
pub const MODULE_VA_RANGE: core::ops::Range<u64> = 0x8200_0000..0x1_0000_0000;

/// True if `va` falls in either VA range the dump can plausibly resolve.
/// Pointers outside the union are invalid (spec §6); VAs are always compared
/// in the unsigned 64-bit domain, so a 32-bit VA with its high bit set
/// (e.g. a module address) sign-extends correctly rather than comparing as
/// negative (spec §4.2, "Xbox sign-extension discipline").
pub fn is_plausible_va(va: u64) -> bool {
    HEAP_VA_RANGE.contains(&va) || MODULE_VA_RANGE.contains(&va)
}

/// The parsed region/module tables for one dump, or a marker that no valid
/// metadata was found (spec §4.5 step 2's "flat mode").
pub struct DumpMapping {
    regions: Vec<MemoryRegion>,
    modules: Vec<ModuleEntry>,
}

impl DumpMapping {
    /// Parses the dump's metadata. Never fails: a missing or corrupt
    /// table-of-streams index yields an empty mapping, which callers treat
    /// as flat mode via [`DumpMapping::is_flat`].
    pub fn parse(dump: &[u8]) -> Self {
        match toc::parse(dump) {
            Some(toc) => {
                debug!(
                    "dump metadata: {} regions, {} modules",
                    toc.regions.len(),
                    toc.modules.len()
                );
                DumpMapping {
                    regions: toc.regions,
                    modules: toc.modules,
                }
            }
            None => {
                warn!("dump metadata absent or corrupt; operating in flat mode");
                DumpMapping {
                    regions: Vec::new(),
                    modules: Vec::new(),
                }
            }
        }
    }

    /// Builds a mapping directly from an already-sorted, non-overlapping
    /// region/module table, bypassing table-of-streams parsing. Used by
    /// [`crate::reconstruct`] to test dump-sourced pointer chasing against
    /// a synthetic mapping without a full dump image.
    pub fn from_parts(regions: Vec<MemoryRegion>, modules: Vec<ModuleEntry>) -> Self {
        DumpMapping { regions, modules }
    }

    /// True when no usable metadata was found: callers should treat file
    /// offsets as VA-equivalent and skip cross-gap reassembly.
    pub fn is_flat(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }

    /// Binary-searches the region list for the first region containing
    /// `va`, returning the corresponding file offset.
    pub fn va_to_file_offset(&self, va: u64) -> Option<u64> {
        let idx = self
            .regions
            .partition_point(|r| r.va_end() <= va);
        self.regions.get(idx).and_then(|r| r.translate(va))
    }

    /// Every region that intersects `[va_start, va_end)`, in ascending VA
    /// order, as a contiguous subsequence of the region table.
    pub fn regions_in_range(&self, va_start: u64, va_end: u64) -> impl Iterator<Item = &MemoryRegion> {
        let start_idx = self.regions.partition_point(|r| r.va_end() <= va_start);
        self.regions[start_idx..]
            .iter()
            .take_while(move |r| r.va < va_end)
    }

    /// Resolves a module's image bytes in the dump as `(file_offset, size)`.
    pub fn module_file_range(&self, module: &str) -> Option<(u64, u64)> {
        let m = self.modules.iter().find(|m| m.name == module)?;
        let offset = self.va_to_file_offset(m.base_va)?;
        Some((offset, m.size))
    }

    /// The inverse of [`DumpMapping::va_to_file_offset`]: finds the region
    /// whose file range contains `file_offset` and returns the
    /// corresponding VA. Regions are sorted by `va`, not `file_offset`, so
    /// this is a linear scan; the carver calls it once per accepted carve
    /// candidate (spec §4.5 step 5c), not per byte.
    pub fn file_offset_to_va(&self, file_offset: u64) -> Option<u64> {
        self.regions
            .iter()
            .find(|r| file_offset >= r.file_offset && file_offset < r.file_offset + r.size)
            .map(|r| r.va + (file_offset - r.file_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping_with(regions: Vec<MemoryRegion>) -> DumpMapping {
        DumpMapping {
            regions,
            modules: Vec::new(),
        }
    }

    #[test]
    fn va_to_file_offset_binary_search() {
        let m = mapping_with(vec![
            MemoryRegion { va: 0x4000_0000, size: 0x1000, file_offset: 0x2000 },
            MemoryRegion { va: 0x4000_2000, size: 0x1000, file_offset: 0x3000 },
        ]);
        assert_eq!(m.va_to_file_offset(0x4000_0800), Some(0x2800));
        assert_eq!(m.va_to_file_offset(0x4000_2800), Some(0x3800));
        assert_eq!(m.va_to_file_offset(0x4000_1800), None); // gap between regions
        assert_eq!(m.va_to_file_offset(0x3fff_ffff), None);
    }

    #[test]
    fn regions_in_range_is_contiguous_subsequence() {
        let m = mapping_with(vec![
            MemoryRegion { va: 0x1000, size: 0x100, file_offset: 0 },
            MemoryRegion { va: 0x2000, size: 0x100, file_offset: 0x100 },
            MemoryRegion { va: 0x3000, size: 0x100, file_offset: 0x200 },
        ]);
        let got: Vec<_> = m.regions_in_range(0x1800, 0x3050).map(|r| r.va).collect();
        assert_eq!(got, vec![0x2000, 0x3000]);
    }

    #[test]
    fn plausible_va_matches_xbox_ranges() {
        assert!(is_plausible_va(0x4000_0000));
        assert!(is_plausible_va(0x4fff_ffff));
        assert!(!is_plausible_va(0x5000_0000));
        assert!(is_plausible_va(0x8200_0000));
        assert!(is_plausible_va(0xffff_ffff));
        assert!(!is_plausible_va(0x1000));
    }

    #[test]
    fn file_offset_to_va_round_trips() {
        let m = mapping_with(vec![
            MemoryRegion { va: 0x4000_0000, size: 0x1000, file_offset: 0x2000 },
            MemoryRegion { va: 0x4000_2000, size: 0x1000, file_offset: 0x3000 },
        ]);
        assert_eq!(m.file_offset_to_va(0x2800), Some(0x4000_0800));
        assert_eq!(m.file_offset_to_va(0x3800), Some(0x4000_2800));
        assert_eq!(m.file_offset_to_va(0x1000), None);
    }

    #[test]
    fn empty_mapping_is_flat() {
        let m = DumpMapping::parse(&[0u8; 4]);
        assert!(m.is_flat());
        assert_eq!(m.va_to_file_offset(0x4000_0000), None);
    }
}
