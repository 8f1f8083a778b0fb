//! Record sources (spec §4.8): "Consumes either a source file directly or
//! memory-region bytes resolved from runtime struct pointers in a dump."
//!
//! [`RecordSource::Esm`] reads a record directly out of an ESM byte buffer
//! at a known file offset (as produced by the conversion index, C6).
//! [`RecordSource::Dump`] reads a record's fields out of its live runtime
//! struct in a memory dump, following named field offsets from an
//! [`OffsetTable`] and cross-referencing auxiliary pointers (sounds,
//! projectiles, FaceGen arrays) by dereferencing through [`DumpMapping`]
//! (C2). Dump-sourced reads are depth-bounded and acyclic by construction:
//! each hop consumes one level of a fixed budget and a cycle just runs the
//! budget out rather than looping forever.

use crate::dump::DumpMapping;
use crate::esm::compress::decompress_record_payload;
use crate::esm::header::{RecordHeader, RECORD_HEADER_LEN};
use crate::reconstruct::offsets::OffsetTable;
use crate::reconstruct::record::{parse_payload, Record, RecordCommon};
use crate::{Error, Result};

/// Maximum number of pointer hops a single field resolution may take before
/// giving up (spec §4.8: dump-sourced reads must be depth-bounded).
pub const MAX_POINTER_CHASE_DEPTH: u32 = 8;

/// Where a reconstructed record's bytes come from.
pub enum RecordSource<'a> {
    /// A source (or transcoded) ESM buffer, read in its own byte order.
    Esm { bytes: &'a [u8], big_endian: bool },
    /// A runtime memory dump, read via known struct offsets for a specific
    /// game build.
    Dump {
        dump: &'a [u8],
        mapping: &'a DumpMapping,
        offsets: &'a OffsetTable,
        /// Always big-endian: the Xbox 360 is a big-endian PowerPC target.
        big_endian: bool,
    },
}

impl<'a> RecordSource<'a> {
    /// Reads and decodes one record from an ESM buffer at `file_offset`,
    /// handling the compressed-payload case (spec §3's `compressed` flag).
    pub fn read_esm_record(&self, file_offset: u64) -> Result<Record> {
        let (bytes, big_endian) = match self {
            RecordSource::Esm { bytes, big_endian } => (*bytes, *big_endian),
            RecordSource::Dump { .. } => {
                return Err(Error::invalid_argument(
                    "read_esm_record called on a Dump-backed RecordSource",
                ));
            }
        };

        let offset = file_offset as usize;
        let header = RecordHeader::read(bytes, offset, big_endian)?;
        let payload_start = offset + RECORD_HEADER_LEN;
        let payload_end = payload_start + header.data_size as usize;
        if payload_end > bytes.len() {
            return Err(Error::out_of_range(
                payload_start as u64,
                header.data_size as u64,
                bytes.len() as u64,
            ));
        }
        let raw_payload = &bytes[payload_start..payload_end];

        let payload = if header.is_compressed() {
            decompress_record_payload(raw_payload)
                .ok_or_else(|| Error::Decompress(format!(
                    "record {:?} at offset {file_offset:#x} failed to decompress",
                    header.signature
                )))?
        } else {
            raw_payload.to_vec()
        };

        let data = parse_payload(header.signature, &payload, big_endian);
        Ok(Record {
            common: RecordCommon {
                signature: header.signature,
                form_id: header.form_id,
                flags: header.flags,
            },
            data,
        })
    }

    /// Resolves `struct_va`'s `field` in `struct_name`'s layout to a file
    /// offset within the dump, or `None` if the struct's VA, the field
    /// name, or the field's own value don't resolve.
    fn field_file_offset(&self, struct_va: u64, struct_name: &str, field: &str) -> Option<u64> {
        let RecordSource::Dump { mapping, offsets, .. } = self else {
            return None;
        };
        let base = mapping.va_to_file_offset(struct_va)?;
        let field_offset = offsets.offset_of(struct_name, field)?;
        Some(base + field_offset as u64)
    }

    /// Reads a `u32` field directly out of a dump-resident struct.
    pub fn read_dump_u32(&self, struct_va: u64, struct_name: &str, field: &str) -> Option<u32> {
        let RecordSource::Dump { dump, big_endian, .. } = self else {
            return None;
        };
        let offset = self.field_file_offset(struct_va, struct_name, field)?;
        crate::primitives::read_u32(dump, offset as usize, *big_endian).ok()
    }

    /// Reads a `u16` field directly out of a dump-resident struct.
    pub fn read_dump_u16(&self, struct_va: u64, struct_name: &str, field: &str) -> Option<u16> {
        let RecordSource::Dump { dump, big_endian, .. } = self else {
            return None;
        };
        let offset = self.field_file_offset(struct_va, struct_name, field)?;
        crate::primitives::read_u16(dump, offset as usize, *big_endian).ok()
    }

    /// Reads a 32-bit VA stored in a dump-resident struct field, i.e. a
    /// pointer-typed field (e.g. a projectile's sound-effect pointer).
    pub fn read_dump_pointer(&self, struct_va: u64, struct_name: &str, field: &str) -> Option<u64> {
        self.read_dump_u32(struct_va, struct_name, field).map(|va| va as u64)
    }

    /// Follows a chain of pointer field names starting at `root_va`,
    /// dereferencing one struct's named pointer field to get the next
    /// struct's VA, up to [`MAX_POINTER_CHASE_DEPTH`] hops. Returns the
    /// final VA, or `None` if any hop's pointer is unresolvable (an
    /// unmapped VA, a missing offset-table entry, or the depth budget
    /// running out before the chain terminates — which also protects
    /// against a cyclic pointer chain never settling).
    ///
    /// `hops` is `(struct_name, field_name)` for each pointer to follow in
    /// order; the struct name describes the struct `root_va` (and then
    /// each subsequent dereferenced VA) points at.
    pub fn chase_pointer_chain(&self, root_va: u64, hops: &[(&str, &str)]) -> Option<u64> {
        if hops.len() as u32 > MAX_POINTER_CHASE_DEPTH {
            return None;
        }
        let mut current_va = root_va;
        for (struct_name, field) in hops {
            current_va = self.read_dump_pointer(current_va, struct_name, field)?;
        }
        Some(current_va)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::region::MemoryRegion;
    use crate::reconstruct::offsets::{FieldOffset, StructLayout};

    fn build_subrecord(sig: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(sig);
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn build_record(sig: &[u8; 4], payload: &[u8], big_endian: bool) -> Vec<u8> {
        let mut out = vec![0u8; RECORD_HEADER_LEN];
        let header = RecordHeader {
            signature: *sig,
            data_size: payload.len() as u32,
            flags: 0,
            form_id: 0x1234,
            timestamp: 0,
            version_control: [0, 0],
        };
        header.write(&mut out, 0, big_endian).unwrap();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn reads_an_uncompressed_esm_record() {
        let payload = build_subrecord(b"EDID", b"Test\0");
        let bytes = build_record(b"WRLD", &payload, false);
        let source = RecordSource::Esm { bytes: &bytes, big_endian: false };

        let record = source.read_esm_record(0).unwrap();
        assert_eq!(record.common.signature, *b"WRLD");
        assert_eq!(record.common.form_id, 0x1234);
    }

    #[test]
    fn read_esm_record_on_dump_source_is_rejected() {
        let dump = vec![0u8; 16];
        let mapping = DumpMapping::parse(&dump);
        let offsets = OffsetTable::empty("none");
        let source = RecordSource::Dump {
            dump: &dump,
            mapping: &mapping,
            offsets: &offsets,
            big_endian: true,
        };
        assert!(source.read_esm_record(0).is_err());
    }

    #[test]
    fn dump_pointer_chase_resolves_through_offset_table() {
        // A "TESObjectREFR"-shaped struct at VA 0x4000_0000 whose "base"
        // pointer field (offset 4) points at a "TESForm"-shaped struct at
        // VA 0x4000_1000, whose "formId" field (offset 0) is 0xdeadbeef.
        let mut dump = vec![0u8; 0x2000];
        dump[4..8].copy_from_slice(&0x4000_1000u32.to_be_bytes());
        dump[0x1000..0x1004].copy_from_slice(&0xdead_beefu32.to_be_bytes());

        let mapping = DumpMapping::from_parts(
            vec![MemoryRegion { va: 0x4000_0000, size: 0x2000, file_offset: 0 }],
            Vec::new(),
        );

        let mut table = OffsetTable::empty("test");
        let mut refr = StructLayout::default();
        refr.fields.insert("base".into(), FieldOffset::new(4));
        table.register("TESObjectREFR", refr);
        let mut form = StructLayout::default();
        form.fields.insert("formId".into(), FieldOffset::new(0));
        table.register("TESForm", form);

        let source = RecordSource::Dump {
            dump: &dump,
            mapping: &mapping,
            offsets: &table,
            big_endian: true,
        };

        let form_va = source
            .chase_pointer_chain(0x4000_0000, &[("TESObjectREFR", "base")])
            .unwrap();
        assert_eq!(form_va, 0x4000_1000);

        let form_id = source.read_dump_u32(form_va, "TESForm", "formId").unwrap();
        assert_eq!(form_id, 0xdead_beef);
    }

    #[test]
    fn dump_pointer_chase_fails_on_unresolvable_hop() {
        let dump = vec![0u8; 0x100];
        let mapping = DumpMapping::from_parts(
            vec![MemoryRegion { va: 0x4000_0000, size: 0x100, file_offset: 0 }],
            Vec::new(),
        );
        let table = OffsetTable::empty("test"); // no struct layouts registered
        let source = RecordSource::Dump {
            dump: &dump,
            mapping: &mapping,
            offsets: &table,
            big_endian: true,
        };
        assert!(source
            .chase_pointer_chain(0x4000_0000, &[("TESObjectREFR", "base")])
            .is_none());
    }

    #[test]
    fn pointer_chain_longer_than_budget_is_rejected() {
        let dump = vec![0u8; 0x10];
        let mapping = DumpMapping::from_parts(Vec::new(), Vec::new());
        let table = OffsetTable::empty("test");
        let source = RecordSource::Dump {
            dump: &dump,
            mapping: &mapping,
            offsets: &table,
            big_endian: true,
        };
        let hops: Vec<(&str, &str)> = (0..MAX_POINTER_CHASE_DEPTH + 1)
            .map(|_| ("TESForm", "next"))
            .collect();
        assert!(source.chase_pointer_chain(0x4000_0000, &hops).is_none());
    }
}
