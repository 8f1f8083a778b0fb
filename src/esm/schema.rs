//! Subrecord field schema (spec §4.7 step 9b): maps `(record signature,
//! subrecord signature)` to a field layout describing per-field width,
//! sign, and whether the field byte-flips across endianness. Subrecords
//! with no schema entry pass through verbatim — this is correct for plain
//! byte arrays and ASCII strings, and deliberately conservative for any
//! numeric subrecord this crate doesn't yet know the layout of (spec §9's
//! "do not fabricate behavior" applies just as much to field layouts as to
//! the TOFT/INFO merge).

use crate::primitives;
use std::collections::HashMap;

/// One scalar field's width and signedness within a subrecord body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl FieldKind {
    fn width(self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::I8 => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 => 4,
            FieldKind::U64 | FieldKind::I64 | FieldKind::F64 => 8,
        }
    }
}

/// A fixed sequence of scalar fields at the start of a subrecord body. Any
/// trailing bytes beyond the declared fields pass through raw.
#[derive(Debug, Clone, Default)]
pub struct SchemaEntry {
    pub fields: Vec<FieldKind>,
}

impl SchemaEntry {
    pub fn new(fields: Vec<FieldKind>) -> Self {
        SchemaEntry { fields }
    }

    fn prefix_width(&self) -> usize {
        self.fields.iter().map(|f| f.width()).sum()
    }
}

/// Data-driven `(record signature, subrecord signature) -> SchemaEntry`
/// table. Ships with a small default set of known numeric subrecords;
/// callers can register more (spec §9 treats this the same way as the
/// bitfield registry — data-driven, not hard-coded).
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entries: HashMap<([u8; 4], [u8; 4]), SchemaEntry>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry { entries: HashMap::new() }
    }

    /// The built-in schema: just the one subrecord the spec's own testable
    /// properties and OFST rebuild depend on (`CELL`'s `XCLC` grid
    /// coordinates, two signed 32-bit fields).
    pub fn with_defaults() -> Self {
        let mut reg = SchemaRegistry::new();
        reg.register(*b"CELL", *b"XCLC", SchemaEntry::new(vec![FieldKind::I32, FieldKind::I32]));
        reg
    }

    pub fn register(&mut self, record_signature: [u8; 4], subrecord_signature: [u8; 4], entry: SchemaEntry) {
        self.entries.insert((record_signature, subrecord_signature), entry);
    }

    pub fn lookup(&self, record_signature: [u8; 4], subrecord_signature: [u8; 4]) -> Option<&SchemaEntry> {
        self.entries.get(&(record_signature, subrecord_signature))
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Re-encodes one subrecord body from `src_big_endian` to `dst_big_endian`.
/// With no schema entry this is a raw byte copy (correct for ASCII strings
/// and opaque byte arrays); with one, each declared field is read in source
/// order and written in target order, and any trailing bytes beyond the
/// schema's fixed prefix are copied raw.
pub fn reencode_body(body: &[u8], schema: Option<&SchemaEntry>, src_big_endian: bool, dst_big_endian: bool) -> Vec<u8> {
    let Some(schema) = schema else {
        return body.to_vec();
    };
    let prefix_width = schema.prefix_width();
    if body.len() < prefix_width {
        return body.to_vec(); // malformed relative to schema; pass through rather than guess
    }

    let mut out = vec![0u8; body.len()];
    let mut offset = 0usize;
    for field in &schema.fields {
        if reencode_field(body, &mut out, offset, *field, src_big_endian, dst_big_endian).is_none() {
            return body.to_vec();
        }
        offset += field.width();
    }
    out[prefix_width..].copy_from_slice(&body[prefix_width..]);
    out
}

fn reencode_field(
    src: &[u8],
    dst: &mut [u8],
    offset: usize,
    field: FieldKind,
    src_big_endian: bool,
    dst_big_endian: bool,
) -> Option<()> {
    match field {
        FieldKind::U8 => {
            let v = primitives::read_u8(src, offset, src_big_endian).ok()?;
            primitives::write_u8(dst, offset, v, dst_big_endian).ok()?;
        }
        FieldKind::I8 => {
            let v = primitives::read_i8(src, offset, src_big_endian).ok()?;
            primitives::write_i8(dst, offset, v, dst_big_endian).ok()?;
        }
        FieldKind::U16 => {
            let v = primitives::read_u16(src, offset, src_big_endian).ok()?;
            primitives::write_u16(dst, offset, v, dst_big_endian).ok()?;
        }
        FieldKind::I16 => {
            let v = primitives::read_i16(src, offset, src_big_endian).ok()?;
            primitives::write_i16(dst, offset, v, dst_big_endian).ok()?;
        }
        FieldKind::U32 => {
            let v = primitives::read_u32(src, offset, src_big_endian).ok()?;
            primitives::write_u32(dst, offset, v, dst_big_endian).ok()?;
        }
        FieldKind::I32 => {
            let v = primitives::read_i32(src, offset, src_big_endian).ok()?;
            primitives::write_i32(dst, offset, v, dst_big_endian).ok()?;
        }
        FieldKind::U64 => {
            let v = primitives::read_u64(src, offset, src_big_endian).ok()?;
            primitives::write_u64(dst, offset, v, dst_big_endian).ok()?;
        }
        FieldKind::I64 => {
            let v = primitives::read_i64(src, offset, src_big_endian).ok()?;
            primitives::write_i64(dst, offset, v, dst_big_endian).ok()?;
        }
        FieldKind::F32 => {
            let v = primitives::read_f32(src, offset, src_big_endian).ok()?;
            primitives::write_f32(dst, offset, v, dst_big_endian).ok()?;
        }
        FieldKind::F64 => {
            let v = primitives::read_f64(src, offset, src_big_endian).ok()?;
            primitives::write_f64(dst, offset, v, dst_big_endian).ok()?;
        }
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xclc_grid_flips_across_endianness() {
        let registry = SchemaRegistry::with_defaults();
        let schema = registry.lookup(*b"CELL", *b"XCLC").unwrap();

        let mut be = [0u8; 8];
        be[0..4].copy_from_slice(&2i32.to_be_bytes());
        be[4..8].copy_from_slice(&(-3i32).to_be_bytes());

        let le = reencode_body(&be, Some(schema), true, false);
        assert_eq!(&le[0..4], &2i32.to_le_bytes());
        assert_eq!(&le[4..8], &(-3i32).to_le_bytes());
    }

    #[test]
    fn unknown_subrecord_passes_through_raw() {
        let body = b"Hello".to_vec();
        let out = reencode_body(&body, None, true, false);
        assert_eq!(out, body);
    }
}
