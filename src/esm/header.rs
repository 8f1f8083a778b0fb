//! The three fixed-size header shapes the ESM container nests (spec §3):
//! record headers, group headers, and subrecord headers. All three are
//! read/written through [`crate::primitives`] rather than `#[repr(C)]`
//! transmutation, since a single transcoding pass reads one in source
//! order and writes it back in target order.

use crate::primitives;
use crate::Result;

pub const RECORD_HEADER_LEN: usize = 24;
pub const GROUP_HEADER_LEN: usize = 24;
pub const SUBRECORD_HEADER_LEN: usize = 6;

/// Set in [`RecordHeader::flags`] when the payload begins with a 4-byte
/// decompressed-size prefix followed by a zlib stream (spec §3).
pub const COMPRESSED_FLAG: u32 = 0x0004_0000;

/// Extended-subrecord-length marker signature (spec §3, §6).
pub const EXTENDED_LENGTH_SIGNATURE: [u8; 4] = *b"XXXX";

/// The group container's fixed signature (spec §3, §6).
pub const GROUP_SIGNATURE: [u8; 4] = *b"GRUP";

/// 24-byte record header (spec §3, "Record header").
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub signature: [u8; 4],
    pub data_size: u32,
    pub flags: u32,
    pub form_id: u32,
    pub timestamp: u32,
    pub version_control: [u16; 2],
}

impl RecordHeader {
    pub fn read(buf: &[u8], offset: usize, big_endian: bool) -> Result<RecordHeader> {
        Ok(RecordHeader {
            signature: primitives::read_signature(buf, offset, big_endian)?,
            data_size: primitives::read_u32(buf, offset + 4, big_endian)?,
            flags: primitives::read_u32(buf, offset + 8, big_endian)?,
            form_id: primitives::read_u32(buf, offset + 12, big_endian)?,
            timestamp: primitives::read_u32(buf, offset + 16, big_endian)?,
            version_control: [
                primitives::read_u16(buf, offset + 20, big_endian)?,
                primitives::read_u16(buf, offset + 22, big_endian)?,
            ],
        })
    }

    pub fn write(&self, buf: &mut [u8], offset: usize, big_endian: bool) -> Result<()> {
        primitives::write_signature(buf, offset, self.signature, big_endian)?;
        primitives::write_u32(buf, offset + 4, self.data_size, big_endian)?;
        primitives::write_u32(buf, offset + 8, self.flags, big_endian)?;
        primitives::write_u32(buf, offset + 12, self.form_id, big_endian)?;
        primitives::write_u32(buf, offset + 16, self.timestamp, big_endian)?;
        primitives::write_u16(buf, offset + 20, self.version_control[0], big_endian)?;
        primitives::write_u16(buf, offset + 22, self.version_control[1], big_endian)?;
        Ok(())
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.flags & COMPRESSED_FLAG != 0
    }
}

/// 24-byte group header (spec §3, "Group header").
///
/// `label`'s interpretation depends on `group_type`: type `0` carries an
/// ASCII record-type tag, stored in native byte order like a signature
/// (never swapped); types `1..=10` carry a raw 32-bit identifier (world
/// form id, cell form id, or packed block/sub-block grid coordinates) that
/// *is* byte-order-dependent, since it's a genuine number rather than
/// character data. Callers pick the right reader via
/// [`GroupHeader::label_as_tag`] / [`GroupHeader::label_as_u32`].
#[derive(Debug, Clone, Copy)]
pub struct GroupHeader {
    pub total_size: u32,
    pub label: [u8; 4],
    pub group_type: i32,
    pub timestamp: u32,
    pub reserved: [u8; 4],
}

/// Group type: top-level record-type tag (spec §3, §4.7).
pub const GROUP_TYPE_TOP: i32 = 0;
/// Group type: world children (spec §4.7).
pub const GROUP_TYPE_WORLD_CHILDREN: i32 = 1;
/// Group type: interior cell block (unused directly, interior cells are
/// flat under the top-level `CELL` group in this format family).
pub const GROUP_TYPE_INTERIOR_BLOCK: i32 = 2;
pub const GROUP_TYPE_INTERIOR_SUBBLOCK: i32 = 3;
/// Group type: exterior cell block / sub-block (spec §4.7, §9).
pub const GROUP_TYPE_EXTERIOR_BLOCK: i32 = 4;
pub const GROUP_TYPE_EXTERIOR_SUBBLOCK: i32 = 5;
pub const GROUP_TYPE_CELL_PERSISTENT: i32 = 8;
pub const GROUP_TYPE_CELL_TEMPORARY: i32 = 9;
pub const GROUP_TYPE_CELL_VISIBLE_DISTANT: i32 = 10;

impl GroupHeader {
    /// Reads a group header whose `GRUP` signature has already been
    /// consumed by the caller (the signature itself is handled uniformly
    /// with record signatures upstream, since both are 4 ASCII bytes at
    /// the same relative position).
    pub fn read(buf: &[u8], offset: usize, big_endian: bool) -> Result<GroupHeader> {
        Ok(GroupHeader {
            total_size: primitives::read_u32(buf, offset + 4, big_endian)?,
            label: {
                let mut l = [0u8; 4];
                l.copy_from_slice(&buf[offset + 8..offset + 12]);
                l
            },
            group_type: primitives::read_i32(buf, offset + 12, big_endian)?,
            timestamp: primitives::read_u32(buf, offset + 16, big_endian)?,
            reserved: {
                let mut r = [0u8; 4];
                r.copy_from_slice(&buf[offset + 20..offset + 24]);
                r
            },
        })
    }

    pub fn write(&self, buf: &mut [u8], offset: usize, big_endian: bool) -> Result<()> {
        primitives::write_signature(buf, offset, GROUP_SIGNATURE, big_endian)?;
        primitives::write_u32(buf, offset + 4, self.total_size, big_endian)?;
        buf[offset + 8..offset + 12].copy_from_slice(&self.label);
        primitives::write_i32(buf, offset + 12, self.group_type, big_endian)?;
        primitives::write_u32(buf, offset + 16, self.timestamp, big_endian)?;
        buf[offset + 20..offset + 24].copy_from_slice(&self.reserved);
        Ok(())
    }

    /// Interprets `label` as a 4-ASCII record-type tag (group type `0`
    /// only). Like a record signature, this is stored in native byte order
    /// regardless of platform endianness.
    pub fn label_as_tag(&self, _big_endian: bool) -> [u8; 4] {
        self.label
    }

    /// Interprets `label` as a raw 32-bit form id / packed grid coordinate
    /// (group types `1..=10`), honoring source byte order but never
    /// treated as ASCII.
    pub fn label_as_u32(&self, big_endian: bool) -> u32 {
        let mut tmp = [0u8; 4];
        tmp.copy_from_slice(&self.label);
        if big_endian {
            u32::from_be_bytes(tmp)
        } else {
            u32::from_le_bytes(tmp)
        }
    }

    pub fn set_label_from_tag(&mut self, tag: [u8; 4], _big_endian: bool) {
        self.label = tag;
    }

    pub fn set_label_from_u32(&mut self, value: u32, big_endian: bool) {
        self.label = if big_endian { value.to_be_bytes() } else { value.to_le_bytes() };
    }
}

/// 6-byte subrecord header (spec §3, "Subrecord header").
#[derive(Debug, Clone, Copy)]
pub struct SubrecordHeader {
    pub signature: [u8; 4],
    pub length: u16,
}

impl SubrecordHeader {
    pub fn read(buf: &[u8], offset: usize, big_endian: bool) -> Result<SubrecordHeader> {
        Ok(SubrecordHeader {
            signature: primitives::read_signature(buf, offset, big_endian)?,
            length: primitives::read_u16(buf, offset + 4, big_endian)?,
        })
    }

    pub fn write(&self, buf: &mut [u8], offset: usize, big_endian: bool) -> Result<()> {
        primitives::write_signature(buf, offset, self.signature, big_endian)?;
        primitives::write_u16(buf, offset + 4, self.length, big_endian)?;
        Ok(())
    }

    #[inline]
    pub fn is_extended_length_marker(&self) -> bool {
        self.signature == EXTENDED_LENGTH_SIGNATURE && self.length == 4
    }
}
