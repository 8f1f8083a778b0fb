//! Subrecord iteration within a record payload, including the `XXXX`
//! extended-length marker (spec §3, §8 "Boundary behavior").

use crate::esm::header::{SubrecordHeader, SUBRECORD_HEADER_LEN};
use crate::primitives;

/// One subrecord within a record's payload: its signature, the byte range
/// of its header within the payload, and the byte range of its body.
#[derive(Debug, Clone, Copy)]
pub struct SubrecordSlice {
    pub signature: [u8; 4],
    pub header_offset: usize,
    pub body_offset: usize,
    pub body_len: usize,
}

/// Walks `payload` subrecord by subrecord, honoring the `XXXX` extended
/// length marker (a subrecord with signature `XXXX` and declared length 4
/// carries a 32-bit length for the *next* subrecord, whose own 16-bit
/// length field is ignored).
///
/// Stops (without erroring) at the first subrecord whose declared length
/// would run past `payload`'s end; spec §3 guarantees subrecords are
/// contiguous within a well-formed payload, so this only triggers on
/// already-malformed input, which callers treat as an early stop rather
/// than a hard failure.
pub fn iter_subrecords(payload: &[u8], big_endian: bool) -> Vec<SubrecordSlice> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    let mut pending_extended_length: Option<u32> = None;

    while offset + SUBRECORD_HEADER_LEN <= payload.len() {
        let header = match SubrecordHeader::read(payload, offset, big_endian) {
            Ok(h) => h,
            Err(_) => break,
        };

        if header.is_extended_length_marker() {
            let Ok(len) = primitives::read_u32(payload, offset + SUBRECORD_HEADER_LEN, big_endian) else {
                break;
            };
            pending_extended_length = Some(len);
            offset += SUBRECORD_HEADER_LEN + 4;
            continue;
        }

        let body_len = pending_extended_length.take().unwrap_or(header.length as u32) as usize;
        let body_offset = offset + SUBRECORD_HEADER_LEN;
        if body_offset + body_len > payload.len() {
            break;
        }

        out.push(SubrecordSlice {
            signature: header.signature,
            header_offset: offset,
            body_offset,
            body_len,
        });
        offset = body_offset + body_len;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_subrecord(sig: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(sig);
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn iterates_plain_subrecords() {
        let mut payload = Vec::new();
        payload.extend(build_subrecord(b"EDID", b"Hello"));
        payload.extend(build_subrecord(b"XCLC", &[0u8; 8]));

        let subs = iter_subrecords(&payload, false);
        assert_eq!(subs.len(), 2);
        assert_eq!(&subs[0].signature, b"EDID");
        assert_eq!(subs[0].body_len, 5);
        assert_eq!(&subs[1].signature, b"XCLC");
        assert_eq!(subs[1].body_len, 8);
    }

    #[test]
    fn extended_length_marker_governs_next_subrecord() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"XXXX");
        payload.extend_from_slice(&4u16.to_le_bytes());
        payload.extend_from_slice(&70000u32.to_le_bytes());
        payload.extend_from_slice(b"BIG_");
        payload.extend_from_slice(&0u16.to_le_bytes()); // ignored 16-bit length
        payload.extend(vec![0xabu8; 70000]);

        let subs = iter_subrecords(&payload, false);
        assert_eq!(subs.len(), 1);
        assert_eq!(&subs[0].signature, b"BIG_");
        assert_eq!(subs[0].body_len, 70000);
    }

    #[test]
    fn truncated_trailing_subrecord_stops_early() {
        let mut payload = build_subrecord(b"EDID", b"ok");
        payload.extend_from_slice(b"XCLC");
        payload.extend_from_slice(&100u16.to_le_bytes());
        payload.extend_from_slice(&[0u8; 4]); // way short of declared 100 bytes

        let subs = iter_subrecords(&payload, false);
        assert_eq!(subs.len(), 1);
        assert_eq!(&subs[0].signature, b"EDID");
    }
}
