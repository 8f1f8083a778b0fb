//! Transcodes a big-endian ESM master file into the little-endian PC layout
//! (spec §4.6/§4.7, components C6/C7): first validates the file header and
//! deduces byte order from its `HEDR` version field, then indexes the
//! source buffer ([`scanner`]) and re-encodes it one record/group at a
//! time ([`transcoder`]), finally rebuilding every world's `OFST` table
//! ([`ofst`]) once the output is in its final byte order.

pub mod compress;
pub mod header;
pub mod index;
pub mod ofst;
pub mod options;
pub mod schema;
pub mod scanner;
pub mod subrecord;
pub mod transcoder;

pub use header::{GroupHeader, RecordHeader, SubrecordHeader};
pub use index::ConversionIndex;
pub use options::{ConvertOptions, ConvertStats};
pub use schema::SchemaRegistry;
pub use transcoder::FILE_HEADER_SIGNATURE;

use crate::esm::header::RECORD_HEADER_LEN;
use crate::primitives;
use crate::{Error, Result};

const HEADER_SUBRECORD_SIGNATURE: [u8; 4] = *b"HEDR";
/// Upper bound on a plausible file-header payload size, used only to
/// disambiguate byte order (spec §4.6); real headers are a few hundred
/// bytes at most even with a long master-file dependency list.
const MAX_PLAUSIBLE_HEADER_SIZE: u32 = 1_048_576;

/// The result of one conversion run (spec §4.6/§4.7).
pub struct ConvertedEsm {
    pub bytes: Vec<u8>,
    pub stats: ConvertStats,
    pub src_big_endian: bool,
    pub dst_big_endian: bool,
}

/// Deduces the source file's byte order from its file header (spec §4.6:
/// "validates the file header ... and deduces byte order from the header's
/// version field"). The header's declared payload size is tried in both
/// byte orders; only one will keep the record's end within the file and
/// below a plausible header size. When both interpretations are plausible
/// (a header small enough to be ambiguous either way), this falls back to
/// the `HEDR` subrecord's version float, which is always a small positive
/// number for this format family.
pub fn detect_byte_order(input: &[u8]) -> Result<bool> {
    if input.len() < RECORD_HEADER_LEN {
        return Err(Error::Fatal("input too small to contain a file header".into()));
    }
    let sig = primitives::read_signature(input, 0, false)?;
    if sig != FILE_HEADER_SIGNATURE {
        return Err(Error::Fatal(format!(
            "not a master file: expected {FILE_HEADER_SIGNATURE:?} signature, found {sig:?}"
        )));
    }

    let plausible_data_size = |big_endian: bool| -> Option<u32> {
        let size = primitives::read_u32(input, 4, big_endian).ok()?;
        let end = RECORD_HEADER_LEN as u64 + size as u64;
        if size < MAX_PLAUSIBLE_HEADER_SIZE && end <= input.len() as u64 {
            Some(size)
        } else {
            None
        }
    };

    match (plausible_data_size(true), plausible_data_size(false)) {
        (Some(_), None) => Ok(true),
        (None, Some(_)) => Ok(false),
        (Some(_), Some(_)) => Ok(detect_via_version_float(input).unwrap_or(true)),
        (None, None) => Err(Error::Fatal(
            "file header declares an implausible payload size in both byte orders".into(),
        )),
    }
}

/// Disambiguates via the `HEDR` subrecord's version float (f32, always a
/// small positive number across this format family's released versions).
fn detect_via_version_float(input: &[u8]) -> Option<bool> {
    let payload_offset = RECORD_HEADER_LEN;
    if payload_offset + 6 + 4 > input.len() {
        return None;
    }
    let sub_sig = primitives::read_signature(input, payload_offset, false).ok()?;
    if sub_sig != HEADER_SUBRECORD_SIGNATURE {
        return None;
    }
    let version_offset = payload_offset + 6;
    let be = primitives::read_f32(input, version_offset, true).ok()?;
    let le = primitives::read_f32(input, version_offset, false).ok()?;
    let plausible = |v: f32| v.is_finite() && v > 0.0 && v < 100.0;
    match (plausible(be), plausible(le)) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

/// Converts a source-endian ESM buffer into the opposite byte order (spec
/// §4.6/§4.7): detects source byte order, indexes the buffer, transcodes
/// it record-by-record and group-by-group, then rebuilds every world's
/// `OFST` table against the freshly written output.
pub fn convert(input: &[u8], options: &ConvertOptions) -> Result<ConvertedEsm> {
    let src_big_endian = detect_byte_order(input)?;
    let dst_big_endian = !src_big_endian;

    let header = RecordHeader::read(input, 0, src_big_endian)?;
    let start_offset = RECORD_HEADER_LEN + header.data_size as usize;

    let index = scanner::scan(input, src_big_endian, start_offset);
    let schema = SchemaRegistry::with_defaults();

    let result = transcoder::transcode(input, src_big_endian, dst_big_endian, &index, &schema, options)?;
    let mut bytes = result.output;
    ofst::rebuild_all(&mut bytes, dst_big_endian, &index, &result.world_output_offsets);

    Ok(ConvertedEsm {
        bytes,
        stats: result.stats,
        src_big_endian,
        dst_big_endian,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CancellationToken;
    use std::sync::Arc;

    fn hedr_payload(version: f32, big_endian: bool) -> Vec<u8> {
        let mut body = vec![0u8; 12];
        primitives::write_f32(&mut body, 0, version, big_endian).unwrap();
        let mut payload = Vec::new();
        payload.extend_from_slice(b"HEDR");
        payload.extend_from_slice(&(body.len() as u16).to_le_bytes());
        payload.extend_from_slice(&body);
        payload
    }

    fn tes4_record(payload: &[u8], big_endian: bool) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"TES4");
        let write_u32 = |buf: &mut Vec<u8>, v: u32| {
            if big_endian {
                buf.extend_from_slice(&v.to_be_bytes());
            } else {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        };
        write_u32(&mut out, payload.len() as u32);
        write_u32(&mut out, 0);
        write_u32(&mut out, 0);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn detects_big_endian_via_plausible_size() {
        let payload = hedr_payload(1.0, true);
        let input = tes4_record(&payload, true);
        assert!(detect_byte_order(&input).unwrap());
    }

    #[test]
    fn detects_little_endian_via_plausible_size() {
        let payload = hedr_payload(1.0, false);
        let input = tes4_record(&payload, false);
        assert!(!detect_byte_order(&input).unwrap());
    }

    #[test]
    fn rejects_non_master_file() {
        let mut input = vec![0u8; 24];
        input[0..4].copy_from_slice(b"XXXX");
        assert!(detect_byte_order(&input).is_err());
    }

    #[test]
    fn convert_round_trips_a_minimal_master_file() {
        let payload = hedr_payload(1.0, true);
        let input = tes4_record(&payload, true);

        let options = ConvertOptions {
            verbose: false,
            progress_interval: 1,
            cancellation: CancellationToken::new(),
            progress: Arc::new(()),
        };
        let converted = convert(&input, &options).unwrap();
        assert!(converted.src_big_endian);
        assert!(!converted.dst_big_endian);
        assert_eq!(&converted.bytes[0..4], b"TES4");
        assert_eq!(converted.stats.records_converted, 1);
    }
}
