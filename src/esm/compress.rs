//! Record payload decompression (spec §7, `Decompress` kind).
//!
//! Compressed record payloads (flag [`crate::esm::header::COMPRESSED_FLAG`])
//! begin with a 4-byte decompressed size followed by a zlib stream. Some
//! captures carry a truncated or header-stripped stream; the documented
//! recovery is to retry as raw deflate after stripping the 2-byte zlib
//! header and 4-byte Adler-32 trailer.

use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// Decompresses a record payload that starts with a 4-byte decompressed
/// size followed by a zlib stream. Returns the decompressed bytes only
/// (the leading size prefix is consumed, not included in the result).
pub fn decompress_record_payload(payload: &[u8]) -> Option<Vec<u8>> {
    if payload.len() < 4 {
        return None;
    }
    let declared_size = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let stream = &payload[4..];

    if let Some(bytes) = try_zlib(stream, declared_size) {
        return Some(bytes);
    }

    // Fallback: strip the 2-byte zlib header and 4-byte trailer, retry as
    // raw deflate (spec §7).
    if stream.len() > 6 {
        let raw = &stream[2..stream.len() - 4];
        if let Some(bytes) = try_raw_deflate(raw, declared_size) {
            return Some(bytes);
        }
    }

    None
}

fn try_zlib(stream: &[u8], declared_size: usize) -> Option<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(stream);
    let mut out = Vec::with_capacity(declared_size.min(16 * 1024 * 1024));
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

fn try_raw_deflate(stream: &[u8], declared_size: usize) -> Option<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(stream);
    let mut out = Vec::with_capacity(declared_size.min(16 * 1024 * 1024));
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}
