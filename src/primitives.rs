//! Endian-aware, allocation-free binary primitives (spec §4.1, component C1).
//!
//! Every reader/writer here takes an explicit `big_endian: bool` rather than
//! a marker type, because both the carver and the transcoder pick the byte
//! order of a given value at runtime (the dump's own endianness is fixed,
//! but the ESM transcoder reads in the source order and writes in the
//! target order within the same call). Internally these delegate to
//! `scroll`'s `Pread`/`Pwrite` with its runtime [`scroll::Endian`] context,
//! which is built for exactly this; the point of this module is to pin down
//! the narrower contract the rest of the crate actually wants: `Option`/
//! `Result`-free bounds checking that never panics, and a signature reader
//! that always yields canonical (source-order-independent) ASCII.

use crate::error::{Error, Result};
use scroll::{Endian, Pread, Pwrite};

#[inline]
fn endian(big_endian: bool) -> Endian {
    if big_endian {
        Endian::Big
    } else {
        Endian::Little
    }
}

#[inline]
fn check(slice: &[u8], offset: usize, width: usize) -> Result<()> {
    let available = slice.len() as u64;
    let end = offset as u64 + width as u64;
    if end > available {
        return Err(Error::out_of_range(offset as u64, width as u64, available));
    }
    Ok(())
}

macro_rules! rw_pair {
    ($read_name:ident, $write_name:ident, $ty:ty, $width:expr) => {
        #[inline]
        pub fn $read_name(slice: &[u8], offset: usize, big_endian: bool) -> Result<$ty> {
            check(slice, offset, $width)?;
            Ok(slice.pread_with::<$ty>(offset, endian(big_endian))?)
        }

        #[inline]
        pub fn $write_name(slice: &mut [u8], offset: usize, value: $ty, big_endian: bool) -> Result<()> {
            check(slice, offset, $width)?;
            slice.pwrite_with::<$ty>(value, offset, endian(big_endian))?;
            Ok(())
        }
    };
}

rw_pair!(read_u8, write_u8, u8, 1);
rw_pair!(read_i8, write_i8, i8, 1);
rw_pair!(read_u16, write_u16, u16, 2);
rw_pair!(read_i16, write_i16, i16, 2);
rw_pair!(read_u32, write_u32, u32, 4);
rw_pair!(read_i32, write_i32, i32, 4);
rw_pair!(read_u64, write_u64, u64, 8);
rw_pair!(read_i64, write_i64, i64, 8);
rw_pair!(read_f32, write_f32, f32, 4);
rw_pair!(read_f64, write_f64, f64, 8);

/// Reads a 4-byte ASCII signature. Signatures are opaque character arrays,
/// not numeric fields, so they are stored in the same byte order regardless
/// of platform endianness; `big_endian` is accepted only so every reader in
/// this module shares one call shape, and is otherwise unused here.
#[inline]
pub fn read_signature(slice: &[u8], offset: usize, _big_endian: bool) -> Result<[u8; 4]> {
    check(slice, offset, 4)?;
    let mut sig = [0u8; 4];
    sig.copy_from_slice(&slice[offset..offset + 4]);
    Ok(sig)
}

#[inline]
pub fn write_signature(slice: &mut [u8], offset: usize, sig: [u8; 4], _big_endian: bool) -> Result<()> {
    check(slice, offset, 4)?;
    slice[offset..offset + 4].copy_from_slice(&sig);
    Ok(())
}

/// True if all four bytes are uppercase ASCII letters, the check the
/// transcoder's orphan-data resync (spec §4.7 step 4) uses to decide
/// whether a top-level signature is plausibly a real record/group tag.
#[inline]
pub fn is_uppercase_ascii_tag(sig: &[u8; 4]) -> bool {
    sig.iter().all(|&b| b.is_ascii_uppercase())
}

/// Converts an IEEE-754 binary16 (half precision) value to `f32`, handling
/// subnormals, infinities, and NaN payloads.
pub fn f16_to_f32(half: u16) -> f32 {
    let sign: f32 = if half & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = (half >> 10) & 0x1f;
    let mantissa = (half & 0x3ff) as u32;

    if exponent == 0 {
        if mantissa == 0 {
            sign * 0.0
        } else {
            // Subnormal: value = mantissa * 2^-24 (smallest subnormal is 2^-14 * 2^-10).
            sign * mantissa as f32 * 2f32.powi(-24)
        }
    } else if exponent == 0x1f {
        if mantissa == 0 {
            sign * f32::INFINITY
        } else {
            sign * f32::NAN
        }
    } else {
        let value = (1.0 + mantissa as f32 / 1024.0) * 2f32.powi(exponent as i32 - 15);
        sign * value
    }
}
