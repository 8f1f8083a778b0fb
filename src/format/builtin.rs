//! Built-in format handlers (spec §6, "Signature magic bytes (examples)").
//!
//! These are representative, not an exhaustive asset-format catalog: a DDS
//! texture (uncompressed and block-compressed), a PNG (walked chunk by
//! chunk to find its true end), a simplified Xbox XMA audio header, and the
//! module-image pseudo-format that spec §4.4 says is "discovered
//! exclusively through dump-metadata walking, not magic scanning."

use crate::format::{ContextWindow, FormatHandler, FormatId, ParseResult, Signature};
use crate::primitives;

// ---------------------------------------------------------------------
// DDS
// ---------------------------------------------------------------------

pub struct Dds;

const DDS_SIGNATURES: &[Signature] = &[Signature {
    id: 0,
    magic: b"DDS ",
    description: "DirectDraw Surface container",
}];

const DDPF_ALPHAPIXELS: u32 = 0x1;
const DDPF_FOURCC: u32 = 0x4;
const DDPF_RGB: u32 = 0x40;

fn dds_level_size(width: u32, height: u32, depth: u32, flags: u32, fourcc: [u8; 4], rgb_bit_count: u32) -> u64 {
    if flags & DDPF_FOURCC != 0 {
        let block_size: u64 = if &fourcc == b"DXT1" { 8 } else { 16 };
        let blocks_wide = (width as u64 + 3) / 4;
        let blocks_high = (height as u64 + 3) / 4;
        blocks_wide.max(1) * blocks_high.max(1) * block_size * depth.max(1) as u64
    } else {
        let bytes_per_pixel = (rgb_bit_count / 8).max(1) as u64;
        width.max(1) as u64 * height.max(1) as u64 * depth.max(1) as u64 * bytes_per_pixel
    }
}

impl FormatHandler for Dds {
    fn id(&self) -> FormatId {
        "dds"
    }

    fn display_name(&self) -> &'static str {
        "DirectDraw Surface texture"
    }

    fn output_folder(&self) -> &'static str {
        "dds"
    }

    fn default_extension(&self) -> &'static str {
        ".dds"
    }

    fn min_size(&self) -> u64 {
        128
    }

    fn max_size(&self) -> u64 {
        128 * 1024 * 1024
    }

    fn signatures(&self) -> &[Signature] {
        DDS_SIGNATURES
    }

    fn parse(&self, window: &[u8], signature_offset: usize, _signature: &Signature) -> Option<ParseResult> {
        const HEADER_LEN: usize = 128;
        if window.len() < signature_offset + HEADER_LEN {
            return None;
        }
        let base = signature_offset;
        let header_size = primitives::read_u32(window, base + 4, false).ok()?;
        if header_size != 124 {
            return None;
        }
        let height = primitives::read_u32(window, base + 12, false).ok()?;
        let width = primitives::read_u32(window, base + 16, false).ok()?;
        let depth = primitives::read_u32(window, base + 24, false).ok()?;
        let mipmap_count = primitives::read_u32(window, base + 28, false).ok()?;
        let pf_size = primitives::read_u32(window, base + 76, false).ok()?;
        if pf_size != 32 {
            return None;
        }
        let pf_flags = primitives::read_u32(window, base + 80, false).ok()?;
        if pf_flags & (DDPF_FOURCC | DDPF_RGB | DDPF_ALPHAPIXELS) == 0 {
            return None;
        }
        let fourcc_bytes = primitives::read_signature(window, base + 84, false).ok()?;
        let rgb_bit_count = primitives::read_u32(window, base + 88, false).ok()?;

        if width == 0 || height == 0 || width > 1 << 16 || height > 1 << 16 {
            return None;
        }

        let levels = mipmap_count.max(1);
        let mut total = 0u64;
        let (mut w, mut h, mut d) = (width, height, depth.max(1));
        for _ in 0..levels {
            total += dds_level_size(w, h, d, pf_flags, fourcc_bytes, rgb_bit_count);
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            d = (d / 2).max(1);
        }

        Some(ParseResult::new(HEADER_LEN as u64 + total))
    }
}

// ---------------------------------------------------------------------
// PNG
// ---------------------------------------------------------------------

pub struct Png;

const PNG_SIGNATURES: &[Signature] = &[Signature {
    id: 0,
    magic: &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a],
    description: "PNG file signature",
}];

impl FormatHandler for Png {
    fn id(&self) -> FormatId {
        "png"
    }

    fn display_name(&self) -> &'static str {
        "Portable Network Graphics image"
    }

    fn output_folder(&self) -> &'static str {
        "png"
    }

    fn default_extension(&self) -> &'static str {
        ".png"
    }

    fn min_size(&self) -> u64 {
        8 + 25 + 12 // signature + minimal IHDR chunk + IEND chunk
    }

    fn max_size(&self) -> u64 {
        256 * 1024 * 1024
    }

    fn signatures(&self) -> &[Signature] {
        PNG_SIGNATURES
    }

    fn context_window(&self) -> ContextWindow {
        // PNGs can be large; walking chunks needs room to find IEND.
        ContextWindow { before: 0, after: 512 * 1024 }
    }

    fn parse(&self, window: &[u8], signature_offset: usize, _signature: &Signature) -> Option<ParseResult> {
        let sig_len = 8usize;
        let mut offset = signature_offset + sig_len;
        loop {
            if offset + 8 > window.len() {
                return None; // ran off the end of the scan window without IEND
            }
            let chunk_len = primitives::read_u32(window, offset, true).ok()? as usize;
            let chunk_type = &window[offset + 4..offset + 8];
            let chunk_total = 8 + chunk_len + 4; // length + type + data + crc
            if offset + chunk_total > window.len() {
                return None;
            }
            offset += chunk_total;
            if chunk_type == b"IEND" {
                break;
            }
        }
        let total = (offset - signature_offset) as u64;
        Some(ParseResult::new(total))
    }
}

// ---------------------------------------------------------------------
// XMA (simplified Xbox audio container)
// ---------------------------------------------------------------------

pub struct Xma;

const XMA_SIGNATURES: &[Signature] = &[Signature {
    id: 0,
    magic: b"XMA2",
    description: "Xbox XMA2 audio stream header",
}];

impl FormatHandler for Xma {
    fn id(&self) -> FormatId {
        "xma"
    }

    fn display_name(&self) -> &'static str {
        "Xbox XMA2 audio stream"
    }

    fn output_folder(&self) -> &'static str {
        "xma"
    }

    fn default_extension(&self) -> &'static str {
        ".xma"
    }

    fn min_size(&self) -> u64 {
        8
    }

    fn max_size(&self) -> u64 {
        64 * 1024 * 1024
    }

    fn signatures(&self) -> &[Signature] {
        XMA_SIGNATURES
    }

    fn parse(&self, window: &[u8], signature_offset: usize, _signature: &Signature) -> Option<ParseResult> {
        if window.len() < signature_offset + 8 {
            return None;
        }
        // Xbox dumps store this header in big-endian byte order.
        let data_size = primitives::read_u32(window, signature_offset + 4, true).ok()? as u64;
        if data_size == 0 {
            return None;
        }
        Some(ParseResult::new(8 + data_size))
    }
}

// ---------------------------------------------------------------------
// Module images: metadata-only, never magic-scanned.
// ---------------------------------------------------------------------

pub struct ModuleImage;

impl FormatHandler for ModuleImage {
    fn id(&self) -> FormatId {
        "module"
    }

    fn display_name(&self) -> &'static str {
        "Loaded executable module image"
    }

    fn output_folder(&self) -> &'static str {
        "modules"
    }

    fn default_extension(&self) -> &'static str {
        ".xex"
    }

    fn min_size(&self) -> u64 {
        0
    }

    fn max_size(&self) -> u64 {
        u64::MAX
    }

    fn scanning_enabled(&self) -> bool {
        false
    }

    fn signatures(&self) -> &[Signature] {
        &[]
    }

    fn parse(&self, _window: &[u8], _signature_offset: usize, _signature: &Signature) -> Option<ParseResult> {
        None
    }
}
