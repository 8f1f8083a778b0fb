//! The carver: locates embedded files in a memory dump by signature,
//! validates them with a format-specific header parser, and reassembles
//! their bytes from the dump's memory regions (spec §1, §4.5, component
//! C5).

mod engine;
mod manifest;
mod options;
mod output;
mod reassemble;

#[cfg(feature = "parallel")]
mod batch;

pub use engine::Carver;
pub use manifest::{CarveEntry, CarveManifest};
pub use options::CarveOptions;

#[cfg(feature = "parallel")]
pub use batch::BoundedCarveBatch;

use crate::{Error, Result};
use std::path::Path;

/// Memory-maps `dump_path` read-only and carves it into
/// `<output_dir>/<dump-basename>/` (spec §6, "Output directory layout"),
/// using the default built-in format registry.
pub fn carve_dump(dump_path: &Path, output_dir: &Path, options: CarveOptions) -> Result<CarveManifest> {
    let file = std::fs::File::open(dump_path).map_err(|e| Error::Fatal(format!("cannot open dump: {e}")))?;
    let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| Error::Fatal(format!("cannot map dump: {e}")))?;

    let basename = dump_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dump".to_string());
    let output_root = output_dir.join(basename);

    let carver = Carver::new();
    carver.carve(&mmap, &output_root, &options)
}
