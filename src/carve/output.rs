//! Output path resolution and exclusive-create disambiguation (spec §4.5
//! step 5e, §5 "each file is created exclusively; duplicates generate a
//! `_n` suffix without racing").

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// Builds `<output>/<folder>/<stem><ext>`, appending `_<n>` before the
/// extension the first time a name collides, and opens it for exclusive
/// creation so two carve runs (or formats sharing an output folder) never
/// clobber each other.
pub fn create_unique(output_root: &Path, folder: &str, stem: &str, ext: &str) -> io::Result<(PathBuf, std::fs::File)> {
    let dir = output_root.join(folder);
    std::fs::create_dir_all(&dir)?;

    let mut candidate = dir.join(format!("{stem}{ext}"));
    let mut n = 1u32;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = dir.join(format!("{stem}_{n}{ext}"));
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// The default filename stem for a carve entry with no better name: the
/// hex dump offset, zero-padded to 8 digits (spec §8 scenario 1:
/// `00004000.dds`).
pub fn hex_offset_stem(offset: u64) -> String {
    format!("{offset:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_offset_stem_matches_spec_example() {
        assert_eq!(hex_offset_stem(0x4000), "00004000");
    }

    #[test]
    fn disambiguates_colliding_names() {
        let dir = tempfile::tempdir().unwrap();
        let (p1, _f1) = create_unique(dir.path(), "dds", "00004000", ".dds").unwrap();
        let (p2, _f2) = create_unique(dir.path(), "dds", "00004000", ".dds").unwrap();
        assert_ne!(p1, p2);
        assert!(p2.to_string_lossy().contains("00004000_1.dds"));
    }
}
