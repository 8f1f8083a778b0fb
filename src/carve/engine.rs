//! The carver engine itself (spec §4.5, component C5): orchestrates the
//! format registry (C4), the multi-pattern matcher (C3), and dump mapping
//! (C2) into one signature-scan-then-reassemble pass.

use crate::carve::manifest::{CarveEntry, CarveManifest};
use crate::carve::options::CarveOptions;
use crate::carve::{output, reassemble};
use crate::dump::DumpMapping;
use crate::format::{FormatHandler, FormatRegistry, Signature};
use crate::matcher::PatternMatcher;
use crate::progress::CarveProgress;
use crate::{Error, Result};
use log::{debug, trace, warn};
use std::io::Write;
use std::path::Path;

/// Owns a format registry and carves dumps against it. Cheap to construct;
/// holds no per-run state, so one instance can be reused (or, under the
/// `parallel` feature, one per worker).
pub struct Carver {
    registry: FormatRegistry,
}

impl Default for Carver {
    fn default() -> Self {
        Carver::new()
    }
}

impl Carver {
    pub fn new() -> Self {
        Carver {
            registry: FormatRegistry::with_builtin_formats(),
        }
    }

    pub fn with_registry(registry: FormatRegistry) -> Self {
        Carver { registry }
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Runs one carve pass over `dump`, writing recovered files under
    /// `output_root` and returning the manifest (also flushed to
    /// `output_root/manifest.json`).
    pub fn carve(&self, dump: &[u8], output_root: &Path, options: &CarveOptions) -> Result<CarveManifest> {
        std::fs::create_dir_all(output_root)
            .map_err(|e| Error::Fatal(format!("cannot create output directory: {e}")))?;

        let mapping = DumpMapping::parse(dump);
        let mut manifest = CarveManifest::new();

        self.carve_by_signature(dump, &mapping, output_root, options, &mut manifest)?;
        self.carve_module_images(dump, &mapping, output_root, options, &mut manifest)?;

        if options.ddx_convert {
            debug!("ddx conversion requested; external collaborator not invoked by the core carver");
        }

        manifest.write_to(output_root)?;
        Ok(manifest)
    }

    fn carve_by_signature(
        &self,
        dump: &[u8],
        mapping: &DumpMapping,
        output_root: &Path,
        options: &CarveOptions,
        manifest: &mut CarveManifest,
    ) -> Result<()> {
        let mut matcher = PatternMatcher::new();
        // Index by pattern id, assigned in registration order so hit
        // tie-breaks follow registration order (spec §4.5, "Determinism").
        let mut pattern_index: Vec<(usize, &Signature)> = Vec::new();

        for (format_idx, format) in self.registry.formats().iter().enumerate() {
            if !format.scanning_enabled() || !options.allows(format.id()) {
                continue;
            }
            for signature in format.signatures() {
                let pattern_id = pattern_index.len() as u32;
                matcher.add_pattern(pattern_id, signature.magic)?;
                pattern_index.push((format_idx, signature));
            }
        }
        if pattern_index.is_empty() {
            return Ok(());
        }
        matcher.build()?;

        let mut hits = matcher.search(dump, 0)?;
        hits.sort_by_key(|h| (h.position, h.pattern_id));

        for hit in hits {
            if options.cancellation.is_cancelled() {
                warn!("carve cancelled after {} entries", manifest.entries.len());
                break;
            }

            let (format_idx, signature) = pattern_index[hit.pattern_id as usize];
            let format = &self.registry.formats()[format_idx];

            if let Some(cap) = options.per_type_cap {
                if manifest.count_for(format.id()) >= cap {
                    continue;
                }
            }

            trace!("signature hit: format={} offset={:#x}", format.id(), hit.position);

            let window_spec = format.context_window();
            let position = hit.position as usize;
            let before = window_spec.before.min(position);
            let win_start = position - before;
            let win_end = (position + window_spec.after).min(dump.len());
            let window = &dump[win_start..win_end];
            let signature_offset = position - win_start;

            let parse_result = match format.parse(window, signature_offset, signature) {
                Some(r) => r,
                None => {
                    trace!("format {} rejected candidate at {:#x}", format.id(), hit.position);
                    continue;
                }
            };

            let true_start = hit.position.saturating_sub(parse_result.leading_bytes);
            let remaining = dump.len() as u64 - true_start.min(dump.len() as u64);
            let size = parse_result
                .size_estimate
                .clamp(format.min_size(), format.max_size())
                .min(remaining);
            if size == 0 {
                continue;
            }

            let (bytes, coverage) = match reassemble::reassemble_via_va(dump, mapping, true_start, size) {
                Some(r) => (r.bytes, r.coverage),
                None => {
                    let end = (true_start + size).min(dump.len() as u64) as usize;
                    (dump[true_start as usize..end].to_vec(), 1.0)
                }
            };
            let truncated = coverage < 1.0;
            if truncated {
                warn!(
                    "truncated reassembly for {} at {:#x}: coverage={:.3}",
                    format.id(),
                    true_start,
                    coverage
                );
            }

            let folder = parse_result.output_folder_override.unwrap_or_else(|| format.output_folder());
            let ext = parse_result.extension_override.unwrap_or_else(|| format.default_extension());
            let stem = output::hex_offset_stem(true_start);

            let (path, mut file) = match output::create_unique(output_root, folder, &stem, ext) {
                Ok(v) => v,
                Err(e) => {
                    warn!("failed to create output file for {} at {:#x}: {e}", format.id(), true_start);
                    continue;
                }
            };
            if let Err(e) = file.write_all(&bytes) {
                warn!("failed to write output file {}: {e}", path.display());
                continue;
            }

            let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or(stem);
            let original_path = parse_result
                .metadata
                .get("originalPath")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());

            let entry = CarveEntry {
                file_type: format.id(),
                offset: true_start,
                size_in_dump: size,
                size_output: bytes.len() as u64,
                filename,
                original_path,
                is_compressed: false,
                content_type: None,
                is_partial: truncated,
                coverage,
                notes: None,
                metadata: parse_result.metadata,
            };

            options.progress.on_carve_hit(&CarveProgress {
                offset: entry.offset,
                format: entry.file_type,
                accepted: true,
            });
            manifest.push(entry);
        }

        Ok(())
    }

    /// Module images are "discovered exclusively through dump-metadata
    /// walking, not magic scanning" (spec §4.4); walk the module table
    /// directly rather than registering a pattern for them.
    fn carve_module_images(
        &self,
        dump: &[u8],
        mapping: &DumpMapping,
        output_root: &Path,
        options: &CarveOptions,
        manifest: &mut CarveManifest,
    ) -> Result<()> {
        let Some(format) = self.registry.find("module") else {
            return Ok(());
        };
        if !options.allows(format.id()) || mapping.is_flat() {
            return Ok(());
        }

        for module in mapping.modules() {
            if options.cancellation.is_cancelled() {
                break;
            }
            let Some((file_offset, size)) = mapping.module_file_range(&module.name) else {
                continue;
            };
            let end = (file_offset + size).min(dump.len() as u64);
            if end <= file_offset {
                continue;
            }
            let bytes = &dump[file_offset as usize..end as usize];

            let stem = sanitize_module_name(&module.name);
            let (path, mut file) = match output::create_unique(output_root, format.output_folder(), &stem, format.default_extension()) {
                Ok(v) => v,
                Err(e) => {
                    warn!("failed to create output file for module {}: {e}", module.name);
                    continue;
                }
            };
            if let Err(e) = file.write_all(bytes) {
                warn!("failed to write module image {}: {e}", path.display());
                continue;
            }

            let entry = CarveEntry {
                file_type: format.id(),
                offset: file_offset,
                size_in_dump: end - file_offset,
                size_output: bytes.len() as u64,
                filename: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or(stem),
                original_path: Some(module.name.clone()),
                is_compressed: false,
                content_type: None,
                is_partial: false,
                coverage: 1.0,
                notes: None,
                metadata: Default::default(),
            };
            options.progress.on_carve_hit(&CarveProgress {
                offset: entry.offset,
                format: entry.file_type,
                accepted: true,
            });
            manifest.push(entry);
        }

        Ok(())
    }
}

fn sanitize_module_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
