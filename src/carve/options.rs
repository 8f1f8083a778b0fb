//! Carver options (spec §4.5 "Inputs").

use crate::format::FormatId;
use crate::progress::{CancellationToken, ProgressSink};
use std::sync::Arc;

/// Tunables for one carve run.
pub struct CarveOptions {
    /// If non-empty, only these format ids are scanned; an empty list means
    /// "every registered format" (spec §4.5: "format filter (optional
    /// allow-list)").
    pub format_allowlist: Vec<FormatId>,
    /// Stop emitting entries for a format once this many have been written;
    /// `None` means unbounded.
    pub per_type_cap: Option<u64>,
    /// Per-occurrence diagnostic logging (spec §7, "verbose mode emits a
    /// per-occurrence diagnostic").
    pub verbose: bool,
    /// Whether to invoke the optional external DDX conversion pass after
    /// staging (spec §4.5 step 6). That converter is an external
    /// collaborator outside this crate's scope; when set, the carver only
    /// logs that the step was requested and skipped.
    pub ddx_convert: bool,
    pub cancellation: CancellationToken,
    pub progress: Arc<dyn ProgressSink>,
}

impl CarveOptions {
    pub fn allows(&self, format: FormatId) -> bool {
        self.format_allowlist.is_empty() || self.format_allowlist.contains(&format)
    }
}

impl Default for CarveOptions {
    fn default() -> Self {
        CarveOptions {
            format_allowlist: Vec::new(),
            per_type_cap: None,
            verbose: false,
            ddx_convert: false,
            cancellation: CancellationToken::new(),
            progress: Arc::new(()),
        }
    }
}

impl std::fmt::Debug for CarveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarveOptions")
            .field("format_allowlist", &self.format_allowlist)
            .field("per_type_cap", &self.per_type_cap)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}
