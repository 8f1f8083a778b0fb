//! Transcoder options and run statistics (spec §4.7 "Statistics", §5
//! "Ordering guarantees"/"Cancellation").

use crate::progress::{CancellationToken, ProgressSink};
use std::collections::HashMap;
use std::sync::Arc;

/// Options accepted by [`crate::esm::convert`].
#[derive(Clone)]
pub struct ConvertOptions {
    /// Emits a per-occurrence diagnostic for every recovered error path
    /// (resync, decompress fallback) rather than only aggregate counters.
    pub verbose: bool,
    /// Report progress every `progress_interval`-th record converted (spec
    /// §5: "synchronous ... at the granularity of ... each N-th record
    /// converted").
    pub progress_interval: u64,
    pub cancellation: CancellationToken,
    pub progress: Arc<dyn ProgressSink>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            verbose: false,
            progress_interval: 1000,
            cancellation: CancellationToken::default(),
            progress: Arc::new(()),
        }
    }
}

impl std::fmt::Debug for ConvertOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertOptions")
            .field("verbose", &self.verbose)
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}

/// Aggregate counters produced by one conversion run (spec §4.7
/// "Statistics").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertStats {
    pub records_converted: u64,
    pub groups_converted: u64,
    pub top_level_records_skipped: u64,
    pub top_level_groups_skipped_by_type: HashMap<i32, u64>,
    /// Skipped top-level records, by record signature (spec §4.7
    /// "Statistics" — distinct from the group-type histogram above, since a
    /// skipped bare record at the root carries no group type of its own).
    pub skipped_record_type_histogram: HashMap<[u8; 4], u64>,
    pub bytes_skipped_streaming_cache: u64,
    /// `INFO` records observed in the streaming-cache region with no
    /// dialogue-topic match to merge into (spec §9 open question: emit a
    /// counter, never fabricate the merge).
    pub orphaned_streaming_info: u64,
    /// Orphaned-data resyncs (spec §4.7 step 4, §7 `ResyncRequired`).
    pub resyncs: u64,
}
