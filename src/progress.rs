//! Progress reporting and cooperative cancellation (spec §5).
//!
//! Progress reporting is synchronous, at the granularity of each hit
//! processed (carver) or each Nth record converted (transcoder); the sink
//! must tolerate concurrent callers since batch mode shares one sink across
//! worker threads. Cancellation is a plain `Arc<AtomicBool>` rather than a
//! dependency on an async runtime's token type: both components only ever
//! check it between discrete units of work, never while suspended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One carve candidate's outcome, reported as it happens.
#[derive(Debug, Clone)]
pub struct CarveProgress {
    pub offset: u64,
    pub format: &'static str,
    pub accepted: bool,
}

/// A transcoder checkpoint, reported every `progress_interval` records.
#[derive(Debug, Clone, Copy)]
pub struct ConvertProgress {
    pub records_converted: u64,
    pub groups_converted: u64,
    pub input_offset: u64,
}

/// Receives progress events from a carve or convert run. Implementations
/// must be `Send + Sync`: batch mode (§5) shares one sink across a bounded
/// worker pool, each worker owning its own [`crate::carve::Carver`].
pub trait ProgressSink: Send + Sync {
    fn on_carve_hit(&self, _progress: &CarveProgress) {}
    fn on_convert_checkpoint(&self, _progress: &ConvertProgress) {}
}

/// A sink that discards every event; the default when the caller doesn't
/// want progress reporting.
impl ProgressSink for () {}

/// Cooperative cancellation, checked between hits (carver) and between
/// records (transcoder). On cancel, the carver flushes the manifest of
/// what it has already staged; the transcoder discards its partial output
/// buffer (spec §5, "Cancellation").
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
