//! Progress reporting for the per-row transform.
//!
//! The transform only knows how many rows it has handled; how that is shown
//! (an `indicatif` bar, nothing at all) is decided by the caller.

use std::sync::Arc;

/// Receives progress from a batch operation.
pub trait ProgressCallback: Send + Sync {
    /// Total number of rows that will be processed.
    fn set_total(&self, total: u64);

    /// Advance by `delta` rows.
    fn inc(&self, delta: u64);

    /// The batch is done.
    fn finish(&self, msg: String);
}

/// Discards all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
