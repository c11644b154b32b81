//! Progress reporting for source collection.
//!
//! Handlers and the merge engine report through [`ProgressCallback`]; the
//! CLI renders it as an `indicatif` bar while tests pass [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a collection run.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total number of units (sources, pages) expected.
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the status message shown next to the bar.
    fn set_message(&self, msg: String);

    /// Marks the run finished with a final message.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
