//! Progress reporting for long-running pipeline stages.
//!
//! [`ProgressCallback`] keeps the pipeline independent of how progress is
//! shown. The CLI renders it with progress bars; tests and library callers
//! use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from the orchestrator.
///
/// Implementations are shared across spawned tasks, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total units of work (jurisdictions, tables, ...).
    fn set_total(&self, total: u64);

    /// Advances progress by `delta` units.
    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// Marks progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
