//! Progress reporting for upstream downloads.
//!
//! Sources report one unit of work per downloaded series through a
//! [`ProgressCallback`]. The CLI renders it as an `indicatif` bar; library
//! callers and tests pass [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running fetch.
///
/// Shared across concurrently polled downloads, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Total units of work expected.
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the status message.
    fn set_message(&self, msg: String);

    /// Marks the work as done, leaving `msg` visible.
    fn finish(&self, msg: String);

    /// Marks the work as done and hides the indicator.
    fn finish_and_clear(&self);
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// A shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
