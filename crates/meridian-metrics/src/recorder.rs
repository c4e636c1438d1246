//! The recorder seam between the framework and a metrics backend.

use std::time::Duration;

use meridian_core::Code;

/// Sink for scheduling metrics.
///
/// Implementations must be cheap to call from many worker threads at
/// once and must never block on I/O.
pub trait MetricsRecorder: Send + Sync {
    /// One extension point finished with `code` after `duration`.
    fn observe_extension_point(&self, extension_point: &str, code: Code, duration: Duration);

    /// One plugin call at `extension_point` finished with `code`.
    fn observe_plugin(&self, extension_point: &str, plugin: &str, code: Code, duration: Duration);

    /// Adjust the number of busy parallel workers for `operation`.
    fn active_workers(&self, operation: &str, delta: i64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn observe_extension_point(&self, _: &str, _: Code, _: Duration) {}

    fn observe_plugin(&self, _: &str, _: &str, _: Code, _: Duration) {}

    fn active_workers(&self, _: &str, _: i64) {}
}
