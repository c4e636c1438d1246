//! Non-blocking recorder.
//!
//! [`AsyncRecorder`] only pushes observations onto an unbounded channel,
//! so worker threads never contend on the sink's locks. An
//! [`AsyncFlusher`] drains the channel into the real recorder, either
//! periodically from [`AsyncFlusher::run`] or on demand.

use std::sync::Arc;
use std::time::Duration;

use meridian_core::Code;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::recorder::MetricsRecorder;

#[derive(Debug)]
enum Sample {
    ExtensionPoint {
        extension_point: String,
        code: Code,
        duration: Duration,
    },
    Plugin {
        extension_point: String,
        plugin: String,
        code: Code,
        duration: Duration,
    },
    Workers {
        operation: String,
        delta: i64,
    },
}

/// Sending half: cheap to clone, never blocks.
#[derive(Debug, Clone)]
pub struct AsyncRecorder {
    tx: mpsc::UnboundedSender<Sample>,
}

/// Receiving half: applies buffered samples to the sink.
pub struct AsyncFlusher {
    rx: mpsc::UnboundedReceiver<Sample>,
    sink: Arc<dyn MetricsRecorder>,
    interval: Duration,
}

/// Create a recorder/flusher pair writing into `sink`.
pub fn async_recorder(sink: Arc<dyn MetricsRecorder>, interval: Duration) -> (AsyncRecorder, AsyncFlusher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AsyncRecorder { tx }, AsyncFlusher { rx, sink, interval })
}

impl MetricsRecorder for AsyncRecorder {
    fn observe_extension_point(&self, extension_point: &str, code: Code, duration: Duration) {
        // A closed channel means the flusher is gone; metrics are best effort.
        let _ = self.tx.send(Sample::ExtensionPoint {
            extension_point: extension_point.to_string(),
            code,
            duration,
        });
    }

    fn observe_plugin(&self, extension_point: &str, plugin: &str, code: Code, duration: Duration) {
        let _ = self.tx.send(Sample::Plugin {
            extension_point: extension_point.to_string(),
            plugin: plugin.to_string(),
            code,
            duration,
        });
    }

    fn active_workers(&self, operation: &str, delta: i64) {
        let _ = self.tx.send(Sample::Workers {
            operation: operation.to_string(),
            delta,
        });
    }
}

impl AsyncFlusher {
    /// Apply every buffered sample to the sink. Returns how many were applied.
    pub fn flush(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(sample) = self.rx.try_recv() {
            match sample {
                Sample::ExtensionPoint {
                    extension_point,
                    code,
                    duration,
                } => self.sink.observe_extension_point(&extension_point, code, duration),
                Sample::Plugin {
                    extension_point,
                    plugin,
                    code,
                    duration,
                } => self.sink.observe_plugin(&extension_point, &plugin, code, duration),
                Sample::Workers { operation, delta } => self.sink.active_workers(&operation, delta),
            }
            applied += 1;
        }
        applied
    }

    /// Flush every `interval` until the shutdown signal fires, then flush once more.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "metrics flusher started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let applied = self.flush();
                    if applied > 0 {
                        debug!(applied, "metrics flushed");
                    }
                }
                _ = shutdown.changed() => {
                    let applied = self.flush();
                    info!(applied, "metrics flusher shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectingRecorder;

    #[test]
    fn nothing_reaches_sink_before_flush() {
        let sink = Arc::new(CollectingRecorder::new());
        let (recorder, mut flusher) = async_recorder(sink.clone(), Duration::from_secs(1));

        recorder.observe_extension_point("Score", Code::Success, Duration::from_millis(1));
        assert_eq!(sink.extension_point_count("Score"), 0);

        assert_eq!(flusher.flush(), 1);
        assert_eq!(sink.extension_point_count("Score"), 1);
    }

    #[test]
    fn send_after_flusher_dropped_is_ignored() {
        let sink = Arc::new(CollectingRecorder::new());
        let (recorder, flusher) = async_recorder(sink, Duration::from_secs(1));
        drop(flusher);

        recorder.observe_plugin("Score", "A", Code::Error, Duration::ZERO);
        recorder.active_workers("Score", 1);
    }

    #[tokio::test]
    async fn run_flushes_on_shutdown() {
        let sink = Arc::new(CollectingRecorder::new());
        let (recorder, flusher) = async_recorder(sink.clone(), Duration::from_secs(3600));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(flusher.run(shutdown_rx));

        recorder.observe_plugin("Filter", "NodeLabels", Code::Success, Duration::from_micros(5));
        recorder.active_workers("Filter", 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(sink.plugin_count("NodeLabels"), 1);
        assert_eq!(sink.active_workers_for("Filter"), 2);
    }
}
