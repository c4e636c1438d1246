//! Bounded-parallelism fan-out.
//!
//! [`Parallelizer::until`] runs `worker(i)` once for every `i` in
//! `[0, n)` on a dedicated pool and returns once every index has run or
//! the cancellation token has stopped the remaining ones.

use std::sync::Arc;

use meridian_metrics::{MetricsRecorder, NoopRecorder};
use tokio_util::sync::CancellationToken;
use tracing::{debug_span, trace};

use crate::cursor::{ChunkCursor, chunk_size_for};
use crate::error::{ParallelError, ParallelResult};

/// Runs index-addressed work on a fixed-size worker pool.
#[derive(Clone)]
pub struct Parallelizer {
    parallelism: usize,
    pool: Arc<rayon::ThreadPool>,
    recorder: Arc<dyn MetricsRecorder>,
}

impl Parallelizer {
    /// Build a parallelizer with its own pool of `parallelism` threads.
    pub fn new(parallelism: usize) -> ParallelResult<Self> {
        Self::with_recorder(parallelism, Arc::new(NoopRecorder))
    }

    /// Like [`Parallelizer::new`], reporting busy workers to `recorder`.
    pub fn with_recorder(parallelism: usize, recorder: Arc<dyn MetricsRecorder>) -> ParallelResult<Self> {
        if parallelism == 0 {
            return Err(ParallelError::ZeroParallelism);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .thread_name(|i| format!("meridian-worker-{i}"))
            .build()?;
        Ok(Self {
            parallelism,
            pool: Arc::new(pool),
            recorder,
        })
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Run `worker(i)` for every `i` in `[0, pieces)`.
    ///
    /// Blocks until every index has been processed or `ctx` is cancelled.
    /// After cancellation no new index starts; indices already running are
    /// left to finish on their own. `operation` labels the fan-out in
    /// traces and metrics.
    pub fn until<F>(&self, ctx: &CancellationToken, pieces: usize, worker: F, operation: &str)
    where
        F: Fn(usize) + Sync,
    {
        if pieces == 0 {
            return;
        }

        let chunk = chunk_size_for(pieces, self.parallelism);
        let cursor = ChunkCursor::new(pieces, chunk);
        let workers = self.parallelism.min(cursor.chunks());

        let span = debug_span!("parallelize", operation, pieces, workers, chunk);
        let _enter = span.enter();

        let worker = &worker;
        let cursor = &cursor;
        let recorder = self.recorder.as_ref();

        self.pool.scope(|s| {
            for _ in 0..workers {
                s.spawn(move |_| {
                    recorder.active_workers(operation, 1);
                    drain(cursor, ctx, worker);
                    recorder.active_workers(operation, -1);
                });
            }
        });

        if ctx.is_cancelled() {
            trace!(operation, "fan-out stopped by cancellation");
        }
    }
}

impl std::fmt::Debug for Parallelizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parallelizer")
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

fn drain<F>(cursor: &ChunkCursor, ctx: &CancellationToken, worker: &F)
where
    F: Fn(usize) + Sync,
{
    while let Some(range) = cursor.next_chunk() {
        for index in range {
            if ctx.is_cancelled() {
                return;
            }
            worker(index);
        }
    }
}
