//! Chunked index hand-out.
//!
//! Workers pull `[start, end)` ranges from a shared atomic counter.
//! Every index in `[0, len)` is handed out exactly once across all
//! workers, so index-addressed output slots are never written twice.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Chunk size for `n` pieces across `parallelism` workers.
///
/// `sqrt(n)` keeps the number of chunks reasonable for large inputs,
/// capped at `n / parallelism + 1` so small inputs still spread across
/// every worker. Never less than 1.
pub fn chunk_size_for(n: usize, parallelism: usize) -> usize {
    let s = n.isqrt();
    let r = n / parallelism.max(1) + 1;
    s.min(r).max(1)
}

/// Lock-free iterator over index chunks, shared by all workers of one fan-out.
#[derive(Debug)]
pub struct ChunkCursor {
    next: AtomicUsize,
    len: usize,
    chunk: usize,
}

impl ChunkCursor {
    pub fn new(len: usize, chunk: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            len,
            chunk: chunk.max(1),
        }
    }

    /// Claim the next chunk, or `None` once every index has been handed out.
    pub fn next_chunk(&self) -> Option<Range<usize>> {
        let start = self.next.fetch_add(self.chunk, Ordering::Relaxed);
        if start >= self.len {
            return None;
        }
        Some(start..(start + self.chunk).min(self.len))
    }

    /// Number of chunks needed to cover every index.
    pub fn chunks(&self) -> usize {
        self.len.div_ceil(self.chunk)
    }
}
