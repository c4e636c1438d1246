//! meridian-parallel: the fan-out primitive every parallel extension
//! point is built on.
//!
//! # Architecture
//!
//! ```text
//! Parallelizer::until(ctx, n, worker, operation)
//!   ├── dedicated rayon pool (size = parallelism)
//!   ├── ChunkCursor (lock-free hand-out of index chunks)
//!   └── CancellationToken checked before every index
//!
//! ErrorChannel
//!   └── capacity-1 channel: first error wins, later ones are dropped
//! ```
//!
//! Callers capture results into pre-sized, index-addressed storage and
//! report failures through an [`ErrorChannel`]; `until` itself returns
//! nothing.

pub mod cursor;
pub mod error;
pub mod error_channel;
pub mod parallelizer;

pub use cursor::{ChunkCursor, chunk_size_for};
pub use error::{ParallelError, ParallelResult};
pub use error_channel::ErrorChannel;
pub use parallelizer::Parallelizer;
pub use tokio_util::sync::CancellationToken;
