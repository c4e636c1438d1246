//! Parallelizer error types.

use thiserror::Error;

/// Errors that can occur while building a parallelizer.
#[derive(Debug, Error)]
pub enum ParallelError {
    #[error("parallelism must be greater than zero")]
    ZeroParallelism,

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type ParallelResult<T> = Result<T, ParallelError>;
