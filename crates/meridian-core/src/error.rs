//! Error types for cycle state access and profile validation.

use thiserror::Error;

/// Result type alias for cycle state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Result type alias for profile validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors returned when reading from a [`CycleState`](crate::CycleState).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("cycle state key not found: {0}")]
    NotFound(String),

    #[error("cycle state key {key:?} holds a different type than requested")]
    TypeMismatch { key: String },
}

/// Errors found while validating a scheduling profile.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("profile name must not be empty")]
    EmptyName,

    #[error("parallelism must be greater than zero")]
    ZeroParallelism,

    #[error("percentage_of_nodes_to_score must be in [0, 100], got {0}")]
    InvalidPercentage(u32),

    #[error("plugin {plugin:?} listed more than once for {extension_point}")]
    DuplicatePlugin {
        extension_point: &'static str,
        plugin: String,
    },

    #[error("score plugin {plugin:?} has negative weight {weight}")]
    NegativeWeight { plugin: String, weight: i64 },

    #[error("total score weight overflows the maximum total score")]
    WeightOverflow,

    #[error("failed to read profile: {0}")]
    Read(String),

    #[error("failed to parse profile: {0}")]
    Parse(String),
}
