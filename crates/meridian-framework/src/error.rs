//! Framework and scheduling error types.

use std::collections::BTreeMap;
use std::fmt;

use meridian_core::{ConfigError, Status};
use meridian_parallel::ParallelError;
use thiserror::Error;

use crate::diagnosis::Diagnosis;

/// Errors raised while building a framework or running its extension points.
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("plugin {plugin:?} failed with: {status}")]
    PluginFailed {
        plugin: String,
        #[source]
        status: Status,
    },

    #[error("plugin {plugin:?} returns an invalid score {score}, it should in the range of [{min}, {max}] after normalizing")]
    InvalidScore {
        plugin: String,
        score: i64,
        min: i64,
        max: i64,
    },

    #[error("running filter plugins on node {node:?}: {status}")]
    FilterFailed {
        node: String,
        #[source]
        status: Status,
    },

    #[error("scheduling cycle was cancelled")]
    Cancelled,

    #[error("plugin {0:?} is not registered")]
    UnknownPlugin(String),

    #[error("plugin {0:?} is already registered")]
    DuplicatePlugin(String),

    #[error("plugin {plugin:?} does not extend {extension_point} plugin")]
    MissingCapability {
        plugin: String,
        extension_point: &'static str,
    },

    #[error("failed to initialize plugin {plugin:?}: {message}")]
    PluginInit { plugin: String, message: String },

    #[error("invalid profile: {0}")]
    Config(#[from] ConfigError),

    #[error("parallelizer error: {0}")]
    Parallelizer(#[from] ParallelError),
}

impl FrameworkError {
    pub fn plugin_failed(plugin: &str, status: Status) -> Self {
        Self::PluginFailed {
            plugin: plugin.to_string(),
            status,
        }
    }
}

pub type FrameworkResult<T> = Result<T, FrameworkError>;

/// No node passed filtering.
#[derive(Debug, Clone)]
pub struct FitError {
    pub num_all_nodes: usize,
    pub diagnosis: Diagnosis,
    /// Node nominated by a post-filter plugin, if any.
    pub nominated_node: Option<String>,
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0/{} nodes are available:", self.num_all_nodes)?;

        if let Some(msg) = &self.diagnosis.pre_filter_msg {
            write!(f, " {msg}.")?;
        } else {
            let histogram = reasons_histogram(&self.diagnosis);
            if !histogram.is_empty() {
                write!(f, " {}.", histogram.join(", "))?;
            }
        }

        if let Some(msg) = &self.diagnosis.post_filter_msg {
            write!(f, " {msg}.")?;
        }
        Ok(())
    }
}

impl std::error::Error for FitError {}

/// `"<count> <reason>"` entries sorted by reason.
fn reasons_histogram(diagnosis: &Diagnosis) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for status in diagnosis.node_to_status.values() {
        for reason in status.reasons() {
            *counts.entry(reason.as_str()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|(reason, count)| format!("{count} {reason}"))
        .collect()
}

/// Errors returned by a scheduling cycle.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("no nodes available to schedule workloads")]
    NoNodesAvailable,

    #[error(transparent)]
    Unschedulable(#[from] FitError),

    #[error("{stage} stage failed: {status}")]
    StageFailed { stage: &'static str, status: Status },

    #[error(transparent)]
    Framework(#[from] FrameworkError),
}
