//! Plugin capability traits.
//!
//! Every plugin implements [`Plugin`]. Each extension point has its own
//! capability trait; a plugin opts into an extension point by
//! implementing the trait and overriding the matching `as_*` probe on
//! [`Plugin`] to return itself. Probes default to `None`, so a plugin
//! only ever advertises the capabilities it really has.
//!
//! ```text
//! struct Spread;
//! impl Plugin for Spread {
//!     fn name(&self) -> &str { "Spread" }
//!     fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> { Some(self) }
//! }
//! impl ScorePlugin for Spread { ... }
//! ```
//!
//! `ctx` is the cancellation token of the current fan-out. Long-running
//! plugins should check it and return early once it is cancelled.

use std::collections::BTreeSet;
use std::sync::Arc;

use meridian_core::{CycleState, NodeInfo, NodeScore, Status, Workload};
use meridian_metrics::labels;
use meridian_parallel::CancellationToken;

use crate::diagnosis::Diagnosis;

/// Base trait of every plugin.
pub trait Plugin: Send + Sync {
    /// Unique name, as referenced from profiles.
    fn name(&self) -> &str;

    fn as_pre_enqueue(self: Arc<Self>) -> Option<Arc<dyn PreEnqueuePlugin>> {
        None
    }

    fn as_pre_filter(self: Arc<Self>) -> Option<Arc<dyn PreFilterPlugin>> {
        None
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        None
    }

    fn as_post_filter(self: Arc<Self>) -> Option<Arc<dyn PostFilterPlugin>> {
        None
    }

    fn as_pre_score(self: Arc<Self>) -> Option<Arc<dyn PreScorePlugin>> {
        None
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        None
    }

    fn as_reserve(self: Arc<Self>) -> Option<Arc<dyn ReservePlugin>> {
        None
    }

    fn as_permit(self: Arc<Self>) -> Option<Arc<dyn PermitPlugin>> {
        None
    }

    fn as_pre_bind(self: Arc<Self>) -> Option<Arc<dyn PreBindPlugin>> {
        None
    }

    fn as_bind(self: Arc<Self>) -> Option<Arc<dyn BindPlugin>> {
        None
    }

    fn as_post_bind(self: Arc<Self>) -> Option<Arc<dyn PostBindPlugin>> {
        None
    }
}

/// Gate a workload before it is considered for scheduling at all.
pub trait PreEnqueuePlugin: Plugin {
    fn pre_enqueue(&self, workload: &Workload) -> Status;
}

// ── Filtering ──────────────────────────────────────────────────────

/// Candidate nodes a pre-filter plugin already knows are the only viable ones.
///
/// `node_names == None` means every node remains a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreFilterResult {
    pub node_names: Option<BTreeSet<String>>,
}

impl PreFilterResult {
    /// Restrict candidates to `names`.
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            node_names: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    pub fn all_nodes(&self) -> bool {
        self.node_names.is_none()
    }

    /// `true` when no node can be a candidate any more.
    pub fn is_empty(&self) -> bool {
        self.node_names.as_ref().is_some_and(BTreeSet::is_empty)
    }

    pub fn allows(&self, node: &str) -> bool {
        self.node_names.as_ref().is_none_or(|names| names.contains(node))
    }

    /// Intersection of two results.
    pub fn merge(&self, other: &PreFilterResult) -> PreFilterResult {
        let node_names = match (&self.node_names, &other.node_names) {
            (None, None) => None,
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (Some(a), Some(b)) => Some(a.intersection(b).cloned().collect()),
        };
        PreFilterResult { node_names }
    }
}

/// Runs once per cycle before filtering. May narrow the candidate nodes,
/// or return `Skip` to disable the same plugin's filter for the cycle.
pub trait PreFilterPlugin: Plugin {
    fn pre_filter(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        nodes: &[NodeInfo],
    ) -> (Option<PreFilterResult>, Status);
}

/// Decides whether a workload fits a single node.
///
/// Called concurrently for different nodes of the same cycle.
pub trait FilterPlugin: Plugin {
    fn filter(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node: &NodeInfo) -> Status;
}

/// Outcome of a post-filter plugin that could make room for the workload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilterResult {
    pub nominated_node: Option<String>,
}

/// Runs only when no node passed filtering.
pub trait PostFilterPlugin: Plugin {
    fn post_filter(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        diagnosis: &Diagnosis,
    ) -> (Option<PostFilterResult>, Status);
}

// ── Scoring ────────────────────────────────────────────────────────

/// Runs once per cycle before scoring, with the feasible nodes.
/// Returning `Skip` disables the same plugin's score for the cycle.
pub trait PreScorePlugin: Plugin {
    fn pre_score(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, nodes: &[NodeInfo]) -> Status;
}

/// Ranks feasible nodes.
///
/// `score` is called concurrently for different nodes; for a given node
/// the score plugins run one after another in profile order.
pub trait ScorePlugin: Plugin {
    fn score(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        node: &NodeInfo,
    ) -> Result<i64, Status>;

    /// Optional normalization step; `None` leaves raw scores as they are.
    fn score_extensions(&self) -> Option<&dyn ScoreExtensions> {
        None
    }
}

/// Rewrites one plugin's scores for every node at once, in place.
///
/// After normalization every score must lie in
/// `[MIN_NODE_SCORE, MAX_NODE_SCORE]`.
pub trait ScoreExtensions: Send + Sync {
    fn normalize_score(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        scores: &mut [NodeScore],
    ) -> Result<(), Status>;
}

// ── Binding cycle ──────────────────────────────────────────────────

/// Claims node resources for the workload ahead of binding.
pub trait ReservePlugin: Plugin {
    fn reserve(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str) -> Status;

    /// Release what `reserve` claimed. Must be idempotent.
    fn unreserve(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str);
}

/// Last chance to reject a workload before binding.
pub trait PermitPlugin: Plugin {
    fn permit(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str) -> Status;
}

pub trait PreBindPlugin: Plugin {
    fn pre_bind(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str) -> Status;
}

/// Binds the workload to the node. `Skip` hands over to the next binder.
pub trait BindPlugin: Plugin {
    fn bind(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str) -> Status;
}

/// Informational hook after a successful bind.
pub trait PostBindPlugin: Plugin {
    fn post_bind(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str);
}

/// Extension points a plugin can be placed at, in cycle order.
pub fn capabilities(plugin: &Arc<dyn Plugin>) -> Vec<&'static str> {
    let probes: [(&'static str, bool); 11] = [
        (labels::PRE_ENQUEUE, plugin.clone().as_pre_enqueue().is_some()),
        (labels::PRE_FILTER, plugin.clone().as_pre_filter().is_some()),
        (labels::FILTER, plugin.clone().as_filter().is_some()),
        (labels::POST_FILTER, plugin.clone().as_post_filter().is_some()),
        (labels::PRE_SCORE, plugin.clone().as_pre_score().is_some()),
        (labels::SCORE, plugin.clone().as_score().is_some()),
        (labels::RESERVE, plugin.clone().as_reserve().is_some()),
        (labels::PERMIT, plugin.clone().as_permit().is_some()),
        (labels::PRE_BIND, plugin.clone().as_pre_bind().is_some()),
        (labels::BIND, plugin.clone().as_bind().is_some()),
        (labels::POST_BIND, plugin.clone().as_post_bind().is_some()),
    ];
    probes
        .into_iter()
        .filter_map(|(point, present)| present.then_some(point))
        .collect()
}
