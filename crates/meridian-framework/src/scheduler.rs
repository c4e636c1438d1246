//! Scheduler: runs one scheduling cycle for a workload.
//!
//! `schedule_one` drives a [`Framework`] through every extension point:
//!
//! - PreEnqueue gates the workload
//! - PreFilter narrows the candidates, Filter finds feasible nodes
//! - PostFilter runs only when nothing is feasible
//! - PreScore and Score rank the feasible nodes, `select_host` picks one
//! - Reserve, Permit, PreBind and Bind commit the decision, PostBind informs
//!
//! Any failure after Reserve runs Unreserve before the error is returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use meridian_core::{CycleState, NodeInfo, NodePluginScores, Status, Workload};
use meridian_metrics::labels;
use meridian_parallel::CancellationToken;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diagnosis::Diagnosis;
use crate::error::{FitError, ScheduleError};
use crate::filtering::FeasibleNodes;
use crate::framework::Framework;

/// Share of cycles that record per-plugin latency.
pub const DEFAULT_PLUGIN_METRICS_SAMPLE_PERCENT: u32 = 10;

/// Outcome of a successful cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleResult {
    /// Node the workload was bound to.
    pub suggested_host: String,
    /// Nodes that went through filtering.
    pub evaluated_nodes: usize,
    /// Nodes that passed filtering.
    pub feasible_nodes: usize,
    /// Per-node score breakdown; empty when scoring was skipped.
    pub scores: Vec<NodePluginScores>,
}

/// Schedules workloads one cycle at a time against a single profile.
#[derive(Debug)]
pub struct Scheduler {
    framework: Arc<Framework>,
    /// Where the next cycle starts filtering, so cycles rotate over nodes.
    next_start_node_index: AtomicUsize,
    plugin_metrics_sample_percent: u32,
}

impl Scheduler {
    pub fn new(framework: Arc<Framework>) -> Self {
        Self {
            framework,
            next_start_node_index: AtomicUsize::new(0),
            plugin_metrics_sample_percent: DEFAULT_PLUGIN_METRICS_SAMPLE_PERCENT,
        }
    }

    /// Override how many cycles in a hundred record per-plugin metrics.
    pub fn with_plugin_metrics_sample_percent(mut self, percent: u32) -> Self {
        self.plugin_metrics_sample_percent = percent.min(100);
        self
    }

    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    /// Run one full scheduling cycle for `workload` over `nodes`.
    pub fn schedule_one(
        &self,
        ctx: &CancellationToken,
        workload: &Workload,
        nodes: &[NodeInfo],
    ) -> Result<ScheduleResult, ScheduleError> {
        if nodes.is_empty() {
            return Err(ScheduleError::NoNodesAvailable);
        }

        let fw = self.framework.as_ref();
        let state = CycleState::new();
        let sample = rand::rng().random_ratio(self.plugin_metrics_sample_percent, 100);
        state.set_record_plugin_metrics(sample);

        let status = fw.run_pre_enqueue_plugins(workload);
        if !status.is_success() {
            return Err(stage_failed(labels::PRE_ENQUEUE, status));
        }

        let feasible = self.find_nodes_that_fit(ctx, &state, workload, nodes)?;
        if feasible.nodes.is_empty() {
            return Err(self.fit_error(ctx, &state, workload, nodes.len(), feasible.diagnosis).into());
        }

        let (host, scores) = if feasible.nodes.len() == 1 {
            debug!(workload = %workload.id, "single feasible node, skipping scoring");
            (feasible.nodes[0].name.clone(), Vec::new())
        } else {
            let status = fw.run_pre_score_plugins(ctx, &state, workload, &feasible.nodes);
            if !status.is_success() {
                return Err(stage_failed(labels::PRE_SCORE, status));
            }
            let scores = fw.run_score_plugins(ctx, &state, workload, &feasible.nodes)?;
            let host = select_host(&scores, &mut rand::rng())
                .map(|s| s.name.clone())
                .ok_or(ScheduleError::NoNodesAvailable)?;
            (host, scores)
        };

        self.commit(ctx, &state, workload, &host)?;

        info!(
            workload = %workload.id,
            node = %host,
            evaluated = feasible.processed,
            feasible = feasible.nodes.len(),
            "workload scheduled"
        );

        Ok(ScheduleResult {
            suggested_host: host,
            evaluated_nodes: feasible.processed,
            feasible_nodes: feasible.nodes.len(),
            scores,
        })
    }

    /// PreFilter then Filter. A pre-filter rejection yields an empty set
    /// with the rejection recorded in the diagnosis.
    fn find_nodes_that_fit(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        nodes: &[NodeInfo],
    ) -> Result<FeasibleNodes, ScheduleError> {
        let fw = self.framework.as_ref();

        let (pre_filter, status) = fw.run_pre_filter_plugins(ctx, state, workload, nodes);
        if !status.is_success() {
            if !status.is_rejected() {
                return Err(stage_failed(labels::PRE_FILTER, status));
            }
            let mut diagnosis = Diagnosis::default();
            diagnosis.pre_filter_msg = Some(status.message());
            if let Some(plugin) = status.plugin() {
                diagnosis.unschedulable_plugins.insert(plugin.to_string());
            }
            return Ok(FeasibleNodes {
                nodes: Vec::new(),
                diagnosis,
                processed: 0,
            });
        }

        let candidates: Vec<NodeInfo> = match &pre_filter {
            Some(r) if !r.all_nodes() => nodes.iter().filter(|n| r.allows(&n.name)).cloned().collect(),
            _ => nodes.to_vec(),
        };

        let start = self.next_start_node_index.load(Ordering::Relaxed);
        let feasible = fw.find_nodes_that_pass_filters(ctx, state, workload, &candidates, start)?;
        if !candidates.is_empty() {
            let next = (start + feasible.processed) % candidates.len();
            self.next_start_node_index.store(next, Ordering::Relaxed);
        }
        Ok(feasible)
    }

    /// Nothing fits: let post-filter plugins try, then describe why.
    fn fit_error(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        num_all_nodes: usize,
        mut diagnosis: Diagnosis,
    ) -> FitError {
        let mut nominated_node = None;
        if self.framework.has_post_filter_plugins() {
            let (result, status) = self.framework.run_post_filter_plugins(ctx, state, workload, &diagnosis);
            if status.is_success() {
                nominated_node = result.and_then(|r| r.nominated_node);
            } else if !status.reasons().is_empty() {
                diagnosis.post_filter_msg = Some(status.message());
            }
        }

        let err = FitError {
            num_all_nodes,
            diagnosis,
            nominated_node,
        };
        debug!(workload = %workload.id, reason = %err, "workload is unschedulable");
        err
    }

    /// Reserve through Bind, unreserving on any failure, then PostBind.
    fn commit(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, host: &str) -> Result<(), ScheduleError> {
        let fw = self.framework.as_ref();

        let status = fw.run_reserve_plugins_reserve(ctx, state, workload, host);
        if !status.is_success() {
            return Err(self.abort(ctx, state, workload, host, labels::RESERVE, status));
        }

        let status = fw.run_permit_plugins(ctx, state, workload, host);
        if !status.is_success() {
            return Err(self.abort(ctx, state, workload, host, labels::PERMIT, status));
        }

        let status = fw.run_pre_bind_plugins(ctx, state, workload, host);
        if !status.is_success() {
            return Err(self.abort(ctx, state, workload, host, labels::PRE_BIND, status));
        }

        let status = fw.run_bind_plugins(ctx, state, workload, host);
        if status.is_skip() {
            let status = Status::error(format!("no bind plugin bound workload {:?}", workload.id));
            return Err(self.abort(ctx, state, workload, host, labels::BIND, status));
        }
        if !status.is_success() {
            return Err(self.abort(ctx, state, workload, host, labels::BIND, status));
        }

        fw.run_post_bind_plugins(ctx, state, workload, host);
        Ok(())
    }

    fn abort(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        host: &str,
        stage: &'static str,
        status: Status,
    ) -> ScheduleError {
        warn!(workload = %workload.id, node = %host, stage, reason = %status, "unreserving workload");
        self.framework.run_reserve_plugins_unreserve(ctx, state, workload, host);
        stage_failed(stage, status)
    }
}

fn stage_failed(stage: &'static str, status: Status) -> ScheduleError {
    ScheduleError::StageFailed { stage, status }
}

/// Pick the node with the highest total score.
///
/// Ties are broken uniformly at random by reservoir sampling, so equal
/// nodes share the load over many cycles. `None` only for an empty list.
pub fn select_host<'a, R: Rng + ?Sized>(scores: &'a [NodePluginScores], rng: &mut R) -> Option<&'a NodePluginScores> {
    let (first, rest) = scores.split_first()?;
    let mut selected = first;
    let mut ties = 1u32;

    for candidate in rest {
        if candidate.total_score > selected.total_score {
            selected = candidate;
            ties = 1;
        } else if candidate.total_score == selected.total_score {
            ties += 1;
            if rng.random_ratio(1, ties) {
                selected = candidate;
            }
        }
    }
    Some(selected)
}
