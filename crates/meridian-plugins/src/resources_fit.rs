//! Resource fit: reject nodes without room, score by allocation strategy.
//!
//! The request is computed once at pre-filter time and stored in the cycle
//! state; filter and score read it back for every node.

use std::sync::Arc;

use meridian_core::{CycleState, MAX_NODE_SCORE, NodeInfo, Status, Workload};
use meridian_framework::{FilterPlugin, FrameworkError, FrameworkResult, Plugin, PreFilterPlugin, PreFilterResult, ScorePlugin};
use meridian_parallel::CancellationToken;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::helper::fraction_to_score;

pub const NAME: &str = "NodeResourcesFit";

/// Cycle state key holding the [`ResourceRequest`].
pub const PRE_FILTER_STATE_KEY: &str = "PreFilterNodeResourcesFit";

pub const ERR_REASON_MEMORY: &str = "Insufficient memory";
pub const ERR_REASON_CPU: &str = "Insufficient cpu";

/// How the score ranks nodes that fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringStrategy {
    /// Prefer nodes that end up most full (bin-packing).
    #[default]
    MostAllocated,
    /// Prefer nodes that end up least full (spreading).
    LeastAllocated,
}

/// Plugin arguments, from `[plugin_args.NodeResourcesFit]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesFitArgs {
    pub strategy: ScoringStrategy,
}

/// Resources the workload asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRequest {
    pub memory_bytes: u64,
    pub cpu_weight: u32,
}

impl ResourceRequest {
    fn of(workload: &Workload) -> Self {
        Self {
            memory_bytes: workload.memory_bytes,
            cpu_weight: workload.cpu_weight,
        }
    }
}

#[derive(Debug, Default)]
pub struct NodeResourcesFit {
    strategy: ScoringStrategy,
}

impl NodeResourcesFit {
    pub fn new(strategy: ScoringStrategy) -> Self {
        Self { strategy }
    }

    /// Build from optional plugin arguments.
    pub fn from_args(args: Option<&toml::Value>) -> FrameworkResult<Self> {
        let args: ResourcesFitArgs = match args {
            Some(value) => value.clone().try_into().map_err(|e: toml::de::Error| FrameworkError::PluginInit {
                plugin: NAME.to_string(),
                message: e.to_string(),
            })?,
            None => ResourcesFitArgs::default(),
        };
        Ok(Self::new(args.strategy))
    }

    pub fn strategy(&self) -> ScoringStrategy {
        self.strategy
    }

    fn request(state: &CycleState) -> Result<Arc<ResourceRequest>, Status> {
        state
            .read::<ResourceRequest>(PRE_FILTER_STATE_KEY)
            .map_err(|e| Status::from_error(e).with_plugin(NAME))
    }
}

impl Plugin for NodeResourcesFit {
    fn name(&self) -> &str {
        NAME
    }

    fn as_pre_filter(self: Arc<Self>) -> Option<Arc<dyn PreFilterPlugin>> {
        Some(self)
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
}

impl PreFilterPlugin for NodeResourcesFit {
    fn pre_filter(
        &self,
        _ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        _nodes: &[NodeInfo],
    ) -> (Option<PreFilterResult>, Status) {
        let request = ResourceRequest::of(workload);
        debug!(workload = %workload.id, memory = request.memory_bytes, cpu = request.cpu_weight, "resource request");
        state.write(PRE_FILTER_STATE_KEY, request);
        (None, Status::success())
    }
}

impl FilterPlugin for NodeResourcesFit {
    fn filter(&self, _ctx: &CancellationToken, state: &CycleState, _workload: &Workload, node: &NodeInfo) -> Status {
        let request = match Self::request(state) {
            Ok(r) => r,
            Err(status) => return status,
        };

        let mut reasons = Vec::new();
        if request.memory_bytes > node.free_memory() {
            reasons.push(ERR_REASON_MEMORY);
        }
        if request.cpu_weight > node.free_cpu() {
            reasons.push(ERR_REASON_CPU);
        }

        if reasons.is_empty() {
            Status::success()
        } else {
            Status::new(meridian_core::Code::Unschedulable, reasons)
        }
    }
}

impl ScorePlugin for NodeResourcesFit {
    fn score(&self, _ctx: &CancellationToken, state: &CycleState, _workload: &Workload, node: &NodeInfo) -> Result<i64, Status> {
        let request = Self::request(state)?;

        let memory = allocated_fraction(node.used_memory_bytes, request.memory_bytes, node.capacity_memory_bytes);
        let cpu = allocated_fraction(
            u64::from(node.used_cpu_weight),
            u64::from(request.cpu_weight),
            u64::from(node.capacity_cpu_weight),
        );
        let allocated = (memory + cpu) / 2.0;

        let fraction = match self.strategy {
            ScoringStrategy::MostAllocated => allocated,
            ScoringStrategy::LeastAllocated => 1.0 - allocated,
        };
        Ok(fraction_to_score(fraction, MAX_NODE_SCORE))
    }
}

/// Fraction of `capacity` in use once `requested` is added. A resource the
/// node does not report counts as half full.
fn allocated_fraction(used: u64, requested: u64, capacity: u64) -> f64 {
    if capacity == 0 {
        return 0.5;
    }
    (used.saturating_add(requested) as f64 / capacity as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, cap_mem: u64, used_mem: u64, cap_cpu: u32, used_cpu: u32) -> NodeInfo {
        let mut node = NodeInfo::new(name, cap_mem, cap_cpu);
        node.used_memory_bytes = used_mem;
        node.used_cpu_weight = used_cpu;
        node
    }

    fn workload(mem: u64, cpu: u32) -> Workload {
        let mut w = Workload::new("w");
        w.memory_bytes = mem;
        w.cpu_weight = cpu;
        w
    }

    fn prepared(w: &Workload) -> CycleState {
        let state = CycleState::new();
        let (result, status) = NodeResourcesFit::default().pre_filter(&CancellationToken::new(), &state, w, &[]);
        assert!(result.is_none());
        assert!(status.is_success());
        state
    }

    #[test]
    fn pre_filter_stores_request() {
        let state = prepared(&workload(128, 10));
        let request = state.read::<ResourceRequest>(PRE_FILTER_STATE_KEY).unwrap();
        assert_eq!(*request, ResourceRequest { memory_bytes: 128, cpu_weight: 10 });
    }

    #[test]
    fn rejects_insufficient_memory() {
        let w = workload(128, 10);
        let state = prepared(&w);

        let status = NodeResourcesFit::default().filter(&CancellationToken::new(), &state, &w, &node("n1", 1024, 1000, 100, 0));

        assert!(status.is_rejected());
        assert_eq!(status.reasons(), [ERR_REASON_MEMORY]);
    }

    #[test]
    fn reports_every_missing_resource() {
        let w = workload(128, 50);
        let state = prepared(&w);

        let status = NodeResourcesFit::default().filter(&CancellationToken::new(), &state, &w, &node("n1", 100, 0, 10, 0));

        assert_eq!(status.reasons(), [ERR_REASON_MEMORY, ERR_REASON_CPU]);
    }

    #[test]
    fn filter_without_pre_filter_is_an_error() {
        let status = NodeResourcesFit::default().filter(
            &CancellationToken::new(),
            &CycleState::new(),
            &workload(1, 1),
            &node("n1", 1024, 0, 100, 0),
        );
        assert_eq!(status.code(), meridian_core::Code::Error);
    }

    #[test]
    fn most_allocated_prefers_fuller_node() {
        let w = workload(128, 10);
        let state = prepared(&w);
        let plugin = NodeResourcesFit::new(ScoringStrategy::MostAllocated);
        let ctx = CancellationToken::new();

        let full = plugin.score(&ctx, &state, &w, &node("n1", 1024, 800, 100, 50)).unwrap();
        let empty = plugin.score(&ctx, &state, &w, &node("n2", 1024, 100, 100, 0)).unwrap();

        assert!(full > empty, "{full} should beat {empty}");
    }

    #[test]
    fn least_allocated_prefers_emptier_node() {
        let w = workload(128, 10);
        let state = prepared(&w);
        let plugin = NodeResourcesFit::new(ScoringStrategy::LeastAllocated);
        let ctx = CancellationToken::new();

        let full = plugin.score(&ctx, &state, &w, &node("n1", 1024, 800, 100, 50)).unwrap();
        let empty = plugin.score(&ctx, &state, &w, &node("n2", 1024, 100, 100, 0)).unwrap();

        assert!(empty > full);
    }

    #[test]
    fn scores_stay_in_range() {
        let w = workload(4096, 500);
        let state = prepared(&w);
        let ctx = CancellationToken::new();
        for strategy in [ScoringStrategy::MostAllocated, ScoringStrategy::LeastAllocated] {
            let plugin = NodeResourcesFit::new(strategy);
            let score = plugin.score(&ctx, &state, &w, &node("n1", 1024, 1024, 100, 100)).unwrap();
            assert!((0..=MAX_NODE_SCORE).contains(&score));
        }
    }

    #[test]
    fn args_select_strategy() {
        let args: toml::Value = toml::from_str(r#"strategy = "LeastAllocated""#).unwrap();
        let plugin = NodeResourcesFit::from_args(Some(&args)).unwrap();
        assert_eq!(plugin.strategy(), ScoringStrategy::LeastAllocated);

        assert_eq!(NodeResourcesFit::from_args(None).unwrap().strategy(), ScoringStrategy::MostAllocated);
    }

    #[test]
    fn bad_args_are_rejected() {
        let args: toml::Value = toml::from_str(r#"strategy = "Random""#).unwrap();
        let err = NodeResourcesFit::from_args(Some(&args)).unwrap_err();
        assert!(matches!(err, FrameworkError::PluginInit { plugin, .. } if plugin == NAME));
    }
}
