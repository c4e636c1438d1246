//! Balance: favour nodes whose utilisation is close to the cluster average.

use std::sync::Arc;

use meridian_core::{CycleState, MAX_NODE_SCORE, NodeInfo, Status, Workload};
use meridian_framework::{Plugin, PreScorePlugin, ScorePlugin};
use meridian_parallel::CancellationToken;

use crate::helper::fraction_to_score;

pub const NAME: &str = "NodeResourcesBalanced";

/// Cycle state key holding the [`ClusterUtilization`].
pub const PRE_SCORE_STATE_KEY: &str = "PreScoreNodeResourcesBalanced";

/// Utilisation assumed for a node that reports no memory capacity.
const UNKNOWN_UTILIZATION: f64 = 0.5;

/// Average memory utilisation over the feasible nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterUtilization {
    pub average: f64,
}

#[derive(Debug, Default)]
pub struct NodeResourcesBalanced;

fn utilization(node: &NodeInfo) -> f64 {
    node.memory_utilization().unwrap_or(UNKNOWN_UTILIZATION)
}

impl Plugin for NodeResourcesBalanced {
    fn name(&self) -> &str {
        NAME
    }

    fn as_pre_score(self: Arc<Self>) -> Option<Arc<dyn PreScorePlugin>> {
        Some(self)
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
}

impl PreScorePlugin for NodeResourcesBalanced {
    /// Skips scoring when there is nothing to balance against.
    fn pre_score(&self, _ctx: &CancellationToken, state: &CycleState, _workload: &Workload, nodes: &[NodeInfo]) -> Status {
        if nodes.len() < 2 {
            return Status::skip();
        }
        let average = nodes.iter().map(utilization).sum::<f64>() / nodes.len() as f64;
        state.write(PRE_SCORE_STATE_KEY, ClusterUtilization { average });
        Status::success()
    }
}

impl ScorePlugin for NodeResourcesBalanced {
    fn score(&self, _ctx: &CancellationToken, state: &CycleState, _workload: &Workload, node: &NodeInfo) -> Result<i64, Status> {
        let cluster = state
            .read::<ClusterUtilization>(PRE_SCORE_STATE_KEY)
            .map_err(|e| Status::from_error(e).with_plugin(NAME))?;

        let distance = (utilization(node) - cluster.average).abs();
        Ok(fraction_to_score(1.0 - distance, MAX_NODE_SCORE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, used: u64) -> NodeInfo {
        let mut node = NodeInfo::new(name, 1000, 100);
        node.used_memory_bytes = used;
        node
    }

    #[test]
    fn single_node_skips() {
        let state = CycleState::new();
        let status = NodeResourcesBalanced.pre_score(&CancellationToken::new(), &state, &Workload::new("w"), &[node("a", 0)]);
        assert!(status.is_skip());
        assert!(!state.contains(PRE_SCORE_STATE_KEY));
    }

    #[test]
    fn pre_score_stores_average() {
        let state = CycleState::new();
        let nodes = [node("a", 200), node("b", 600)];

        let status = NodeResourcesBalanced.pre_score(&CancellationToken::new(), &state, &Workload::new("w"), &nodes);

        assert!(status.is_success());
        let cluster = state.read::<ClusterUtilization>(PRE_SCORE_STATE_KEY).unwrap();
        assert!((cluster.average - 0.4).abs() < 1e-9);
    }

    #[test]
    fn closeness_to_average_scores_higher() {
        let state = CycleState::new();
        let ctx = CancellationToken::new();
        let w = Workload::new("w");
        let nodes = [node("a", 100), node("b", 400), node("c", 700)];
        NodeResourcesBalanced.pre_score(&ctx, &state, &w, &nodes);

        let scores: Vec<i64> = nodes
            .iter()
            .map(|n| NodeResourcesBalanced.score(&ctx, &state, &w, n).unwrap())
            .collect();

        assert_eq!(scores, vec![70, 100, 70]);
    }

    #[test]
    fn score_without_pre_score_is_an_error() {
        let err = NodeResourcesBalanced
            .score(&CancellationToken::new(), &CycleState::new(), &Workload::new("w"), &node("a", 0))
            .unwrap_err();
        assert_eq!(err.plugin(), Some(NAME));
    }
}
