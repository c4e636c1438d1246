//! Spread: prefer nodes running fewer workload instances.
//!
//! The raw score is the instance count, which is unbounded; normalization
//! reverses and rescales it so the emptiest node scores highest.

use std::sync::Arc;

use meridian_core::{CycleState, MAX_NODE_SCORE, NodeInfo, NodeScore, Status, Workload};
use meridian_framework::{Plugin, ScoreExtensions, ScorePlugin};
use meridian_parallel::CancellationToken;

use crate::helper::default_normalize_score;

pub const NAME: &str = "InstanceSpread";

#[derive(Debug, Default)]
pub struct InstanceSpread;

impl Plugin for InstanceSpread {
    fn name(&self) -> &str {
        NAME
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
}

impl ScorePlugin for InstanceSpread {
    fn score(&self, _ctx: &CancellationToken, _state: &CycleState, _workload: &Workload, node: &NodeInfo) -> Result<i64, Status> {
        Ok(i64::from(node.active_instances))
    }

    fn score_extensions(&self) -> Option<&dyn ScoreExtensions> {
        Some(self)
    }
}

impl ScoreExtensions for InstanceSpread {
    fn normalize_score(
        &self,
        _ctx: &CancellationToken,
        _state: &CycleState,
        _workload: &Workload,
        scores: &mut [NodeScore],
    ) -> Result<(), Status> {
        default_normalize_score(MAX_NODE_SCORE, true, scores);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_score_is_instance_count() {
        let mut node = NodeInfo::new("n1", 1024, 100);
        node.active_instances = 250;

        let score = InstanceSpread
            .score(&CancellationToken::new(), &CycleState::new(), &Workload::new("w"), &node)
            .unwrap();

        assert_eq!(score, 250);
    }

    #[test]
    fn normalize_favours_fewest_instances() {
        let mut scores = vec![
            NodeScore { name: "busy".into(), score: 200 },
            NodeScore { name: "idle".into(), score: 0 },
            NodeScore { name: "half".into(), score: 100 },
        ];

        InstanceSpread
            .score_extensions()
            .unwrap()
            .normalize_score(&CancellationToken::new(), &CycleState::new(), &Workload::new("w"), &mut scores)
            .unwrap();

        let values: Vec<i64> = scores.iter().map(|s| s.score).collect();
        assert_eq!(values, vec![0, 100, 50]);
    }
}
