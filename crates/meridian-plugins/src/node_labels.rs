//! Label affinity: required labels filter, preferred labels score.

use std::sync::Arc;

use meridian_core::{CycleState, MAX_NODE_SCORE, NodeInfo, Status, Workload};
use meridian_framework::{FilterPlugin, Plugin, ScorePlugin};
use meridian_parallel::CancellationToken;

use crate::helper::fraction_to_score;

pub const NAME: &str = "NodeLabels";

pub const ERR_REASON_LABELS: &str = "node(s) didn't match the required labels";

#[derive(Debug, Default)]
pub struct NodeLabels;

impl Plugin for NodeLabels {
    fn name(&self) -> &str {
        NAME
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
}

impl FilterPlugin for NodeLabels {
    fn filter(&self, _ctx: &CancellationToken, _state: &CycleState, workload: &Workload, node: &NodeInfo) -> Status {
        let matches = workload
            .required_labels
            .iter()
            .all(|(key, value)| node.labels.get(key) == Some(value));
        if matches {
            Status::success()
        } else {
            Status::unschedulable(ERR_REASON_LABELS)
        }
    }
}

impl ScorePlugin for NodeLabels {
    /// Share of preferred labels the node carries. Neutral (half the
    /// range) when the workload has no preferences.
    fn score(&self, _ctx: &CancellationToken, _state: &CycleState, workload: &Workload, node: &NodeInfo) -> Result<i64, Status> {
        let preferred = workload.preferred_labels.len();
        if preferred == 0 {
            return Ok(MAX_NODE_SCORE / 2);
        }
        let matched = workload
            .preferred_labels
            .iter()
            .filter(|(key, value)| node.labels.get(*key).is_some_and(|v| v == *value))
            .count();
        Ok(fraction_to_score(matched as f64 / preferred as f64, MAX_NODE_SCORE))
    }
}
