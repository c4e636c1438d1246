//! Keeps workloads off draining nodes.

use std::sync::Arc;

use meridian_core::{CycleState, NodeInfo, Status, Workload};
use meridian_framework::{FilterPlugin, Plugin};
use meridian_parallel::CancellationToken;

pub const NAME: &str = "NodeUnschedulable";

/// Reason reported for a draining node.
pub const ERR_REASON_DRAINING: &str = "node(s) were draining";

#[derive(Debug, Default)]
pub struct NodeUnschedulable;

impl Plugin for NodeUnschedulable {
    fn name(&self) -> &str {
        NAME
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }
}

impl FilterPlugin for NodeUnschedulable {
    fn filter(&self, _ctx: &CancellationToken, _state: &CycleState, _workload: &Workload, node: &NodeInfo) -> Status {
        if node.is_draining {
            return Status::unschedulable(ERR_REASON_DRAINING);
        }
        Status::success()
    }
}
