//! Parallel filtering over candidate nodes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

use meridian_core::{Code, CycleState, NodeInfo, Status, Workload};
use meridian_metrics::labels;
use meridian_parallel::{CancellationToken, ErrorChannel};
use tracing::debug;

use crate::diagnosis::Diagnosis;
use crate::error::{FrameworkError, FrameworkResult};
use crate::framework::Framework;

/// Below this many nodes every node is evaluated.
pub const MIN_FEASIBLE_NODES_TO_FIND: usize = 100;

/// Floor for the adaptive percentage on very large clusters.
pub const MIN_FEASIBLE_NODES_PERCENTAGE_TO_FIND: usize = 5;

/// How many feasible nodes a cycle looks for before it stops filtering.
///
/// `percentage == 0` selects the adaptive percentage: 50% on small
/// clusters, shrinking by one point per 125 nodes down to 5%.
pub fn num_feasible_nodes_to_find(percentage: u32, num_all_nodes: usize) -> usize {
    if num_all_nodes < MIN_FEASIBLE_NODES_TO_FIND || percentage >= 100 {
        return num_all_nodes;
    }

    let adaptive = if percentage == 0 {
        50usize
            .saturating_sub(num_all_nodes / 125)
            .max(MIN_FEASIBLE_NODES_PERCENTAGE_TO_FIND)
    } else {
        percentage as usize
    };

    (num_all_nodes * adaptive / 100).max(MIN_FEASIBLE_NODES_TO_FIND)
}

/// Nodes that passed filtering, plus why the rest did not.
#[derive(Debug, Clone, Default)]
pub struct FeasibleNodes {
    pub nodes: Vec<NodeInfo>,
    pub diagnosis: Diagnosis,
    /// Candidates actually evaluated, feasible or not.
    pub processed: usize,
}

impl Framework {
    /// Run the filter plugins against `candidates` in parallel.
    ///
    /// Evaluation starts at `start_index` and wraps around, so successive
    /// cycles spread their attention over the cluster. Filtering stops once
    /// enough feasible nodes are found. A rejecting status lands in the
    /// diagnosis; an `Error` status aborts the whole call. A cancelled
    /// `ctx` yields [`FrameworkError::Cancelled`].
    pub fn find_nodes_that_pass_filters(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        candidates: &[NodeInfo],
        start_index: usize,
    ) -> FrameworkResult<FeasibleNodes> {
        if ctx.is_cancelled() {
            return Err(FrameworkError::Cancelled);
        }
        let total = candidates.len();
        let to_find = num_feasible_nodes_to_find(self.percentage_of_nodes_to_score(), total);
        if total == 0 {
            return Ok(FeasibleNodes::default());
        }
        let start_index = start_index % total;

        if !self.has_filter_plugins() {
            let nodes = (0..to_find)
                .map(|i| candidates[(start_index + i) % total].clone())
                .collect();
            return Ok(FeasibleNodes {
                nodes,
                diagnosis: Diagnosis::default(),
                processed: to_find,
            });
        }

        let start = Instant::now();
        let parent = ctx;
        let ctx = parent.child_token();
        let err_ch: ErrorChannel<FrameworkError> = ErrorChannel::new();
        let feasible_len = AtomicUsize::new(0);
        let feasible: Vec<OnceLock<usize>> = (0..to_find).map(|_| OnceLock::new()).collect();
        let rejected: Mutex<Vec<(usize, Status)>> = Mutex::new(Vec::new());

        self.parallelizer.until(
            &ctx,
            total,
            |i| {
                let index = (start_index + i) % total;
                let node = &candidates[index];
                let status = self.run_filter_plugins(&ctx, state, workload, node);

                match status.code() {
                    Code::Success => {
                        let length = feasible_len.fetch_add(1, Ordering::SeqCst) + 1;
                        if length > to_find {
                            ctx.cancel();
                            feasible_len.fetch_sub(1, Ordering::SeqCst);
                        } else {
                            let _ = feasible[length - 1].set(index);
                        }
                    }
                    Code::Error => {
                        let err = FrameworkError::FilterFailed {
                            node: node.name.clone(),
                            status,
                        };
                        err_ch.send_error_with_cancel(err, &ctx);
                    }
                    _ => {
                        rejected
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((index, status));
                    }
                }
            },
            labels::FILTER,
        );

        if let Some(err) = err_ch.receive_error() {
            self.observe(labels::FILTER, Code::Error, start);
            return Err(err);
        }
        // The child token is also cancelled on early stop; only the caller's counts.
        if parent.is_cancelled() {
            self.observe(labels::FILTER, Code::Error, start);
            return Err(FrameworkError::Cancelled);
        }

        let mut diagnosis = Diagnosis::default();
        let rejected = rejected.into_inner().unwrap_or_else(PoisonError::into_inner);
        for (index, status) in rejected {
            diagnosis.add(candidates[index].name.clone(), status);
        }

        let nodes: Vec<NodeInfo> = feasible
            .into_iter()
            .filter_map(OnceLock::into_inner)
            .map(|index| candidates[index].clone())
            .collect();
        let processed = nodes.len() + diagnosis.len();

        let code = if nodes.is_empty() { Code::Unschedulable } else { Code::Success };
        self.observe(labels::FILTER, code, start);

        debug!(
            workload = %workload.id,
            candidates = total,
            feasible = nodes.len(),
            rejected = diagnosis.len(),
            "filtering complete"
        );

        Ok(FeasibleNodes {
            nodes,
            diagnosis,
            processed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meridian_core::ProfileConfig;
    use meridian_metrics::NoopRecorder;

    use crate::plugin::{FilterPlugin, Plugin};
    use crate::registry::Registry;

    /// Rejects nodes whose name is listed; errors on `boom`.
    struct DenyList(Vec<&'static str>);

    impl Plugin for DenyList {
        fn name(&self) -> &str {
            "DenyList"
        }

        fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
            Some(self)
        }
    }

    impl FilterPlugin for DenyList {
        fn filter(&self, _: &CancellationToken, _: &CycleState, _: &Workload, node: &NodeInfo) -> Status {
            if node.name == "boom" {
                return Status::error("exploded");
            }
            if self.0.contains(&node.name.as_str()) {
                return Status::unschedulable("node is denied");
            }
            Status::success()
        }
    }

    fn framework(deny: Option<Vec<&'static str>>, percentage: u32) -> Framework {
        let mut registry = Registry::new();
        let mut profile = ProfileConfig::empty("test");
        profile.profile.parallelism = 4;
        profile.profile.percentage_of_nodes_to_score = percentage;
        if let Some(deny) = deny {
            let plugin = Arc::new(DenyList(deny));
            registry
                .register("DenyList", move |_| Ok(plugin.clone() as Arc<dyn Plugin>))
                .unwrap();
            profile.plugins.filter.push("DenyList".to_string());
        }
        Framework::new(&registry, &profile, Arc::new(NoopRecorder)).unwrap()
    }

    fn nodes(count: usize) -> Vec<NodeInfo> {
        (0..count).map(|i| NodeInfo::new(format!("n{i}"), 1024, 100)).collect()
    }

    fn run(fw: &Framework, candidates: &[NodeInfo], start: usize) -> FrameworkResult<FeasibleNodes> {
        fw.find_nodes_that_pass_filters(&CancellationToken::new(), &CycleState::new(), &Workload::new("w"), candidates, start)
    }

    #[test]
    fn small_clusters_evaluate_every_node() {
        assert_eq!(num_feasible_nodes_to_find(0, 0), 0);
        assert_eq!(num_feasible_nodes_to_find(0, 99), 99);
        assert_eq!(num_feasible_nodes_to_find(10, 50), 50);
    }

    #[test]
    fn adaptive_percentage_shrinks_with_cluster_size() {
        // 50 - 1000/125 = 42%.
        assert_eq!(num_feasible_nodes_to_find(0, 1000), 420);
        // Floor of 5% on very large clusters.
        assert_eq!(num_feasible_nodes_to_find(0, 10_000), 500);
        // Never fewer than 100.
        assert_eq!(num_feasible_nodes_to_find(0, 150), 100);
    }

    #[test]
    fn explicit_percentage() {
        assert_eq!(num_feasible_nodes_to_find(50, 1000), 500);
        assert_eq!(num_feasible_nodes_to_find(100, 1000), 1000);
        assert_eq!(num_feasible_nodes_to_find(1, 1000), 100);
    }

    #[test]
    fn rejected_nodes_land_in_diagnosis() {
        let fw = framework(Some(vec!["n1", "n3"]), 0);

        let result = run(&fw, &nodes(5), 0).unwrap();

        let mut names: Vec<&str> = result.nodes.iter().map(|n| n.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["n0", "n2", "n4"]);
        assert_eq!(result.diagnosis.len(), 2);
        assert!(result.diagnosis.unschedulable_plugins.contains("DenyList"));
        assert_eq!(result.processed, 5);
    }

    #[test]
    fn filter_error_is_fatal() {
        let fw = framework(Some(vec![]), 0);
        let mut candidates = nodes(3);
        candidates.push(NodeInfo::new("boom", 1024, 100));

        let err = run(&fw, &candidates, 0).unwrap_err();

        assert!(matches!(&err, FrameworkError::FilterFailed { node, .. } if node == "boom"));
        assert!(err.to_string().contains("exploded"));
    }

    #[test]
    fn stops_after_enough_feasible_nodes() {
        let fw = framework(Some(vec![]), 0);

        let result = run(&fw, &nodes(1000), 0).unwrap();

        assert_eq!(result.nodes.len(), 420);
        assert!(result.processed >= 420);
    }

    #[test]
    fn without_filters_takes_nodes_from_start_index() {
        let fw = framework(None, 0);

        let result = run(&fw, &nodes(4), 2).unwrap();

        let names: Vec<&str> = result.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["n2", "n3", "n0", "n1"]);
        assert_eq!(result.processed, 4);
    }

    #[test]
    fn empty_candidates() {
        let fw = framework(Some(vec![]), 0);
        let result = run(&fw, &[], 7).unwrap();
        assert!(result.nodes.is_empty());
        assert_eq!(result.processed, 0);
    }

    #[test]
    fn cancelled_caller_is_not_an_empty_result() {
        let ctx = CancellationToken::new();
        ctx.cancel();

        for fw in [framework(Some(vec![]), 0), framework(None, 0)] {
            let err = fw
                .find_nodes_that_pass_filters(&ctx, &CycleState::new(), &Workload::new("w"), &nodes(10), 0)
                .unwrap_err();
            assert!(matches!(err, FrameworkError::Cancelled));
        }
    }

    #[test]
    fn early_stop_leaves_caller_token_alone() {
        let fw = framework(Some(vec![]), 0);
        let ctx = CancellationToken::new();

        let result = fw
            .find_nodes_that_pass_filters(&ctx, &CycleState::new(), &Workload::new("w"), &nodes(1000), 0)
            .unwrap();

        assert_eq!(result.nodes.len(), 420);
        assert!(!ctx.is_cancelled());
    }
}
