//! Parallel scoring: raw scores, normalization, weighting.
//!
//! `run_score_plugins` is three fan-outs separated by barriers:
//!
//! ```text
//! 1. score      over nodes    raw[p][n] = plugin p scores node n
//!                             (plugins in profile order, per node)
//! 2. normalize  over plugins  plugin p rewrites raw[p][*] in place
//! 3. aggregate  over nodes    check range, weight, sum into result[n]
//! ```
//!
//! Every fan-out writes only to cells owned by its own index, so the
//! score matrix and the result slots need no locking. The first failure
//! from any worker cancels the cycle's token and is the error returned;
//! a non-nil error means the ranking must not be used.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use meridian_core::{
    Code, CycleState, DEFAULT_SCORE_WEIGHT, MAX_NODE_SCORE, MIN_NODE_SCORE, NodeInfo, NodePluginScores, NodeScore,
    PluginScore, Status, Workload,
};
use meridian_metrics::labels;
use meridian_parallel::{CancellationToken, ErrorChannel};
use tracing::{debug, warn};

use crate::error::{FrameworkError, FrameworkResult};
use crate::framework::Framework;
use crate::plugin::{ScoreExtensions, ScorePlugin};

/// Raw scores laid out plugin-major: row `p` holds plugin `p`'s score
/// for every node.
#[derive(Debug)]
pub(crate) struct ScoreMatrix {
    nodes: usize,
    cells: Vec<AtomicI64>,
}

impl ScoreMatrix {
    pub(crate) fn new(plugins: usize, nodes: usize) -> Self {
        Self {
            nodes,
            cells: (0..plugins * nodes).map(|_| AtomicI64::new(0)).collect(),
        }
    }

    pub(crate) fn set(&self, plugin: usize, node: usize, score: i64) {
        self.cells[plugin * self.nodes + node].store(score, Ordering::Relaxed);
    }

    pub(crate) fn get(&self, plugin: usize, node: usize) -> i64 {
        self.cells[plugin * self.nodes + node].load(Ordering::Relaxed)
    }

    /// Copy out one plugin's row, pairing each score with its node name.
    pub(crate) fn row(&self, plugin: usize, nodes: &[NodeInfo]) -> Vec<NodeScore> {
        nodes
            .iter()
            .enumerate()
            .map(|(i, node)| NodeScore {
                name: node.name.clone(),
                score: self.get(plugin, i),
            })
            .collect()
    }

    /// Write a (possibly normalized) row back.
    pub(crate) fn store_row(&self, plugin: usize, scores: &[NodeScore]) {
        for (i, s) in scores.iter().enumerate().take(self.nodes) {
            self.set(plugin, i, s.score);
        }
    }
}

impl Framework {
    /// Score every node with every score plugin and aggregate the
    /// weighted results.
    ///
    /// The returned list follows the order of `nodes`; each entry holds one
    /// [`PluginScore`] per non-skipped score plugin, in profile order. Any
    /// plugin failure, any score outside `[MIN_NODE_SCORE, MAX_NODE_SCORE]`
    /// after normalization, or cancellation of `ctx` yields an error.
    pub fn run_score_plugins(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        nodes: &[NodeInfo],
    ) -> FrameworkResult<Vec<NodePluginScores>> {
        let start = Instant::now();
        let result = self.score_nodes(ctx, state, workload, nodes);

        let code = match &result {
            Ok(_) => Code::Success,
            Err(_) => Code::Error,
        };
        self.observe(labels::SCORE, code, start);

        if let Err(e) = &result {
            warn!(workload = %workload.id, error = %e, "scoring failed");
        }
        result
    }

    fn score_nodes(
        &self,
        parent: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        nodes: &[NodeInfo],
    ) -> FrameworkResult<Vec<NodePluginScores>> {
        let plugins: Vec<&dyn ScorePlugin> = self
            .score_plugins
            .iter()
            .filter(|pl| !state.should_skip_score(pl.name()))
            .map(|pl| pl.as_ref())
            .collect();
        let weights: Vec<i64> = plugins
            .iter()
            .map(|pl| self.score_weight(pl.name()).unwrap_or(DEFAULT_SCORE_WEIGHT))
            .collect();

        // Cancelling this cycle's token must not cancel the caller's.
        let ctx = parent.child_token();
        let err_ch: ErrorChannel<FrameworkError> = ErrorChannel::new();
        let matrix = ScoreMatrix::new(plugins.len(), nodes.len());

        // Phase 1: raw scores, node-major.
        if !plugins.is_empty() {
            self.parallelizer.until(
                &ctx,
                nodes.len(),
                |index| {
                    let node = &nodes[index];
                    for (p, pl) in plugins.iter().enumerate() {
                        match self.run_score_plugin(&ctx, *pl, state, workload, node) {
                            Ok(score) => matrix.set(p, index, score),
                            Err(status) => {
                                err_ch.send_error_with_cancel(FrameworkError::plugin_failed(pl.name(), status), &ctx);
                                return;
                            }
                        }
                    }
                },
                labels::SCORE,
            );
            finish_phase(&err_ch, &ctx)?;
        }

        // Phase 2: normalization, plugin-major.
        self.parallelizer.until(
            &ctx,
            plugins.len(),
            |p| {
                let pl = plugins[p];
                let Some(ext) = pl.score_extensions() else {
                    return;
                };
                let mut scores = matrix.row(p, nodes);
                if let Err(status) = self.run_score_extension(&ctx, pl.name(), ext, state, workload, &mut scores) {
                    err_ch.send_error_with_cancel(FrameworkError::plugin_failed(pl.name(), status), &ctx);
                    return;
                }
                matrix.store_row(p, &scores);
            },
            labels::SCORE,
        );
        finish_phase(&err_ch, &ctx)?;

        // Phase 3: range check, weighting and aggregation, node-major.
        let slots: Vec<OnceLock<NodePluginScores>> = (0..nodes.len()).map(|_| OnceLock::new()).collect();
        self.parallelizer.until(
            &ctx,
            nodes.len(),
            |index| {
                let mut node_scores = NodePluginScores {
                    name: nodes[index].name.clone(),
                    scores: Vec::with_capacity(plugins.len()),
                    total_score: 0,
                };

                for (p, pl) in plugins.iter().enumerate() {
                    let score = matrix.get(p, index);
                    if !(MIN_NODE_SCORE..=MAX_NODE_SCORE).contains(&score) {
                        let err = FrameworkError::InvalidScore {
                            plugin: pl.name().to_string(),
                            score,
                            min: MIN_NODE_SCORE,
                            max: MAX_NODE_SCORE,
                        };
                        err_ch.send_error_with_cancel(err, &ctx);
                        return;
                    }
                    let weighted = score * weights[p];
                    node_scores.scores.push(PluginScore {
                        name: pl.name().to_string(),
                        score: weighted,
                    });
                    node_scores.total_score += weighted;
                }

                let written = slots[index].set(node_scores);
                debug_assert!(written.is_ok(), "node slot {index} written twice");
            },
            labels::SCORE,
        );
        finish_phase(&err_ch, &ctx)?;

        let result = slots
            .into_iter()
            .map(OnceLock::into_inner)
            .collect::<Option<Vec<_>>>()
            .ok_or(FrameworkError::Cancelled)?;

        debug!(
            workload = %workload.id,
            nodes = result.len(),
            plugins = plugins.len(),
            "scoring complete"
        );
        Ok(result)
    }

    fn run_score_plugin(
        &self,
        ctx: &CancellationToken,
        pl: &dyn ScorePlugin,
        state: &CycleState,
        workload: &Workload,
        node: &NodeInfo,
    ) -> Result<i64, Status> {
        if !state.record_plugin_metrics() {
            return pl.score(ctx, state, workload, node);
        }
        let start = Instant::now();
        let result = pl.score(ctx, state, workload, node);
        let code = result.as_ref().map_or_else(Status::code, |_| Code::Success);
        self.observe_plugin(state, labels::SCORE, pl.name(), code, start);
        result
    }

    fn run_score_extension(
        &self,
        ctx: &CancellationToken,
        plugin: &str,
        ext: &dyn ScoreExtensions,
        state: &CycleState,
        workload: &Workload,
        scores: &mut [NodeScore],
    ) -> Result<(), Status> {
        if !state.record_plugin_metrics() {
            return ext.normalize_score(ctx, state, workload, scores);
        }
        let start = Instant::now();
        let result = ext.normalize_score(ctx, state, workload, scores);
        let code = result.as_ref().map_or_else(Status::code, |_| Code::Success);
        self.observe_plugin(state, labels::NORMALIZE_SCORE, plugin, code, start);
        result
    }
}

/// Close a phase: surface the first reported error, or treat an
/// externally cancelled token as cancellation of the whole call.
fn finish_phase(err_ch: &ErrorChannel<FrameworkError>, ctx: &CancellationToken) -> FrameworkResult<()> {
    if let Some(err) = err_ch.receive_error() {
        return Err(err);
    }
    if ctx.is_cancelled() {
        return Err(FrameworkError::Cancelled);
    }
    Ok(())
}
