//! The framework: one profile's plugins, resolved per extension point.
//!
//! A [`Framework`] is built once from a [`Registry`] and a
//! [`ProfileConfig`] and is immutable afterwards. It exposes one
//! `run_*` method per extension point; the serial ones live here, the
//! parallel ones (filter fan-out, scoring) in `filtering.rs` and
//! `scoring.rs`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use meridian_core::{Code, CycleState, NodeInfo, ProfileConfig, Status, Workload};
use meridian_metrics::{MetricsRecorder, labels};
use meridian_parallel::{CancellationToken, Parallelizer};
use tracing::{debug, info};

use crate::diagnosis::Diagnosis;
use crate::error::{FrameworkError, FrameworkResult};
use crate::plugin::*;
use crate::registry::Registry;

/// Runs the plugins of one scheduling profile.
pub struct Framework {
    profile_name: String,
    percentage_of_nodes_to_score: u32,
    /// Every instantiated plugin, by name.
    plugins: HashMap<String, Arc<dyn Plugin>>,
    pub(crate) score_plugin_weight: HashMap<String, i64>,

    pre_enqueue_plugins: Vec<Arc<dyn PreEnqueuePlugin>>,
    pre_filter_plugins: Vec<Arc<dyn PreFilterPlugin>>,
    pub(crate) filter_plugins: Vec<Arc<dyn FilterPlugin>>,
    post_filter_plugins: Vec<Arc<dyn PostFilterPlugin>>,
    pre_score_plugins: Vec<Arc<dyn PreScorePlugin>>,
    pub(crate) score_plugins: Vec<Arc<dyn ScorePlugin>>,
    reserve_plugins: Vec<Arc<dyn ReservePlugin>>,
    permit_plugins: Vec<Arc<dyn PermitPlugin>>,
    pre_bind_plugins: Vec<Arc<dyn PreBindPlugin>>,
    bind_plugins: Vec<Arc<dyn BindPlugin>>,
    post_bind_plugins: Vec<Arc<dyn PostBindPlugin>>,

    pub(crate) parallelizer: Parallelizer,
    pub(crate) recorder: Arc<dyn MetricsRecorder>,
}

impl Framework {
    /// Validate `profile`, build every plugin it names, and resolve each
    /// extension point list by capability.
    pub fn new(registry: &Registry, profile: &ProfileConfig, recorder: Arc<dyn MetricsRecorder>) -> FrameworkResult<Self> {
        profile.validate()?;

        let mut plugins: HashMap<String, Arc<dyn Plugin>> = HashMap::new();
        for name in profile.plugins.all_names() {
            let plugin = registry.build(&name, profile.plugin_args.get(&name))?;
            plugins.insert(name, plugin);
        }

        let set = &profile.plugins;
        let framework = Self {
            profile_name: profile.profile.name.clone(),
            percentage_of_nodes_to_score: profile.profile.percentage_of_nodes_to_score,
            score_plugin_weight: profile.score_weights(),
            pre_enqueue_plugins: resolve(labels::PRE_ENQUEUE, names(&set.pre_enqueue), &plugins, |p| p.as_pre_enqueue())?,
            pre_filter_plugins: resolve(labels::PRE_FILTER, names(&set.pre_filter), &plugins, |p| p.as_pre_filter())?,
            filter_plugins: resolve(labels::FILTER, names(&set.filter), &plugins, |p| p.as_filter())?,
            post_filter_plugins: resolve(labels::POST_FILTER, names(&set.post_filter), &plugins, |p| p.as_post_filter())?,
            pre_score_plugins: resolve(labels::PRE_SCORE, names(&set.pre_score), &plugins, |p| p.as_pre_score())?,
            score_plugins: resolve(
                labels::SCORE,
                set.score.iter().map(|s| s.name.as_str()),
                &plugins,
                |p| p.as_score(),
            )?,
            reserve_plugins: resolve(labels::RESERVE, names(&set.reserve), &plugins, |p| p.as_reserve())?,
            permit_plugins: resolve(labels::PERMIT, names(&set.permit), &plugins, |p| p.as_permit())?,
            pre_bind_plugins: resolve(labels::PRE_BIND, names(&set.pre_bind), &plugins, |p| p.as_pre_bind())?,
            bind_plugins: resolve(labels::BIND, names(&set.bind), &plugins, |p| p.as_bind())?,
            post_bind_plugins: resolve(labels::POST_BIND, names(&set.post_bind), &plugins, |p| p.as_post_bind())?,
            parallelizer: Parallelizer::with_recorder(profile.profile.parallelism, recorder.clone())?,
            recorder,
            plugins,
        };

        info!(
            profile = %framework.profile_name,
            plugins = framework.plugins.len(),
            parallelism = framework.parallelizer.parallelism(),
            "framework built"
        );
        Ok(framework)
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn percentage_of_nodes_to_score(&self) -> u32 {
        self.percentage_of_nodes_to_score
    }

    pub fn parallelizer(&self) -> &Parallelizer {
        &self.parallelizer
    }

    pub fn has_filter_plugins(&self) -> bool {
        !self.filter_plugins.is_empty()
    }

    pub fn has_post_filter_plugins(&self) -> bool {
        !self.post_filter_plugins.is_empty()
    }

    pub fn has_score_plugins(&self) -> bool {
        !self.score_plugins.is_empty()
    }

    /// Weight of a score plugin, `None` if it is not a configured score plugin.
    pub fn score_weight(&self, plugin: &str) -> Option<i64> {
        self.score_plugin_weight.get(plugin).copied()
    }

    /// Plugin names per extension point, in execution order.
    pub fn list_plugins(&self) -> Vec<(&'static str, Vec<&str>)> {
        fn names_of<T: Plugin + ?Sized>(list: &[Arc<T>]) -> Vec<&str> {
            list.iter().map(|p| p.name()).collect()
        }
        vec![
            (labels::PRE_ENQUEUE, names_of(&self.pre_enqueue_plugins)),
            (labels::PRE_FILTER, names_of(&self.pre_filter_plugins)),
            (labels::FILTER, names_of(&self.filter_plugins)),
            (labels::POST_FILTER, names_of(&self.post_filter_plugins)),
            (labels::PRE_SCORE, names_of(&self.pre_score_plugins)),
            (labels::SCORE, names_of(&self.score_plugins)),
            (labels::RESERVE, names_of(&self.reserve_plugins)),
            (labels::PERMIT, names_of(&self.permit_plugins)),
            (labels::PRE_BIND, names_of(&self.pre_bind_plugins)),
            (labels::BIND, names_of(&self.bind_plugins)),
            (labels::POST_BIND, names_of(&self.post_bind_plugins)),
        ]
    }

    // ── Metrics helpers ────────────────────────────────────────────

    pub(crate) fn observe(&self, extension_point: &str, code: Code, start: Instant) {
        self.recorder
            .observe_extension_point(extension_point, code, start.elapsed());
    }

    pub(crate) fn observe_plugin(&self, state: &CycleState, extension_point: &str, plugin: &str, code: Code, start: Instant) {
        if state.record_plugin_metrics() {
            self.recorder
                .observe_plugin(extension_point, plugin, code, start.elapsed());
        }
    }

    // ── PreEnqueue ─────────────────────────────────────────────────

    /// Gate the workload before it enters a cycle. Stops at the first
    /// non-success status.
    pub fn run_pre_enqueue_plugins(&self, workload: &Workload) -> Status {
        let start = Instant::now();
        let mut status = Status::success();
        for pl in &self.pre_enqueue_plugins {
            let s = pl.pre_enqueue(workload);
            if !s.is_success() {
                status = if s.is_rejected() {
                    s.with_plugin(pl.name())
                } else {
                    error_status(pl.name(), s)
                };
                break;
            }
        }
        self.observe(labels::PRE_ENQUEUE, status.code(), start);
        status
    }

    // ── PreFilter ──────────────────────────────────────────────────

    /// Run pre-filter plugins in order, merging their candidate-node
    /// restrictions. A `Skip` disables the same plugin's filter.
    pub fn run_pre_filter_plugins(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        nodes: &[NodeInfo],
    ) -> (Option<PreFilterResult>, Status) {
        let start = Instant::now();
        let (result, status) = self.pre_filter(ctx, state, workload, nodes);
        self.observe(labels::PRE_FILTER, status.code(), start);
        (result, status)
    }

    fn pre_filter(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        nodes: &[NodeInfo],
    ) -> (Option<PreFilterResult>, Status) {
        let mut result: Option<PreFilterResult> = None;
        let mut restricting = Vec::new();

        for pl in &self.pre_filter_plugins {
            let t = Instant::now();
            let (r, s) = pl.pre_filter(ctx, state, workload, nodes);
            self.observe_plugin(state, labels::PRE_FILTER, pl.name(), s.code(), t);

            if s.is_skip() {
                state.skip_filter_plugin(pl.name());
                continue;
            }
            if !s.is_success() {
                if s.is_rejected() {
                    return (None, s.with_plugin(pl.name()));
                }
                return (None, error_status(pl.name(), s));
            }

            let Some(r) = r.filter(|r| !r.all_nodes()) else {
                continue;
            };
            restricting.push(pl.name().to_string());
            let merged = match &result {
                Some(prev) => prev.merge(&r),
                None => r,
            };
            if merged.is_empty() {
                let msg = format!(
                    "node(s) didn't satisfy plugin(s) [{}] simultaneously",
                    restricting.join(", ")
                );
                return (Some(merged), Status::unschedulable(msg).with_plugin(pl.name()));
            }
            result = Some(merged);
        }

        (result, Status::success())
    }

    // ── Filter ─────────────────────────────────────────────────────

    /// Run every filter plugin against one node, stopping at the first
    /// that does not succeed. Plugins skipped by pre-filter are not run.
    pub fn run_filter_plugins(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node: &NodeInfo) -> Status {
        for pl in &self.filter_plugins {
            if state.should_skip_filter(pl.name()) {
                continue;
            }
            let t = Instant::now();
            let s = pl.filter(ctx, state, workload, node);
            self.observe_plugin(state, labels::FILTER, pl.name(), s.code(), t);

            if !s.is_success() {
                if s.is_rejected() {
                    return s.with_plugin(pl.name());
                }
                return error_status(pl.name(), s);
            }
        }
        Status::success()
    }

    // ── PostFilter ─────────────────────────────────────────────────

    /// Give post-filter plugins a chance to make the workload schedulable.
    /// The first success wins; an `Error` stops immediately.
    pub fn run_post_filter_plugins(
        &self,
        ctx: &CancellationToken,
        state: &CycleState,
        workload: &Workload,
        diagnosis: &Diagnosis,
    ) -> (Option<PostFilterResult>, Status) {
        let start = Instant::now();
        let mut reasons: Vec<String> = Vec::new();
        let mut rejector: Option<String> = None;
        let mut outcome = None;

        for pl in &self.post_filter_plugins {
            let t = Instant::now();
            let (r, s) = pl.post_filter(ctx, state, workload, diagnosis);
            self.observe_plugin(state, labels::POST_FILTER, pl.name(), s.code(), t);

            if s.is_success() {
                outcome = Some((r, s));
                break;
            } else if s.is_rejected() {
                reasons.extend(s.reasons().iter().cloned());
                rejector.get_or_insert_with(|| pl.name().to_string());
            } else if !s.is_skip() {
                outcome = Some((None, error_status(pl.name(), s)));
                break;
            }
        }

        let (result, status) = outcome.unwrap_or_else(|| {
            let status = Status::new(Code::Unschedulable, reasons);
            let status = match rejector {
                Some(name) => status.with_plugin(name),
                None => status,
            };
            (None, status)
        });
        self.observe(labels::POST_FILTER, status.code(), start);
        (result, status)
    }

    // ── PreScore ───────────────────────────────────────────────────

    /// Run pre-score plugins. A `Skip` disables the same plugin's score.
    pub fn run_pre_score_plugins(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, nodes: &[NodeInfo]) -> Status {
        let start = Instant::now();
        let mut status = Status::success();
        for pl in &self.pre_score_plugins {
            let t = Instant::now();
            let s = pl.pre_score(ctx, state, workload, nodes);
            self.observe_plugin(state, labels::PRE_SCORE, pl.name(), s.code(), t);

            if s.is_skip() {
                state.skip_score_plugin(pl.name());
                continue;
            }
            if !s.is_success() {
                status = error_status(pl.name(), s);
                break;
            }
        }
        self.observe(labels::PRE_SCORE, status.code(), start);
        status
    }

    // ── Reserve ────────────────────────────────────────────────────

    /// Reserve the node for the workload. On failure the caller must run
    /// [`Framework::run_reserve_plugins_unreserve`].
    pub fn run_reserve_plugins_reserve(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str) -> Status {
        let start = Instant::now();
        let mut status = Status::success();
        for pl in &self.reserve_plugins {
            let t = Instant::now();
            let s = pl.reserve(ctx, state, workload, node_name);
            self.observe_plugin(state, labels::RESERVE, pl.name(), s.code(), t);

            if !s.is_success() {
                status = if s.is_rejected() {
                    s.with_plugin(pl.name())
                } else {
                    error_status(pl.name(), s)
                };
                break;
            }
        }
        self.observe(labels::RESERVE, status.code(), start);
        status
    }

    /// Undo reservations, in reverse plugin order.
    pub fn run_reserve_plugins_unreserve(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str) {
        let start = Instant::now();
        for pl in self.reserve_plugins.iter().rev() {
            let t = Instant::now();
            pl.unreserve(ctx, state, workload, node_name);
            self.observe_plugin(state, labels::UNRESERVE, pl.name(), Code::Success, t);
        }
        self.observe(labels::UNRESERVE, Code::Success, start);
    }

    // ── Permit ─────────────────────────────────────────────────────

    pub fn run_permit_plugins(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str) -> Status {
        let start = Instant::now();
        let mut status = Status::success();
        for pl in &self.permit_plugins {
            let t = Instant::now();
            let s = pl.permit(ctx, state, workload, node_name);
            self.observe_plugin(state, labels::PERMIT, pl.name(), s.code(), t);

            if !s.is_success() {
                status = if s.is_rejected() {
                    debug!(plugin = pl.name(), workload = %workload.id, "permit rejected workload");
                    s.with_plugin(pl.name())
                } else {
                    error_status(pl.name(), s)
                };
                break;
            }
        }
        self.observe(labels::PERMIT, status.code(), start);
        status
    }

    // ── Binding ────────────────────────────────────────────────────

    pub fn run_pre_bind_plugins(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str) -> Status {
        let start = Instant::now();
        let mut status = Status::success();
        for pl in &self.pre_bind_plugins {
            let t = Instant::now();
            let s = pl.pre_bind(ctx, state, workload, node_name);
            self.observe_plugin(state, labels::PRE_BIND, pl.name(), s.code(), t);

            if !s.is_success() {
                status = if s.is_rejected() {
                    s.with_plugin(pl.name())
                } else {
                    error_status(pl.name(), s)
                };
                break;
            }
        }
        self.observe(labels::PRE_BIND, status.code(), start);
        status
    }

    /// Hand the workload to the first binder that does not skip it.
    /// Returns `Skip` when there are no binders or every binder skipped.
    pub fn run_bind_plugins(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str) -> Status {
        let start = Instant::now();
        let mut status = Status::skip();
        for pl in &self.bind_plugins {
            let t = Instant::now();
            let s = pl.bind(ctx, state, workload, node_name);
            self.observe_plugin(state, labels::BIND, pl.name(), s.code(), t);

            if s.is_skip() {
                continue;
            }
            status = if s.is_success() {
                s
            } else if s.is_rejected() {
                s.with_plugin(pl.name())
            } else {
                error_status(pl.name(), s)
            };
            break;
        }
        self.observe(labels::BIND, status.code(), start);
        status
    }

    pub fn run_post_bind_plugins(&self, ctx: &CancellationToken, state: &CycleState, workload: &Workload, node_name: &str) {
        let start = Instant::now();
        for pl in &self.post_bind_plugins {
            let t = Instant::now();
            pl.post_bind(ctx, state, workload, node_name);
            self.observe_plugin(state, labels::POST_BIND, pl.name(), Code::Success, t);
        }
        self.observe(labels::POST_BIND, Code::Success, start);
    }
}

impl std::fmt::Debug for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("profile_name", &self.profile_name)
            .field("plugins", &self.list_plugins())
            .finish()
    }
}

/// Wrap a failing plugin's status into an `Error` status attributed to it.
pub(crate) fn error_status(plugin: &str, status: Status) -> Status {
    Status::from_error(FrameworkError::plugin_failed(plugin, status)).with_plugin(plugin)
}

fn names(list: &[String]) -> impl Iterator<Item = &str> {
    list.iter().map(String::as_str)
}

fn resolve<'a, T: ?Sized>(
    extension_point: &'static str,
    names: impl IntoIterator<Item = &'a str>,
    plugins: &HashMap<String, Arc<dyn Plugin>>,
    probe: fn(Arc<dyn Plugin>) -> Option<Arc<T>>,
) -> FrameworkResult<Vec<Arc<T>>> {
    names
        .into_iter()
        .map(|name| {
            let plugin = plugins
                .get(name)
                .ok_or_else(|| FrameworkError::UnknownPlugin(name.to_string()))?;
            probe(Arc::clone(plugin)).ok_or_else(|| FrameworkError::MissingCapability {
                plugin: name.to_string(),
                extension_point,
            })
        })
        .collect()
}
