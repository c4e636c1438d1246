//! Configurable fake plugin shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use meridian_core::{Code, CycleState, NodeInfo, NodeScore, ProfileConfig, ScorePluginConfig, Status, Workload};
use meridian_framework::*;
use meridian_metrics::NoopRecorder;
use meridian_parallel::CancellationToken;

/// One plugin that can sit at every extension point.
///
/// Each hook records `"<point>:<node>"` into `calls` and returns the
/// code configured for it.
#[derive(Default)]
pub struct Fake {
    pub name: String,
    pub reject_nodes: BTreeSet<String>,
    pub scores: HashMap<String, i64>,
    pub pre_filter_only: Option<Vec<String>>,
    pub pre_score: Option<Code>,
    pub reserve: Option<Code>,
    pub permit: Option<Code>,
    pub bind: Option<Code>,
    pub nominate: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl Fake {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn scoring(name: &str, scores: &[(&str, i64)]) -> Self {
        Self {
            scores: scores.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn status(code: Option<Code>, reason: &str) -> Status {
    match code.unwrap_or(Code::Success) {
        Code::Success => Status::success(),
        code => Status::new(code, [reason]),
    }
}

impl Plugin for Fake {
    fn name(&self) -> &str {
        &self.name
    }
    fn as_pre_filter(self: Arc<Self>) -> Option<Arc<dyn PreFilterPlugin>> {
        Some(self)
    }
    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }
    fn as_post_filter(self: Arc<Self>) -> Option<Arc<dyn PostFilterPlugin>> {
        Some(self)
    }
    fn as_pre_score(self: Arc<Self>) -> Option<Arc<dyn PreScorePlugin>> {
        Some(self)
    }
    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
    fn as_reserve(self: Arc<Self>) -> Option<Arc<dyn ReservePlugin>> {
        Some(self)
    }
    fn as_permit(self: Arc<Self>) -> Option<Arc<dyn PermitPlugin>> {
        Some(self)
    }
    fn as_bind(self: Arc<Self>) -> Option<Arc<dyn BindPlugin>> {
        Some(self)
    }
    fn as_post_bind(self: Arc<Self>) -> Option<Arc<dyn PostBindPlugin>> {
        Some(self)
    }
}

impl PreFilterPlugin for Fake {
    fn pre_filter(&self, _: &CancellationToken, _: &CycleState, _: &Workload, _: &[NodeInfo]) -> (Option<PreFilterResult>, Status) {
        self.record("pre_filter".to_string());
        let result = self.pre_filter_only.as_ref().map(|names| PreFilterResult::only(names.iter().cloned()));
        (result, Status::success())
    }
}

impl FilterPlugin for Fake {
    fn filter(&self, _: &CancellationToken, _: &CycleState, _: &Workload, node: &NodeInfo) -> Status {
        if self.reject_nodes.contains(&node.name) {
            return Status::unschedulable("node is fenced");
        }
        Status::success()
    }
}

impl PostFilterPlugin for Fake {
    fn post_filter(&self, _: &CancellationToken, _: &CycleState, _: &Workload, _: &Diagnosis) -> (Option<PostFilterResult>, Status) {
        self.record("post_filter".to_string());
        match &self.nominate {
            Some(node) => (
                Some(PostFilterResult {
                    nominated_node: Some(node.clone()),
                }),
                Status::success(),
            ),
            None => (None, Status::unschedulable("no node can be freed")),
        }
    }
}

impl PreScorePlugin for Fake {
    fn pre_score(&self, _: &CancellationToken, _: &CycleState, _: &Workload, _: &[NodeInfo]) -> Status {
        self.record("pre_score".to_string());
        status(self.pre_score, "pre-score failed")
    }
}

impl ScorePlugin for Fake {
    fn score(&self, _: &CancellationToken, _: &CycleState, _: &Workload, node: &NodeInfo) -> Result<i64, Status> {
        Ok(self.scores.get(&node.name).copied().unwrap_or(0))
    }
}

impl ReservePlugin for Fake {
    fn reserve(&self, _: &CancellationToken, _: &CycleState, _: &Workload, node: &str) -> Status {
        self.record(format!("reserve:{node}"));
        status(self.reserve, "reserve failed")
    }

    fn unreserve(&self, _: &CancellationToken, _: &CycleState, _: &Workload, node: &str) {
        self.record(format!("unreserve:{node}"));
    }
}

impl PermitPlugin for Fake {
    fn permit(&self, _: &CancellationToken, _: &CycleState, _: &Workload, node: &str) -> Status {
        self.record(format!("permit:{node}"));
        status(self.permit, "permit denied")
    }
}

impl BindPlugin for Fake {
    fn bind(&self, _: &CancellationToken, _: &CycleState, _: &Workload, node: &str) -> Status {
        self.record(format!("bind:{node}"));
        status(self.bind, "bind failed")
    }
}

impl PostBindPlugin for Fake {
    fn post_bind(&self, _: &CancellationToken, _: &CycleState, _: &Workload, node: &str) {
        self.record(format!("post_bind:{node}"));
    }
}

/// Profile that places `fake` at every extension point with `weight`.
pub fn full_profile(name: &str, weight: i64) -> ProfileConfig {
    let mut profile = ProfileConfig::empty("test");
    profile.profile.parallelism = 4;
    let plugins = &mut profile.plugins;
    for list in [
        &mut plugins.pre_filter,
        &mut plugins.filter,
        &mut plugins.post_filter,
        &mut plugins.pre_score,
        &mut plugins.reserve,
        &mut plugins.permit,
        &mut plugins.bind,
        &mut plugins.post_bind,
    ] {
        list.push(name.to_string());
    }
    plugins.score.push(ScorePluginConfig::new(name, weight));
    profile
}

/// Register every fake under its own name and build a framework.
pub fn build(profile: &ProfileConfig, fakes: Vec<Arc<Fake>>) -> Framework {
    let mut registry = Registry::new();
    for fake in fakes {
        let name = fake.name.clone();
        registry
            .register(name, move |_| Ok(fake.clone() as Arc<dyn Plugin>))
            .unwrap();
    }
    Framework::new(&registry, profile, Arc::new(NoopRecorder)).unwrap()
}

pub fn nodes(names: &[&str]) -> Vec<NodeInfo> {
    names.iter().map(|n| NodeInfo::new(*n, 4096, 1000)).collect()
}

/// A row of `NodeScore`s, handy for normalization tests.
pub fn row(scores: &[(&str, i64)]) -> Vec<NodeScore> {
    scores
        .iter()
        .map(|(name, score)| NodeScore {
            name: name.to_string(),
            score: *score,
        })
        .collect()
}
