//! Domain types for a scheduling cycle.
//!
//! Nodes and workloads are serializable so that clusters and workloads can
//! be described in JSON files; the scoring types are produced fresh for
//! every cycle and thrown away once a node has been selected.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of a node in the cluster. Stable for the duration of a cycle.
pub type NodeName = String;

/// Lowest score a score plugin may report after normalization.
pub const MIN_NODE_SCORE: i64 = 0;

/// Highest score a score plugin may report after normalization.
pub const MAX_NODE_SCORE: i64 = 100;

/// Upper bound for the sum of weighted scores of a single node.
pub const MAX_TOTAL_SCORE: i64 = i64::MAX;

/// Default weight of a score plugin when the profile does not set one.
pub const DEFAULT_SCORE_WEIGHT: i64 = 1;

// ── Node ───────────────────────────────────────────────────────────

/// A candidate node with its capacity and current usage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: NodeName,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub capacity_memory_bytes: u64,
    pub capacity_cpu_weight: u32,
    #[serde(default)]
    pub used_memory_bytes: u64,
    #[serde(default)]
    pub used_cpu_weight: u32,
    /// Workload instances already running on the node.
    #[serde(default)]
    pub active_instances: u32,
    /// Draining nodes accept no new workloads.
    #[serde(default)]
    pub is_draining: bool,
}

impl NodeInfo {
    /// An empty node with the given capacity.
    pub fn new(name: impl Into<NodeName>, capacity_memory_bytes: u64, capacity_cpu_weight: u32) -> Self {
        Self {
            name: name.into(),
            labels: HashMap::new(),
            capacity_memory_bytes,
            capacity_cpu_weight,
            used_memory_bytes: 0,
            used_cpu_weight: 0,
            active_instances: 0,
            is_draining: false,
        }
    }

    pub fn free_memory(&self) -> u64 {
        self.capacity_memory_bytes.saturating_sub(self.used_memory_bytes)
    }

    pub fn free_cpu(&self) -> u32 {
        self.capacity_cpu_weight.saturating_sub(self.used_cpu_weight)
    }

    /// Fraction of memory in use, `None` when the node reports no capacity.
    pub fn memory_utilization(&self) -> Option<f64> {
        (self.capacity_memory_bytes > 0)
            .then(|| self.used_memory_bytes as f64 / self.capacity_memory_bytes as f64)
    }
}

// ── Workload ───────────────────────────────────────────────────────

/// The unit seeking placement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workload {
    pub id: String,
    /// Memory needed in bytes.
    #[serde(default)]
    pub memory_bytes: u64,
    /// CPU weight needed.
    #[serde(default)]
    pub cpu_weight: u32,
    /// Labels a node must carry (all must match).
    #[serde(default)]
    pub required_labels: HashMap<String, String>,
    /// Labels a node should carry (soft affinity).
    #[serde(default)]
    pub preferred_labels: HashMap<String, String>,
    /// Priority (0 = highest).
    #[serde(default)]
    pub priority: u32,
}

impl Workload {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            memory_bytes: 0,
            cpu_weight: 0,
            required_labels: HashMap::new(),
            preferred_labels: HashMap::new(),
            priority: 0,
        }
    }
}

// ── Scores ─────────────────────────────────────────────────────────

/// One plugin's raw score for one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeScore {
    pub name: NodeName,
    pub score: i64,
}

/// One plugin's weighted contribution to a node's total.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginScore {
    pub name: String,
    pub score: i64,
}

/// Full scoring breakdown for a node.
///
/// `scores` follows the order of the configured score plugins and
/// `total_score` is the sum of their weighted scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodePluginScores {
    pub name: NodeName,
    pub scores: Vec<PluginScore>,
    pub total_score: i64,
}
