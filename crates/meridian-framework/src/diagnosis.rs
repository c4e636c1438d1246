//! Why nodes were turned away during filtering.

use std::collections::{BTreeMap, BTreeSet};

use meridian_core::Status;

/// Per-node filter results of a cycle that found too few feasible nodes.
#[derive(Debug, Clone, Default)]
pub struct Diagnosis {
    /// Node name → the status that rejected it.
    pub node_to_status: BTreeMap<String, Status>,
    /// Plugins that rejected at least one node.
    pub unschedulable_plugins: BTreeSet<String>,
    /// Set when pre-filter rejected the workload outright.
    pub pre_filter_msg: Option<String>,
    /// Set when post-filter ran and could not help.
    pub post_filter_msg: Option<String>,
}

impl Diagnosis {
    /// Record the status that rejected `node`.
    pub fn add(&mut self, node: impl Into<String>, status: Status) {
        if let Some(plugin) = status.plugin() {
            self.unschedulable_plugins.insert(plugin.to_string());
        }
        self.node_to_status.insert(node.into(), status);
    }

    pub fn len(&self) -> usize {
        self.node_to_status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_to_status.is_empty()
    }
}
