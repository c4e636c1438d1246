//! meridian-plugins: the built-in plugin set.
//!
//! | Plugin                  | Extension points            |
//! |-------------------------|-----------------------------|
//! | `NodeUnschedulable`     | Filter                      |
//! | `NodeLabels`            | Filter, Score               |
//! | `NodeResourcesFit`      | PreFilter, Filter, Score    |
//! | `NodeResourcesBalanced` | PreScore, Score             |
//! | `InstanceSpread`        | Score (+ NormalizeScore)    |
//! | `DefaultBinder`         | Bind                        |
//!
//! [`default_registry`] registers all of them; [`default_profile`] wires
//! them into a working profile.

pub mod balanced;
pub mod binder;
pub mod helper;
pub mod node_labels;
pub mod node_unschedulable;
pub mod resources_fit;
pub mod spread;

use std::sync::Arc;

use meridian_core::{ProfileConfig, ScorePluginConfig};
use meridian_framework::{FrameworkResult, Plugin, Registry};

pub use balanced::NodeResourcesBalanced;
pub use binder::{Binding, DefaultBinder};
pub use helper::default_normalize_score;
pub use node_labels::NodeLabels;
pub use node_unschedulable::NodeUnschedulable;
pub use resources_fit::{NodeResourcesFit, ResourcesFitArgs, ScoringStrategy};
pub use spread::InstanceSpread;

/// Name of the profile returned by [`default_profile`].
pub const DEFAULT_PROFILE_NAME: &str = "default-scheduler";

/// Registry with every built-in plugin.
pub fn default_registry() -> FrameworkResult<Registry> {
    let mut registry = Registry::new();
    registry.register(node_unschedulable::NAME, |_| Ok(Arc::new(NodeUnschedulable) as Arc<dyn Plugin>))?;
    registry.register(node_labels::NAME, |_| Ok(Arc::new(NodeLabels) as Arc<dyn Plugin>))?;
    registry.register(resources_fit::NAME, |args| {
        Ok(Arc::new(NodeResourcesFit::from_args(args)?) as Arc<dyn Plugin>)
    })?;
    registry.register(balanced::NAME, |_| Ok(Arc::new(NodeResourcesBalanced) as Arc<dyn Plugin>))?;
    registry.register(spread::NAME, |_| Ok(Arc::new(InstanceSpread) as Arc<dyn Plugin>))?;
    registry.register(binder::NAME, |_| Ok(Arc::new(DefaultBinder::new()) as Arc<dyn Plugin>))?;
    Ok(registry)
}

/// Profile using every built-in plugin at each point it supports.
pub fn default_profile() -> ProfileConfig {
    let mut profile = ProfileConfig::empty(DEFAULT_PROFILE_NAME);
    let plugins = &mut profile.plugins;

    plugins.pre_filter = vec![resources_fit::NAME.to_string()];
    plugins.filter = vec![
        node_unschedulable::NAME.to_string(),
        node_labels::NAME.to_string(),
        resources_fit::NAME.to_string(),
    ];
    plugins.pre_score = vec![balanced::NAME.to_string()];
    plugins.score = vec![
        ScorePluginConfig::new(resources_fit::NAME, 1),
        ScorePluginConfig::new(balanced::NAME, 1),
        ScorePluginConfig::new(node_labels::NAME, 2),
        ScorePluginConfig::new(spread::NAME, 1),
    ];
    plugins.bind = vec![binder::NAME.to_string()];
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_every_plugin() {
        let registry = default_registry().unwrap();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "DefaultBinder",
                "InstanceSpread",
                "NodeLabels",
                "NodeResourcesBalanced",
                "NodeResourcesFit",
                "NodeUnschedulable",
            ]
        );
    }

    #[test]
    fn default_profile_is_valid() {
        let profile = default_profile();
        profile.validate().unwrap();
        assert_eq!(profile.profile.name, DEFAULT_PROFILE_NAME);
    }
}
