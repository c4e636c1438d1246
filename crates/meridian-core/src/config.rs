//! profile.toml configuration parser.
//!
//! A profile names the plugins enabled at every extension point, the
//! weight of each score plugin, and the framework-wide knobs
//! (parallelism, how many nodes to score).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{DEFAULT_SCORE_WEIGHT, MAX_NODE_SCORE, MAX_TOTAL_SCORE};

/// Pool size used when a profile does not set `parallelism`.
pub const DEFAULT_PARALLELISM: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileConfig {
    pub profile: ProfileSection,
    #[serde(default)]
    pub plugins: PluginSet,
    /// Free-form arguments handed to plugin factories, keyed by plugin name.
    #[serde(default)]
    pub plugin_args: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileSection {
    pub name: String,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Share of feasible nodes to find before filtering stops.
    /// `0` picks an adaptive share based on cluster size.
    #[serde(default)]
    pub percentage_of_nodes_to_score: u32,
}

/// Enabled plugins per extension point, in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PluginSet {
    #[serde(default)]
    pub pre_enqueue: Vec<String>,
    #[serde(default)]
    pub pre_filter: Vec<String>,
    #[serde(default)]
    pub filter: Vec<String>,
    #[serde(default)]
    pub post_filter: Vec<String>,
    #[serde(default)]
    pub pre_score: Vec<String>,
    #[serde(default)]
    pub score: Vec<ScorePluginConfig>,
    #[serde(default)]
    pub reserve: Vec<String>,
    #[serde(default)]
    pub permit: Vec<String>,
    #[serde(default)]
    pub pre_bind: Vec<String>,
    #[serde(default)]
    pub bind: Vec<String>,
    #[serde(default)]
    pub post_bind: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScorePluginConfig {
    pub name: String,
    /// `0` (or omitted) means the default weight of 1.
    #[serde(default)]
    pub weight: i64,
}

impl ScorePluginConfig {
    pub fn new(name: impl Into<String>, weight: i64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }

    /// Weight applied to this plugin's normalized scores.
    pub fn effective_weight(&self) -> i64 {
        if self.weight == 0 {
            DEFAULT_SCORE_WEIGHT
        } else {
            self.weight
        }
    }
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

impl PluginSet {
    /// Extension point name paired with its plugin names, score included.
    pub fn extension_points(&self) -> Vec<(&'static str, Vec<&str>)> {
        fn names(list: &[String]) -> Vec<&str> {
            list.iter().map(String::as_str).collect()
        }
        vec![
            ("PreEnqueue", names(&self.pre_enqueue)),
            ("PreFilter", names(&self.pre_filter)),
            ("Filter", names(&self.filter)),
            ("PostFilter", names(&self.post_filter)),
            ("PreScore", names(&self.pre_score)),
            ("Score", self.score.iter().map(|s| s.name.as_str()).collect()),
            ("Reserve", names(&self.reserve)),
            ("Permit", names(&self.permit)),
            ("PreBind", names(&self.pre_bind)),
            ("Bind", names(&self.bind)),
            ("PostBind", names(&self.post_bind)),
        ]
    }

    /// Every distinct plugin name, in first-seen order.
    pub fn all_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, names) in self.extension_points() {
            for name in names {
                if seen.insert(name) {
                    out.push(name.to_string());
                }
            }
        }
        out
    }
}

impl ProfileConfig {
    /// A profile with no plugins enabled.
    pub fn empty(name: &str) -> Self {
        Self {
            profile: ProfileSection {
                name: name.to_string(),
                parallelism: DEFAULT_PARALLELISM,
                percentage_of_nodes_to_score: 0,
            },
            plugins: PluginSet::default(),
            plugin_args: HashMap::new(),
        }
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Effective weight per score plugin name.
    pub fn score_weights(&self) -> HashMap<String, i64> {
        self.plugins
            .score
            .iter()
            .map(|s| (s.name.clone(), s.effective_weight()))
            .collect()
    }

    /// Check the profile for values the framework cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.profile.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.profile.parallelism == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        if self.profile.percentage_of_nodes_to_score > 100 {
            return Err(ConfigError::InvalidPercentage(
                self.profile.percentage_of_nodes_to_score,
            ));
        }

        for (extension_point, names) in self.plugins.extension_points() {
            let mut seen = HashSet::new();
            for name in names {
                if !seen.insert(name) {
                    return Err(ConfigError::DuplicatePlugin {
                        extension_point,
                        plugin: name.to_string(),
                    });
                }
            }
        }

        // Every plugin at MAX_NODE_SCORE must still fit under MAX_TOTAL_SCORE.
        let mut budget = MAX_TOTAL_SCORE;
        for score in &self.plugins.score {
            if score.weight < 0 {
                return Err(ConfigError::NegativeWeight {
                    plugin: score.name.clone(),
                    weight: score.weight,
                });
            }
            budget = score
                .effective_weight()
                .checked_mul(MAX_NODE_SCORE)
                .and_then(|w| budget.checked_sub(w))
                .filter(|left| *left >= 0)
                .ok_or(ConfigError::WeightOverflow)?;
        }

        Ok(())
    }
}
