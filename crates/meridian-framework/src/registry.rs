//! Plugin registry: name → factory.
//!
//! The registry is the only place plugins are constructed. A
//! [`Framework`](crate::Framework) asks it for every plugin a profile
//! names, exactly once per plugin, passing that plugin's
//! `[plugin_args.<name>]` table.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{FrameworkError, FrameworkResult};
use crate::plugin::Plugin;

/// Builds a plugin from its optional profile arguments.
pub type PluginFactory =
    Box<dyn Fn(Option<&toml::Value>) -> FrameworkResult<Arc<dyn Plugin>> + Send + Sync>;

/// Known plugins, by name.
#[derive(Default)]
pub struct Registry {
    factories: BTreeMap<String, PluginFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`. Names must be unique.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> FrameworkResult<()>
    where
        F: Fn(Option<&toml::Value>) -> FrameworkResult<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(FrameworkError::DuplicatePlugin(name));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Move every factory of `other` into this registry.
    pub fn merge(&mut self, other: Registry) -> FrameworkResult<()> {
        for (name, factory) in other.factories {
            if self.factories.contains_key(&name) {
                return Err(FrameworkError::DuplicatePlugin(name));
            }
            self.factories.insert(name, factory);
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct the plugin registered under `name`.
    pub fn build(&self, name: &str, args: Option<&toml::Value>) -> FrameworkResult<Arc<dyn Plugin>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| FrameworkError::UnknownPlugin(name.to_string()))?;
        let plugin = factory(args)?;
        if plugin.name() != name {
            return Err(FrameworkError::PluginInit {
                plugin: name.to_string(),
                message: format!("factory built a plugin named {:?}", plugin.name()),
            });
        }
        Ok(plugin)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
