use std::fmt::Write as _;

use meridian_framework::capabilities;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub extension_points: Vec<&'static str>,
}

/// Build every built-in plugin with default arguments and probe it.
pub fn describe() -> anyhow::Result<Vec<PluginInfo>> {
    let registry = meridian_plugins::default_registry()?;
    registry
        .names()
        .map(|name| {
            let plugin = registry.build(name, None)?;
            Ok(PluginInfo {
                name: name.to_string(),
                extension_points: capabilities(&plugin),
            })
        })
        .collect()
}

pub fn format_plugins(plugins: &[PluginInfo]) -> String {
    let mut out = String::new();
    for p in plugins {
        let _ = writeln!(out, "{:<24} {}", p.name, p.extension_points.join(", "));
    }
    out
}

pub fn list(format: &str) -> anyhow::Result<()> {
    let plugins = describe()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&plugins)?),
        _ => print!("{}", format_plugins(&plugins)),
    }
    Ok(())
}
