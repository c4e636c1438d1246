use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use meridian_core::ProfileConfig;
use meridian_framework::Framework;
use meridian_metrics::NoopRecorder;

/// Parse `path` and build it against the built-in registry. Returns the
/// resolved plugins per extension point.
pub fn check(path: &Path) -> anyhow::Result<Vec<(&'static str, Vec<String>)>> {
    let profile = ProfileConfig::from_file(path).with_context(|| format!("loading profile {}", path.display()))?;
    let registry = meridian_plugins::default_registry()?;
    let framework = Framework::new(&registry, &profile, Arc::new(NoopRecorder))
        .with_context(|| format!("profile {:?} does not resolve", profile.profile.name))?;

    Ok(framework
        .list_plugins()
        .into_iter()
        .map(|(point, names)| (point, names.into_iter().map(str::to_string).collect()))
        .collect())
}

pub fn validate(path: &Path) -> anyhow::Result<()> {
    let points = check(path)?;
    println!("✓ Profile {} is valid", path.display());
    for (point, names) in points.iter().filter(|(_, names)| !names.is_empty()) {
        println!("  {point:<12} {}", names.join(", "));
    }
    Ok(())
}
