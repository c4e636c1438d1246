use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use meridian_core::{NodeInfo, ProfileConfig, Workload};
use meridian_framework::{Framework, ScheduleResult, Scheduler};
use meridian_metrics::{CollectingRecorder, MetricsRecorder, async_recorder, render_prometheus};
use meridian_parallel::CancellationToken;
use tokio::sync::watch;
use tracing::info;

const FLUSH_INTERVAL: Duration = Duration::from_millis(200);

pub struct SimulateArgs {
    pub profile: Option<PathBuf>,
    pub cluster: PathBuf,
    pub workload: PathBuf,
    pub format: String,
    pub metrics: bool,
}

pub async fn simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let profile = load_profile(args.profile.as_deref())?;
    let nodes = load_cluster(&args.cluster)?;
    let workload = load_workload(&args.workload)?;

    let sink = Arc::new(CollectingRecorder::new());
    let (recorder, flusher) = async_recorder(sink.clone(), FLUSH_INTERVAL);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flusher_handle = tokio::spawn(flusher.run(shutdown_rx));

    let registry = meridian_plugins::default_registry()?;
    let framework = Framework::new(&registry, &profile, Arc::new(recorder) as Arc<dyn MetricsRecorder>)
        .with_context(|| format!("building profile {:?}", profile.profile.name))?;
    let scheduler = Scheduler::new(Arc::new(framework));

    info!(
        profile = %profile.profile.name,
        nodes = nodes.len(),
        workload = %workload.id,
        "simulating scheduling cycle"
    );

    // The cycle blocks on the worker pool; keep it off the async runtime.
    let cycle = tokio::task::spawn_blocking(move || {
        let ctx = CancellationToken::new();
        let result = scheduler.schedule_one(&ctx, &workload, &nodes);
        (result, workload)
    });
    let (result, workload) = cycle.await.context("scheduling cycle panicked")?;

    // Dropping the scheduler closes the recorder; the flusher drains what is left.
    let _ = shutdown_tx.send(true);
    flusher_handle.await.context("metrics flusher panicked")?;

    let result = result.with_context(|| format!("scheduling workload {:?}", workload.id))?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print!("{}", format_result(&result)),
    }

    if args.metrics {
        print!("{}", render_prometheus(&sink.snapshot()));
    }
    Ok(())
}

pub fn load_profile(path: Option<&Path>) -> anyhow::Result<ProfileConfig> {
    match path {
        Some(path) => ProfileConfig::from_file(path).with_context(|| format!("loading profile {}", path.display())),
        None => Ok(meridian_plugins::default_profile()),
    }
}

pub fn load_cluster(path: &Path) -> anyhow::Result<Vec<NodeInfo>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading cluster {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing cluster {}", path.display()))
}

pub fn load_workload(path: &Path) -> anyhow::Result<Workload> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading workload {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing workload {}", path.display()))
}

/// Human-readable breakdown, best node first.
pub fn format_result(result: &ScheduleResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "✓ Selected node: {}", result.suggested_host);
    let _ = writeln!(
        out,
        "  Evaluated {} node(s), {} feasible",
        result.evaluated_nodes, result.feasible_nodes
    );

    if result.scores.is_empty() {
        return out;
    }

    let mut ranked: Vec<_> = result.scores.iter().collect();
    ranked.sort_by(|a, b| b.total_score.cmp(&a.total_score).then_with(|| a.name.cmp(&b.name)));

    let _ = writeln!(out);
    for node in ranked {
        let marker = if node.name == result.suggested_host { "*" } else { " " };
        let _ = writeln!(out, "{marker} {:<24} {:>6}", node.name, node.total_score);
        for plugin in &node.scores {
            let _ = writeln!(out, "    {:<28} {:>6}", plugin.name, plugin.score);
        }
    }
    out
}
