//! Prometheus text exposition format.
//!
//! Renders a [`MetricsSnapshot`] into the Prometheus text exposition
//! format for scraping by a Prometheus server or compatible agent.

use crate::collector::{LatencySummary, MetricsSnapshot};

/// Render a metrics snapshot into Prometheus text format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    render_latency(
        &mut out,
        "meridian_framework_extension_point_duration",
        "Latency for running all plugins of an extension point.",
        &snapshot.extension_points,
    );
    render_latency(
        &mut out,
        "meridian_plugin_execution_duration",
        "Latency of a single plugin call at an extension point.",
        &snapshot.plugins,
    );

    out.push_str("# HELP meridian_active_workers Parallel workers currently running, by operation.\n");
    out.push_str("# TYPE meridian_active_workers gauge\n");
    for (operation, value) in &snapshot.active_workers {
        out.push_str(&format!(
            "meridian_active_workers{{operation=\"{operation}\"}} {value}\n"
        ));
    }

    out
}

fn render_latency(out: &mut String, name: &str, help: &str, summaries: &[LatencySummary]) {
    out.push_str(&format!("# HELP {name}_ms {help}\n"));
    out.push_str(&format!("# TYPE {name}_ms summary\n"));
    for s in summaries {
        let labels = format_labels(&s.labels);
        out.push_str(&format!(
            "{name}_ms{{{labels},quantile=\"0.5\"}} {:.3}\n",
            s.p50_ms
        ));
        out.push_str(&format!(
            "{name}_ms{{{labels},quantile=\"0.99\"}} {:.3}\n",
            s.p99_ms
        ));
        out.push_str(&format!("{name}_ms_count{{{labels}}} {}\n", s.count));
    }
}

fn format_labels(labels: &[(&'static str, String)]) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(",")
}
