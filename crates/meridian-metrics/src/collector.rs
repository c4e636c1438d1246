//! In-memory metrics collector.
//!
//! Latency samples are kept per label set behind a mutex; worker gauges
//! are plain counters. A [`MetricsSnapshot`] turns the samples into
//! percentiles for exposition.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use meridian_core::Code;
use tracing::debug;

use crate::recorder::MetricsRecorder;

type ExtensionPointKey = (String, Code);
type PluginKey = (String, String, Code);

/// Collects every observation in memory.
#[derive(Debug, Default)]
pub struct CollectingRecorder {
    /// (extension_point, code) → latency samples in microseconds.
    extension_points: Mutex<HashMap<ExtensionPointKey, Vec<u64>>>,
    /// (extension_point, plugin, code) → latency samples in microseconds.
    plugins: Mutex<HashMap<PluginKey, Vec<u64>>>,
    /// operation → busy workers.
    active_workers: Mutex<HashMap<String, i64>>,
}

/// Latency distribution for one label set.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub labels: Vec<(&'static str, String)>,
    pub count: u64,
    pub p50_ms: f64,
    pub p99_ms: f64,
}

/// Point-in-time view of everything collected so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub extension_points: Vec<LatencySummary>,
    pub plugins: Vec<LatencySummary>,
    pub active_workers: BTreeMap<String, i64>,
}

impl CollectingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of observations recorded for an extension point, any code.
    pub fn extension_point_count(&self, extension_point: &str) -> usize {
        lock(&self.extension_points)
            .iter()
            .filter(|((point, _), _)| point == extension_point)
            .map(|(_, samples)| samples.len())
            .sum()
    }

    /// Number of observations recorded for a plugin, any extension point.
    pub fn plugin_count(&self, plugin: &str) -> usize {
        lock(&self.plugins)
            .iter()
            .filter(|((_, name, _), _)| name == plugin)
            .map(|(_, samples)| samples.len())
            .sum()
    }

    /// Current busy-worker gauge for an operation.
    pub fn active_workers_for(&self, operation: &str) -> i64 {
        lock(&self.active_workers).get(operation).copied().unwrap_or(0)
    }

    /// Summarise all samples. Label sets are sorted for stable output.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut extension_points: Vec<LatencySummary> = lock(&self.extension_points)
            .iter()
            .map(|((point, code), samples)| {
                summarize(
                    vec![("extension_point", point.clone()), ("status", code.to_string())],
                    samples,
                )
            })
            .collect();
        extension_points.sort_by(|a, b| a.labels.cmp(&b.labels));

        let mut plugins: Vec<LatencySummary> = lock(&self.plugins)
            .iter()
            .map(|((point, plugin, code), samples)| {
                summarize(
                    vec![
                        ("extension_point", point.clone()),
                        ("plugin", plugin.clone()),
                        ("status", code.to_string()),
                    ],
                    samples,
                )
            })
            .collect();
        plugins.sort_by(|a, b| a.labels.cmp(&b.labels));

        let active_workers = lock(&self.active_workers)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        debug!(
            extension_points = extension_points.len(),
            plugins = plugins.len(),
            "metrics snapshot taken"
        );

        MetricsSnapshot {
            extension_points,
            plugins,
            active_workers,
        }
    }
}

impl MetricsRecorder for CollectingRecorder {
    fn observe_extension_point(&self, extension_point: &str, code: Code, duration: Duration) {
        lock(&self.extension_points)
            .entry((extension_point.to_string(), code))
            .or_default()
            .push(micros(duration));
    }

    fn observe_plugin(&self, extension_point: &str, plugin: &str, code: Code, duration: Duration) {
        lock(&self.plugins)
            .entry((extension_point.to_string(), plugin.to_string(), code))
            .or_default()
            .push(micros(duration));
    }

    fn active_workers(&self, operation: &str, delta: i64) {
        *lock(&self.active_workers)
            .entry(operation.to_string())
            .or_default() += delta;
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

fn summarize(labels: Vec<(&'static str, String)>, samples: &[u64]) -> LatencySummary {
    let (p50_ms, p99_ms) = compute_percentiles(samples);
    LatencySummary {
        labels,
        count: samples.len() as u64,
        p50_ms,
        p99_ms,
    }
}

/// Compute P50 and P99 latency from microsecond samples.
///
/// Returns (p50_ms, p99_ms). If empty, returns (0.0, 0.0).
fn compute_percentiles(latencies: &[u64]) -> (f64, f64) {
    if latencies.is_empty() {
        return (0.0, 0.0);
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let p50_idx = (sorted.len() as f64 * 0.50) as usize;
    let p99_idx = (sorted.len() as f64 * 0.99) as usize;

    let p50 = sorted[p50_idx.min(sorted.len() - 1)] as f64 / 1000.0;
    let p99 = sorted[p99_idx.min(sorted.len() - 1)] as f64 / 1000.0;

    (p50, p99)
}
