//! meridian-metrics: observability for scheduling cycles.
//!
//! The framework reports how long every extension point and (sampled)
//! plugin call takes, plus how many parallel workers each fan-out keeps
//! busy. Reporting is purely observational: nothing in the framework
//! reads these values back.
//!
//! # Architecture
//!
//! ```text
//! MetricsRecorder (trait)
//!   ├── NoopRecorder        ← default, discards everything
//!   ├── CollectingRecorder  ← in-memory latency samples + gauges
//!   └── AsyncRecorder       ← non-blocking sender
//!         └── AsyncFlusher::run() drains into a sink recorder
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain
//! ```

pub mod async_recorder;
pub mod collector;
pub mod prometheus;
pub mod recorder;

pub use async_recorder::{AsyncFlusher, AsyncRecorder, async_recorder};
pub use collector::{CollectingRecorder, LatencySummary, MetricsSnapshot};
pub use prometheus::render_prometheus;
pub use recorder::{MetricsRecorder, NoopRecorder};

/// Extension point labels shared by the framework and the parallelizer.
pub mod labels {
    pub const PRE_ENQUEUE: &str = "PreEnqueue";
    pub const PRE_FILTER: &str = "PreFilter";
    pub const FILTER: &str = "Filter";
    pub const POST_FILTER: &str = "PostFilter";
    pub const PRE_SCORE: &str = "PreScore";
    pub const SCORE: &str = "Score";
    pub const NORMALIZE_SCORE: &str = "NormalizeScore";
    pub const RESERVE: &str = "Reserve";
    pub const UNRESERVE: &str = "Unreserve";
    pub const PERMIT: &str = "Permit";
    pub const PRE_BIND: &str = "PreBind";
    pub const BIND: &str = "Bind";
    pub const POST_BIND: &str = "PostBind";
}
