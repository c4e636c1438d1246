//! meridian-framework: plugin extension points, parallel scoring, and
//! the scheduling cycle.
//!
//! A profile names the plugins that run at each extension point. The
//! [`Registry`] builds them, a [`Framework`] holds one profile's plugins
//! resolved per extension point, and the [`Scheduler`] drives a workload
//! through one cycle.
//!
//! # Architecture
//!
//! ```text
//! Scheduler::schedule_one
//!   ├── PreEnqueue → PreFilter
//!   ├── Filter (parallel over nodes, stops once enough nodes fit)
//!   │     └── PostFilter when nothing fits → FitError
//!   ├── PreScore
//!   ├── Score (parallel)
//!   │     ├── 1. raw scores       over nodes
//!   │     ├── 2. NormalizeScore   over plugins
//!   │     └── 3. weight + sum     over nodes
//!   ├── select_host (highest total, random among ties)
//!   └── Reserve → Permit → PreBind → Bind → PostBind
//!         └── Unreserve on any failure
//! ```

pub mod diagnosis;
pub mod error;
pub mod filtering;
pub mod framework;
pub mod plugin;
pub mod registry;
pub mod scheduler;
pub mod scoring;

pub use diagnosis::Diagnosis;
pub use error::{FitError, FrameworkError, FrameworkResult, ScheduleError};
pub use filtering::{FeasibleNodes, num_feasible_nodes_to_find};
pub use framework::Framework;
pub use plugin::{
    BindPlugin, FilterPlugin, PermitPlugin, Plugin, PostBindPlugin, PostFilterPlugin, PostFilterResult,
    PreBindPlugin, PreEnqueuePlugin, PreFilterPlugin, PreFilterResult, PreScorePlugin, ReservePlugin,
    ScoreExtensions, ScorePlugin, capabilities,
};
pub use registry::{PluginFactory, Registry};
pub use scheduler::{ScheduleResult, Scheduler, select_host};
