//! meridian-core: shared vocabulary for the Meridian scheduling framework.
//!
//! Every stage of a scheduling cycle speaks in terms of the types defined
//! here: the nodes being considered, the workload being placed, the
//! [`Status`] each plugin returns, and the per-cycle [`CycleState`] that
//! plugins use to hand intermediate results to later stages.
//!
//! # Architecture
//!
//! ```text
//! ProfileConfig (profile.toml)
//!   └── plugin lists per extension point + score weights
//!
//! One scheduling cycle
//!   ├── Workload (what to place)
//!   ├── [NodeInfo] (where it could go)
//!   ├── CycleState (scratch space shared by plugins)
//!   └── NodePluginScores (per-node scoring breakdown)
//! ```

pub mod config;
pub mod cycle_state;
pub mod error;
pub mod status;
pub mod types;

pub use config::{PluginSet, ProfileConfig, ProfileSection, ScorePluginConfig};
pub use cycle_state::CycleState;
pub use error::{ConfigError, ConfigResult, StateError, StateResult};
pub use status::{Code, Status};
pub use types::*;
