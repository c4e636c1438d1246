//! Default binder: records the binding in memory.

use std::sync::{Arc, Mutex, PoisonError};

use meridian_core::{CycleState, Status, Workload};
use meridian_framework::{BindPlugin, Plugin};
use meridian_parallel::CancellationToken;
use serde::Serialize;
use tracing::info;

pub const NAME: &str = "DefaultBinder";

/// A workload placed on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub workload: String,
    pub node: String,
}

#[derive(Debug, Default)]
pub struct DefaultBinder {
    bindings: Mutex<Vec<Binding>>,
}

impl DefaultBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every binding made so far, oldest first.
    pub fn bindings(&self) -> Vec<Binding> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Plugin for DefaultBinder {
    fn name(&self) -> &str {
        NAME
    }

    fn as_bind(self: Arc<Self>) -> Option<Arc<dyn BindPlugin>> {
        Some(self)
    }
}

impl BindPlugin for DefaultBinder {
    fn bind(&self, _ctx: &CancellationToken, _state: &CycleState, workload: &Workload, node_name: &str) -> Status {
        info!(workload = %workload.id, node = %node_name, "binding workload");
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Binding {
                workload: workload.id.clone(),
                node: node_name.to_string(),
            });
        Status::success()
    }
}
