//! Plugin call results.
//!
//! Every plugin call reports a [`Status`]. A status carries a [`Code`],
//! human-readable reasons, an optional underlying error, and the name of
//! the plugin that produced it once the framework has attributed it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Classification of a plugin result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Code {
    /// The plugin ran and the workload may proceed.
    #[default]
    Success,
    /// The workload cannot be placed on the node, or at this stage.
    Unschedulable,
    /// Something went wrong inside the plugin.
    Error,
    /// The plugin has nothing to do for this workload; later calls of the
    /// same plugin in this cycle are skipped.
    Skip,
}

impl Code {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Code::Success => "Success",
            Code::Unschedulable => "Unschedulable",
            Code::Error => "Error",
            Code::Skip => "Skip",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a plugin call.
#[derive(Clone, Default)]
pub struct Status {
    code: Code,
    reasons: Vec<String>,
    error: Option<Cause>,
    plugin: Option<String>,
}

impl Status {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn new(code: Code, reasons: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            code,
            reasons: reasons.into_iter().map(Into::into).collect(),
            error: None,
            plugin: None,
        }
    }

    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Self::new(Code::Unschedulable, [reason])
    }

    pub fn skip() -> Self {
        Self::new(Code::Skip, Vec::<String>::new())
    }

    /// An `Error` status carrying only a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Code::Error, [message])
    }

    /// An `Error` status wrapping an underlying cause.
    pub fn from_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            code: Code::Error,
            reasons: vec![err.to_string()],
            error: Some(Arc::new(err)),
            plugin: None,
        }
    }

    /// Attribute this status to a plugin.
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// Name of the plugin that produced this status, if attributed.
    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    /// Reasons joined into one message.
    pub fn message(&self) -> String {
        self.reasons.join(", ")
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    pub fn is_skip(&self) -> bool {
        self.code == Code::Skip
    }

    /// `true` when the workload was turned away rather than the plugin failing.
    pub fn is_rejected(&self) -> bool {
        self.code == Code::Unschedulable
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Status")
            .field("code", &self.code)
            .field("reasons", &self.reasons)
            .field("plugin", &self.plugin)
            .finish()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reasons.is_empty() {
            write!(f, "{}", self.code)
        } else {
            f.write_str(&self.message())
        }
    }
}

impl std::error::Error for Status {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.reasons == other.reasons && self.plugin == other.plugin
    }
}
