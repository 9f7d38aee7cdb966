// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// No suitable nodes found
    #[error("No suitable nodes found for pod {pod}: {reason}")]
    #[diagnostic(
        code(scheduler::no_suitable_nodes),
        help("Check node labels, resources, and pod requirements")
    )]
    NoSuitableNodes {
        pod: String,
        reason: String,
    },

    /// A Permit plugin denied the pod, or its wait timed out
    #[error("Pod {pod} denied at Permit by plugin {plugin}: {reason}")]
    #[diagnostic(
        code(scheduler::permit_rejected),
        help("The pod can be retried once the denying condition clears")
    )]
    PermitRejected {
        pod: String,
        plugin: String,
        reason: String,
    },

    /// A plugin reported an unexpected Error status
    #[error("Plugin {plugin} failed at {phase}: {message}")]
    #[diagnostic(
        code(scheduler::plugin_error),
        help("This is a plugin fault, not a normal \"no fit\" decision")
    )]
    PluginError {
        phase: String,
        plugin: String,
        message: String,
    },

    /// The binding cycle failed; the pod goes back to the queue
    #[error("Failed to bind pod {pod} to node {node}: {message}")]
    #[diagnostic(
        code(scheduler::binding_failed),
        help("Reserve holds were released; the pod is returned for a fresh attempt")
    )]
    BindingFailed {
        pod: String,
        node: String,
        message: String,
    },

    /// The scheduling attempt was cancelled out-of-band
    #[error("Scheduling attempt for pod {pod} was cancelled")]
    #[diagnostic(
        code(scheduler::cancelled),
        help("The pod was deleted or the scheduler is shutting down")
    )]
    Cancelled {
        pod: String,
    },

    /// Invalid scheduling profile
    #[error("Invalid scheduling profile: {message}")]
    #[diagnostic(
        code(scheduler::invalid_profile),
        help("{suggestion}")
    )]
    InvalidProfile {
        message: String,
        suggestion: String,
    },

    /// A profile references a plugin that was never registered
    #[error("Unknown plugin '{name}' in scheduling profile")]
    #[diagnostic(
        code(scheduler::unknown_plugin),
        help("Register the plugin before building a framework from this profile")
    )]
    UnknownPlugin {
        name: String,
    },

    /// A plugin is enabled at an extension point it does not implement
    #[error("Plugin '{plugin}' does not implement the {phase} extension point")]
    #[diagnostic(
        code(scheduler::missing_capability),
        help("Enable the plugin only at extension points it declares")
    )]
    MissingCapability {
        plugin: String,
        phase: String,
    },

    /// CycleState key not found
    #[error("Cycle state key '{key}' not found")]
    #[diagnostic(
        code(scheduler::state_key_not_found),
        help("The producing phase did not run, or wrote under a different key")
    )]
    StateKeyNotFound {
        key: String,
    },

    /// CycleState value had an unexpected type
    #[error("Cycle state key '{key}' holds a value of an unexpected type")]
    #[diagnostic(
        code(scheduler::state_type_mismatch),
        help("Reader and writer disagree on the value type for this key")
    )]
    StateTypeMismatch {
        key: String,
    },

    /// Core error
    #[error("Core error: {0}")]
    #[diagnostic(
        code(scheduler::core_error),
        help("This is an internal error")
    )]
    CoreError(#[from] magnetar_core::MagnetarError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    Internal {
        message: String,
    },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a NoSuitableNodes error
    pub fn no_suitable_nodes(pod: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoSuitableNodes {
            pod: pod.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidProfile error
    pub fn invalid_profile(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidProfile {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// A normal negative decision, as opposed to a fault.
    ///
    /// Callers use this to pick backoff policy: an unschedulable pod waits
    /// for the cluster to change, a fault is retried.
    pub fn is_unschedulable(&self) -> bool {
        matches!(
            self,
            Self::NoSuitableNodes { .. } | Self::PermitRejected { .. }
        )
    }
}
