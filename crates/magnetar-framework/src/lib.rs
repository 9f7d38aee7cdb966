//! Magnetar Framework - the pluggable scheduling pipeline
//!
//! This crate provides:
//! - The extension point contract (QueueSort through PostBind) as
//!   capability traits plugins implement a subset of
//! - Status and CycleState, the per-phase outcome value and the
//!   per-attempt state container
//! - The plugin registry and profile configuration
//! - The extension point runner and the scheduling/binding cycle
//!   orchestrators
//! - The waiting set for Permit "wait" resolutions

pub mod cycle_state;
pub mod error;
pub mod plugin;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod status;
pub mod waiting;

// Re-export commonly used types
pub use cycle_state::{CycleState, StateData};
pub use error::{Result, SchedulerError};
pub use plugin::{
    BindPlugin, ExtensionPoint, FilterPlugin, NodeScore, NodeStatusMap, PermitPlugin, Plugin,
    PluginCapabilities, PostBindPlugin, PostFilterPlugin, PreBindPlugin, PreFilterExtensions,
    PreFilterPlugin, PreScorePlugin, QueueSortPlugin, ReservePlugin, ScoreExtensions, ScorePlugin,
};
pub use registry::{PhasePlugins, PluginFactory, PluginRef, Profile, ProfilePlugins, Registry};
pub use runner::{select_node, Framework, FrameworkBuilder, PermitOutcome};
pub use scheduler::{
    BindingSink, RequeueSink, Scheduler, SchedulerConfig, SchedulingDecision,
};
pub use status::{Code, Status};
pub use waiting::{PermitDecision, WaitingPod, WaitingPods};
