//! Magnetar Plugins - in-tree plugins for the scheduling pipeline
//!
//! This crate provides:
//! - LabelAffinity: group-label matching between pod and node (Filter)
//! - NodeResourcesFit / NodeSelector: resource and selector filters
//! - LeastAllocated / BalancedAllocation: scoring functions
//! - PrioritySort: queue ordering
//! - DefaultBinder: hands the decision to the binding sink

pub mod default_binder;
pub mod label_affinity;
pub mod node_resources;
pub mod node_selector;
pub mod priority_sort;

pub use default_binder::DefaultBinder;
pub use label_affinity::{LabelAffinity, LabelAffinityConfig, DEFAULT_LABEL_KEY};
pub use node_resources::{
    BalancedAllocation, LeastAllocated, NodeResourcesFit, ResourceQuantities,
};
pub use node_selector::NodeSelector;
pub use priority_sort::PrioritySort;

use magnetar_framework::{
    BindingSink, PhasePlugins, PluginCapabilities, PluginRef, Profile, Registry, Result,
};
use std::sync::Arc;

/// Register every in-tree plugin.
///
/// The binding sink is injected here so `DefaultBinder` instances built
/// from a profile reach the caller's sink.
pub fn register_builtins(registry: &mut Registry, sink: Arc<dyn BindingSink>) -> Result<()> {
    registry.register(LabelAffinity::NAME, |args| {
        Ok(PluginCapabilities::new(LabelAffinity::NAME)
            .with_filter(Arc::new(LabelAffinity::from_args(args)?)))
    })?;
    registry.register(NodeResourcesFit::NAME, |_args| {
        Ok(PluginCapabilities::new(NodeResourcesFit::NAME)
            .with_filter(Arc::new(NodeResourcesFit)))
    })?;
    registry.register(NodeSelector::NAME, |_args| {
        Ok(PluginCapabilities::new(NodeSelector::NAME).with_filter(Arc::new(NodeSelector)))
    })?;
    registry.register(LeastAllocated::NAME, |_args| {
        Ok(PluginCapabilities::new(LeastAllocated::NAME).with_score(Arc::new(LeastAllocated)))
    })?;
    registry.register(BalancedAllocation::NAME, |_args| {
        Ok(PluginCapabilities::new(BalancedAllocation::NAME)
            .with_score(Arc::new(BalancedAllocation)))
    })?;
    registry.register(PrioritySort::NAME, |_args| {
        Ok(PluginCapabilities::new(PrioritySort::NAME).with_queue_sort(Arc::new(PrioritySort)))
    })?;
    registry.register(DefaultBinder::NAME, move |_args| {
        Ok(PluginCapabilities::new(DefaultBinder::NAME)
            .with_bind(Arc::new(DefaultBinder::new(sink.clone()))))
    })?;
    Ok(())
}

/// The default scheduling profile: every in-tree plugin enabled at its
/// extension point, scorers at weight 1
pub fn default_profile() -> Profile {
    let mut profile = Profile::default();
    profile.plugins.queue_sort = PhasePlugins::enabled(&[PrioritySort::NAME]);
    profile.plugins.filter = PhasePlugins::enabled(&[
        LabelAffinity::NAME,
        NodeSelector::NAME,
        NodeResourcesFit::NAME,
    ]);
    profile.plugins.score = PhasePlugins {
        enabled: vec![
            PluginRef::weighted(LeastAllocated::NAME, 1),
            PluginRef::weighted(BalancedAllocation::NAME, 1),
        ],
    };
    profile.plugins.bind = PhasePlugins::enabled(&[DefaultBinder::NAME]);
    profile
}
