use crate::error::{Result, SchedulerError};
use crate::plugin::{ExtensionPoint, PluginCapabilities};
use crate::runner::Framework;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Default weight applied to Score plugins that do not configure one
pub const DEFAULT_SCORE_WEIGHT: u32 = 1;

/// A reference to an enabled plugin within one extension point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRef {
    /// Plugin name, as registered
    pub name: String,
    /// Weight for Score plugins; ignored elsewhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

impl PluginRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: None,
        }
    }

    pub fn weighted(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight: Some(weight),
        }
    }
}

/// The ordered plugin sequence enabled at one extension point
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhasePlugins {
    #[serde(default)]
    pub enabled: Vec<PluginRef>,
}

impl PhasePlugins {
    pub fn enabled(names: &[&str]) -> Self {
        Self {
            enabled: names.iter().map(|n| PluginRef::new(*n)).collect(),
        }
    }
}

/// Enabled plugins per extension point, in the order they run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePlugins {
    #[serde(default)]
    pub queue_sort: PhasePlugins,
    #[serde(default)]
    pub pre_filter: PhasePlugins,
    #[serde(default)]
    pub filter: PhasePlugins,
    #[serde(default)]
    pub post_filter: PhasePlugins,
    #[serde(default)]
    pub pre_score: PhasePlugins,
    #[serde(default)]
    pub score: PhasePlugins,
    #[serde(default)]
    pub reserve: PhasePlugins,
    #[serde(default)]
    pub permit: PhasePlugins,
    #[serde(default)]
    pub pre_bind: PhasePlugins,
    #[serde(default)]
    pub bind: PhasePlugins,
    #[serde(default)]
    pub post_bind: PhasePlugins,
}

impl ProfilePlugins {
    fn phase(&self, point: ExtensionPoint) -> &PhasePlugins {
        match point {
            ExtensionPoint::QueueSort => &self.queue_sort,
            ExtensionPoint::PreFilter => &self.pre_filter,
            ExtensionPoint::Filter => &self.filter,
            ExtensionPoint::PostFilter => &self.post_filter,
            ExtensionPoint::PreScore => &self.pre_score,
            ExtensionPoint::Score => &self.score,
            ExtensionPoint::Reserve => &self.reserve,
            ExtensionPoint::Permit => &self.permit,
            ExtensionPoint::PreBind => &self.pre_bind,
            ExtensionPoint::Bind => &self.bind,
            ExtensionPoint::PostBind => &self.post_bind,
        }
    }
}

/// A scheduling profile: enabled plugins per extension point plus
/// per-plugin constructor arguments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub plugins: ProfilePlugins,
    /// Arguments handed to the plugin's factory, keyed by plugin name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub plugin_args: HashMap<String, serde_json::Value>,
}

/// Constructor for a plugin's declared capability set
pub type PluginFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<PluginCapabilities> + Send + Sync>;

const ALL_POINTS: [ExtensionPoint; 11] = [
    ExtensionPoint::QueueSort,
    ExtensionPoint::PreFilter,
    ExtensionPoint::Filter,
    ExtensionPoint::PostFilter,
    ExtensionPoint::PreScore,
    ExtensionPoint::Score,
    ExtensionPoint::Reserve,
    ExtensionPoint::Permit,
    ExtensionPoint::PreBind,
    ExtensionPoint::Bind,
    ExtensionPoint::PostBind,
];

/// Maps plugin names to constructors.
///
/// Built once at startup; [`Registry::build`] turns a [`Profile`] into a
/// [`Framework`] with the ordered plugin set for each extension point.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, PluginFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin constructor under a name
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&serde_json::Value) -> Result<PluginCapabilities> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(SchedulerError::invalid_profile(
                format!("plugin '{}' registered twice", name),
                "Each plugin name may only be registered once",
            ));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Names of all registered plugins, sorted
    pub fn plugin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a [`Framework`] from a profile.
    ///
    /// Instantiates each enabled plugin exactly once, validates that every
    /// referenced plugin exists and declares the capability for each phase
    /// it is enabled at, and enforces the single-QueueSort invariant.
    pub fn build(&self, profile: &Profile) -> Result<Framework> {
        if profile.plugins.queue_sort.enabled.len() > 1 {
            return Err(SchedulerError::invalid_profile(
                "more than one queue-sort plugin enabled",
                "Exactly one total ordering must exist; enable at most one QueueSort plugin",
            ));
        }

        // Instantiate each distinct enabled plugin once
        let mut built: HashMap<String, PluginCapabilities> = HashMap::new();
        for point in ALL_POINTS {
            let phase = profile.plugins.phase(point);
            let mut seen = HashSet::new();
            for plugin_ref in &phase.enabled {
                if !seen.insert(plugin_ref.name.as_str()) {
                    return Err(SchedulerError::invalid_profile(
                        format!(
                            "plugin '{}' enabled twice at {}",
                            plugin_ref.name, point
                        ),
                        "Enable each plugin at most once per extension point",
                    ));
                }
                if built.contains_key(&plugin_ref.name) {
                    continue;
                }
                let factory = self.factories.get(&plugin_ref.name).ok_or_else(|| {
                    SchedulerError::UnknownPlugin {
                        name: plugin_ref.name.clone(),
                    }
                })?;
                let args = profile
                    .plugin_args
                    .get(&plugin_ref.name)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                let capabilities = factory(&args)?;
                debug!(plugin = %plugin_ref.name, "plugin initialized");
                built.insert(plugin_ref.name.clone(), capabilities);
            }
        }

        let mut builder = Framework::builder();

        for point in ALL_POINTS {
            let phase = profile.plugins.phase(point);
            for plugin_ref in &phase.enabled {
                let capabilities = built.get(&plugin_ref.name).ok_or_else(|| {
                    SchedulerError::internal(format!(
                        "plugin '{}' was not instantiated",
                        plugin_ref.name
                    ))
                })?;
                if !capabilities.implements(point) {
                    return Err(SchedulerError::MissingCapability {
                        plugin: plugin_ref.name.clone(),
                        phase: point.to_string(),
                    });
                }
                builder = match point {
                    ExtensionPoint::QueueSort => {
                        // len <= 1 checked above; unwrap is safe but stay explicit
                        match &capabilities.queue_sort {
                            Some(p) => builder.queue_sort(p.clone()),
                            None => builder,
                        }
                    }
                    ExtensionPoint::PreFilter => match &capabilities.pre_filter {
                        Some(p) => builder.add_pre_filter(p.clone()),
                        None => builder,
                    },
                    ExtensionPoint::Filter => match &capabilities.filter {
                        Some(p) => builder.add_filter(p.clone()),
                        None => builder,
                    },
                    ExtensionPoint::PostFilter => match &capabilities.post_filter {
                        Some(p) => builder.add_post_filter(p.clone()),
                        None => builder,
                    },
                    ExtensionPoint::PreScore => match &capabilities.pre_score {
                        Some(p) => builder.add_pre_score(p.clone()),
                        None => builder,
                    },
                    ExtensionPoint::Score => match &capabilities.score {
                        Some(p) => builder.add_score(
                            p.clone(),
                            plugin_ref.weight.unwrap_or(DEFAULT_SCORE_WEIGHT),
                        ),
                        None => builder,
                    },
                    ExtensionPoint::Reserve => match &capabilities.reserve {
                        Some(p) => builder.add_reserve(p.clone()),
                        None => builder,
                    },
                    ExtensionPoint::Permit => match &capabilities.permit {
                        Some(p) => builder.add_permit(p.clone()),
                        None => builder,
                    },
                    ExtensionPoint::PreBind => match &capabilities.pre_bind {
                        Some(p) => builder.add_pre_bind(p.clone()),
                        None => builder,
                    },
                    ExtensionPoint::Bind => match &capabilities.bind {
                        Some(p) => builder.add_bind(p.clone()),
                        None => builder,
                    },
                    ExtensionPoint::PostBind => match &capabilities.post_bind {
                        Some(p) => builder.add_post_bind(p.clone()),
                        None => builder,
                    },
                };
            }
        }

        Ok(builder.build())
    }
}
