use async_trait::async_trait;
use magnetar_core::{node_name, Node, Pod, PodRef};
use magnetar_framework::{CycleState, FilterPlugin, Plugin, Status};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Label key consulted when no other key is configured
pub const DEFAULT_LABEL_KEY: &str = "magnetar.io/node-group";

/// Configuration for [`LabelAffinity`].
///
/// Passing the key through configuration lets differently-keyed instances
/// of the plugin coexist in one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelAffinityConfig {
    /// The label key matched between pod and node
    #[serde(default = "default_label_key")]
    pub label_key: String,
}

fn default_label_key() -> String {
    DEFAULT_LABEL_KEY.to_string()
}

impl Default for LabelAffinityConfig {
    fn default() -> Self {
        Self {
            label_key: default_label_key(),
        }
    }
}

/// Filter plugin matching a pod's group label against the node's.
///
/// A pod without the label is unconstrained and passes every node. A pod
/// carrying the label only fits nodes carrying the same value. Pure
/// function of the two label maps; keeps no state and is safe to run
/// concurrently across nodes.
pub struct LabelAffinity {
    config: LabelAffinityConfig,
}

impl LabelAffinity {
    pub const NAME: &'static str = "LabelAffinity";

    pub fn new(config: LabelAffinityConfig) -> Self {
        Self { config }
    }

    /// Build from profile args; missing args fall back to the default key
    pub fn from_args(args: &serde_json::Value) -> magnetar_framework::Result<Self> {
        let config = if args.is_null() {
            LabelAffinityConfig::default()
        } else {
            serde_json::from_value(args.clone()).map_err(|e| {
                magnetar_framework::SchedulerError::invalid_profile(
                    format!("invalid LabelAffinity args: {}", e),
                    "Expected an object like {\"label_key\": \"example.com/group\"}",
                )
            })?
        };
        Ok(Self::new(config))
    }

    pub fn label_key(&self) -> &str {
        &self.config.label_key
    }
}

impl Plugin for LabelAffinity {
    fn name(&self) -> &str {
        Self::NAME
    }
}

#[async_trait]
impl FilterPlugin for LabelAffinity {
    async fn filter(&self, _state: &mut CycleState, pod: &Pod, node: &Node) -> Status {
        let key = &self.config.label_key;
        let pod_ref = PodRef::from_pod(pod);

        let pod_value = pod
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key));

        let Some(pod_value) = pod_value else {
            // Unconstrained pod: any node is eligible from this plugin's
            // perspective
            debug!(
                pod = %pod_ref,
                node = %node_name(node),
                "pod carries no '{}' label; no constraint imposed",
                key
            );
            return Status::success();
        };

        let node_value = node
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key));

        let Some(node_value) = node_value else {
            return Status::unschedulable("node does not have required label");
        };

        if node_value != pod_value {
            return Status::unschedulable("label value mismatch");
        }

        Status::success()
    }
}
