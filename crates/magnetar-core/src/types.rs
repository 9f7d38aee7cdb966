use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::fmt;

/// PodRef identifies a pod by namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    /// Namespace of the pod
    pub namespace: String,
    /// Name of the pod
    pub name: String,
}

impl PodRef {
    /// Create a new PodRef
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build a PodRef from pod metadata, defaulting missing fields
    pub fn from_pod(pod: &Pod) -> Self {
        Self {
            namespace: pod
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            name: pod
                .metadata
                .name
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Name of a node, defaulting to "unknown" when unset
pub fn node_name(node: &Node) -> String {
    node.metadata
        .name
        .clone()
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_ref_display() {
        let pod_ref = PodRef::new("team-a", "worker");
        assert_eq!(pod_ref.to_string(), "team-a/worker");
    }

    #[test]
    fn test_pod_ref_from_pod_defaults() {
        let pod = Pod::default();
        let pod_ref = PodRef::from_pod(&pod);
        assert_eq!(pod_ref.namespace, "default");
        assert_eq!(pod_ref.name, "unknown");

        let mut pod = Pod::default();
        pod.metadata.namespace = Some("team-a".to_string());
        pod.metadata.name = Some("worker".to_string());
        assert_eq!(PodRef::from_pod(&pod).to_string(), "team-a/worker");
    }

    #[test]
    fn test_node_name_defaults() {
        let node = Node::default();
        assert_eq!(node_name(&node), "unknown");

        let mut node = Node::default();
        node.metadata.name = Some("n1".to_string());
        assert_eq!(node_name(&node), "n1");
    }
}
