use async_trait::async_trait;
use magnetar_core::{Node, Pod};
use magnetar_framework::{CycleState, FilterPlugin, Plugin, Status};

/// Filter plugin enforcing the pod's `spec.node_selector`.
///
/// Every selector pair must be present on the node with the same value; a
/// pod without a selector passes everywhere.
pub struct NodeSelector;

impl NodeSelector {
    pub const NAME: &'static str = "NodeSelector";
}

impl Plugin for NodeSelector {
    fn name(&self) -> &str {
        Self::NAME
    }
}

#[async_trait]
impl FilterPlugin for NodeSelector {
    async fn filter(&self, _state: &mut CycleState, pod: &Pod, node: &Node) -> Status {
        let Some(selector) = pod.spec.as_ref().and_then(|s| s.node_selector.as_ref()) else {
            return Status::success();
        };

        let node_labels = node.metadata.labels.as_ref();

        for (key, value) in selector {
            let node_value = node_labels.and_then(|labels| labels.get(key));
            if node_value != Some(value) {
                return Status::unschedulable(format!(
                    "node selector mismatch: {}={}",
                    key, value
                ));
            }
        }

        Status::success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn create_test_pod(selector: &[(&str, &str)]) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some("worker".to_string());
        let mut spec = k8s_openapi::api::core::v1::PodSpec::default();
        if !selector.is_empty() {
            spec.node_selector = Some(
                selector
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            );
        }
        pod.spec = Some(spec);
        pod
    }

    fn create_test_node(labels: &[(&str, &str)]) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some("n1".to_string());
        if !labels.is_empty() {
            let map: BTreeMap<String, String> = labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            node.metadata.labels = Some(map);
        }
        node
    }

    #[tokio::test]
    async fn test_no_selector_passes() {
        let pod = create_test_pod(&[]);
        let node = create_test_node(&[]);
        let mut state = CycleState::new();

        let status = NodeSelector.filter(&mut state, &pod, &node).await;
        assert!(status.is_success());
    }

    #[tokio::test]
    async fn test_matching_selector_passes() {
        let pod = create_test_pod(&[("disk", "ssd")]);
        let node = create_test_node(&[("disk", "ssd"), ("zone", "east")]);
        let mut state = CycleState::new();

        let status = NodeSelector.filter(&mut state, &pod, &node).await;
        assert!(status.is_success());
    }

    #[tokio::test]
    async fn test_mismatched_selector_is_unschedulable() {
        let pod = create_test_pod(&[("disk", "ssd")]);
        let node = create_test_node(&[("disk", "hdd")]);
        let mut state = CycleState::new();

        let status = NodeSelector.filter(&mut state, &pod, &node).await;
        assert!(status.is_unschedulable());
        assert!(status.reason().contains("disk=ssd"));
    }

    #[tokio::test]
    async fn test_missing_label_is_unschedulable() {
        let pod = create_test_pod(&[("disk", "ssd")]);
        let node = create_test_node(&[]);
        let mut state = CycleState::new();

        let status = NodeSelector.filter(&mut state, &pod, &node).await;
        assert!(status.is_unschedulable());
    }
}
