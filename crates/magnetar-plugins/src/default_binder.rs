use async_trait::async_trait;
use magnetar_core::{node_name, Node, Pod, PodRef};
use magnetar_framework::{BindingSink, BindPlugin, CycleState, Plugin, Status};
use std::sync::Arc;
use tracing::info;

/// Bind plugin forwarding the (pod, node) pair to the binding sink.
///
/// The sink is the external collaborator that durably records the
/// assignment; it is injected at registration time so the plugin itself
/// stays free of storage concerns.
pub struct DefaultBinder {
    sink: Arc<dyn BindingSink>,
}

impl DefaultBinder {
    pub const NAME: &'static str = "DefaultBinder";

    pub fn new(sink: Arc<dyn BindingSink>) -> Self {
        Self { sink }
    }
}

impl Plugin for DefaultBinder {
    fn name(&self) -> &str {
        Self::NAME
    }
}

#[async_trait]
impl BindPlugin for DefaultBinder {
    async fn bind(&self, _state: &mut CycleState, pod: &Pod, node: &Node) -> Status {
        let pod_ref = PodRef::from_pod(pod);
        let node = node_name(node);

        match self.sink.bind(pod, &node).await {
            Ok(()) => {
                info!(pod = %pod_ref, node = %node, "pod bound");
                Status::success()
            }
            Err(e) => Status::error(format!("binding sink failed: {}", e)),
        }
    }
}
