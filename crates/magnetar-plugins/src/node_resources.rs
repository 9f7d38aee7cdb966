use async_trait::async_trait;
use magnetar_core::{node_name, MagnetarError, Node, Pod};
use magnetar_framework::{CycleState, FilterPlugin, Plugin, ScorePlugin, Status};
use tracing::debug;

/// CPU and memory quantities, normalized to millicores and bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceQuantities {
    /// CPU in millicores (1000 = 1 core)
    pub cpu_millicores: i64,
    /// Memory in bytes
    pub memory_bytes: i64,
}

impl ResourceQuantities {
    /// Parse a CPU string (e.g., "2", "1000m", "0.5")
    pub fn parse_cpu(s: &str) -> magnetar_core::Result<i64> {
        if let Some(m) = s.strip_suffix('m') {
            m.parse::<i64>()
                .map_err(|e| MagnetarError::invalid_quantity(s, e.to_string()))
        } else if let Ok(cores) = s.parse::<f64>() {
            Ok((cores * 1000.0) as i64)
        } else {
            Err(MagnetarError::invalid_quantity(s, "not a CPU quantity"))
        }
    }

    /// Parse a memory string (e.g., "128Mi", "1Gi", "1024")
    pub fn parse_memory(s: &str) -> magnetar_core::Result<i64> {
        let parse = |num: &str| {
            num.parse::<i64>()
                .map_err(|e| MagnetarError::invalid_quantity(s, e.to_string()))
        };
        if let Some(num) = s.strip_suffix("Ki") {
            Ok(parse(num)? * 1024)
        } else if let Some(num) = s.strip_suffix("Mi") {
            Ok(parse(num)? * 1024 * 1024)
        } else if let Some(num) = s.strip_suffix("Gi") {
            Ok(parse(num)? * 1024 * 1024 * 1024)
        } else {
            parse(s)
        }
    }

    /// Sum the resource requests of every container in a pod.
    ///
    /// Unparseable or absent requests count as zero, matching the "no
    /// request means no demand" convention.
    pub fn pod_requests(pod: &Pod) -> Self {
        let mut total = Self::default();
        let Some(spec) = &pod.spec else {
            return total;
        };
        for container in &spec.containers {
            let Some(requests) = container
                .resources
                .as_ref()
                .and_then(|r| r.requests.as_ref())
            else {
                continue;
            };
            total.cpu_millicores += requests
                .get("cpu")
                .and_then(|q| Self::parse_cpu(&q.0).ok())
                .unwrap_or(0);
            total.memory_bytes += requests
                .get("memory")
                .and_then(|q| Self::parse_memory(&q.0).ok())
                .unwrap_or(0);
        }
        total
    }

    /// A node's allocatable capacity
    pub fn node_allocatable(node: &Node) -> Self {
        let Some(allocatable) = node.status.as_ref().and_then(|s| s.allocatable.as_ref()) else {
            return Self::default();
        };
        Self {
            cpu_millicores: allocatable
                .get("cpu")
                .and_then(|q| Self::parse_cpu(&q.0).ok())
                .unwrap_or(0),
            memory_bytes: allocatable
                .get("memory")
                .and_then(|q| Self::parse_memory(&q.0).ok())
                .unwrap_or(0),
        }
    }
}

/// Filter plugin checking pod resource requests against node allocatable
pub struct NodeResourcesFit;

impl NodeResourcesFit {
    pub const NAME: &'static str = "NodeResourcesFit";
}

impl Plugin for NodeResourcesFit {
    fn name(&self) -> &str {
        Self::NAME
    }
}

#[async_trait]
impl FilterPlugin for NodeResourcesFit {
    async fn filter(&self, _state: &mut CycleState, pod: &Pod, node: &Node) -> Status {
        let available = ResourceQuantities::node_allocatable(node);
        let requested = ResourceQuantities::pod_requests(pod);

        debug!(
            node = %node_name(node),
            cpu_available = available.cpu_millicores,
            memory_available = available.memory_bytes,
            cpu_requested = requested.cpu_millicores,
            memory_requested = requested.memory_bytes,
            "checking resource fit"
        );

        if requested.cpu_millicores > available.cpu_millicores {
            return Status::unschedulable(format!(
                "insufficient CPU: requested {} milli, available {} milli",
                requested.cpu_millicores, available.cpu_millicores
            ));
        }

        if requested.memory_bytes > available.memory_bytes {
            return Status::unschedulable(format!(
                "insufficient memory: requested {} bytes, available {} bytes",
                requested.memory_bytes, available.memory_bytes
            ));
        }

        Status::success()
    }
}

/// Score plugin preferring nodes with the lowest resulting utilization
pub struct LeastAllocated;

impl LeastAllocated {
    pub const NAME: &'static str = "LeastAllocated";
}

impl Plugin for LeastAllocated {
    fn name(&self) -> &str {
        Self::NAME
    }
}

#[async_trait]
impl ScorePlugin for LeastAllocated {
    async fn score(&self, _state: &CycleState, pod: &Pod, node: &Node) -> (i64, Status) {
        let available = ResourceQuantities::node_allocatable(node);
        if available.cpu_millicores == 0 || available.memory_bytes == 0 {
            return (0, Status::success());
        }

        let requested = ResourceQuantities::pod_requests(pod);

        let cpu_utilization =
            requested.cpu_millicores as f64 / available.cpu_millicores as f64 * 100.0;
        let memory_utilization =
            requested.memory_bytes as f64 / available.memory_bytes as f64 * 100.0;

        // Lower utilization after placement = higher score
        let avg_utilization = (cpu_utilization + memory_utilization) / 2.0;
        let score = (100.0 - avg_utilization).clamp(0.0, 100.0) as i64;

        debug!(
            node = %node_name(node),
            score,
            cpu_utilization,
            memory_utilization,
            "least-allocated score"
        );

        (score, Status::success())
    }
}

/// Score plugin preferring balanced CPU/memory consumption
pub struct BalancedAllocation;

impl BalancedAllocation {
    pub const NAME: &'static str = "BalancedAllocation";
}

impl Plugin for BalancedAllocation {
    fn name(&self) -> &str {
        Self::NAME
    }
}

#[async_trait]
impl ScorePlugin for BalancedAllocation {
    async fn score(&self, _state: &CycleState, pod: &Pod, node: &Node) -> (i64, Status) {
        let available = ResourceQuantities::node_allocatable(node);
        if available.cpu_millicores == 0 || available.memory_bytes == 0 {
            return (0, Status::success());
        }

        let requested = ResourceQuantities::pod_requests(pod);

        let cpu_fraction = requested.cpu_millicores as f64 / available.cpu_millicores as f64;
        let memory_fraction = requested.memory_bytes as f64 / available.memory_bytes as f64;

        // CPU and memory consumption should end up similar
        let variance = (cpu_fraction - memory_fraction).abs();
        let score = ((1.0 - variance) * 100.0).clamp(0.0, 100.0) as i64;

        (score, Status::success())
    }
}
