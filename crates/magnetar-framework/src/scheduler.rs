use crate::cycle_state::CycleState;
use crate::error::{Result, SchedulerError};
use crate::plugin::{ExtensionPoint, NodeStatusMap};
use crate::runner::{select_node, Framework, PermitOutcome};
use crate::status::Status;
use crate::waiting::{PermitDecision, WaitingPod, WaitingPods};
use async_trait::async_trait;
use magnetar_core::{node_name, Node, Pod, PodRef};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Durably records a chosen (pod, node) pair.
///
/// Invoked once per successful attempt from within the Bind phase; the
/// implementation must be idempotent from the orchestrator's point of view,
/// since a retry after an ambiguous failure must not double-bind.
#[async_trait]
pub trait BindingSink: Send + Sync {
    async fn bind(
        &self,
        pod: &Pod,
        node: &str,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Receives a pod back for a fresh attempt after a binding-cycle failure
#[async_trait]
pub trait RequeueSink: Send + Sync {
    async fn requeue(&self, pod: &Pod, reason: &str);
}

/// Configuration for the scheduler
#[derive(Clone)]
pub struct SchedulerConfig {
    /// Upper bound applied to Permit wait timeouts
    pub max_permit_wait: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_permit_wait: Duration::from_secs(600),
        }
    }
}

/// Terminal outcome of a successful scheduling attempt
#[derive(Debug, Clone)]
pub struct SchedulingDecision {
    /// The pod that was placed
    pub pod: PodRef,
    /// The node it was bound to
    pub node: String,
    /// The winning aggregate score (0 when only one node survived Filter)
    pub score: i64,
}

/// Pod scheduler: runs the scheduling cycle and the binding cycle for one
/// pod at a time.
///
/// One scheduling attempt per pod is in flight at any moment; within an
/// attempt the Filter and Score phases fan out across the candidate nodes.
pub struct Scheduler {
    framework: Arc<Framework>,
    waiting: Arc<WaitingPods>,
    requeue: Option<Arc<dyn RequeueSink>>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(framework: Arc<Framework>, config: SchedulerConfig) -> Self {
        Self {
            framework,
            waiting: Arc::new(WaitingPods::new()),
            requeue: None,
            config,
        }
    }

    /// Attach the queue collaborator receiving pods back after binding
    /// failures
    pub fn with_requeue_sink(mut self, sink: Arc<dyn RequeueSink>) -> Self {
        self.requeue = Some(sink);
        self
    }

    /// The waiting set; external approvers resolve Permit waits through it
    pub fn waiting_pods(&self) -> Arc<WaitingPods> {
        self.waiting.clone()
    }

    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    /// Run one full scheduling attempt for a pod against a candidate-node
    /// snapshot.
    ///
    /// PreFilter → Filter → (PostFilter) → PreScore → Score → select →
    /// Reserve → Permit → WaitOnPermit → PreBind → Bind → PostBind.
    /// Returns the bound node, or an error whose
    /// [`SchedulerError::is_unschedulable`] distinguishes a normal negative
    /// decision from a fault.
    pub async fn schedule_one(
        &self,
        pod: &Pod,
        nodes: &[Node],
        cancel: &CancellationToken,
    ) -> Result<SchedulingDecision> {
        let pod_ref = PodRef::from_pod(pod);
        debug!(pod = %pod_ref, candidates = nodes.len(), "starting scheduling cycle");

        if nodes.is_empty() {
            return Err(SchedulerError::no_suitable_nodes(
                pod_ref.to_string(),
                "no candidate nodes",
            ));
        }

        let mut state = CycleState::new();

        // PreFilter: whole-pod checks, in order
        self.ensure_live(&pod_ref, cancel)?;
        let status = self.framework.run_pre_filter(&mut state, pod, nodes).await;
        if !status.is_success() {
            return Err(self.phase_failure(&pod_ref, ExtensionPoint::PreFilter, status));
        }

        // Filter: per-node, parallel, merged at the barrier
        let (mut feasible, rejections) =
            self.framework.run_filter(&state, pod, nodes, cancel).await?;

        // PostFilter runs only when Filter removed every candidate
        if feasible.is_empty() {
            let (nominated, status) = self
                .framework
                .run_post_filter(&mut state, pod, &rejections)
                .await;
            match nominated {
                Some(name) => {
                    info!(pod = %pod_ref, node = %name, "node reconsidered after PostFilter");
                    let node = nodes
                        .iter()
                        .find(|n| node_name(n) == name)
                        .cloned()
                        .ok_or_else(|| {
                            SchedulerError::internal(format!(
                                "PostFilter nominated unknown node '{}'",
                                name
                            ))
                        })?;
                    feasible = vec![node];
                }
                None => {
                    if status.is_error() {
                        return Err(self.phase_failure(
                            &pod_ref,
                            ExtensionPoint::PostFilter,
                            status,
                        ));
                    }
                    return Err(SchedulerError::no_suitable_nodes(
                        pod_ref.to_string(),
                        summarize_rejections(&rejections),
                    ));
                }
            }
        }

        // Selection: scoring only matters with more than one survivor
        let (selected, best_score) = if feasible.len() == 1 {
            debug!(pod = %pod_ref, "single feasible node, skipping scoring");
            (feasible.remove(0), 0)
        } else {
            self.ensure_live(&pod_ref, cancel)?;
            let status = self
                .framework
                .run_pre_score(&mut state, pod, &feasible)
                .await;
            if !status.is_success() {
                return Err(self.phase_failure(&pod_ref, ExtensionPoint::PreScore, status));
            }

            let scores = self
                .framework
                .run_score(&state, pod, &feasible, cancel)
                .await?;
            let best = select_node(&scores)
                .ok_or_else(|| SchedulerError::internal("no nodes scored"))?;
            let node = feasible
                .iter()
                .find(|n| node_name(n) == best.node)
                .cloned()
                .ok_or_else(|| {
                    SchedulerError::internal(format!("scored unknown node '{}'", best.node))
                })?;
            (node, best.score)
        };
        let selected_name = node_name(&selected);
        info!(pod = %pod_ref, node = %selected_name, score = best_score, "selected node");

        // Reserve: tentative holds on the selected node. A mid-chain
        // failure is unwound by the runner itself.
        self.ensure_live(&pod_ref, cancel)?;
        let status = self.framework.run_reserve(&mut state, pod, &selected).await;
        if !status.is_success() {
            return Err(self.phase_failure(&pod_ref, ExtensionPoint::Reserve, status));
        }

        // Past Reserve, any failure must release the holds exactly once.
        match self
            .permit_and_bind(&mut state, &pod_ref, pod, &selected, cancel)
            .await
        {
            Ok(()) => {
                info!(pod = %pod_ref, node = %selected_name, "pod bound");
                Ok(SchedulingDecision {
                    pod: pod_ref,
                    node: selected_name,
                    score: best_score,
                })
            }
            Err(e) => {
                self.framework
                    .run_unreserve(&mut state, pod, &selected)
                    .await;
                if matches!(e, SchedulerError::BindingFailed { .. }) {
                    if let Some(requeue) = &self.requeue {
                        requeue.requeue(pod, &e.to_string()).await;
                    }
                }
                Err(e)
            }
        }
    }

    /// Permit plus the binding cycle for the selected node
    async fn permit_and_bind(
        &self,
        state: &mut CycleState,
        pod_ref: &PodRef,
        pod: &Pod,
        node: &Node,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.ensure_live(pod_ref, cancel)?;

        let waiting = match self.framework.run_permit(state, pod, node).await {
            PermitOutcome::Allow => None,
            PermitOutcome::Reject(status) => {
                return Err(self.permit_failure(pod_ref, status));
            }
            PermitOutcome::Wait(waits) => {
                let capped = waits
                    .into_iter()
                    .map(|(plugin, timeout)| (plugin, timeout.min(self.config.max_permit_wait)))
                    .collect();
                let waiting = Arc::new(WaitingPod::new(
                    pod_ref.clone(),
                    node_name(node),
                    capped,
                ));
                self.waiting.insert(waiting.clone()).await;
                Some(waiting)
            }
        };

        let result = self
            .run_binding_cycle(state, pod_ref, pod, node, waiting.as_deref(), cancel)
            .await;

        if waiting.is_some() {
            self.waiting.remove(&pod_ref.to_string()).await;
        }

        result
    }

    /// The binding cycle: WaitOnPermit → PreBind → Bind → PostBind
    async fn run_binding_cycle(
        &self,
        state: &mut CycleState,
        pod_ref: &PodRef,
        pod: &Pod,
        node: &Node,
        waiting: Option<&WaitingPod>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let node_str = node_name(node);

        if let Some(waiting) = waiting {
            let pending = waiting.pending_plugins().await;
            info!(pod = %pod_ref, ?pending, "pod waiting on permit");
            let decision = tokio::select! {
                decision = waiting.wait() => decision,
                _ = cancel.cancelled() => {
                    return Err(SchedulerError::Cancelled {
                        pod: pod_ref.to_string(),
                    });
                }
            };
            if let PermitDecision::Reject { plugin, reason } = decision {
                warn!(pod = %pod_ref, plugin = %plugin, "permit wait denied: {}", reason);
                return Err(SchedulerError::PermitRejected {
                    pod: pod_ref.to_string(),
                    plugin,
                    reason,
                });
            }
        }

        self.ensure_live(pod_ref, cancel)?;
        let status = self.framework.run_pre_bind(state, pod, node).await;
        if !status.is_success() {
            return Err(SchedulerError::BindingFailed {
                pod: pod_ref.to_string(),
                node: node_str,
                message: format!("PreBind: {}", status.message()),
            });
        }

        let status = self.framework.run_bind(state, pod, node).await;
        if status.is_skip() {
            return Err(SchedulerError::BindingFailed {
                pod: pod_ref.to_string(),
                node: node_str,
                message: "no bind plugin claimed the pod".to_string(),
            });
        }
        if !status.is_success() {
            return Err(SchedulerError::BindingFailed {
                pod: pod_ref.to_string(),
                node: node_str,
                message: format!("Bind: {}", status.message()),
            });
        }

        // Informational only; runs after a confirmed successful bind
        self.framework.run_post_bind(state, pod, node).await;
        Ok(())
    }

    fn ensure_live(&self, pod_ref: &PodRef, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(SchedulerError::Cancelled {
                pod: pod_ref.to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn phase_failure(
        &self,
        pod_ref: &PodRef,
        phase: ExtensionPoint,
        status: Status,
    ) -> SchedulerError {
        if status.is_error() {
            SchedulerError::PluginError {
                phase: phase.to_string(),
                plugin: status.plugin().unwrap_or("unknown").to_string(),
                message: status.reason().to_string(),
            }
        } else {
            SchedulerError::no_suitable_nodes(pod_ref.to_string(), status.message())
        }
    }

    fn permit_failure(&self, pod_ref: &PodRef, status: Status) -> SchedulerError {
        if status.is_error() {
            SchedulerError::PluginError {
                phase: ExtensionPoint::Permit.to_string(),
                plugin: status.plugin().unwrap_or("unknown").to_string(),
                message: status.reason().to_string(),
            }
        } else {
            SchedulerError::PermitRejected {
                pod: pod_ref.to_string(),
                plugin: status.plugin().unwrap_or("unknown").to_string(),
                reason: status.reason().to_string(),
            }
        }
    }
}

/// One line per rejected node, sorted by node name for stable diagnostics
fn summarize_rejections(rejections: &NodeStatusMap) -> String {
    if rejections.is_empty() {
        return "no candidate nodes survived filtering".to_string();
    }
    let mut lines: Vec<String> = rejections
        .iter()
        .map(|(node, status)| format!("{}: {}", node, status.message()))
        .collect();
    lines.sort();
    lines.join("; ")
}
