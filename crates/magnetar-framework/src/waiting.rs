use magnetar_core::PodRef;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::debug;

/// Resolution of a Permit wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermitDecision {
    /// Every waiting plugin approved
    Allow,
    /// A plugin denied the pod, or its wait timed out
    Reject { plugin: String, reason: String },
}

/// A pod parked in the waiting set pending Permit approval.
///
/// Tracks the plugins still waiting, each with its own deadline. The pod
/// proceeds once every plugin has allowed; a single rejection, or the
/// earliest deadline elapsing, denies it.
pub struct WaitingPod {
    pod: PodRef,
    node: String,
    pending: Mutex<HashMap<String, Instant>>,
    tx: watch::Sender<Option<PermitDecision>>,
    rx: watch::Receiver<Option<PermitDecision>>,
}

impl WaitingPod {
    /// Park a pod for the given (plugin, timeout) waits
    pub fn new(pod: PodRef, node: impl Into<String>, waits: Vec<(String, Duration)>) -> Self {
        let now = Instant::now();
        let pending = waits
            .into_iter()
            .map(|(plugin, timeout)| (plugin, now + timeout))
            .collect();
        let (tx, rx) = watch::channel(None);
        Self {
            pod,
            node: node.into(),
            pending: Mutex::new(pending),
            tx,
            rx,
        }
    }

    pub fn pod(&self) -> &PodRef {
        &self.pod
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Plugins still waiting on approval
    pub async fn pending_plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pending.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Record one plugin's approval.
    ///
    /// The pod proceeds once every waiting plugin has allowed. Allowing a
    /// plugin that is not pending is a no-op.
    pub async fn allow(&self, plugin: &str) {
        let mut pending = self.pending.lock().await;
        pending.remove(plugin);
        if pending.is_empty() {
            let _ = self.tx.send(Some(PermitDecision::Allow));
        } else {
            // Nudge the waiter so it re-arms against the new earliest deadline
            let _ = self.tx.send(None);
        }
    }

    /// Record one plugin's denial
    pub async fn reject(&self, plugin: &str, reason: impl Into<String>) {
        let _ = self.tx.send(Some(PermitDecision::Reject {
            plugin: plugin.to_string(),
            reason: reason.into(),
        }));
    }

    /// Park until every plugin allows, any rejects, or the earliest
    /// per-plugin timeout elapses. Expiry is treated as denial, attributed
    /// to the plugin whose deadline fired.
    pub async fn wait(&self) -> PermitDecision {
        let mut rx = self.rx.clone();
        loop {
            let current: Option<PermitDecision> = rx.borrow_and_update().clone();
            if let Some(decision) = current {
                return decision;
            }

            let earliest = {
                let pending = self.pending.lock().await;
                pending
                    .iter()
                    .min_by_key(|(_, deadline)| **deadline)
                    .map(|(plugin, deadline)| (plugin.clone(), *deadline))
            };
            let Some((plugin, deadline)) = earliest else {
                return PermitDecision::Allow;
            };

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return PermitDecision::Reject {
                            plugin,
                            reason: "waiting set dropped".to_string(),
                        };
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return PermitDecision::Reject {
                        plugin,
                        reason: "permit wait timed out".to_string(),
                    };
                }
            }
        }
    }
}

/// The waiting set: pods suspended at Permit, keyed by namespace/name.
///
/// This is the external approval surface - a collaborator that decides a
/// parked pod's fate calls [`WaitingPods::allow`] or [`WaitingPods::reject`].
#[derive(Default)]
pub struct WaitingPods {
    pods: Mutex<HashMap<String, Arc<WaitingPod>>>,
}

impl WaitingPods {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, waiting: Arc<WaitingPod>) {
        let key = waiting.pod().to_string();
        debug!(pod = %key, node = waiting.node(), "pod entered the waiting set");
        self.pods.lock().await.insert(key, waiting);
    }

    pub async fn get(&self, pod: &str) -> Option<Arc<WaitingPod>> {
        self.pods.lock().await.get(pod).cloned()
    }

    pub async fn remove(&self, pod: &str) -> Option<Arc<WaitingPod>> {
        self.pods.lock().await.remove(pod)
    }

    /// Approve one plugin's wait for a parked pod; false if the pod is not
    /// waiting
    pub async fn allow(&self, pod: &str, plugin: &str) -> bool {
        match self.get(pod).await {
            Some(waiting) => {
                waiting.allow(plugin).await;
                true
            }
            None => false,
        }
    }

    /// Deny a parked pod; false if the pod is not waiting
    pub async fn reject(&self, pod: &str, plugin: &str, reason: &str) -> bool {
        match self.get(pod).await {
            Some(waiting) => {
                waiting.reject(plugin, reason).await;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.pods.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pods.lock().await.is_empty()
    }
}
