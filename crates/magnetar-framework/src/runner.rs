use crate::cycle_state::CycleState;
use crate::error::{Result, SchedulerError};
use crate::plugin::{
    BindPlugin, ExtensionPoint, FilterPlugin, NodeScore, NodeStatusMap, PermitPlugin,
    PostBindPlugin, PostFilterPlugin, PreBindPlugin, PreFilterPlugin, PreScorePlugin,
    QueueSortPlugin, ReservePlugin, ScorePlugin,
};
use crate::status::Status;
use futures_util::future::join_all;
use futures_util::FutureExt;
use magnetar_core::{node_name, Node, Pod, PodRef};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Aggregate outcome of the Permit phase
#[derive(Debug)]
pub enum PermitOutcome {
    /// Every Permit plugin approved; proceed to binding
    Allow,
    /// A plugin denied the pod
    Reject(Status),
    /// Plugins that suspended the pod, with their timeouts
    Wait(Vec<(String, Duration)>),
}

/// The extension point runner.
///
/// Holds the ordered plugin sequence for every phase and invokes each
/// plugin in configured order, aggregating statuses per the phase's
/// combination rules. Built from a [`crate::registry::Registry`] and a
/// profile, or directly through [`FrameworkBuilder`].
pub struct Framework {
    pub(crate) queue_sort: Option<Arc<dyn QueueSortPlugin>>,
    pub(crate) pre_filter: Vec<Arc<dyn PreFilterPlugin>>,
    pub(crate) filter: Vec<Arc<dyn FilterPlugin>>,
    pub(crate) post_filter: Vec<Arc<dyn PostFilterPlugin>>,
    pub(crate) pre_score: Vec<Arc<dyn PreScorePlugin>>,
    pub(crate) score: Vec<(Arc<dyn ScorePlugin>, u32)>,
    pub(crate) reserve: Vec<Arc<dyn ReservePlugin>>,
    pub(crate) permit: Vec<Arc<dyn PermitPlugin>>,
    pub(crate) pre_bind: Vec<Arc<dyn PreBindPlugin>>,
    pub(crate) bind: Vec<Arc<dyn BindPlugin>>,
    pub(crate) post_bind: Vec<Arc<dyn PostBindPlugin>>,
}

impl Framework {
    pub fn builder() -> FrameworkBuilder {
        FrameworkBuilder::default()
    }

    /// The queue-sort plugin, if one is registered
    pub fn queue_sort(&self) -> Option<&dyn QueueSortPlugin> {
        self.queue_sort.as_deref()
    }

    /// Run PreFilter plugins once for the whole pod, in order.
    ///
    /// The first non-success status aborts the remaining pipeline for this
    /// pod; Skip counts as success.
    pub async fn run_pre_filter(&self, state: &mut CycleState, pod: &Pod, nodes: &[Node]) -> Status {
        for plugin in &self.pre_filter {
            let status = plugin.pre_filter(state, pod, nodes).await;
            if !status.is_success() {
                return status.with_plugin(plugin.name());
            }
        }
        Status::success()
    }

    /// Run the AddPod sub-capability of every PreFilter plugin declaring it
    pub async fn run_add_pod(
        &self,
        state: &mut CycleState,
        pod: &Pod,
        pod_to_add: &Pod,
        node: &Node,
    ) -> Status {
        for plugin in &self.pre_filter {
            if let Some(ext) = plugin.extensions() {
                let status = ext.add_pod(state, pod, pod_to_add, node).await;
                if !status.is_success() {
                    return status.with_plugin(plugin.name());
                }
            }
        }
        Status::success()
    }

    /// Run the RemovePod sub-capability of every PreFilter plugin declaring it
    pub async fn run_remove_pod(
        &self,
        state: &mut CycleState,
        pod: &Pod,
        pod_to_remove: &Pod,
        node: &Node,
    ) -> Status {
        for plugin in &self.pre_filter {
            if let Some(ext) = plugin.extensions() {
                let status = ext.remove_pod(state, pod, pod_to_remove, node).await;
                if !status.is_success() {
                    return status.with_plugin(plugin.name());
                }
            }
        }
        Status::success()
    }

    /// Run the Filter chain for one node; stops at the first non-success
    pub async fn run_filter_node(&self, state: &mut CycleState, pod: &Pod, node: &Node) -> Status {
        for plugin in &self.filter {
            let status = plugin.filter(state, pod, node).await;
            if !status.is_success() {
                return status.with_plugin(plugin.name());
            }
        }
        Status::success()
    }

    /// Run Filter across the candidate set.
    ///
    /// Node evaluations are independent and run in parallel, each on its own
    /// fork of the cycle state; results merge at the barrier. The
    /// cancellation token is observed between node evaluations. An Error
    /// status removes the node just like Unschedulable, but is surfaced
    /// distinctly in logs and in the rejection map.
    pub async fn run_filter(
        &self,
        state: &CycleState,
        pod: &Pod,
        nodes: &[Node],
        cancel: &CancellationToken,
    ) -> Result<(Vec<Node>, NodeStatusMap)> {
        let pod_ref = PodRef::from_pod(pod);

        let evaluations = nodes.iter().map(|node| async move {
            if cancel.is_cancelled() {
                return None;
            }
            let mut fork = state.fork();
            let status = self.run_filter_node(&mut fork, pod, node).await;
            Some((node, status))
        });

        let results = join_all(evaluations).await;

        if cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled {
                pod: pod_ref.to_string(),
            });
        }

        let mut feasible = Vec::new();
        let mut rejections = NodeStatusMap::new();

        for (node, status) in results.into_iter().flatten() {
            let name = node_name(node);
            if status.is_success() {
                feasible.push(node.clone());
            } else {
                if status.is_error() {
                    error!(
                        pod = %pod_ref,
                        node = %name,
                        "filter plugin failed: {}",
                        status.message()
                    );
                } else {
                    debug!(
                        pod = %pod_ref,
                        node = %name,
                        "node filtered out: {}",
                        status.message()
                    );
                }
                rejections.insert(name, status);
            }
        }

        Ok((feasible, rejections))
    }

    /// Run PostFilter plugins in order.
    ///
    /// Invoked only when Filter removed every candidate node. The phase
    /// stops at the first plugin that reports a node as schedulable again;
    /// later PostFilter plugins are ignored.
    pub async fn run_post_filter(
        &self,
        state: &mut CycleState,
        pod: &Pod,
        rejections: &NodeStatusMap,
    ) -> (Option<String>, Status) {
        for plugin in &self.post_filter {
            let (nominated, status) = plugin.post_filter(state, pod, rejections).await;
            if status.is_error() {
                return (None, status.with_plugin(plugin.name()));
            }
            if status.is_success() {
                if let Some(node) = nominated {
                    return (Some(node), Status::success().with_plugin(plugin.name()));
                }
            }
        }
        (None, Status::unschedulable("no PostFilter plugin reconsidered a node"))
    }

    /// Run PreScore plugins once for the whole pod, in order
    pub async fn run_pre_score(&self, state: &mut CycleState, pod: &Pod, nodes: &[Node]) -> Status {
        for plugin in &self.pre_score {
            let status = plugin.pre_score(state, pod, nodes).await;
            if !status.is_success() {
                return status.with_plugin(plugin.name());
            }
        }
        Status::success()
    }

    /// Run Score and NormalizeScore over the surviving nodes.
    ///
    /// Per plugin: every node is scored in parallel, the plugin's own batch
    /// is normalized through its score extensions, and the weighted result
    /// accumulates into the per-node totals. The returned list is sorted by
    /// node name for reproducible logs.
    pub async fn run_score(
        &self,
        state: &CycleState,
        pod: &Pod,
        nodes: &[Node],
        cancel: &CancellationToken,
    ) -> Result<Vec<NodeScore>> {
        let pod_ref = PodRef::from_pod(pod);
        let mut totals: HashMap<String, i64> =
            nodes.iter().map(|n| (node_name(n), 0i64)).collect();

        for (plugin, weight) in &self.score {
            if cancel.is_cancelled() {
                return Err(SchedulerError::Cancelled {
                    pod: pod_ref.to_string(),
                });
            }

            let runs = nodes.iter().map(|node| async move {
                let (score, status) = plugin.score(state, pod, node).await;
                (node_name(node), score, status)
            });

            let mut scores = Vec::with_capacity(nodes.len());
            for (name, score, status) in join_all(runs).await {
                if !status.is_success() {
                    return Err(SchedulerError::PluginError {
                        phase: ExtensionPoint::Score.to_string(),
                        plugin: plugin.name().to_string(),
                        message: status.reason().to_string(),
                    });
                }
                scores.push(NodeScore::new(name, score));
            }

            if let Some(ext) = plugin.score_extensions() {
                let status = ext.normalize_score(state, pod, &mut scores).await;
                if !status.is_success() {
                    return Err(SchedulerError::PluginError {
                        phase: "NormalizeScore".to_string(),
                        plugin: plugin.name().to_string(),
                        message: status.reason().to_string(),
                    });
                }
            }

            for entry in &scores {
                if let Some(total) = totals.get_mut(&entry.node) {
                    *total += entry.score * i64::from(*weight);
                }
            }

            debug!(pod = %pod_ref, plugin = plugin.name(), weight, "score plugin finished");
        }

        let mut aggregate: Vec<NodeScore> = totals
            .into_iter()
            .map(|(node, score)| NodeScore { node, score })
            .collect();
        aggregate.sort_by(|a, b| a.node.cmp(&b.node));
        Ok(aggregate)
    }

    /// Run Reserve plugins in order for the selected node.
    ///
    /// On a mid-chain failure every reserve plugin is unreserved, in reverse
    /// order, before the failing status is reported; the caller must not
    /// release again for this failure.
    pub async fn run_reserve(&self, state: &mut CycleState, pod: &Pod, node: &Node) -> Status {
        for plugin in &self.reserve {
            let status = plugin.reserve(state, pod, node).await;
            if !status.is_success() {
                warn!(
                    plugin = plugin.name(),
                    "reserve failed, releasing holds: {}",
                    status.message()
                );
                self.run_unreserve(state, pod, node).await;
                return status.with_plugin(plugin.name());
            }
        }
        Status::success()
    }

    /// Release every Reserve hold, in reverse registration order.
    ///
    /// Plugins keep their release operations idempotent, so running the
    /// full chain after a partial reserve is safe.
    pub async fn run_unreserve(&self, state: &mut CycleState, pod: &Pod, node: &Node) {
        for plugin in self.reserve.iter().rev() {
            plugin.unreserve(state, pod, node).await;
        }
    }

    /// Run Permit plugins in order for the selected node
    pub async fn run_permit(&self, state: &mut CycleState, pod: &Pod, node: &Node) -> PermitOutcome {
        let mut waits = Vec::new();
        for plugin in &self.permit {
            let status = plugin.permit(state, pod, node).await;
            if status.is_wait() {
                let timeout = status.timeout().unwrap_or(Duration::ZERO);
                debug!(plugin = plugin.name(), ?timeout, "permit plugin wants to wait");
                waits.push((plugin.name().to_string(), timeout));
            } else if !status.is_success() {
                return PermitOutcome::Reject(status.with_plugin(plugin.name()));
            }
        }
        if waits.is_empty() {
            PermitOutcome::Allow
        } else {
            PermitOutcome::Wait(waits)
        }
    }

    /// Run PreBind plugins in order; first non-success aborts
    pub async fn run_pre_bind(&self, state: &mut CycleState, pod: &Pod, node: &Node) -> Status {
        for plugin in &self.pre_bind {
            let status = plugin.pre_bind(state, pod, node).await;
            if !status.is_success() {
                return status.with_plugin(plugin.name());
            }
        }
        Status::success()
    }

    /// Run Bind plugins in order.
    ///
    /// The first plugin not returning Skip owns the binding call and
    /// short-circuits the rest. Skip is returned when no plugin claimed the
    /// pod.
    pub async fn run_bind(&self, state: &mut CycleState, pod: &Pod, node: &Node) -> Status {
        for plugin in &self.bind {
            let status = plugin.bind(state, pod, node).await;
            if status.is_skip() {
                debug!(plugin = plugin.name(), "bind plugin declined");
                continue;
            }
            return status.with_plugin(plugin.name());
        }
        Status::skip()
    }

    /// Run PostBind plugins after a confirmed successful bind.
    ///
    /// Informational only: there is no status to return, and a panicking
    /// plugin is contained so it cannot corrupt cycle bookkeeping for
    /// subsequent pods.
    pub async fn run_post_bind(&self, state: &mut CycleState, pod: &Pod, node: &Node) {
        for plugin in &self.post_bind {
            let outcome = AssertUnwindSafe(plugin.post_bind(state, pod, node))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                error!(plugin = plugin.name(), "PostBind plugin panicked; continuing");
            }
        }
    }
}

/// Pick the highest aggregate score; ties break on the lexicographically
/// smallest node name so selection is reproducible.
pub fn select_node(scores: &[NodeScore]) -> Option<&NodeScore> {
    scores
        .iter()
        .max_by(|a, b| a.score.cmp(&b.score).then_with(|| b.node.cmp(&a.node)))
}

/// Assembles a [`Framework`] directly, for embedders and tests.
///
/// [`crate::registry::Registry::build`] drives this from a profile.
#[derive(Default)]
pub struct FrameworkBuilder {
    queue_sort: Option<Arc<dyn QueueSortPlugin>>,
    pre_filter: Vec<Arc<dyn PreFilterPlugin>>,
    filter: Vec<Arc<dyn FilterPlugin>>,
    post_filter: Vec<Arc<dyn PostFilterPlugin>>,
    pre_score: Vec<Arc<dyn PreScorePlugin>>,
    score: Vec<(Arc<dyn ScorePlugin>, u32)>,
    reserve: Vec<Arc<dyn ReservePlugin>>,
    permit: Vec<Arc<dyn PermitPlugin>>,
    pre_bind: Vec<Arc<dyn PreBindPlugin>>,
    bind: Vec<Arc<dyn BindPlugin>>,
    post_bind: Vec<Arc<dyn PostBindPlugin>>,
}

impl FrameworkBuilder {
    pub fn queue_sort(mut self, plugin: Arc<dyn QueueSortPlugin>) -> Self {
        self.queue_sort = Some(plugin);
        self
    }

    pub fn add_pre_filter(mut self, plugin: Arc<dyn PreFilterPlugin>) -> Self {
        self.pre_filter.push(plugin);
        self
    }

    pub fn add_filter(mut self, plugin: Arc<dyn FilterPlugin>) -> Self {
        self.filter.push(plugin);
        self
    }

    pub fn add_post_filter(mut self, plugin: Arc<dyn PostFilterPlugin>) -> Self {
        self.post_filter.push(plugin);
        self
    }

    pub fn add_pre_score(mut self, plugin: Arc<dyn PreScorePlugin>) -> Self {
        self.pre_score.push(plugin);
        self
    }

    pub fn add_score(mut self, plugin: Arc<dyn ScorePlugin>, weight: u32) -> Self {
        self.score.push((plugin, weight));
        self
    }

    pub fn add_reserve(mut self, plugin: Arc<dyn ReservePlugin>) -> Self {
        self.reserve.push(plugin);
        self
    }

    pub fn add_permit(mut self, plugin: Arc<dyn PermitPlugin>) -> Self {
        self.permit.push(plugin);
        self
    }

    pub fn add_pre_bind(mut self, plugin: Arc<dyn PreBindPlugin>) -> Self {
        self.pre_bind.push(plugin);
        self
    }

    pub fn add_bind(mut self, plugin: Arc<dyn BindPlugin>) -> Self {
        self.bind.push(plugin);
        self
    }

    pub fn add_post_bind(mut self, plugin: Arc<dyn PostBindPlugin>) -> Self {
        self.post_bind.push(plugin);
        self
    }

    pub fn build(self) -> Framework {
        Framework {
            queue_sort: self.queue_sort,
            pre_filter: self.pre_filter,
            filter: self.filter,
            post_filter: self.post_filter,
            pre_score: self.pre_score,
            score: self.score,
            reserve: self.reserve,
            permit: self.permit,
            pre_bind: self.pre_bind,
            bind: self.bind,
            post_bind: self.post_bind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Plugin;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn create_test_node(name: &str) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node
    }

    fn create_test_pod(name: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.namespace = Some("default".to_string());
        pod.metadata.name = Some(name.to_string());
        pod
    }

    /// Rejects the listed nodes; errors on the listed nodes; passes the rest
    struct NodeListFilter {
        name: &'static str,
        reject: Vec<&'static str>,
        fail: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl NodeListFilter {
        fn new(name: &'static str, reject: Vec<&'static str>, fail: Vec<&'static str>) -> Self {
            Self {
                name,
                reject,
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Plugin for NodeListFilter {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[async_trait]
    impl FilterPlugin for NodeListFilter {
        async fn filter(&self, _state: &mut CycleState, _pod: &Pod, node: &Node) -> Status {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = node_name(node);
            if self.fail.iter().any(|n| *n == name) {
                Status::error("injected fault")
            } else if self.reject.iter().any(|n| *n == name) {
                Status::unschedulable("node rejected")
            } else {
                Status::success()
            }
        }
    }

    /// Returns a fixed score per node name
    struct FixedScore {
        name: &'static str,
        scores: HashMap<String, i64>,
        normalize_to_max: bool,
    }

    impl FixedScore {
        fn new(name: &'static str, scores: &[(&str, i64)]) -> Self {
            Self {
                name,
                scores: scores
                    .iter()
                    .map(|(n, s)| (n.to_string(), *s))
                    .collect(),
                normalize_to_max: false,
            }
        }
    }

    impl Plugin for FixedScore {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[async_trait]
    impl ScorePlugin for FixedScore {
        async fn score(&self, _state: &CycleState, _pod: &Pod, node: &Node) -> (i64, Status) {
            let score = self.scores.get(&node_name(node)).copied().unwrap_or(0);
            (score, Status::success())
        }

        fn score_extensions(&self) -> Option<&dyn crate::plugin::ScoreExtensions> {
            if self.normalize_to_max {
                Some(self)
            } else {
                None
            }
        }
    }

    #[async_trait]
    impl crate::plugin::ScoreExtensions for FixedScore {
        async fn normalize_score(
            &self,
            _state: &CycleState,
            _pod: &Pod,
            scores: &mut [NodeScore],
        ) -> Status {
            let max = scores.iter().map(|s| s.score).max().unwrap_or(0);
            if max > 0 {
                for s in scores.iter_mut() {
                    s.score = s.score * 100 / max;
                }
            }
            Status::success()
        }
    }

    #[tokio::test]
    async fn test_filter_removes_rejected_and_failed_nodes() {
        let framework = Framework::builder()
            .add_filter(Arc::new(NodeListFilter::new("f1", vec!["n2"], vec!["n3"])))
            .build();

        let pod = create_test_pod("worker");
        let nodes = vec![
            create_test_node("n1"),
            create_test_node("n2"),
            create_test_node("n3"),
        ];
        let state = CycleState::new();
        let cancel = CancellationToken::new();

        let (feasible, rejections) = framework
            .run_filter(&state, &pod, &nodes, &cancel)
            .await
            .unwrap();

        assert_eq!(feasible.len(), 1);
        assert_eq!(node_name(&feasible[0]), "n1");
        assert!(rejections["n2"].is_unschedulable());
        assert!(rejections["n3"].is_error());
    }

    #[tokio::test]
    async fn test_filter_commutative_with_node_order() {
        let pod = create_test_pod("worker");
        let state = CycleState::new();
        let cancel = CancellationToken::new();

        let surviving = |nodes: Vec<Node>| {
            let framework = Framework::builder()
                .add_filter(Arc::new(NodeListFilter::new("f1", vec!["n2"], vec![])))
                .build();
            let pod = pod.clone();
            let state = state.fork();
            let cancel = cancel.clone();
            async move {
                let (feasible, _) = framework
                    .run_filter(&state, &pod, &nodes, &cancel)
                    .await
                    .unwrap();
                let mut names: Vec<String> = feasible.iter().map(node_name).collect();
                names.sort();
                names
            }
        };

        let forward = surviving(vec![create_test_node("n1"), create_test_node("n2")]).await;
        let reversed = surviving(vec![create_test_node("n2"), create_test_node("n1")]).await;
        assert_eq!(forward, reversed);
        assert_eq!(forward, vec!["n1".to_string()]);
    }

    #[tokio::test]
    async fn test_filter_chain_short_circuits_per_node() {
        let first = Arc::new(NodeListFilter::new("first", vec!["n1"], vec![]));
        let second = Arc::new(NodeListFilter::new("second", vec![], vec![]));
        let framework = Framework::builder()
            .add_filter(first.clone())
            .add_filter(second.clone())
            .build();

        let pod = create_test_pod("worker");
        let nodes = vec![create_test_node("n1")];
        let state = CycleState::new();
        let cancel = CancellationToken::new();

        let (feasible, _) = framework
            .run_filter(&state, &pod, &nodes, &cancel)
            .await
            .unwrap();

        assert!(feasible.is_empty());
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        // first rejected n1, so second never ran for it
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_filter_observes_cancellation() {
        let framework = Framework::builder()
            .add_filter(Arc::new(NodeListFilter::new("f1", vec![], vec![])))
            .build();

        let pod = create_test_pod("worker");
        let nodes = vec![create_test_node("n1")];
        let state = CycleState::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = framework.run_filter(&state, &pod, &nodes, &cancel).await;
        assert!(matches!(result, Err(SchedulerError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_score_weighted_sum() {
        let framework = Framework::builder()
            .add_score(
                Arc::new(FixedScore::new("s1", &[("n1", 10), ("n2", 20)])),
                1,
            )
            .add_score(
                Arc::new(FixedScore::new("s2", &[("n1", 30), ("n2", 5)])),
                2,
            )
            .build();

        let pod = create_test_pod("worker");
        let nodes = vec![create_test_node("n1"), create_test_node("n2")];
        let state = CycleState::new();
        let cancel = CancellationToken::new();

        let scores = framework
            .run_score(&state, &pod, &nodes, &cancel)
            .await
            .unwrap();

        let by_name: HashMap<&str, i64> =
            scores.iter().map(|s| (s.node.as_str(), s.score)).collect();
        assert_eq!(by_name["n1"], 10 + 30 * 2);
        assert_eq!(by_name["n2"], 20 + 5 * 2);
    }

    #[tokio::test]
    async fn test_normalize_score_rescales_plugin_batch() {
        let mut plugin = FixedScore::new("s1", &[("n1", 50), ("n2", 200)]);
        plugin.normalize_to_max = true;

        let framework = Framework::builder().add_score(Arc::new(plugin), 1).build();

        let pod = create_test_pod("worker");
        let nodes = vec![create_test_node("n1"), create_test_node("n2")];
        let state = CycleState::new();
        let cancel = CancellationToken::new();

        let scores = framework
            .run_score(&state, &pod, &nodes, &cancel)
            .await
            .unwrap();

        let by_name: HashMap<&str, i64> =
            scores.iter().map(|s| (s.node.as_str(), s.score)).collect();
        assert_eq!(by_name["n2"], 100);
        assert_eq!(by_name["n1"], 25);
    }

    /// PreFilter plugin writing a note into cycle state, with AddPod/
    /// RemovePod extensions that count invocations
    struct NotingPreFilter {
        outcome: Status,
        add_calls: AtomicUsize,
        remove_calls: AtomicUsize,
    }

    impl NotingPreFilter {
        fn succeeding() -> Self {
            Self {
                outcome: Status::success(),
                add_calls: AtomicUsize::new(0),
                remove_calls: AtomicUsize::new(0),
            }
        }
    }

    impl Plugin for NotingPreFilter {
        fn name(&self) -> &str {
            "NotingPreFilter"
        }
    }

    #[async_trait]
    impl PreFilterPlugin for NotingPreFilter {
        async fn pre_filter(
            &self,
            state: &mut CycleState,
            _pod: &Pod,
            _nodes: &[Node],
        ) -> Status {
            state.write("noting-pre-filter/note", Box::new("checked".to_string()));
            self.outcome.clone()
        }

        fn extensions(&self) -> Option<&dyn crate::plugin::PreFilterExtensions> {
            Some(self)
        }
    }

    #[async_trait]
    impl crate::plugin::PreFilterExtensions for NotingPreFilter {
        async fn add_pod(
            &self,
            _state: &mut CycleState,
            _pod: &Pod,
            _pod_to_add: &Pod,
            _node: &Node,
        ) -> Status {
            self.add_calls.fetch_add(1, Ordering::SeqCst);
            Status::success()
        }

        async fn remove_pod(
            &self,
            _state: &mut CycleState,
            _pod: &Pod,
            _pod_to_remove: &Pod,
            _node: &Node,
        ) -> Status {
            self.remove_calls.fetch_add(1, Ordering::SeqCst);
            Status::success()
        }
    }

    #[tokio::test]
    async fn test_pre_filter_writes_state_and_attributes_failures() {
        let framework = Framework::builder()
            .add_pre_filter(Arc::new(NotingPreFilter::succeeding()))
            .add_pre_filter(Arc::new({
                struct Rejecting;
                impl Plugin for Rejecting {
                    fn name(&self) -> &str {
                        "Rejecting"
                    }
                }
                #[async_trait]
                impl PreFilterPlugin for Rejecting {
                    async fn pre_filter(
                        &self,
                        _state: &mut CycleState,
                        _pod: &Pod,
                        _nodes: &[Node],
                    ) -> Status {
                        Status::unschedulable("pod-wide veto")
                    }
                }
                Rejecting
            }))
            .build();

        let pod = create_test_pod("worker");
        let nodes = vec![create_test_node("n1")];
        let mut state = CycleState::new();

        let status = framework.run_pre_filter(&mut state, &pod, &nodes).await;
        assert!(status.is_unschedulable());
        assert_eq!(status.plugin(), Some("Rejecting"));

        // State written by the first plugin is visible to later phases
        let note: &String = state.read("noting-pre-filter/note").unwrap();
        assert_eq!(note, "checked");
    }

    #[tokio::test]
    async fn test_pre_filter_extensions_invoked() {
        let plugin = Arc::new(NotingPreFilter::succeeding());
        let framework = Framework::builder().add_pre_filter(plugin.clone()).build();

        let pod = create_test_pod("worker");
        let other = create_test_pod("neighbor");
        let node = create_test_node("n1");
        let mut state = CycleState::new();

        let status = framework.run_add_pod(&mut state, &pod, &other, &node).await;
        assert!(status.is_success());
        let status = framework
            .run_remove_pod(&mut state, &pod, &other, &node)
            .await;
        assert!(status.is_success());

        assert_eq!(plugin.add_calls.load(Ordering::SeqCst), 1);
        assert_eq!(plugin.remove_calls.load(Ordering::SeqCst), 1);
    }

    /// PostFilter fixture: optionally nominates, counts invocations
    struct Nominator {
        name: &'static str,
        nominate: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Plugin for Nominator {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[async_trait]
    impl PostFilterPlugin for Nominator {
        async fn post_filter(
            &self,
            _state: &mut CycleState,
            _pod: &Pod,
            _rejections: &NodeStatusMap,
        ) -> (Option<String>, Status) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.nominate {
                Some(node) => (Some(node.to_string()), Status::success()),
                None => (None, Status::unschedulable("nothing to reconsider")),
            }
        }
    }

    #[tokio::test]
    async fn test_post_filter_stops_at_first_nomination() {
        let first = Arc::new(Nominator {
            name: "first",
            nominate: Some("n1"),
            calls: AtomicUsize::new(0),
        });
        let second = Arc::new(Nominator {
            name: "second",
            nominate: Some("n2"),
            calls: AtomicUsize::new(0),
        });
        let framework = Framework::builder()
            .add_post_filter(first.clone())
            .add_post_filter(second.clone())
            .build();

        let pod = create_test_pod("worker");
        let mut state = CycleState::new();
        let rejections = NodeStatusMap::new();

        let (nominated, status) = framework
            .run_post_filter(&mut state, &pod, &rejections)
            .await;

        assert_eq!(nominated.as_deref(), Some("n1"));
        assert!(status.is_success());
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_post_filter_without_nomination_is_unschedulable() {
        let only = Arc::new(Nominator {
            name: "only",
            nominate: None,
            calls: AtomicUsize::new(0),
        });
        let framework = Framework::builder().add_post_filter(only).build();

        let pod = create_test_pod("worker");
        let mut state = CycleState::new();
        let (nominated, status) = framework
            .run_post_filter(&mut state, &pod, &NodeStatusMap::new())
            .await;

        assert!(nominated.is_none());
        assert!(status.is_unschedulable());
    }

    /// Reserve fixture counting reserve/unreserve calls, optionally failing
    struct CountingReserve {
        name: &'static str,
        fail: bool,
        reserved: AtomicUsize,
        released: AtomicUsize,
    }

    impl CountingReserve {
        fn new(name: &'static str, fail: bool) -> Self {
            Self {
                name,
                fail,
                reserved: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }
        }
    }

    impl Plugin for CountingReserve {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[async_trait]
    impl ReservePlugin for CountingReserve {
        async fn reserve(&self, _state: &mut CycleState, _pod: &Pod, _node: &Node) -> Status {
            if self.fail {
                return Status::unschedulable("hold unavailable");
            }
            self.reserved.fetch_add(1, Ordering::SeqCst);
            Status::success()
        }

        async fn unreserve(&self, _state: &mut CycleState, _pod: &Pod, _node: &Node) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_reserve_failure_unwinds_all_holds() {
        let first = Arc::new(CountingReserve::new("first", false));
        let second = Arc::new(CountingReserve::new("second", true));
        let framework = Framework::builder()
            .add_reserve(first.clone())
            .add_reserve(second.clone())
            .build();

        let pod = create_test_pod("worker");
        let node = create_test_node("n1");
        let mut state = CycleState::new();

        let status = framework.run_reserve(&mut state, &pod, &node).await;

        assert!(!status.is_success());
        assert_eq!(status.plugin(), Some("second"));
        assert_eq!(first.reserved.load(Ordering::SeqCst), 1);
        // The whole chain is released; plugins keep unreserve idempotent
        assert_eq!(first.released.load(Ordering::SeqCst), 1);
        assert_eq!(second.released.load(Ordering::SeqCst), 1);
    }

    /// Bind fixture: skips or binds, counting calls
    struct SelectiveBinder {
        name: &'static str,
        skip: bool,
        calls: AtomicUsize,
    }

    impl SelectiveBinder {
        fn new(name: &'static str, skip: bool) -> Self {
            Self {
                name,
                skip,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Plugin for SelectiveBinder {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[async_trait]
    impl BindPlugin for SelectiveBinder {
        async fn bind(&self, _state: &mut CycleState, _pod: &Pod, _node: &Node) -> Status {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.skip {
                Status::skip()
            } else {
                Status::success()
            }
        }
    }

    #[tokio::test]
    async fn test_bind_first_claimer_short_circuits() {
        let declines = Arc::new(SelectiveBinder::new("declines", true));
        let claims = Arc::new(SelectiveBinder::new("claims", false));
        let never = Arc::new(SelectiveBinder::new("never", false));
        let framework = Framework::builder()
            .add_bind(declines.clone())
            .add_bind(claims.clone())
            .add_bind(never.clone())
            .build();

        let pod = create_test_pod("worker");
        let node = create_test_node("n1");
        let mut state = CycleState::new();

        let status = framework.run_bind(&mut state, &pod, &node).await;

        assert!(status.is_success());
        assert_eq!(status.plugin(), Some("claims"));
        assert_eq!(declines.calls.load(Ordering::SeqCst), 1);
        assert_eq!(claims.calls.load(Ordering::SeqCst), 1);
        assert_eq!(never.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bind_all_skip_reports_skip() {
        let framework = Framework::builder()
            .add_bind(Arc::new(SelectiveBinder::new("declines", true)))
            .build();

        let pod = create_test_pod("worker");
        let node = create_test_node("n1");
        let mut state = CycleState::new();

        let status = framework.run_bind(&mut state, &pod, &node).await;
        assert!(status.is_skip());
    }

    #[test]
    fn test_select_node_tie_breaks_on_name() {
        let scores = vec![
            NodeScore::new("n3", 80),
            NodeScore::new("n1", 80),
            NodeScore::new("n2", 50),
        ];
        let best = select_node(&scores).unwrap();
        assert_eq!(best.node, "n1");
        assert_eq!(best.score, 80);

        assert!(select_node(&[]).is_none());
    }
}
